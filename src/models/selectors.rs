// src/models/selectors.rs

//! CSS selector chains for scraping a catalog page.
//!
//! Every field is located through an ordered list of selectors. The first
//! selector that yields a non-empty value wins; later entries are fallbacks
//! for older or alternative page layouts.

use serde::{Deserialize, Serialize};

/// Ordered selector chains for each extracted field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorRules {
    /// Novel title
    #[serde(default = "defaults::title")]
    pub title: Vec<String>,

    /// Author name
    #[serde(default = "defaults::author")]
    pub author: Vec<String>,

    /// Cover image element (value read from `cover_attr`)
    #[serde(default = "defaults::cover")]
    pub cover: Vec<String>,

    #[serde(default = "defaults::cover_attr")]
    pub cover_attr: String,

    /// Container holding the "latest chapter" teaser
    #[serde(default = "defaults::latest_container")]
    pub latest_container: Vec<String>,

    /// Link to the latest chapter, inside the container
    #[serde(default = "defaults::latest_link")]
    pub latest_link: Vec<String>,

    /// Publication label of the latest chapter, inside the container
    #[serde(default = "defaults::latest_published")]
    pub latest_published: Vec<String>,

    /// Document-level link used when no teaser container exists
    #[serde(default = "defaults::latest_fallback_link")]
    pub latest_fallback_link: Vec<String>,

    /// Volume containers
    #[serde(default = "defaults::volume")]
    pub volume: Vec<String>,

    /// Volume title, inside a volume container
    #[serde(default = "defaults::volume_title")]
    pub volume_title: Vec<String>,

    /// Chapter list items, inside a volume or the whole document
    #[serde(default = "defaults::chapter_item")]
    pub chapter_item: Vec<String>,

    /// Chapter link, inside a chapter item
    #[serde(default = "defaults::chapter_link")]
    pub chapter_link: Vec<String>,

    /// Sequence number, inside the chapter link
    #[serde(default = "defaults::chapter_number")]
    pub chapter_number: Vec<String>,

    /// Dedicated title node, inside the chapter link
    #[serde(default = "defaults::chapter_title")]
    pub chapter_title: Vec<String>,

    /// Publication label, inside the chapter link
    #[serde(default = "defaults::chapter_published")]
    pub chapter_published: Vec<String>,

    /// Lock icon candidates, inside a chapter link
    #[serde(default = "defaults::lock_marker")]
    pub lock_marker: Vec<String>,

    /// Icon reference a lock candidate must point at (any `href` attribute,
    /// including `xlink:href`); empty means any candidate counts
    #[serde(default = "defaults::lock_icon_ref")]
    pub lock_icon_ref: String,

    /// HTML attribute holding link targets
    #[serde(default = "defaults::link_attr")]
    pub link_attr: String,
}

impl Default for SelectorRules {
    fn default() -> Self {
        Self {
            title: defaults::title(),
            author: defaults::author(),
            cover: defaults::cover(),
            cover_attr: defaults::cover_attr(),
            latest_container: defaults::latest_container(),
            latest_link: defaults::latest_link(),
            latest_published: defaults::latest_published(),
            latest_fallback_link: defaults::latest_fallback_link(),
            volume: defaults::volume(),
            volume_title: defaults::volume_title(),
            chapter_item: defaults::chapter_item(),
            chapter_link: defaults::chapter_link(),
            chapter_number: defaults::chapter_number(),
            chapter_title: defaults::chapter_title(),
            chapter_published: defaults::chapter_published(),
            lock_marker: defaults::lock_marker(),
            lock_icon_ref: defaults::lock_icon_ref(),
            link_attr: defaults::link_attr(),
        }
    }
}

impl SelectorRules {
    /// Named chains, for validation and diagnostics.
    pub fn chains(&self) -> [(&'static str, &[String]); 15] {
        [
            ("title", &self.title),
            ("author", &self.author),
            ("cover", &self.cover),
            ("latest_container", &self.latest_container),
            ("latest_link", &self.latest_link),
            ("latest_published", &self.latest_published),
            ("latest_fallback_link", &self.latest_fallback_link),
            ("volume", &self.volume),
            ("volume_title", &self.volume_title),
            ("chapter_item", &self.chapter_item),
            ("chapter_link", &self.chapter_link),
            ("chapter_number", &self.chapter_number),
            ("chapter_title", &self.chapter_title),
            ("chapter_published", &self.chapter_published),
            ("lock_marker", &self.lock_marker),
        ]
    }

    /// Chains that must not be empty.
    pub const REQUIRED: [&'static str; 4] =
        ["latest_link", "chapter_item", "chapter_link", "lock_marker"];
}

mod defaults {
    fn chain(selectors: &[&str]) -> Vec<String> {
        selectors.iter().map(|s| s.to_string()).collect()
    }

    pub fn title() -> Vec<String> {
        chain(&["h1.auto_height", "h1"])
    }
    pub fn author() -> Vec<String> {
        chain(&[
            "address .c_primary",
            "[data-test=\"author\"] a, .author a, .author-name",
        ])
    }
    pub fn cover() -> Vec<String> {
        chain(&[
            "div._sd img",
            ".book-cover img, .cover img, img[alt*=\"cover\"]",
        ])
    }
    pub fn cover_attr() -> String {
        "src".into()
    }
    pub fn latest_container() -> Vec<String> {
        chain(&[".det-con-intro", ".latest-chapter, .last-chapter"])
    }
    pub fn latest_link() -> Vec<String> {
        chain(&["a.lst-chapter", "a"])
    }
    pub fn latest_published() -> Vec<String> {
        chain(&["small.c_s", "small, .date, .time"])
    }
    pub fn latest_fallback_link() -> Vec<String> {
        chain(&["ol.content-list > li:first-child a"])
    }
    pub fn volume() -> Vec<String> {
        chain(&[".volume-item"])
    }
    pub fn volume_title() -> Vec<String> {
        chain(&["h4", ".volume-title, .volume-name, h1, h2, h3"])
    }
    pub fn chapter_item() -> Vec<String> {
        chain(&[
            "ol.content-list > li",
            ".chapter-list li, .content-list li, .chapter-item",
        ])
    }
    pub fn chapter_link() -> Vec<String> {
        chain(&["a"])
    }
    pub fn chapter_number() -> Vec<String> {
        chain(&["._num"])
    }
    pub fn chapter_title() -> Vec<String> {
        chain(&["strong"])
    }
    pub fn chapter_published() -> Vec<String> {
        chain(&["small"])
    }
    pub fn lock_marker() -> Vec<String> {
        chain(&["svg._icon use"])
    }
    pub fn lock_icon_ref() -> String {
        "#i-lock".into()
    }
    pub fn link_attr() -> String {
        "href".into()
    }
}
