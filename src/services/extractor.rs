// src/services/extractor.rs

//! Catalog page extraction.
//!
//! Turns a raw catalog document into a [`NovelSnapshot`]. The markup is not
//! stable, so every field goes through a [`Chain`] of selectors evaluated in
//! order with early exit on the first non-empty result. Fields with a safe
//! default fall back to it; the latest chapter has none, and a page without
//! one is rejected as a whole.

use chrono::Utc;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{Chapter, NovelSnapshot, SelectorRules, Volume};

const DEFAULT_TITLE: &str = "Untitled";
const DEFAULT_AUTHOR: &str = "Unknown Author";
const DEFAULT_VOLUME_TITLE: &str = "Untitled Volume";
const MAIN_VOLUME_TITLE: &str = "Main Volume";
const LATEST_PUBLISHED_DEFAULT: &str = "Unknown";
const LISTED_PUBLISHED_DEFAULT: &str = "Unknown Date";

/// An ordered list of selectors; the first one that matches wins.
#[derive(Debug, Clone)]
struct Chain(Vec<Selector>);

impl Chain {
    fn compile(selectors: &[String]) -> Result<Self> {
        selectors
            .iter()
            .map(|s| Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}"))))
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    /// First element, in selector order then document order, for which `f`
    /// yields a value. A selector whose matches all yield `None` falls
    /// through to the next one.
    fn find_map<'a, T>(
        &self,
        scope: ElementRef<'a>,
        mut f: impl FnMut(ElementRef<'a>) -> Option<T>,
    ) -> Option<T> {
        self.0
            .iter()
            .find_map(|sel| scope.select(sel).find_map(&mut f))
    }

    /// All elements matched by the earliest selector that matches anything.
    fn all<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        self.0
            .iter()
            .map(|sel| scope.select(sel).collect::<Vec<_>>())
            .find(|found| !found.is_empty())
            .unwrap_or_default()
    }

    /// First non-empty, whitespace-normalized text.
    fn text(&self, scope: ElementRef<'_>) -> Option<String> {
        self.0.iter().find_map(|sel| {
            scope
                .select(sel)
                .map(|el| element_text(&el))
                .find(|text| !text.is_empty())
        })
    }

    /// First non-empty attribute value.
    fn attr(&self, scope: ElementRef<'_>, name: &str) -> Option<String> {
        self.0.iter().find_map(|sel| {
            scope
                .select(sel)
                .filter_map(|el| el.value().attr(name))
                .map(str::trim)
                .find(|value| !value.is_empty())
                .map(String::from)
        })
    }
}

/// Collapse an element's text nodes into a single trimmed line.
fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compiled extraction rules for catalog pages.
///
/// Stateless once built; safe to share across concurrent checks.
#[derive(Debug, Clone)]
pub struct Extractor {
    title: Chain,
    author: Chain,
    cover: Chain,
    cover_attr: String,
    latest_container: Chain,
    latest_link: Chain,
    latest_published: Chain,
    latest_fallback_link: Chain,
    volume: Chain,
    volume_title: Chain,
    chapter_item: Chain,
    chapter_link: Chain,
    chapter_number: Chain,
    chapter_title: Chain,
    chapter_published: Chain,
    lock_marker: Chain,
    lock_icon_ref: String,
    link_attr: String,
}

impl Extractor {
    /// Compile the given selector rules.
    pub fn new(rules: &SelectorRules) -> Result<Self> {
        Ok(Self {
            title: Chain::compile(&rules.title)?,
            author: Chain::compile(&rules.author)?,
            cover: Chain::compile(&rules.cover)?,
            cover_attr: rules.cover_attr.clone(),
            latest_container: Chain::compile(&rules.latest_container)?,
            latest_link: Chain::compile(&rules.latest_link)?,
            latest_published: Chain::compile(&rules.latest_published)?,
            latest_fallback_link: Chain::compile(&rules.latest_fallback_link)?,
            volume: Chain::compile(&rules.volume)?,
            volume_title: Chain::compile(&rules.volume_title)?,
            chapter_item: Chain::compile(&rules.chapter_item)?,
            chapter_link: Chain::compile(&rules.chapter_link)?,
            chapter_number: Chain::compile(&rules.chapter_number)?,
            chapter_title: Chain::compile(&rules.chapter_title)?,
            chapter_published: Chain::compile(&rules.chapter_published)?,
            lock_marker: Chain::compile(&rules.lock_marker)?,
            lock_icon_ref: rules.lock_icon_ref.clone(),
            link_attr: rules.link_attr.clone(),
        })
    }

    /// Extract a full snapshot from a raw catalog document.
    ///
    /// Fails with [`AppError::Extraction`] when no latest chapter can be
    /// located by any fallback.
    pub fn extract(&self, novel_id: &str, html: &str) -> Result<NovelSnapshot> {
        let document = Html::parse_document(html);
        self.extract_document(novel_id, &document)
    }

    /// Extract a full snapshot from an already parsed document.
    pub fn extract_document(&self, novel_id: &str, document: &Html) -> Result<NovelSnapshot> {
        let root = document.root_element();

        let Some(mut latest) = self.latest_chapter(root) else {
            log::warn!("No latest chapter found for novel {novel_id}");
            return Err(AppError::extraction(novel_id, "latest chapter"));
        };

        let volumes = self.volumes(root);
        if volumes.is_empty() {
            log::warn!("No chapter list found for novel {novel_id}");
        }

        // The teaser rarely carries lock icons or numbers; borrow them from
        // the listing entry with the same title.
        if let Some(listed) = volumes
            .iter()
            .flat_map(|v| v.chapters.iter())
            .find(|c| c.same_as(&latest))
        {
            latest.locked |= listed.locked;
            latest.number = latest.number.or(listed.number);
        }

        let snapshot = NovelSnapshot {
            novel_id: novel_id.to_string(),
            title: self.field_or(novel_id, "title", self.title.text(root), DEFAULT_TITLE),
            author: self.field_or(novel_id, "author", self.author.text(root), DEFAULT_AUTHOR),
            cover_url: self.field_or(
                novel_id,
                "cover",
                self.cover.attr(root, &self.cover_attr),
                "",
            ),
            latest_chapter: latest,
            volumes,
            checked_at: Utc::now(),
        };

        log::debug!(
            "Extracted {} ({} volumes, {} chapters, latest: {})",
            snapshot.title,
            snapshot.volumes.len(),
            snapshot.total_chapters(),
            snapshot.latest_chapter.title
        );
        Ok(snapshot)
    }

    /// Cheap entry point: run only the latest-chapter chain.
    pub fn quick_extract_latest(&self, html: &str) -> Option<Chapter> {
        let document = Html::parse_document(html);
        self.latest_chapter(document.root_element())
    }

    fn field_or(&self, novel_id: &str, field: &str, value: Option<String>, default: &str) -> String {
        value.unwrap_or_else(|| {
            log::debug!("All {field} selectors missed for novel {novel_id}, using default");
            default.to_string()
        })
    }

    /// Latest chapter from the teaser container, falling back to a
    /// document-level link.
    fn latest_chapter(&self, root: ElementRef<'_>) -> Option<Chapter> {
        let from_teaser = self.latest_container.find_map(root, |container| {
            let published = self
                .latest_published
                .text(container)
                .unwrap_or_else(|| LATEST_PUBLISHED_DEFAULT.to_string());
            self.latest_link
                .find_map(container, |link| self.linked_chapter(link, None, published.clone()))
        });

        from_teaser.or_else(|| {
            self.latest_fallback_link.find_map(root, |link| {
                self.linked_chapter(link, None, LATEST_PUBLISHED_DEFAULT.to_string())
            })
        })
    }

    /// Volumes in document order; falls back to a single synthetic volume
    /// when the page has no volume containers.
    fn volumes(&self, root: ElementRef<'_>) -> Vec<Volume> {
        let containers = self.volume.all(root);

        if containers.is_empty() {
            let chapters = self.chapters_in(root);
            if chapters.is_empty() {
                return Vec::new();
            }
            return vec![Volume {
                title: MAIN_VOLUME_TITLE.to_string(),
                chapters,
            }];
        }

        containers
            .into_iter()
            .filter_map(|container| {
                let chapters = self.chapters_in(container);
                if chapters.is_empty() {
                    return None;
                }
                let title = self
                    .volume_title
                    .text(container)
                    .unwrap_or_else(|| DEFAULT_VOLUME_TITLE.to_string());
                Some(Volume { title, chapters })
            })
            .collect()
    }

    fn chapters_in(&self, container: ElementRef<'_>) -> Vec<Chapter> {
        self.chapter_item
            .all(container)
            .into_iter()
            .filter_map(|item| {
                self.chapter_link.find_map(item, |link| {
                    let published = self
                        .chapter_published
                        .text(link)
                        .unwrap_or_else(|| LISTED_PUBLISHED_DEFAULT.to_string());
                    self.linked_chapter(link, Some(&self.chapter_title), published)
                })
            })
            .collect()
    }

    /// Build a chapter from its link element. The title comes from
    /// `title_chain` when given and matching, else from the whole link text.
    fn linked_chapter(
        &self,
        link: ElementRef<'_>,
        title_chain: Option<&Chain>,
        published: String,
    ) -> Option<Chapter> {
        let title = title_chain
            .and_then(|chain| chain.text(link))
            .unwrap_or_else(|| element_text(&link));
        if title.is_empty() {
            return None;
        }

        let number = self
            .chapter_number
            .text(link)
            .and_then(|raw| raw.parse::<u32>().ok());

        let url = link
            .value()
            .attr(&self.link_attr)
            .unwrap_or("")
            .trim()
            .to_string();

        Some(Chapter {
            number,
            title,
            url,
            published,
            locked: self.is_locked(link),
        })
    }

    /// Whether a lock icon is present under the chapter's link.
    fn is_locked(&self, link: ElementRef<'_>) -> bool {
        self.lock_marker.0.iter().any(|sel| {
            link.select(sel).any(|marker| {
                self.lock_icon_ref.is_empty()
                    || marker
                        .value()
                        .attrs()
                        .any(|(name, value)| name == "href" && value == self.lock_icon_ref)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> Extractor {
        Extractor::new(&SelectorRules::default()).unwrap()
    }

    const CATALOG_PAGE: &str = r##"
<html>
<head><title>Test Novel Page</title></head>
<body>
    <h1 class="auto_height">Test Novel Title</h1>
    <address><span class="c_primary">Test Author</span></address>
    <div class="_sd"><img src="http://example.com/cover.jpg" /></div>

    <div class="det-con-intro">
        <a class="lst-chapter" href="/book/123/chapter-100">Chapter 100: The Latest Adventure</a>
        <small class="c_s">2 hours ago</small>
    </div>

    <div class="volume-item">
        <h4>Volume 1: The Beginning</h4>
        <ol class="content-list">
            <li>
                <a href="/book/123/chapter-1">
                    <span class="_num">1</span>
                    <strong>Chapter 1: First Steps</strong>
                    <small>Jan 01, 2023</small>
                </a>
            </li>
            <li>
                <a href="/book/123/chapter-2">
                    <span class="_num">2</span>
                    <strong>Chapter 2: Into the Woods</strong>
                    <small>Jan 02, 2023</small>
                    <svg class="_icon"><use href="#i-lock"></use></svg>
                </a>
            </li>
        </ol>
    </div>
    <div class="volume-item">
        <h4>Volume 2: The Journey Continues</h4>
        <ol class="content-list">
            <li>
                <a href="/book/123/chapter-3">
                    <span class="_num">3</span>
                    <strong>Chapter 3: New Allies</strong>
                    <small>Jan 03, 2023</small>
                </a>
            </li>
        </ol>
    </div>
    <div class="volume-item">
        <h4>Volume 3: Empty</h4>
    </div>
</body>
</html>
"##;

    const MINIMAL_PAGE: &str = r#"
<html><body>
    <h1>Minimal Novel</h1>
    <div class="latest-chapter">
        <a href="/book/456/ch1">Chapter 1: Only Chapter</a>
        <span class="date">Yesterday</span>
    </div>
    <ol class="content-list">
        <li>
            <a href="/book/456/ch1">
                <strong>Chapter 1: Only Chapter</strong>
            </a>
        </li>
    </ol>
</body></html>
"#;

    #[test]
    fn test_extract_full_page() {
        let snap = extractor().extract("123", CATALOG_PAGE).unwrap();

        assert_eq!(snap.novel_id, "123");
        assert_eq!(snap.title, "Test Novel Title");
        assert_eq!(snap.author, "Test Author");
        assert_eq!(snap.cover_url, "http://example.com/cover.jpg");

        assert_eq!(snap.latest_chapter.title, "Chapter 100: The Latest Adventure");
        assert_eq!(snap.latest_chapter.url, "/book/123/chapter-100");
        assert_eq!(snap.latest_chapter.published, "2 hours ago");
        assert!(!snap.latest_chapter.locked);
    }

    #[test]
    fn test_volumes_and_lock_markers() {
        let snap = extractor().extract("123", CATALOG_PAGE).unwrap();

        // The empty third volume is dropped
        assert_eq!(snap.volumes.len(), 2);
        assert_eq!(snap.volumes[0].title, "Volume 1: The Beginning");
        assert_eq!(snap.volumes[1].title, "Volume 2: The Journey Continues");

        let second = &snap.volumes[0].chapters[1];
        assert_eq!(second.number, Some(2));
        assert_eq!(second.title, "Chapter 2: Into the Woods");
        assert_eq!(second.url, "/book/123/chapter-2");
        assert_eq!(second.published, "Jan 02, 2023");
        assert!(second.locked);
        assert!(!snap.volumes[0].chapters[0].locked);

        assert_eq!(snap.total_chapters(), 3);
        assert_eq!(
            snap.last_free_chapter().map(|c| c.title.as_str()),
            Some("Chapter 3: New Allies")
        );
    }

    #[test]
    fn test_minimal_page_uses_fallbacks_and_defaults() {
        let snap = extractor().extract("456", MINIMAL_PAGE).unwrap();

        assert_eq!(snap.title, "Minimal Novel");
        assert_eq!(snap.author, "Unknown Author");
        assert_eq!(snap.cover_url, "");
        assert_eq!(snap.latest_chapter.title, "Chapter 1: Only Chapter");
        assert_eq!(snap.latest_chapter.published, "Yesterday");

        assert_eq!(snap.volumes.len(), 1);
        assert_eq!(snap.volumes[0].title, "Main Volume");
        let only = &snap.volumes[0].chapters[0];
        assert_eq!(only.title, "Chapter 1: Only Chapter");
        assert_eq!(only.number, None);
        assert_eq!(only.published, "Unknown Date");
    }

    #[test]
    fn test_fallback_value_is_returned_trimmed() {
        let html = r#"
            <h1 class="auto_height">   </h1>
            <h1>  Fallback Title  </h1>
            <span class="author-name">  Jane Doe </span>
            <div class="cover"><img src=" /img/c.png "></div>
            <ol class="content-list"><li><a href="/c1">One</a></li></ol>
        "#;
        let snap = extractor().extract("1", html).unwrap();
        assert_eq!(snap.title, "Fallback Title");
        assert_eq!(snap.author, "Jane Doe");
        assert_eq!(snap.cover_url, "/img/c.png");
    }

    #[test]
    fn test_defaults_when_nothing_matches() {
        let html = r#"<ol class="content-list"><li><a href="/c1">One</a></li></ol>"#;
        let snap = extractor().extract("1", html).unwrap();
        assert_eq!(snap.title, "Untitled");
        assert_eq!(snap.author, "Unknown Author");
        assert_eq!(snap.cover_url, "");
    }

    #[test]
    fn test_latest_falls_back_to_chapter_list() {
        let html = r#"
            <ol class="content-list">
                <li><a href="/first">First Chapter in List</a></li>
            </ol>
        "#;
        let extractor = extractor();
        let chapter = extractor.quick_extract_latest(html).unwrap();
        assert_eq!(chapter.title, "First Chapter in List");
        assert_eq!(chapter.url, "/first");
        assert_eq!(chapter.published, "Unknown");
    }

    #[test]
    fn test_teaser_without_link_falls_through() {
        let html = r#"
            <div class="det-con-intro"><p>No link here</p></div>
            <div class="latest-chapter"><a href="/c9">Chapter 9</a></div>
        "#;
        let chapter = extractor().quick_extract_latest(html).unwrap();
        assert_eq!(chapter.title, "Chapter 9");
    }

    #[test]
    fn test_empty_teaser_link_falls_through_to_next_link() {
        let html = r#"
            <div class="det-con-intro">
                <a class="lst-chapter" href="/c0"> </a>
                <a href="/c5">Chapter 5: Newest</a>
            </div>
            <ol class="content-list">
                <li><a href="/c1">Chapter 1: Oldest</a></li>
            </ol>
        "#;
        let chapter = extractor().quick_extract_latest(html).unwrap();
        assert_eq!(chapter.title, "Chapter 5: Newest");
        assert_eq!(chapter.url, "/c5");
    }

    #[test]
    fn test_chapter_item_skips_empty_link() {
        let mut rules = SelectorRules::default();
        rules.chapter_link = vec!["a.title".into(), "a".into()];
        let html = r#"
            <div class="det-con-intro"><a class="lst-chapter" href="/c2">Ch.2</a></div>
            <ol class="content-list">
                <li><a class="title" href="/x"></a><a href="/c2"><strong>Ch.2</strong></a></li>
            </ol>
        "#;
        let snap = Extractor::new(&rules).unwrap().extract("1", html).unwrap();
        let chapters: Vec<&str> = snap.chapters().map(|c| c.url.as_str()).collect();
        assert_eq!(chapters, vec!["/c2"]);
    }

    #[test]
    fn test_missing_latest_rejects_candidate() {
        let extractor = extractor();
        assert!(extractor.quick_extract_latest("<div></div>").is_none());

        let result = extractor.extract("9", "<html><body><h1>Error</h1></body></html>");
        assert!(matches!(result, Err(AppError::Extraction { .. })));
    }

    #[test]
    fn test_unparsable_number_is_left_unset() {
        let html = r#"
            <ol class="content-list">
                <li><a href="/c"><span class="_num">Prologue</span><strong>Prologue</strong></a></li>
                <li><a href="/d"><span class="_num"> 123 </span><strong>Chapter Title Here</strong><small>Yesterday</small></a></li>
            </ol>
        "#;
        let snap = extractor().extract("1", html).unwrap();
        let chapters = &snap.volumes[0].chapters;
        assert_eq!(chapters[0].number, None);
        assert_eq!(chapters[1].number, Some(123));
        assert_eq!(chapters[1].published, "Yesterday");
    }

    #[test]
    fn test_xlink_lock_marker() {
        let html = r##"
            <ol class="content-list">
                <li><a href="/c1"><strong>Ch.1</strong></a></li>
                <li><a href="/c2"><strong>Ch.2</strong>
                    <svg class="_icon"><use xlink:href="#i-lock"></use></svg></a></li>
                <li><a href="/c3"><strong>Ch.3</strong>
                    <svg class="_icon"><use href="#i-star"></use></svg></a></li>
            </ol>
        "##;
        let snap = extractor().extract("1", html).unwrap();
        let locked: Vec<bool> = snap.chapters().map(|c| c.locked).collect();
        assert_eq!(locked, vec![false, true, false]);
    }

    #[test]
    fn test_latest_inherits_lock_from_listing() {
        let html = r##"
            <div class="det-con-intro"><a class="lst-chapter" href="/c2">Ch.2</a></div>
            <ol class="content-list">
                <li><a href="/c1"><span class="_num">1</span><strong>Ch.1</strong></a></li>
                <li><a href="/c2"><span class="_num">2</span><strong>Ch.2</strong>
                    <svg class="_icon"><use href="#i-lock"></use></svg></a></li>
            </ol>
        "##;
        let snap = extractor().extract("1", html).unwrap();
        assert!(snap.latest_chapter.locked);
        assert_eq!(snap.latest_chapter.number, Some(2));
        assert_eq!(snap.last_free_chapter().unwrap().title, "Ch.1");
    }

    #[test]
    fn test_invalid_selector_rejected() {
        let mut rules = SelectorRules::default();
        rules.title = vec!["[[invalid".into()];
        assert!(matches!(
            Extractor::new(&rules),
            Err(AppError::Selector { .. })
        ));
    }
}
