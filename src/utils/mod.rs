//! Utility functions and helpers.

pub mod http;

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Resolve a URL string against a base URL string.
pub fn resolve(base_url: &str, href: &str) -> Option<String> {
    Url::parse(base_url)
        .ok()
        .map(|base| resolve_url(&base, href))
}

static BOOK_SEGMENT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?:.*_)?(\d+)$").ok());

/// Extract a numeric novel id from a catalog URL or a bare id.
///
/// Accepted forms:
/// - `12345`
/// - `https://www.webnovel.com/book/12345`
/// - `https://www.webnovel.com/book/some-title_12345/catalog`
pub fn parse_novel_id(reference: &str) -> Option<String> {
    let reference = reference.trim();
    if !reference.is_empty() && reference.chars().all(|c| c.is_ascii_digit()) {
        return Some(reference.to_string());
    }

    let url = Url::parse(reference).ok()?;
    let mut segments = url.path_segments()?;
    segments.find(|s| *s == "book")?;
    let slug = segments.next()?;

    BOOK_SEGMENT
        .as_ref()?
        .captures(slug)
        .and_then(|caps| caps.get(1))
        .map(|id| id.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://example.com/path/").unwrap();
        assert_eq!(
            resolve_url(&base, "page.html"),
            "https://example.com/path/page.html"
        );
        assert_eq!(
            resolve_url(&base, "/root.html"),
            "https://example.com/root.html"
        );
        assert_eq!(
            resolve_url(&base, "https://other.com/x"),
            "https://other.com/x"
        );
    }

    #[test]
    fn test_resolve_relative_chapter_link() {
        assert_eq!(
            resolve("https://www.webnovel.com/book/1/catalog", "/book/1/ch-2"),
            Some("https://www.webnovel.com/book/1/ch-2".to_string())
        );
        assert_eq!(resolve("not a url", "/x"), None);
    }

    #[test]
    fn test_parse_novel_id() {
        assert_eq!(parse_novel_id("12345"), Some("12345".to_string()));
        assert_eq!(parse_novel_id(" 12345 "), Some("12345".to_string()));
        assert_eq!(
            parse_novel_id("https://www.webnovel.com/book/the-novel_12345"),
            Some("12345".to_string())
        );
        assert_eq!(
            parse_novel_id("https://www.webnovel.com/book/the_long_title_777/catalog"),
            Some("777".to_string())
        );
        assert_eq!(
            parse_novel_id("https://www.webnovel.com/book/98765"),
            Some("98765".to_string())
        );
    }

    #[test]
    fn test_parse_novel_id_rejects_non_numeric() {
        assert_eq!(parse_novel_id(""), None);
        assert_eq!(parse_novel_id("the-novel"), None);
        assert_eq!(parse_novel_id("https://www.webnovel.com/book/the-novel"), None);
        assert_eq!(parse_novel_id("https://www.webnovel.com/stories/123"), None);
    }
}
