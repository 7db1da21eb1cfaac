//! Chapter, volume and snapshot structures.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A single chapter as listed on a catalog page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chapter {
    /// Sequence number, `None` when the page does not expose a parsable one
    #[serde(default)]
    pub number: Option<u32>,

    /// Chapter title (never empty for an extracted chapter)
    pub title: String,

    /// Link target as found in the markup
    pub url: String,

    /// Free-text publication label ("2 hours ago", "Jan 01, 2023", ...)
    pub published: String,

    /// Whether the chapter sits behind the paywall
    #[serde(default)]
    pub locked: bool,
}

impl Chapter {
    /// Chapters are identified by title; sequence numbers are unreliable.
    pub fn same_as(&self, other: &Chapter) -> bool {
        self.title == other.title
    }
}

/// An ordered group of chapters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Volume {
    pub title: String,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

/// Last-known structured view of a tracked novel.
///
/// `latest_chapter` is not optional: a candidate without one is rejected by
/// the extractor and can never be stored or compared against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NovelSnapshot {
    /// Stable catalog identifier
    pub novel_id: String,

    /// Display title
    pub title: String,

    pub author: String,

    /// Cover image locator (empty if none was found)
    pub cover_url: String,

    /// The chapter currently considered "current" for comparison
    pub latest_chapter: Chapter,

    /// Full chapter listing; empty when only a quick check was performed
    #[serde(default)]
    pub volumes: Vec<Volume>,

    /// When the novel was last checked against the source
    pub checked_at: DateTime<Utc>,
}

impl NovelSnapshot {
    /// All chapters across volumes in extraction order.
    pub fn chapters(&self) -> impl Iterator<Item = &Chapter> {
        self.volumes.iter().flat_map(|v| v.chapters.iter())
    }

    /// Total number of chapters across all volumes.
    pub fn total_chapters(&self) -> usize {
        self.volumes.iter().map(|v| v.chapters.len()).sum()
    }

    /// The last chapter in the listing that is not locked.
    pub fn last_free_chapter(&self) -> Option<&Chapter> {
        self.chapters().filter(|c| !c.locked).last()
    }

    /// Refresh `checked_at`, keeping it strictly increasing even when the
    /// wall clock has not advanced since the previous check.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.checked_at = if now > self.checked_at {
            now
        } else {
            self.checked_at + Duration::microseconds(1)
        };
    }
}

/// Freshly fetched chapter information for one novel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterProbe {
    /// Unconditional latest chapter, locked or not
    pub latest: Chapter,

    /// Latest chapter that is not locked, if determinable
    pub last_free: Option<Chapter>,

    /// Chapter listing the probe was derived from (empty for quick probes)
    pub volumes: Vec<Volume>,
}

impl ChapterProbe {
    /// Probe built from the latest chapter alone; paid chapters are not
    /// distinguished.
    pub fn latest_only(latest: Chapter) -> Self {
        Self {
            latest,
            last_free: None,
            volumes: Vec::new(),
        }
    }

    /// Probe rebuilt from a stored snapshot, whose `latest_chapter` already
    /// is the chapter chosen for notification. Paid chapters are recovered
    /// from the stored listing when that chapter appears in it.
    pub fn from_stored(snapshot: &NovelSnapshot) -> Self {
        let announced = &snapshot.latest_chapter;
        let latest = snapshot
            .chapters()
            .skip_while(|c| !c.same_as(announced))
            .last()
            .filter(|c| c.locked)
            .unwrap_or(announced)
            .clone();
        Self {
            latest,
            last_free: Some(announced.clone()),
            volumes: Vec::new(),
        }
    }

    /// The chapter used for comparison and notification.
    pub fn chapter_for_notification(&self) -> &Chapter {
        self.last_free.as_ref().unwrap_or(&self.latest)
    }

    /// Whether newer chapters exist behind the paywall.
    pub fn has_paid_chapters(&self) -> bool {
        match &self.last_free {
            Some(free) => self.latest.locked && !self.latest.same_as(free),
            None => false,
        }
    }

    /// Number of chapters between the last free and the latest chapter,
    /// when both carry sequence numbers.
    pub fn locked_ahead(&self) -> Option<u32> {
        if !self.has_paid_chapters() {
            return None;
        }
        let free = self.last_free.as_ref()?.number?;
        self.latest.number?.checked_sub(free)
    }
}

impl From<NovelSnapshot> for ChapterProbe {
    fn from(snapshot: NovelSnapshot) -> Self {
        let last_free = snapshot.last_free_chapter().cloned();
        Self {
            latest: snapshot.latest_chapter,
            last_free,
            volumes: snapshot.volumes,
        }
    }
}

/// A detected update, ready for fan-out to subscribers.
///
/// Carries only the chapter selected for notification; a paid chapter is
/// never surfaced, only flagged through `has_paid_chapters`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateEvent {
    pub novel_id: String,
    pub novel_title: String,
    pub author: String,
    pub chapter: Chapter,
    pub has_paid_chapters: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_ahead: Option<u32>,
    pub detected_at: DateTime<Utc>,
}

impl UpdateEvent {
    /// Build an event announcing `probe`'s chapter-for-notification.
    pub fn new(snapshot: &NovelSnapshot, probe: &ChapterProbe, now: DateTime<Utc>) -> Self {
        Self {
            novel_id: snapshot.novel_id.clone(),
            novel_title: snapshot.title.clone(),
            author: snapshot.author.clone(),
            chapter: probe.chapter_for_notification().clone(),
            has_paid_chapters: probe.has_paid_chapters(),
            locked_ahead: probe.locked_ahead(),
            detected_at: now,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_last_free_chapter_skips_locked_tail() {
        let mut snap = snapshot("1", "Ch.3");
        snap.volumes = vec![
            Volume {
                title: "Volume 1".into(),
                chapters: vec![chapter("Ch.1", false), chapter("Ch.2", false)],
            },
            Volume {
                title: "Volume 2".into(),
                chapters: vec![chapter("Ch.3", true)],
            },
        ];

        assert_eq!(snap.total_chapters(), 3);
        assert_eq!(snap.last_free_chapter().map(|c| c.title.as_str()), Some("Ch.2"));
    }

    #[test]
    fn test_touch_is_strictly_increasing() {
        let mut snap = snapshot("1", "Ch.1");
        let future = snap.checked_at + Duration::hours(2);
        snap.touch(future);
        assert_eq!(snap.checked_at, future);

        // Clock stalled or stepped back
        snap.touch(future - Duration::minutes(5));
        assert!(snap.checked_at > future);
    }

    #[test]
    fn test_probe_prefers_last_free() {
        let probe = ChapterProbe {
            latest: numbered(12, "Ch.12", true),
            last_free: Some(numbered(10, "Ch.10", false)),
            volumes: Vec::new(),
        };
        assert_eq!(probe.chapter_for_notification().title, "Ch.10");
        assert!(probe.has_paid_chapters());
        assert_eq!(probe.locked_ahead(), Some(2));
    }

    #[test]
    fn test_probe_without_paid_chapters() {
        let probe = ChapterProbe::latest_only(chapter("Ch.5", false));
        assert_eq!(probe.chapter_for_notification().title, "Ch.5");
        assert!(!probe.has_paid_chapters());
        assert_eq!(probe.locked_ahead(), None);

        // Latest is free and equal to the last free chapter
        let probe = ChapterProbe {
            latest: chapter("Ch.5", false),
            last_free: Some(chapter("Ch.5", false)),
            volumes: Vec::new(),
        };
        assert!(!probe.has_paid_chapters());
    }

    #[test]
    fn test_from_stored_recovers_paid_chapters() {
        let mut snap = snapshot("1", "Ch.2");
        snap.volumes = vec![Volume {
            title: "Volume 1".into(),
            chapters: vec![
                numbered(1, "Ch.1", false),
                numbered(2, "Ch.2", false),
                numbered(3, "Ch.3", true),
                numbered(4, "Ch.4", true),
            ],
        }];
        snap.latest_chapter = numbered(2, "Ch.2", false);

        let probe = ChapterProbe::from_stored(&snap);
        assert_eq!(probe.chapter_for_notification().title, "Ch.2");
        assert!(probe.has_paid_chapters());
        assert_eq!(probe.locked_ahead(), Some(2));

        // A listing that does not contain the stored chapter says nothing
        snap.latest_chapter = chapter("Ch.9", false);
        assert!(!ChapterProbe::from_stored(&snap).has_paid_chapters());
    }

    #[test]
    fn test_snapshot_requires_latest_chapter_on_load() {
        let json = r#"{
            "novel_id": "1",
            "title": "T",
            "author": "A",
            "cover_url": "",
            "checked_at": "2026-01-01T00:00:00Z"
        }"#;
        assert!(serde_json::from_str::<NovelSnapshot>(json).is_err());
    }
}
