// src/services/detector.rs

//! Update detection between a stored snapshot and a fresh probe.
//!
//! The comparison key is the probe's chapter-for-notification: the last free
//! chapter when one is known, otherwise the unconditional latest chapter.
//! Titles are the only identity; sequence numbers are not trusted.

use chrono::{DateTime, Utc};

use crate::models::{ChapterProbe, NovelSnapshot, UpdateEvent};

/// Outcome of comparing a probe with the stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// No probe could be obtained; nothing may be written.
    Skipped,

    /// Same chapter as before; the snapshot only has a fresh `checked_at`.
    Unchanged(NovelSnapshot),

    /// A new chapter-for-notification; the snapshot carries it as latest.
    Updated(NovelSnapshot, UpdateEvent),
}

impl Detection {
    /// Snapshot to persist, if any.
    pub fn snapshot(&self) -> Option<&NovelSnapshot> {
        match self {
            Self::Skipped => None,
            Self::Unchanged(snapshot) | Self::Updated(snapshot, _) => Some(snapshot),
        }
    }

    pub fn event(&self) -> Option<&UpdateEvent> {
        match self {
            Self::Updated(_, event) => Some(event),
            _ => None,
        }
    }

    pub fn is_update(&self) -> bool {
        matches!(self, Self::Updated(..))
    }
}

/// Stateless change detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector;

impl ChangeDetector {
    pub fn new() -> Self {
        Self
    }

    /// Compare `probe` against `stored`.
    ///
    /// Never mutates `stored`; the returned snapshot is what the caller
    /// should persist.
    pub fn detect(
        &self,
        novel_id: &str,
        stored: &NovelSnapshot,
        probe: Option<&ChapterProbe>,
        now: DateTime<Utc>,
    ) -> Detection {
        let Some(probe) = probe else {
            log::debug!("No chapter info for {novel_id}, skipping detection");
            return Detection::Skipped;
        };

        let mut next = stored.clone();
        next.touch(now);

        let candidate = probe.chapter_for_notification();
        if candidate.same_as(&stored.latest_chapter) {
            return Detection::Unchanged(next);
        }

        log::info!(
            "Update for {} ({}): {:?} -> {:?}{}",
            novel_id,
            stored.title,
            stored.latest_chapter.title,
            candidate.title,
            if probe.has_paid_chapters() {
                " (paid chapters ahead)"
            } else {
                ""
            }
        );

        next.latest_chapter = candidate.clone();
        if !probe.volumes.is_empty() {
            next.volumes = probe.volumes.clone();
        }

        let event = UpdateEvent::new(&next, probe, next.checked_at);
        Detection::Updated(next, event)
    }
}
