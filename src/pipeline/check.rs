// src/pipeline/check.rs

//! Single-novel check: fetch, extract, detect, persist, notify.
//!
//! Scheduled cycles and manual checks both go through [`UpdateChecker::check`];
//! callers are responsible for holding the novel's lock around it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::{AppError, Result};
use crate::models::{ChapterProbe, Config, NovelSnapshot, UpdateEvent};
use crate::services::{
    ChangeDetector, DeliveryReport, Detection, Extractor, Fetcher, MessageSender, Notifier,
};
use crate::storage::NovelStore;

/// What a successful check did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// First check of the novel; snapshot stored, nobody notified
    Initialized(NovelSnapshot),

    /// No new chapter; `redelivered` holds the catch-up report if any
    /// subscriber was behind
    Unchanged { redelivered: Option<DeliveryReport> },

    /// New chapter stored and fanned out; `report` is `None` when the
    /// subscriber list could not be resolved
    Updated {
        event: UpdateEvent,
        report: Option<DeliveryReport>,
    },
}

impl CheckOutcome {
    pub fn event(&self) -> Option<&UpdateEvent> {
        match self {
            Self::Updated { event, .. } => Some(event),
            _ => None,
        }
    }
}

pub struct UpdateChecker {
    store: Arc<dyn NovelStore>,
    fetcher: Arc<dyn Fetcher>,
    extractor: Extractor,
    detector: ChangeDetector,
    notifier: Notifier,
    fetch_timeout: Duration,
    quick_check: bool,
    retry_pending: bool,
}

impl UpdateChecker {
    pub fn new(
        config: &Config,
        store: Arc<dyn NovelStore>,
        fetcher: Arc<dyn Fetcher>,
        sender: Arc<dyn MessageSender>,
    ) -> Result<Self> {
        Ok(Self {
            extractor: Extractor::new(&config.selectors)?,
            detector: ChangeDetector::new(),
            notifier: Notifier::new(store.clone(), sender, config),
            store,
            fetcher,
            fetch_timeout: config.fetcher.timeout(),
            quick_check: config.scheduler.quick_check,
            retry_pending: config.notifier.retry_pending,
        })
    }

    pub fn store(&self) -> &Arc<dyn NovelStore> {
        &self.store
    }

    /// Check one novel against its stored snapshot.
    ///
    /// Fetch and extraction failures leave the stored snapshot untouched.
    /// A failed save suppresses notification.
    pub async fn check(&self, novel_id: &str) -> Result<CheckOutcome> {
        let Some(stored) = self.store.get_snapshot(novel_id).await? else {
            return self.initialize(novel_id).await;
        };

        let fetched = self.probe(novel_id).await;
        let detection = self
            .detector
            .detect(novel_id, &stored, fetched.as_ref().ok(), Utc::now());

        match detection {
            Detection::Skipped => Err(fetched
                .err()
                .unwrap_or_else(|| AppError::extraction(novel_id, "latest chapter"))),
            Detection::Unchanged(snapshot) => {
                self.store.save_snapshot(&snapshot).await?;
                log::debug!("No update for {novel_id} ({})", snapshot.latest_chapter.title);

                let redelivered = if self.retry_pending {
                    self.redeliver(&snapshot).await
                } else {
                    None
                };
                Ok(CheckOutcome::Unchanged { redelivered })
            }
            Detection::Updated(snapshot, event) => {
                self.store.save_snapshot(&snapshot).await?;

                let report = match self.notifier.notify(&event).await {
                    Ok(report) => Some(report),
                    Err(e) => {
                        log::error!("Could not notify subscribers of {novel_id}: {e}");
                        None
                    }
                };
                Ok(CheckOutcome::Updated { event, report })
            }
        }
    }

    /// Fetch and fully extract a novel without touching the store.
    ///
    /// The snapshot's latest chapter is the chapter-for-notification, so
    /// later comparisons start from what subscribers can actually read.
    pub async fn fetch_snapshot(&self, novel_id: &str) -> Result<NovelSnapshot> {
        let html = self.fetch(novel_id).await?;
        let mut snapshot = self.extractor.extract(novel_id, &html)?;
        if let Some(free) = snapshot.last_free_chapter().cloned() {
            snapshot.latest_chapter = free;
        }
        Ok(snapshot)
    }

    async fn initialize(&self, novel_id: &str) -> Result<CheckOutcome> {
        let snapshot = self.fetch_snapshot(novel_id).await?;
        self.store.save_snapshot(&snapshot).await?;
        log::info!(
            "Stored initial snapshot of {} ({}), latest: {}",
            novel_id,
            snapshot.title,
            snapshot.latest_chapter.title
        );
        Ok(CheckOutcome::Initialized(snapshot))
    }

    async fn probe(&self, novel_id: &str) -> Result<ChapterProbe> {
        let html = self.fetch(novel_id).await?;
        if self.quick_check {
            return self
                .extractor
                .quick_extract_latest(&html)
                .map(ChapterProbe::latest_only)
                .ok_or_else(|| AppError::extraction(novel_id, "latest chapter"));
        }
        self.extractor.extract(novel_id, &html).map(ChapterProbe::from)
    }

    async fn fetch(&self, novel_id: &str) -> Result<String> {
        tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(novel_id))
            .await
            .map_err(|_| AppError::timeout(format!("fetch {novel_id}"), self.fetch_timeout.as_secs()))?
    }

    async fn redeliver(&self, snapshot: &NovelSnapshot) -> Option<DeliveryReport> {
        match self.notifier.notify_pending(snapshot).await {
            Ok(report) if report.attempted > 0 => Some(report),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Pending delivery lookup failed for {}: {e}", snapshot.novel_id);
                None
            }
        }
    }
}
