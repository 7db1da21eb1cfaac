// src/services/notifier.rs

//! Fan-out of update events to subscribers.
//!
//! Every subscriber is delivered to independently. A failed or timed out
//! send only affects that subscriber: its cursor stays where it was so the
//! chapter is offered again later, while everyone else proceeds.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::{AppError, Result};
use crate::models::{ChapterProbe, Config, NotifierConfig, NovelSnapshot, Subscription, UpdateEvent};
use crate::services::sender::{MessageSender, render_message};
use crate::storage::NovelStore;

/// Per-event delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Sends started
    pub attempted: usize,
    /// Sends that succeeded
    pub delivered: usize,
    /// Sends that failed or timed out
    pub failed: usize,
    /// Subscribers whose cursor already matched the chapter
    pub skipped: usize,
}

impl DeliveryReport {
    pub fn merge(&mut self, other: DeliveryReport) {
        self.attempted += other.attempted;
        self.delivered += other.delivered;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

pub struct Notifier {
    store: Arc<dyn NovelStore>,
    sender: Arc<dyn MessageSender>,
    config: NotifierConfig,
    novel_url: String,
}

impl Notifier {
    pub fn new(store: Arc<dyn NovelStore>, sender: Arc<dyn MessageSender>, config: &Config) -> Self {
        Self {
            store,
            sender,
            config: config.notifier.clone(),
            novel_url: config.fetcher.novel_url.clone(),
        }
    }

    /// Deliver `event` to every enabled subscriber of its novel.
    ///
    /// Fails only when the subscriber list cannot be resolved.
    pub async fn notify(&self, event: &UpdateEvent) -> Result<DeliveryReport> {
        let subscriptions = self.store.get_subscriptions(&event.novel_id, true).await?;
        let report = self.deliver(event, &subscriptions).await;

        log::info!(
            "Notified {}/{} subscribers of {} ({} failed, {} already up to date)",
            report.delivered,
            report.attempted,
            event.novel_id,
            report.failed,
            report.skipped
        );
        Ok(report)
    }

    /// Re-offer the stored chapter to subscribers whose cursor lags behind
    /// it, typically after an earlier delivery failed.
    pub async fn notify_pending(&self, snapshot: &NovelSnapshot) -> Result<DeliveryReport> {
        let current = &snapshot.latest_chapter.title;
        let lagging: Vec<Subscription> = self
            .store
            .get_subscriptions(&snapshot.novel_id, true)
            .await?
            .into_iter()
            .filter(|s| s.last_notified_chapter.as_ref().is_some_and(|c| c != current))
            .collect();

        if lagging.is_empty() {
            return Ok(DeliveryReport::default());
        }

        log::info!(
            "Retrying delivery of {:?} to {} subscribers of {}",
            current,
            lagging.len(),
            snapshot.novel_id
        );
        let event = UpdateEvent::new(snapshot, &ChapterProbe::from_stored(snapshot), Utc::now());
        Ok(self.deliver(&event, &lagging).await)
    }

    async fn deliver(&self, event: &UpdateEvent, subscriptions: &[Subscription]) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let text = render_message(event, &self.novel_url.replace("{id}", &event.novel_id));
        let chapter = &event.chapter.title;

        for sub in subscriptions {
            if sub.has_seen(chapter) {
                report.skipped += 1;
                continue;
            }
            if report.attempted > 0 {
                tokio::time::sleep(self.config.send_delay()).await;
            }
            report.attempted += 1;

            match self.send_with_timeout(sub, &text).await {
                Ok(()) => {
                    report.delivered += 1;
                    if let Err(e) = self
                        .store
                        .set_subscriber_cursor(sub.subscriber_id, &event.novel_id, chapter)
                        .await
                    {
                        log::error!(
                            "Delivered to {} but could not record cursor for {}: {}",
                            sub.subscriber_id,
                            event.novel_id,
                            e
                        );
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    log::warn!("{e}");
                }
            }
        }
        report
    }

    async fn send_with_timeout(&self, sub: &Subscription, text: &str) -> Result<()> {
        let limit: Duration = self.config.delivery_timeout();
        match tokio::time::timeout(limit, self.sender.send(sub.subscriber_id, text)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::delivery(
                sub.subscriber_id,
                AppError::timeout("delivery", limit.as_secs()),
            )),
        }
    }
}
