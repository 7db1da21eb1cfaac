// src/pipeline/tracking.rs

//! Front-end operations: track, list, remove, mute and manual checks.

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{NovelSnapshot, SubscriberId, Subscription};
use crate::pipeline::check::CheckOutcome;
use crate::pipeline::scheduler::Scheduler;
use crate::storage::NovelStore;
use crate::utils::parse_novel_id;

/// Result of a tracking request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    /// New subscription created
    Tracking(NovelSnapshot),
    /// The subscriber already follows this novel
    AlreadyTracking(String),
}

/// A subscription together with the novel's stored snapshot.
#[derive(Debug, Clone)]
pub struct TrackedNovel {
    pub subscription: Subscription,
    pub snapshot: Option<NovelSnapshot>,
}

pub struct Tracker {
    scheduler: Arc<Scheduler>,
}

impl Tracker {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }

    fn store(&self) -> &Arc<dyn NovelStore> {
        self.scheduler.checker().store()
    }

    fn novel_id(reference: &str) -> Result<String> {
        parse_novel_id(reference).ok_or_else(|| AppError::InvalidNovelRef(reference.to_string()))
    }

    /// Start following a novel given as a catalog URL or a numeric id.
    ///
    /// The new subscription's cursor is set to the current chapter, so the
    /// subscriber is only told about chapters published after this call.
    pub async fn track(&self, subscriber: SubscriberId, reference: &str) -> Result<TrackOutcome> {
        let novel_id = Self::novel_id(reference)?;

        let existing = self.store().subscriptions_for(subscriber).await?;
        if existing.iter().any(|s| s.novel_id == novel_id) {
            return Ok(TrackOutcome::AlreadyTracking(novel_id));
        }

        let _held = self.scheduler.lock_entity(&novel_id).await;
        let snapshot = match self.store().get_snapshot(&novel_id).await? {
            Some(snapshot) => snapshot,
            None => {
                let snapshot = self.scheduler.checker().fetch_snapshot(&novel_id).await?;
                self.store().save_snapshot(&snapshot).await?;
                snapshot
            }
        };

        let mut subscription = Subscription::new(subscriber, novel_id.as_str());
        subscription.last_notified_chapter = Some(snapshot.latest_chapter.title.clone());
        if !self.store().add_subscription(subscription).await? {
            return Ok(TrackOutcome::AlreadyTracking(novel_id));
        }

        log::info!(
            "Subscriber {subscriber} now tracks {} ({})",
            novel_id,
            snapshot.title
        );
        Ok(TrackOutcome::Tracking(snapshot))
    }

    /// Novels followed by a subscriber, newest subscription first.
    pub async fn list(&self, subscriber: SubscriberId) -> Result<Vec<TrackedNovel>> {
        let mut tracked = Vec::new();
        for subscription in self.store().subscriptions_for(subscriber).await? {
            let snapshot = self.store().get_snapshot(&subscription.novel_id).await?;
            tracked.push(TrackedNovel {
                subscription,
                snapshot,
            });
        }
        Ok(tracked)
    }

    /// Stop following a novel. Returns `false` if it was not followed.
    pub async fn remove(&self, subscriber: SubscriberId, reference: &str) -> Result<bool> {
        let novel_id = Self::novel_id(reference)?;
        let removed = self.store().remove_subscription(subscriber, &novel_id).await?;
        if removed {
            log::info!("Subscriber {subscriber} stopped tracking {novel_id}");
        }
        Ok(removed)
    }

    /// Mute or unmute a followed novel. Returns `false` if it was not followed.
    pub async fn set_notifications(
        &self,
        subscriber: SubscriberId,
        reference: &str,
        enabled: bool,
    ) -> Result<bool> {
        let novel_id = Self::novel_id(reference)?;
        self.store()
            .set_notifications_enabled(subscriber, &novel_id, enabled)
            .await
    }

    /// Check a novel right away, outside the schedule.
    pub async fn check_now(&self, reference: &str) -> Result<CheckOutcome> {
        let novel_id = Self::novel_id(reference)?;
        self.scheduler.check_now(&novel_id).await
    }

    /// Check every novel a subscriber follows, one at a time with the
    /// scheduler's request delay in between. A failed novel does not stop
    /// the others; its error is returned in its slot.
    pub async fn check_subscriber(
        &self,
        subscriber: SubscriberId,
    ) -> Result<Vec<(String, Result<CheckOutcome>)>> {
        let subscriptions = self.store().subscriptions_for(subscriber).await?;
        let delay = self.scheduler.config().request_delay();

        let mut results = Vec::with_capacity(subscriptions.len());
        for (i, subscription) in subscriptions.into_iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let outcome = self.scheduler.check_now(&subscription.novel_id).await;
            if let Err(e) = &outcome {
                log::warn!("Check failed for {}: {e}", subscription.novel_id);
            }
            results.push((subscription.novel_id, outcome));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Config;
    use crate::pipeline::check::UpdateChecker;
    use crate::storage::MemoryStore;
    use crate::testing::{PageFetcher, RecordingSender, catalog_page};

    struct Harness {
        store: Arc<MemoryStore>,
        fetcher: Arc<PageFetcher>,
        sender: Arc<RecordingSender>,
        tracker: Tracker,
    }

    fn harness() -> Harness {
        let mut config = Config::default();
        config.notifier.send_delay_ms = 0;
        config.scheduler.request_delay_ms = 0;
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(PageFetcher::new());
        let sender = Arc::new(RecordingSender::default());
        let checker =
            UpdateChecker::new(&config, store.clone(), fetcher.clone(), sender.clone()).unwrap();
        let scheduler = Arc::new(Scheduler::new(config.scheduler.clone(), checker));
        Harness {
            store,
            fetcher,
            sender,
            tracker: Tracker::new(scheduler),
        }
    }

    #[tokio::test]
    async fn test_track_by_url_sets_cursor_to_current_chapter() {
        let h = harness();
        h.fetcher
            .set_page("777", catalog_page("Novel", &[("Ch.1", false), ("Ch.2", true)]));

        let outcome = h
            .tracker
            .track(5, "https://www.webnovel.com/book/some-novel_777")
            .await
            .unwrap();

        let TrackOutcome::Tracking(snapshot) = outcome else {
            panic!("expected new subscription");
        };
        assert_eq!(snapshot.title, "Novel");

        let subs = h.store.get_subscriptions("777", true).await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].last_notified_chapter.as_deref(), Some("Ch.1"));
        assert!(h.store.get_snapshot("777").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_track_twice_is_refused() {
        let h = harness();
        h.fetcher.set_page("1", catalog_page("Novel", &[("Ch.1", false)]));

        h.tracker.track(5, "1").await.unwrap();
        let again = h.tracker.track(5, "1").await.unwrap();

        assert_eq!(again, TrackOutcome::AlreadyTracking("1".into()));
        assert_eq!(h.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_second_subscriber_reuses_stored_snapshot() {
        let h = harness();
        h.fetcher.set_page("1", catalog_page("Novel", &[("Ch.1", false)]));

        h.tracker.track(5, "1").await.unwrap();
        h.tracker.track(6, "1").await.unwrap();

        assert_eq!(h.fetcher.calls(), 1);
        assert_eq!(h.store.get_subscribers("1", true).await.unwrap(), vec![5, 6]);
    }

    #[tokio::test]
    async fn test_track_rejects_unknown_reference() {
        let h = harness();
        let result = h.tracker.track(5, "not a novel").await;
        assert!(matches!(result, Err(AppError::InvalidNovelRef(_))));
    }

    #[tokio::test]
    async fn test_failed_fetch_creates_no_subscription() {
        let h = harness();
        assert!(h.tracker.track(5, "404").await.is_err());
        assert!(h.tracker.list(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_remove_and_mute() {
        let h = harness();
        h.fetcher.set_page("1", catalog_page("First", &[("Ch.1", false)]));
        h.fetcher.set_page("2", catalog_page("Second", &[("Ch.1", false)]));
        h.tracker.track(5, "1").await.unwrap();
        h.tracker.track(5, "2").await.unwrap();

        let listed = h.tracker.list(5).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|t| t.snapshot.is_some()));

        assert!(h.tracker.set_notifications(5, "1", false).await.unwrap());
        assert_eq!(h.store.list_all_tracked_ids().await.unwrap(), vec!["2"]);

        assert!(h.tracker.remove(5, "https://www.webnovel.com/book/second_2").await.unwrap());
        assert!(!h.tracker.remove(5, "2").await.unwrap());
        assert!(matches!(
            h.tracker.set_notifications(5, "nonsense", true).await,
            Err(AppError::InvalidNovelRef(_))
        ));
        assert_eq!(h.tracker.list(5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_check_now_notifies_new_chapter() {
        let h = harness();
        h.fetcher.set_page("1", catalog_page("Novel", &[("Ch.1", false)]));
        h.tracker.track(5, "1").await.unwrap();

        h.fetcher
            .set_page("1", catalog_page("Novel", &[("Ch.1", false), ("Ch.2", false)]));
        let outcome = h.tracker.check_now("1").await.unwrap();

        assert_eq!(outcome.event().unwrap().chapter.title, "Ch.2");
        assert_eq!(h.sender.recipients(), vec![5]);
    }

    #[tokio::test]
    async fn test_check_subscriber_reports_each_followed_novel() {
        let h = harness();
        h.fetcher.set_page("1", catalog_page("First", &[("Ch.1", false)]));
        h.fetcher.set_page("2", catalog_page("Second", &[("Ch.1", false)]));
        h.tracker.track(5, "1").await.unwrap();
        h.tracker.track(5, "2").await.unwrap();
        h.tracker.track(6, "1").await.unwrap();

        h.fetcher
            .set_page("2", catalog_page("Second", &[("Ch.1", false), ("Ch.2", false)]));
        let mut results = h.tracker.check_subscriber(5).await.unwrap();
        results.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "1");
        assert!(matches!(results[0].1, Ok(CheckOutcome::Unchanged { .. })));
        assert_eq!(results[1].0, "2");
        let updated = results[1].1.as_ref().unwrap().event().unwrap();
        assert_eq!(updated.chapter.title, "Ch.2");
        assert_eq!(h.sender.recipients(), vec![5]);
    }

    #[tokio::test]
    async fn test_check_subscriber_keeps_going_after_a_failure() {
        let h = harness();
        h.fetcher.set_page("1", catalog_page("First", &[("Ch.1", false)]));
        h.fetcher.set_page("2", catalog_page("Second", &[("Ch.1", false)]));
        h.tracker.track(5, "1").await.unwrap();
        h.tracker.track(5, "2").await.unwrap();

        h.fetcher.set_page("1", "<html><body></body></html>".into());
        let results = h.tracker.check_subscriber(5).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results.iter().filter(|(_, r)| r.is_err()).count(), 1);
        assert!(h.tracker.check_subscriber(7).await.unwrap().is_empty());
    }
}
