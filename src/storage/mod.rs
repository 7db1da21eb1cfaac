//! Storage abstractions for snapshot and subscription persistence.
//!
//! The store exclusively owns persisted snapshots and subscriptions; the
//! pipeline only reads and requests updates through [`NovelStore`].
//!
//! ## Directory Structure (local backend)
//!
//! ```text
//! storage/
//! ├── subscriptions.json    # All subscriptions, keyed by (subscriber, novel)
//! └── novels/
//!     ├── 12345.json        # One snapshot per tracked novel
//!     └── 67890.json
//! ```

pub mod local;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{NovelSnapshot, SubscriberId, Subscription};

// Re-export for convenience
pub use local::LocalStore;
pub use memory::MemoryStore;

/// A persisted snapshot with its record timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredNovel {
    /// First time the snapshot was saved; preserved across upserts
    pub created_at: DateTime<Utc>,
    /// Last time the snapshot was saved
    pub updated_at: DateTime<Utc>,
    pub snapshot: NovelSnapshot,
}

impl StoredNovel {
    /// Upsert `snapshot` over an optional previous record.
    pub fn upsert(previous: Option<&StoredNovel>, snapshot: NovelSnapshot) -> Self {
        let now = Utc::now();
        Self {
            created_at: previous.map_or(now, |p| p.created_at),
            updated_at: now,
            snapshot,
        }
    }
}

/// Entity store boundary.
#[async_trait]
pub trait NovelStore: Send + Sync {
    /// Last stored snapshot of a novel.
    async fn get_snapshot(&self, novel_id: &str) -> Result<Option<NovelSnapshot>>;

    /// Insert or replace a snapshot, keeping the original creation time.
    async fn save_snapshot(&self, snapshot: &NovelSnapshot) -> Result<()>;

    /// De-duplicated ids of novels with at least one enabled subscription.
    async fn list_all_tracked_ids(&self) -> Result<Vec<String>>;

    /// Subscriptions to a novel, optionally filtered to enabled ones.
    async fn get_subscriptions(
        &self,
        novel_id: &str,
        enabled_only: bool,
    ) -> Result<Vec<Subscription>>;

    /// Subscriber ids of a novel, optionally filtered to enabled ones.
    async fn get_subscribers(&self, novel_id: &str, enabled_only: bool) -> Result<Vec<SubscriberId>> {
        Ok(self
            .get_subscriptions(novel_id, enabled_only)
            .await?
            .into_iter()
            .map(|s| s.subscriber_id)
            .collect())
    }

    /// Record `chapter_title` as delivered to `subscriber`.
    async fn set_subscriber_cursor(
        &self,
        subscriber: SubscriberId,
        novel_id: &str,
        chapter_title: &str,
    ) -> Result<()>;

    /// Insert a subscription; returns `false` if the pair already exists.
    async fn add_subscription(&self, subscription: Subscription) -> Result<bool>;

    /// Delete a subscription; returns `false` if it did not exist.
    async fn remove_subscription(&self, subscriber: SubscriberId, novel_id: &str) -> Result<bool>;

    /// All subscriptions of one subscriber, newest first.
    async fn subscriptions_for(&self, subscriber: SubscriberId) -> Result<Vec<Subscription>>;

    /// Toggle notifications; returns `false` if the subscription does not exist.
    async fn set_notifications_enabled(
        &self,
        subscriber: SubscriberId,
        novel_id: &str,
        enabled: bool,
    ) -> Result<bool>;
}

/// Ids of novels with at least one enabled subscription, first-seen order.
pub(crate) fn tracked_ids<'a>(subscriptions: impl Iterator<Item = &'a Subscription>) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for sub in subscriptions.filter(|s| s.notifications_enabled) {
        if !ids.contains(&sub.novel_id) {
            ids.push(sub.novel_id.clone());
        }
    }
    ids
}

/// Sort subscriptions newest first.
pub(crate) fn newest_first(mut subscriptions: Vec<Subscription>) -> Vec<Subscription> {
    subscriptions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    subscriptions
}
