//! In-process storage backend, used by tests and dry runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{NovelSnapshot, SubscriberId, Subscription};
use crate::storage::{NovelStore, StoredNovel, newest_first, tracked_ids};

#[derive(Debug, Default)]
struct Inner {
    novels: HashMap<String, StoredNovel>,
    subscriptions: Vec<Subscription>,
}

impl Inner {
    fn subscription_mut(
        &mut self,
        subscriber: SubscriberId,
        novel_id: &str,
    ) -> Option<&mut Subscription> {
        self.subscriptions
            .iter_mut()
            .find(|s| s.subscriber_id == subscriber && s.novel_id == novel_id)
    }
}

/// Volatile store keeping everything behind one mutex.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| AppError::store("memory store lock poisoned"))
    }
}

#[async_trait]
impl NovelStore for MemoryStore {
    async fn get_snapshot(&self, novel_id: &str) -> Result<Option<NovelSnapshot>> {
        Ok(self.lock()?.novels.get(novel_id).map(|n| n.snapshot.clone()))
    }

    async fn save_snapshot(&self, snapshot: &NovelSnapshot) -> Result<()> {
        let mut inner = self.lock()?;
        let record = StoredNovel::upsert(inner.novels.get(&snapshot.novel_id), snapshot.clone());
        inner.novels.insert(snapshot.novel_id.clone(), record);
        Ok(())
    }

    async fn list_all_tracked_ids(&self) -> Result<Vec<String>> {
        Ok(tracked_ids(self.lock()?.subscriptions.iter()))
    }

    async fn get_subscriptions(
        &self,
        novel_id: &str,
        enabled_only: bool,
    ) -> Result<Vec<Subscription>> {
        Ok(self
            .lock()?
            .subscriptions
            .iter()
            .filter(|s| s.novel_id == novel_id && (!enabled_only || s.notifications_enabled))
            .cloned()
            .collect())
    }

    async fn set_subscriber_cursor(
        &self,
        subscriber: SubscriberId,
        novel_id: &str,
        chapter_title: &str,
    ) -> Result<()> {
        let mut inner = self.lock()?;
        let sub = inner.subscription_mut(subscriber, novel_id).ok_or_else(|| {
            AppError::store(format!("no subscription for {subscriber} on {novel_id}"))
        })?;
        sub.last_notified_chapter = Some(chapter_title.to_string());
        Ok(())
    }

    async fn add_subscription(&self, subscription: Subscription) -> Result<bool> {
        let mut inner = self.lock()?;
        if inner
            .subscription_mut(subscription.subscriber_id, &subscription.novel_id)
            .is_some()
        {
            return Ok(false);
        }
        inner.subscriptions.push(subscription);
        Ok(true)
    }

    async fn remove_subscription(&self, subscriber: SubscriberId, novel_id: &str) -> Result<bool> {
        let mut inner = self.lock()?;
        let before = inner.subscriptions.len();
        inner
            .subscriptions
            .retain(|s| !(s.subscriber_id == subscriber && s.novel_id == novel_id));
        Ok(inner.subscriptions.len() != before)
    }

    async fn subscriptions_for(&self, subscriber: SubscriberId) -> Result<Vec<Subscription>> {
        let mine = self
            .lock()?
            .subscriptions
            .iter()
            .filter(|s| s.subscriber_id == subscriber)
            .cloned()
            .collect();
        Ok(newest_first(mine))
    }

    async fn set_notifications_enabled(
        &self,
        subscriber: SubscriberId,
        novel_id: &str,
        enabled: bool,
    ) -> Result<bool> {
        let mut inner = self.lock()?;
        match inner.subscription_mut(subscriber, novel_id) {
            Some(sub) => {
                sub.notifications_enabled = enabled;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
