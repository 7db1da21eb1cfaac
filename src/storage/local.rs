//! Local filesystem storage implementation.
//!
//! Snapshots live in one JSON file per novel, subscriptions in a single
//! `subscriptions.json`. Every write goes through a temp file and a rename,
//! so a crash never leaves a half-written record behind.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── subscriptions.json
//! └── novels/
//!     └── {novel_id}.json
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{NovelSnapshot, SubscriberId, Subscription};
use crate::storage::{NovelStore, StoredNovel, newest_first, tracked_ids};

const SUBSCRIPTIONS_KEY: &str = "subscriptions.json";

/// Local filesystem storage backend.
pub struct LocalStore {
    root_dir: PathBuf,
    // Serializes read-modify-write cycles on the JSON files.
    write_lock: Mutex<()>,
}

impl LocalStore {
    /// Create a new LocalStore rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root_dir(&self) -> &PathBuf {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Key of a novel's snapshot file. Ids become file names, so anything
    /// beyond a plain token is refused.
    fn novel_key(novel_id: &str) -> Result<String> {
        let valid = !novel_id.is_empty()
            && novel_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(AppError::store(format!("invalid novel id {novel_id:?}")));
        }
        Ok(format!("novels/{novel_id}.json"))
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn load_subscriptions(&self) -> Result<Vec<Subscription>> {
        Ok(self.read_json(SUBSCRIPTIONS_KEY).await?.unwrap_or_default())
    }

    /// Apply `change` to the subscription list and persist it if it reports
    /// a modification.
    async fn modify_subscriptions<F>(&self, change: F) -> Result<bool>
    where
        F: FnOnce(&mut Vec<Subscription>) -> bool + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut subscriptions = self.load_subscriptions().await?;
        let changed = change(&mut subscriptions);
        if changed {
            self.write_json(SUBSCRIPTIONS_KEY, &subscriptions).await?;
        }
        Ok(changed)
    }
}

#[async_trait]
impl NovelStore for LocalStore {
    async fn get_snapshot(&self, novel_id: &str) -> Result<Option<NovelSnapshot>> {
        let key = Self::novel_key(novel_id)?;
        Ok(self
            .read_json::<StoredNovel>(&key)
            .await?
            .map(|stored| stored.snapshot))
    }

    async fn save_snapshot(&self, snapshot: &NovelSnapshot) -> Result<()> {
        let key = Self::novel_key(&snapshot.novel_id)?;
        let _guard = self.write_lock.lock().await;

        let previous: Option<StoredNovel> = self.read_json(&key).await?;
        let record = StoredNovel::upsert(previous.as_ref(), snapshot.clone());
        self.write_json(&key, &record).await?;

        log::debug!("Saved snapshot {} to {}", snapshot.novel_id, key);
        Ok(())
    }

    async fn list_all_tracked_ids(&self) -> Result<Vec<String>> {
        let subscriptions = self.load_subscriptions().await?;
        Ok(tracked_ids(subscriptions.iter()))
    }

    async fn get_subscriptions(
        &self,
        novel_id: &str,
        enabled_only: bool,
    ) -> Result<Vec<Subscription>> {
        Ok(self
            .load_subscriptions()
            .await?
            .into_iter()
            .filter(|s| s.novel_id == novel_id && (!enabled_only || s.notifications_enabled))
            .collect())
    }

    async fn set_subscriber_cursor(
        &self,
        subscriber: SubscriberId,
        novel_id: &str,
        chapter_title: &str,
    ) -> Result<()> {
        let found = self
            .modify_subscriptions(|subs| {
                match subs
                    .iter_mut()
                    .find(|s| s.subscriber_id == subscriber && s.novel_id == novel_id)
                {
                    Some(sub) => {
                        sub.last_notified_chapter = Some(chapter_title.to_string());
                        true
                    }
                    None => false,
                }
            })
            .await?;

        if !found {
            return Err(AppError::store(format!(
                "no subscription for {subscriber} on {novel_id}"
            )));
        }
        Ok(())
    }

    async fn add_subscription(&self, subscription: Subscription) -> Result<bool> {
        Self::novel_key(&subscription.novel_id)?;
        self.modify_subscriptions(|subs| {
            let exists = subs.iter().any(|s| {
                s.subscriber_id == subscription.subscriber_id && s.novel_id == subscription.novel_id
            });
            if !exists {
                subs.push(subscription);
            }
            !exists
        })
        .await
    }

    async fn remove_subscription(&self, subscriber: SubscriberId, novel_id: &str) -> Result<bool> {
        self.modify_subscriptions(|subs| {
            let before = subs.len();
            subs.retain(|s| !(s.subscriber_id == subscriber && s.novel_id == novel_id));
            subs.len() != before
        })
        .await
    }

    async fn subscriptions_for(&self, subscriber: SubscriberId) -> Result<Vec<Subscription>> {
        let mine = self
            .load_subscriptions()
            .await?
            .into_iter()
            .filter(|s| s.subscriber_id == subscriber)
            .collect();
        Ok(newest_first(mine))
    }

    async fn set_notifications_enabled(
        &self,
        subscriber: SubscriberId,
        novel_id: &str,
        enabled: bool,
    ) -> Result<bool> {
        let mut found = false;
        self.modify_subscriptions(|subs| {
            match subs
                .iter_mut()
                .find(|s| s.subscriber_id == subscriber && s.novel_id == novel_id)
            {
                Some(sub) => {
                    found = true;
                    let changed = sub.notifications_enabled != enabled;
                    sub.notifications_enabled = enabled;
                    changed
                }
                None => false,
            }
        })
        .await?;
        Ok(found)
    }
}
