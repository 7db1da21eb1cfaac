//! Subscriber-to-novel subscription records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chat/recipient identifier of a subscriber.
pub type SubscriberId = i64;

/// A subscriber's interest in one novel. Unique on `(subscriber_id, novel_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscription {
    pub subscriber_id: SubscriberId,
    pub novel_id: String,
    pub created_at: DateTime<Utc>,

    /// Title of the last chapter delivered to this subscriber
    #[serde(default)]
    pub last_notified_chapter: Option<String>,

    #[serde(default = "enabled")]
    pub notifications_enabled: bool,
}

fn enabled() -> bool {
    true
}

impl Subscription {
    /// Create a new enabled subscription with an empty cursor.
    pub fn new(subscriber_id: SubscriberId, novel_id: impl Into<String>) -> Self {
        Self {
            subscriber_id,
            novel_id: novel_id.into(),
            created_at: Utc::now(),
            last_notified_chapter: None,
            notifications_enabled: true,
        }
    }

    /// Whether `chapter_title` was already delivered to this subscriber.
    pub fn has_seen(&self, chapter_title: &str) -> bool {
        self.last_notified_chapter.as_deref() == Some(chapter_title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_subscription_defaults() {
        let sub = Subscription::new(7, "123");
        assert!(sub.notifications_enabled);
        assert!(sub.last_notified_chapter.is_none());
        assert!(!sub.has_seen("Ch.1"));
    }

    #[test]
    fn test_notifications_default_to_enabled_on_load() {
        let json = r#"{"subscriber_id": 1, "novel_id": "9", "created_at": "2026-01-01T00:00:00Z"}"#;
        let sub: Subscription = serde_json::from_str(json).unwrap();
        assert!(sub.notifications_enabled);
    }
}
