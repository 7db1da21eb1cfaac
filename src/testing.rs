//! Test doubles shared by the pipeline tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::error::{AppError, Result};
use crate::models::SubscriberId;
use crate::services::{Fetcher, MessageSender};

/// Render a catalog page in the markup the default selectors expect.
/// The last chapter is announced as the latest one.
pub fn catalog_page(title: &str, chapters: &[(&str, bool)]) -> String {
    let latest = chapters.last().map(|(t, _)| *t).unwrap_or_default();
    let items: String = chapters
        .iter()
        .enumerate()
        .map(|(i, (chapter, locked))| {
            let lock = if *locked {
                r##"<svg class="_icon"><use href="#i-lock"></use></svg>"##
            } else {
                ""
            };
            format!(
                r#"<li><a href="/ch/{n}"><span class="_num">{n}</span><strong>{chapter}</strong><small>today</small>{lock}</a></li>"#,
                n = i + 1
            )
        })
        .collect();

    format!(
        r#"<html><body>
            <h1 class="auto_height">{title}</h1>
            <address><span class="c_primary">Author</span></address>
            <div class="det-con-intro"><a class="lst-chapter" href="/latest">{latest}</a><small class="c_s">now</small></div>
            <ol class="content-list">{items}</ol>
        </body></html>"#
    )
}

/// Serves pages from a map; optionally blocks every fetch on a gate.
#[derive(Default)]
pub struct PageFetcher {
    pages: Mutex<HashMap<String, String>>,
    calls: AtomicUsize,
    gate: Option<Semaphore>,
}

impl PageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fetcher whose calls wait until [`PageFetcher::open`] is called.
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn set_page(&self, novel_id: &str, html: String) {
        self.pages.lock().unwrap().insert(novel_id.to_string(), html);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn open(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }
}

#[async_trait]
impl Fetcher for PageFetcher {
    async fn fetch(&self, novel_id: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }
        self.pages
            .lock()
            .unwrap()
            .get(novel_id)
            .cloned()
            .ok_or_else(|| AppError::fetch(novel_id, "HTTP 503 Service Unavailable"))
    }
}

/// Records delivered messages; fails for the listed subscribers.
#[derive(Default)]
pub struct RecordingSender {
    pub failing: Vec<SubscriberId>,
    sent: Mutex<Vec<(SubscriberId, String)>>,
}

impl RecordingSender {
    pub fn failing_for(failing: Vec<SubscriberId>) -> Self {
        Self {
            failing,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(SubscriberId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn recipients(&self) -> Vec<SubscriberId> {
        self.sent().into_iter().map(|(id, _)| id).collect()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, subscriber: SubscriberId, text: &str) -> Result<()> {
        if self.failing.contains(&subscriber) {
            return Err(AppError::delivery(subscriber, "chat not found"));
        }
        self.sent.lock().unwrap().push((subscriber, text.to_string()));
        Ok(())
    }
}
