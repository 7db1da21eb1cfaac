// src/services/sender.rs

//! Delivery transports for update messages.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{NotifierConfig, SubscriberId, UpdateEvent};
use crate::utils::resolve;

/// Delivers a rendered message to one subscriber.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, subscriber: SubscriberId, text: &str) -> Result<()>;
}

/// Plain-text message announcing an update.
pub fn render_message(event: &UpdateEvent, novel_url: &str) -> String {
    let chapter_url = resolve(novel_url, &event.chapter.url).unwrap_or_else(|| novel_url.to_string());

    let mut text = format!(
        "New chapter of {} by {}\n{}\nPublished: {}\n{}",
        event.novel_title, event.author, event.chapter.title, event.chapter.published, chapter_url
    );
    match (event.has_paid_chapters, event.locked_ahead) {
        (true, Some(n)) => text.push_str(&format!("\n{n} more chapter(s) available behind the paywall")),
        (true, None) => text.push_str("\nNewer paid chapters are available"),
        _ => {}
    }
    text
}

/// Telegram Bot API transport.
pub struct TelegramSender {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramSender {
    pub fn new(config: &NotifierConfig, token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.delivery_timeout())
            .build()?;
        Ok(Self {
            client,
            api_url: config.telegram_api_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }
}

#[async_trait]
impl MessageSender for TelegramSender {
    async fn send(&self, subscriber: SubscriberId, text: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/bot{}/sendMessage", self.api_url, self.token))
            .json(&serde_json::json!({
                "chat_id": subscriber,
                "text": text,
                "disable_web_page_preview": true,
            }))
            .send()
            .await
            .map_err(|e| AppError::delivery(subscriber, e))?;

        let status = response.status();
        let body: TelegramResponse = response
            .json()
            .await
            .map_err(|e| AppError::delivery(subscriber, format!("HTTP {status}: {e}")))?;

        if !body.ok {
            let reason = body.description.unwrap_or_else(|| format!("HTTP {status}"));
            return Err(AppError::delivery(subscriber, reason));
        }
        Ok(())
    }
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSender;

#[async_trait]
impl MessageSender for LogSender {
    async fn send(&self, subscriber: SubscriberId, text: &str) -> Result<()> {
        log::info!("[to {subscriber}] {}", text.replace('\n', " | "));
        Ok(())
    }
}
