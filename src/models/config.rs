//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scraper::Selector;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::SelectorRules;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Catalog fetching settings
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Periodic check settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Delivery settings
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Entity store location
    #[serde(default)]
    pub storage: StorageConfig,

    /// Extraction selector chains
    #[serde(default)]
    pub selectors: SelectorRules,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("cannot read {}: {e}", path.display())))?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Overlay values taken from the process environment.
    ///
    /// - `TELEGRAM_BOT_TOKEN` sets `notifier.telegram_token`
    /// - `CHECK_INTERVAL` (seconds) sets `scheduler.interval_secs`
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(token) = var("TELEGRAM_BOT_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.notifier.telegram_token = Some(token);
        }
        if let Some(raw) = var("CHECK_INTERVAL") {
            match raw.trim().parse() {
                Ok(secs) => self.scheduler.interval_secs = secs,
                Err(e) => log::warn!("Ignoring CHECK_INTERVAL={raw:?}: {e}"),
            }
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetcher.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetcher.user_agent is empty"));
        }
        if self.fetcher.timeout_secs == 0 {
            return Err(AppError::validation("fetcher.timeout_secs must be > 0"));
        }
        if !self.fetcher.catalog_url.contains("{id}") {
            return Err(AppError::validation(
                "fetcher.catalog_url must contain an {id} placeholder",
            ));
        }
        if self.scheduler.interval_secs == 0 {
            return Err(AppError::validation("scheduler.interval_secs must be > 0"));
        }
        if self.scheduler.max_concurrent == 0 {
            return Err(AppError::validation("scheduler.max_concurrent must be > 0"));
        }
        if self.notifier.delivery_timeout_secs == 0 {
            return Err(AppError::validation(
                "notifier.delivery_timeout_secs must be > 0",
            ));
        }

        for (name, chain) in self.selectors.chains() {
            if chain.is_empty() && SelectorRules::REQUIRED.contains(&name) {
                return Err(AppError::validation(format!(
                    "selectors.{name} needs at least one selector"
                )));
            }
            for selector in chain {
                Selector::parse(selector).map_err(|e| AppError::selector(selector, format!("{e:?}")))?;
            }
        }
        Ok(())
    }
}

/// Catalog fetching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Catalog page URL template; `{id}` is replaced by the novel id
    #[serde(default = "defaults::catalog_url")]
    pub catalog_url: String,

    /// Public novel page URL template used in messages
    #[serde(default = "defaults::novel_url")]
    pub novel_url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl FetcherConfig {
    pub fn catalog_url_for(&self, novel_id: &str) -> String {
        self.catalog_url.replace("{id}", novel_id)
    }

    pub fn novel_url_for(&self, novel_id: &str) -> String {
        self.novel_url.replace("{id}", novel_id)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            catalog_url: defaults::catalog_url(),
            novel_url: defaults::novel_url(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Periodic check settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduled cycles
    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,

    /// Novels checked concurrently within one cycle
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Delay between consecutive checks in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Compare only the unconditional latest chapter (skips the chapter
    /// list walk, so paid chapters are not told apart)
    #[serde(default)]
    pub quick_check: bool,
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::interval(),
            max_concurrent: defaults::max_concurrent(),
            request_delay_ms: defaults::request_delay(),
            quick_check: false,
        }
    }
}

/// Delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Delay between consecutive sends in milliseconds
    #[serde(default = "defaults::send_delay")]
    pub send_delay_ms: u64,

    /// Per-message delivery timeout in seconds
    #[serde(default = "defaults::delivery_timeout")]
    pub delivery_timeout_secs: u64,

    /// Re-attempt subscribers whose cursor lags behind on unchanged checks
    #[serde(default = "defaults::retry_pending")]
    pub retry_pending: bool,

    /// Telegram bot token; messages are only logged when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_token: Option<String>,

    /// Telegram Bot API base URL
    #[serde(default = "defaults::telegram_api_url")]
    pub telegram_api_url: String,
}

impl NotifierConfig {
    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            send_delay_ms: defaults::send_delay(),
            delivery_timeout_secs: defaults::delivery_timeout(),
            retry_pending: defaults::retry_pending(),
            telegram_token: None,
            telegram_api_url: defaults::telegram_api_url(),
        }
    }
}

/// Entity store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "defaults::storage_dir")]
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: defaults::storage_dir(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Fetcher defaults
    pub fn catalog_url() -> String {
        "https://www.webnovel.com/book/{id}/catalog".into()
    }
    pub fn novel_url() -> String {
        "https://www.webnovel.com/book/{id}".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; novel-notify/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Scheduler defaults
    pub fn interval() -> u64 {
        3600
    }
    pub fn max_concurrent() -> usize {
        1
    }
    pub fn request_delay() -> u64 {
        2000
    }

    // Notifier defaults
    pub fn send_delay() -> u64 {
        100
    }
    pub fn delivery_timeout() -> u64 {
        15
    }
    pub fn retry_pending() -> bool {
        true
    }
    pub fn telegram_api_url() -> String {
        "https://api.telegram.org".into()
    }

    // Storage defaults
    pub fn storage_dir() -> PathBuf {
        PathBuf::from("storage")
    }
}
