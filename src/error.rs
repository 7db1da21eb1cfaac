// src/error.rs

//! Unified error handling for the update pipeline.

use std::fmt;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// The catalog document could not be fetched
    #[error("Fetch failed for {novel_id}: {message}")]
    Fetch { novel_id: String, message: String },

    /// An external call did not finish in time
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    /// A required field could not be recovered by any fallback
    #[error("Extraction failed for {novel_id}: no {field} found")]
    Extraction { novel_id: String, field: String },

    /// The entity store rejected or could not serve a request
    #[error("Store error: {0}")]
    Store(String),

    /// A message could not be delivered to one subscriber
    #[error("Delivery to {subscriber} failed: {message}")]
    Delivery { subscriber: i64, message: String },

    /// Input that does not name a catalog entity
    #[error("Not a recognizable novel URL or id: {0}")]
    InvalidNovelRef(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a fetch error for a novel.
    pub fn fetch(novel_id: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            novel_id: novel_id.into(),
            message: message.to_string(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            secs,
        }
    }

    /// Create an extraction error naming the unrecoverable field.
    pub fn extraction(novel_id: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Extraction {
            novel_id: novel_id.into(),
            field: field.into(),
        }
    }

    /// Create a store error.
    pub fn store(message: impl fmt::Display) -> Self {
        Self::Store(message.to_string())
    }

    /// Create a delivery error for one subscriber.
    pub fn delivery(subscriber: i64, message: impl fmt::Display) -> Self {
        Self::Delivery {
            subscriber,
            message: message.to_string(),
        }
    }

    /// Whether the failure is expected to clear up on a later cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Fetch { .. } | Self::Timeout { .. } | Self::Delivery { .. }
        )
    }
}
