//! Service layer for the update pipeline.
//!
//! This module contains the business logic for:
//! - Catalog fetching (`Fetcher`, `HttpFetcher`)
//! - Snapshot extraction (`Extractor`)
//! - Update detection (`ChangeDetector`)
//! - Subscriber fan-out (`Notifier`) over a delivery transport (`MessageSender`)

mod detector;
mod extractor;
mod fetcher;
mod notifier;
mod sender;

pub use detector::{ChangeDetector, Detection};
pub use extractor::Extractor;
pub use fetcher::{Fetcher, HttpFetcher};
pub use notifier::{DeliveryReport, Notifier};
pub use sender::{LogSender, MessageSender, TelegramSender, render_message};
