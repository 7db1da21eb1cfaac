// src/models/mod.rs

//! Domain models for the update pipeline.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod novel;
mod selectors;
mod subscription;

// Re-export all public types
pub use config::{Config, FetcherConfig, NotifierConfig, SchedulerConfig, StorageConfig};
pub use novel::{Chapter, ChapterProbe, NovelSnapshot, UpdateEvent, Volume};
pub use selectors::SelectorRules;
pub use subscription::{SubscriberId, Subscription};

#[cfg(test)]
pub(crate) use novel::fixtures;
