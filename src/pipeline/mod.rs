//! Pipeline entry points for update checks.
//!
//! - `UpdateChecker`: one novel, fetch through notification
//! - `Scheduler`: periodic cycles over every tracked novel
//! - `Tracker`: subscription management for front ends

pub mod check;
pub mod scheduler;
pub mod tracking;

pub use check::{CheckOutcome, UpdateChecker};
pub use scheduler::{CycleReport, CycleTrigger, EntityState, Scheduler};
pub use tracking::{TrackOutcome, TrackedNovel, Tracker};
