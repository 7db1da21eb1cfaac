// src/lib.rs

//! Novel Notify Library
//!
//! Tracks serialized novels on a catalog site and notifies subscribers when
//! a new free chapter appears.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;
