//! chat_media_fetcher Library
//!
//! Downloads media referenced by web chat media URLs in sequential byte-range
//! chunks, with single-flight per resource, FIFO admission under a mutable
//! concurrency limit and state snapshots broadcast after every change.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
