//! Prelude module for chat_media_fetcher
//!
//! Re-exports the items needed to embed the orchestrator with a single
//! `use chat_media_fetcher::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use chat_media_fetcher::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let orchestrator = Orchestrator::new(
//!         OrchestratorConfig::default().with_max_concurrency(2),
//!         Arc::new(MediaClient::new()?),
//!         Arc::new(DiskSink::new("downloads")),
//!     )?;
//!     let mut updates = orchestrator.subscribe();
//!     orchestrator.request_download("https://web.telegram.org/a/progressive/document1");
//!     let _snapshot = updates.recv().await;
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, DownloadError, Result};

// Orchestration
pub use crate::app::{
    AssembledFile, DiskSink, DownloadState, DownloadStatus, FileSink, MediaClient, MemorySink,
    Orchestrator, OrchestratorConfig, RangeFetcher, RequestOutcome, StateSnapshot,
};

// Configuration
pub use crate::app::ClientConfig;
pub use crate::config::AppConfig;

pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;

pub use tokio;
