//! Core application logic for chat_media_fetcher
//!
//! This module contains the download core: the byte-range client, resource
//! key parsing, throughput estimation, the state store, admission control,
//! file persistence and the orchestrator that ties them together.
//!
//! # Examples
//!
//! ```rust,no_run
//! use chat_media_fetcher::app::ResourceDescriptor;
//!
//! let descriptor =
//!     ResourceDescriptor::parse("https://web.telegram.org/a/progressive/document42").unwrap();
//! assert_eq!(descriptor.file_name(), "video_42.mp4");
//! assert_eq!(descriptor.total_size(), None);
//! ```

pub mod client;
pub mod coordinator;
pub mod models;
pub mod queue;
pub mod sink;
pub mod speed;
pub mod state;

// Re-export main public API
pub use client::{ChunkResponse, ClientConfig, ContentRange, MediaClient, RangeFetcher, RangeRequest};
pub use coordinator::{
    create_shutdown_channel, wait_for_shutdown_signal, Orchestrator, OrchestratorConfig,
    RequestOutcome, SignalHandler, CANCELLED_MESSAGE,
};
pub use models::{ResourceDescriptor, StreamMetadata};
pub use queue::{ActiveRun, ConcurrencyGate, DownloadQueue, LimitChange};
pub use sink::{AssembledFile, DiskSink, FileSink, MemorySink};
pub use speed::{SpeedEstimator, TimeRemaining};
pub use state::{
    DownloadState, DownloadStateStore, DownloadStatus, StateEntry, StateSnapshot, StateUpdate,
};
