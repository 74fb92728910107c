//! Per-resource download state
//!
//! - `types`: status, state record, partial updates and snapshots
//! - `store`: the keyed store that merges updates and broadcasts snapshots

pub mod store;
pub mod types;

pub use store::DownloadStateStore;
pub use types::{DownloadState, DownloadStatus, StateEntry, StateSnapshot, StateUpdate};
