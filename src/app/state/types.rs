//! Core data structures for download state tracking
//!
//! This module defines the per-resource state record, the partial update type
//! merged into it, and the snapshot broadcast to listeners.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::speed::TimeRemaining;

/// Lifecycle status of one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Never requested
    #[default]
    Idle,
    /// Waiting for a concurrency slot
    Queued,
    /// Admitted, metadata not yet parsed
    Starting,
    /// Chunk loop running
    Downloading,
    /// File assembled and saved
    Completed,
    /// Failed; only a new request clears it
    Error,
}

impl DownloadStatus {
    /// Check if this status represents a finished run
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadStatus::Completed | DownloadStatus::Error)
    }

    /// Check if a run currently owns this resource
    pub fn is_running(&self) -> bool {
        matches!(self, DownloadStatus::Starting | DownloadStatus::Downloading)
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DownloadStatus::Idle => "idle",
            DownloadStatus::Queued => "queued",
            DownloadStatus::Starting => "starting",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// Current state of one resource key
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DownloadState {
    pub status: DownloadStatus,
    /// Percentage in `[0, 100]`
    pub progress: f64,
    pub downloaded_size: u64,
    /// Zero until known
    pub total_size: u64,
    pub time_remaining: TimeRemaining,
    /// True while downloading or queued
    pub in_progress: bool,
    /// Set to force the running chunk loop to stop and requeue
    pub need_restarted: bool,
    pub last_updated: DateTime<Utc>,
    /// Present only when `status` is `Error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_path: Option<PathBuf>,
}

/// Partial update merged over the previous state
///
/// Fields left as `None` keep their previous value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub status: Option<DownloadStatus>,
    pub progress: Option<f64>,
    pub downloaded_size: Option<u64>,
    pub total_size: Option<u64>,
    pub time_remaining: Option<TimeRemaining>,
    pub in_progress: Option<bool>,
    pub need_restarted: Option<bool>,
    pub error_message: Option<String>,
    pub file_name: Option<String>,
    pub saved_path: Option<PathBuf>,
}

impl StateUpdate {
    /// Waiting for a slot, nothing fetched
    pub fn queued() -> Self {
        Self {
            status: Some(DownloadStatus::Queued),
            progress: Some(0.0),
            downloaded_size: Some(0),
            time_remaining: Some(TimeRemaining::Waiting),
            in_progress: Some(true),
            ..Default::default()
        }
    }

    /// Evicted by a lowered concurrency limit
    pub fn requeued() -> Self {
        Self {
            need_restarted: Some(true),
            ..Self::queued()
        }
    }

    /// Admitted and about to start from offset 0
    pub fn starting() -> Self {
        Self {
            status: Some(DownloadStatus::Starting),
            progress: Some(0.0),
            downloaded_size: Some(0),
            time_remaining: Some(TimeRemaining::Calculating),
            in_progress: Some(true),
            need_restarted: Some(false),
            ..Default::default()
        }
    }

    /// Progress after a chunk
    pub fn downloading(
        progress: f64,
        downloaded: u64,
        total: u64,
        time_remaining: TimeRemaining,
    ) -> Self {
        Self {
            status: Some(DownloadStatus::Downloading),
            progress: Some(progress),
            downloaded_size: Some(downloaded),
            total_size: Some(total),
            time_remaining: Some(time_remaining),
            in_progress: Some(true),
            ..Default::default()
        }
    }

    /// File saved
    pub fn completed(total: u64, saved_path: PathBuf) -> Self {
        Self {
            status: Some(DownloadStatus::Completed),
            progress: Some(100.0),
            downloaded_size: Some(total),
            total_size: Some(total),
            time_remaining: Some(TimeRemaining::Done),
            in_progress: Some(false),
            saved_path: Some(saved_path),
            ..Default::default()
        }
    }

    /// Run failed
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Some(DownloadStatus::Error),
            time_remaining: Some(TimeRemaining::Done),
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Attach a suggested file name
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

/// One row of a broadcast snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateEntry {
    pub key: String,
    pub state: DownloadState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// Full `{key -> state}` collection, ordered by key
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub entries: Vec<StateEntry>,
}

impl StateSnapshot {
    /// Look up one key in the snapshot
    pub fn get(&self, key: &str) -> Option<&DownloadState> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| &entry.state)
    }

    /// Number of keys in a given status
    pub fn count(&self, status: DownloadStatus) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.state.status == status)
            .count()
    }

    /// Whether every listed key has reached `completed` or `error`
    pub fn all_terminal<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> bool {
        keys.into_iter()
            .all(|key| self.get(key).is_some_and(|state| state.status.is_terminal()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_helpers() {
        assert!(DownloadStatus::Completed.is_terminal());
        assert!(DownloadStatus::Error.is_terminal());
        assert!(!DownloadStatus::Queued.is_terminal());
        assert!(DownloadStatus::Starting.is_running());
        assert!(DownloadStatus::Downloading.is_running());
        assert!(!DownloadStatus::Queued.is_running());
        assert_eq!(DownloadStatus::Downloading.to_string(), "downloading");
    }

    #[test]
    fn test_requeued_update_flags_restart() {
        let update = StateUpdate::requeued();
        assert_eq!(update.status, Some(DownloadStatus::Queued));
        assert_eq!(update.need_restarted, Some(true));
        assert_eq!(update.progress, Some(0.0));
        assert_eq!(update.time_remaining, Some(TimeRemaining::Waiting));
    }

    #[test]
    fn test_state_serializes_camel_case() {
        let state = DownloadState {
            status: DownloadStatus::Downloading,
            progress: 50.0,
            downloaded_size: 5,
            total_size: 10,
            in_progress: true,
            ..Default::default()
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "downloading");
        assert_eq!(json["downloadedSize"], 5);
        assert_eq!(json["needRestarted"], false);
        assert_eq!(json["timeRemaining"], "calculating");
        assert!(json.get("errorMessage").is_none());
    }

    #[test]
    fn test_snapshot_queries() {
        let snapshot = StateSnapshot {
            entries: vec![
                StateEntry {
                    key: "a".to_string(),
                    state: DownloadState {
                        status: DownloadStatus::Completed,
                        ..Default::default()
                    },
                    thumbnail: None,
                },
                StateEntry {
                    key: "b".to_string(),
                    state: DownloadState {
                        status: DownloadStatus::Queued,
                        ..Default::default()
                    },
                    thumbnail: Some("thumb.jpg".to_string()),
                },
            ],
        };

        assert_eq!(snapshot.count(DownloadStatus::Queued), 1);
        assert!(snapshot.all_terminal(["a"]));
        assert!(!snapshot.all_terminal(["a", "b"]));
        assert!(!snapshot.all_terminal(["missing"]));
    }
}
