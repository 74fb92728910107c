//! Single source of truth for per-resource download state
//!
//! Every mutation goes through [`DownloadStateStore::set`], which merges a
//! partial update over the previous record and then broadcasts the whole
//! collection. Listeners subscribe to the broadcast; there is no per-key
//! subscription.

use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::trace;

use super::types::{DownloadState, DownloadStatus, StateEntry, StateSnapshot, StateUpdate};
use crate::constants::scheduler;

/// Keyed store of [`DownloadState`] records with snapshot broadcasting
#[derive(Debug)]
pub struct DownloadStateStore {
    states: BTreeMap<String, DownloadState>,
    thumbnails: BTreeMap<String, String>,
    sender: broadcast::Sender<StateSnapshot>,
}

impl Default for DownloadStateStore {
    fn default() -> Self {
        Self::new(scheduler::BROADCAST_CAPACITY)
    }
}

impl DownloadStateStore {
    /// Create an empty store whose broadcast channel buffers `capacity` snapshots
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            states: BTreeMap::new(),
            thumbnails: BTreeMap::new(),
            sender,
        }
    }

    /// Current state for a key, if any download was ever attempted
    pub fn get(&self, key: &str) -> Option<&DownloadState> {
        self.states.get(key)
    }

    /// Merge `update` into the state for `key` and broadcast
    ///
    /// An incoming `Error` status forces `progress` to 0 and clears
    /// `in_progress`; any other incoming status clears the error message.
    pub fn set(&mut self, key: &str, update: StateUpdate) -> &DownloadState {
        let state = self.states.entry(key.to_string()).or_default();
        merge(state, update);

        trace!(
            "State {} -> {} ({:.1}%)",
            key,
            state.status,
            state.progress
        );

        self.broadcast();
        &self.states[key]
    }

    /// Associate a thumbnail with a key and broadcast
    pub fn set_thumbnail(&mut self, key: &str, thumbnail: impl Into<String>) {
        self.thumbnails.insert(key.to_string(), thumbnail.into());
        self.broadcast();
    }

    /// Copy of the full collection, ordered by key
    pub fn snapshot(&self) -> StateSnapshot {
        let entries = self
            .states
            .iter()
            .map(|(key, state)| StateEntry {
                key: key.clone(),
                state: state.clone(),
                thumbnail: self.thumbnails.get(key).cloned(),
            })
            .collect();
        StateSnapshot { entries }
    }

    /// Receive a snapshot after every mutation
    pub fn subscribe(&self) -> broadcast::Receiver<StateSnapshot> {
        self.sender.subscribe()
    }

    /// Remove completed and failed entries, returning how many were dropped
    pub fn clear_finished(&mut self) -> usize {
        let before = self.states.len();
        self.states.retain(|_, state| !state.status.is_terminal());
        let removed = before - self.states.len();

        if removed > 0 {
            let states = &self.states;
            self.thumbnails.retain(|key, _| states.contains_key(key));
            self.broadcast();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn broadcast(&self) {
        if self.sender.receiver_count() == 0 {
            return;
        }
        // Lagging or departed receivers are not our concern
        let _ = self.sender.send(self.snapshot());
    }
}

fn merge(state: &mut DownloadState, update: StateUpdate) {
    let StateUpdate {
        status,
        progress,
        downloaded_size,
        total_size,
        time_remaining,
        in_progress,
        need_restarted,
        error_message,
        file_name,
        saved_path,
    } = update;

    if let Some(value) = status {
        state.status = value;
    }
    if let Some(value) = progress {
        state.progress = value.clamp(0.0, 100.0);
    }
    if let Some(value) = downloaded_size {
        state.downloaded_size = value;
    }
    if let Some(value) = total_size {
        state.total_size = value;
    }
    if let Some(value) = time_remaining {
        state.time_remaining = value;
    }
    if let Some(value) = in_progress {
        state.in_progress = value;
    }
    if let Some(value) = need_restarted {
        state.need_restarted = value;
    }
    if let Some(value) = file_name {
        state.file_name = Some(value);
    }
    if let Some(value) = saved_path {
        state.saved_path = Some(value);
    }

    match status {
        Some(DownloadStatus::Error) => {
            state.progress = 0.0;
            state.in_progress = false;
            if error_message.is_some() {
                state.error_message = error_message;
            }
        }
        Some(_) => state.error_message = None,
        None => {
            if error_message.is_some() && state.status == DownloadStatus::Error {
                state.error_message = error_message;
            }
        }
    }

    state.last_updated = Utc::now();
}
