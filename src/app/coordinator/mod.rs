//! Download orchestration
//!
//! This module ties the state store, the concurrency gate and the queue
//! together into a single-flight-per-resource scheduler. Callers request
//! downloads by resource key and observe the results through state
//! snapshots; nothing is returned from a run directly.
//!
//! # Key Features
//!
//! - **Single flight**: a key that is starting or downloading ignores new
//!   requests
//! - **FIFO admission**: requests beyond the concurrency limit wait in order
//! - **Pseudo-pause**: lowering the limit cancels the newest runs, which are
//!   requeued and restart from offset 0 when a slot frees up
//! - **Error isolation**: every run error becomes an `error` state; the slot
//!   is always released and the queue drained
//!
//! # Architecture
//!
//! - [`config`] - Orchestrator configuration and validation
//! - [`chunk_loop`] - The per-run chunk retrieval loop
//! - [`signals`] - Ctrl-C / SIGTERM handling that shuts the orchestrator down
//!
//! The store, gate and queue live in one `SchedulerState` behind a
//! `std::sync::Mutex`. The lock is never held across an `.await`; the only
//! suspension points of a run are the range fetch and the sink save.
//!
//! # Examples
//!
//! ```rust,no_run
//! use chat_media_fetcher::app::{DiskSink, MediaClient, Orchestrator, OrchestratorConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OrchestratorConfig::default().with_max_concurrency(2);
//! let orchestrator = Orchestrator::new(
//!     config,
//!     Arc::new(MediaClient::new()?),
//!     Arc::new(DiskSink::new("downloads")),
//! )?;
//!
//! let key = "https://web.telegram.org/a/progressive/document123".to_string();
//! orchestrator.request_download(&key);
//! let snapshot = orchestrator.wait_until_settled(&[key]).await;
//! println!("{:?}", snapshot.entries);
//! # Ok(())
//! # }
//! ```

pub mod chunk_loop;
pub mod config;
pub mod signals;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::app::client::RangeFetcher;
use crate::app::queue::{ActiveRun, ConcurrencyGate, DownloadQueue, LimitChange};
use crate::app::sink::FileSink;
use crate::app::state::{DownloadState, DownloadStateStore, StateSnapshot, StateUpdate};
use crate::errors::{ConfigError, ConfigResult};

use chunk_loop::RunOutcome;

pub use config::OrchestratorConfig;
pub use signals::{create_shutdown_channel, wait_for_shutdown_signal, SignalHandler};

/// Message stored on runs cut short by [`Orchestrator::shutdown`]
pub const CANCELLED_MESSAGE: &str = "download cancelled";

/// Immediate answer to a download request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// A run for this key is already starting or downloading
    AlreadyInProgress,
    /// Waiting for a concurrency slot
    Queued,
    /// Admitted and spawned
    Started,
    /// The orchestrator no longer accepts requests
    ShuttingDown,
}

/// Everything guarded by the scheduler lock
#[derive(Debug)]
struct SchedulerState {
    store: DownloadStateStore,
    gate: ConcurrencyGate,
    queue: DownloadQueue,
    shutting_down: bool,
}

impl SchedulerState {
    /// Admit `key` and mark it starting from offset 0
    fn start(&mut self, key: &str) -> ActiveRun {
        let run = self.gate.admit(key);
        self.store.set(key, StateUpdate::starting());
        run
    }
}

/// Single-flight download scheduler
///
/// Shared as `Arc<Orchestrator>`; runs are spawned on the current tokio
/// runtime, so requests must be made from within one.
pub struct Orchestrator {
    config: OrchestratorConfig,
    fetcher: Arc<dyn RangeFetcher>,
    sink: Arc<dyn FileSink>,
    scheduler: Mutex<SchedulerState>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator
    ///
    /// # Arguments
    ///
    /// * `config` - chunk size, initial limit and broadcast capacity
    /// * `fetcher` - performs the ranged GETs
    /// * `sink` - persists assembled files
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the configuration does not validate
    pub fn new(
        config: OrchestratorConfig,
        fetcher: Arc<dyn RangeFetcher>,
        sink: Arc<dyn FileSink>,
    ) -> ConfigResult<Arc<Self>> {
        config
            .validate()
            .map_err(|reason| ConfigError::InvalidValue {
                field: "scheduler".to_string(),
                value: format!("{:?}", config),
                reason,
            })?;

        let scheduler = SchedulerState {
            store: DownloadStateStore::new(config.broadcast_capacity),
            gate: ConcurrencyGate::new(config.max_concurrency)?,
            queue: DownloadQueue::new(),
            shutting_down: false,
        };

        info!(
            "Orchestrator ready (chunk size {} bytes, limit {:?})",
            config.chunk_size, config.max_concurrency
        );

        Ok(Arc::new(Self {
            config,
            fetcher,
            sink,
            scheduler: Mutex::new(scheduler),
        }))
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Request a download of `key`
    ///
    /// Returns the admission decision immediately; the outcome of the run is
    /// only visible through state snapshots.
    pub fn request_download(self: &Arc<Self>, key: &str) -> RequestOutcome {
        let run = {
            let mut state = self.lock();

            if state.shutting_down {
                return RequestOutcome::ShuttingDown;
            }

            if let Some(current) = state.store.get(key) {
                if current.in_progress && current.status.is_running() {
                    debug!("Ignoring request for {}: already {}", key, current.status);
                    return RequestOutcome::AlreadyInProgress;
                }
            }

            if state.queue.contains(key) {
                return RequestOutcome::Queued;
            }

            if !state.gate.can_admit() {
                state.queue.enqueue(key);
                state.store.set(key, StateUpdate::queued());
                info!("Queued {} ({} waiting)", key, state.queue.len());
                return RequestOutcome::Queued;
            }

            state.start(key)
        };

        self.spawn_run(key.to_string(), run);
        RequestOutcome::Started
    }

    /// Change the concurrency limit
    ///
    /// Raising the limit drains the queue. Lowering it below the number of
    /// active runs evicts the most recently admitted ones: their keys go back
    /// into the queue flagged `need_restarted`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a limit of zero
    pub fn set_max_concurrency(self: &Arc<Self>, limit: usize) -> ConfigResult<()> {
        let change = {
            let mut state = self.lock();
            let change = state.gate.set_limit(limit)?;

            if let LimitChange::Lowered { evicted } = &change {
                for key in evicted {
                    state.queue.enqueue(key);
                    state.store.set(key, StateUpdate::requeued());
                    warn!("Evicted {} after lowering the limit to {}", key, limit);
                }
            }
            change
        };

        if change == LimitChange::Raised {
            self.drain();
        }
        Ok(())
    }

    pub fn max_concurrency(&self) -> Option<usize> {
        self.lock().gate.limit()
    }

    /// Associate a thumbnail with a key
    pub fn store_thumbnail(&self, key: &str, thumbnail: impl Into<String>) {
        self.lock().store.set_thumbnail(key, thumbnail);
    }

    /// Current state of a key
    pub fn state(&self, key: &str) -> Option<DownloadState> {
        self.lock().store.get(key).cloned()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.lock().store.snapshot()
    }

    /// Receive the full state collection after every mutation
    pub fn subscribe(&self) -> broadcast::Receiver<StateSnapshot> {
        self.lock().store.subscribe()
    }

    pub fn active_keys(&self) -> Vec<String> {
        self.lock().gate.active_keys()
    }

    pub fn queued_keys(&self) -> Vec<String> {
        self.lock().queue.keys()
    }

    /// Drop completed and failed entries from the store
    pub fn clear_finished(&self) -> usize {
        self.lock().store.clear_finished()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Wait until every key in `keys` is `completed` or `error`
    ///
    /// Keys that were never requested never settle.
    pub async fn wait_until_settled(&self, keys: &[String]) -> StateSnapshot {
        let (mut receiver, mut snapshot) = {
            let state = self.lock();
            (state.store.subscribe(), state.store.snapshot())
        };

        loop {
            if snapshot.all_terminal(keys.iter().map(String::as_str)) {
                return snapshot;
            }

            snapshot = match receiver.recv().await {
                Ok(snapshot) => snapshot,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Settle watcher skipped {} snapshots", skipped);
                    self.snapshot()
                }
                Err(broadcast::error::RecvError::Closed) => return self.snapshot(),
            };
        }
    }

    /// Stop accepting requests and cancel everything in flight
    ///
    /// Waiting and running keys end in `error` with a cancellation message.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if state.shutting_down {
            return;
        }
        state.shutting_down = true;

        let waiting = state.queue.clear();
        let cancelled = state.gate.cancel_all();
        for key in waiting.iter().chain(cancelled.iter()) {
            state.store.set(key, StateUpdate::error(CANCELLED_MESSAGE));
        }

        info!(
            "Shutting down: cancelled {} active and {} queued downloads",
            cancelled.len(),
            waiting.len()
        );
    }

    /// Start queued keys while slots are free
    fn drain(self: &Arc<Self>) {
        let started = {
            let mut state = self.lock();
            let mut started = Vec::new();
            if state.shutting_down {
                return;
            }

            while state.gate.can_admit() {
                let Some(key) = state.queue.pop_front() else {
                    break;
                };
                let run = state.start(&key);
                started.push((key, run));
            }
            started
        };

        for (key, run) in started {
            debug!("Drained {} from the queue", key);
            self.spawn_run(key, run);
        }
    }

    fn spawn_run(self: &Arc<Self>, key: String, run: ActiveRun) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = this.run_chunks(&key, &run).await;
            this.finish(&key, run.generation, outcome);
            this.drain();
        });
    }

    /// Write `update` only if `generation` still holds the slot for `key`
    fn publish(&self, key: &str, generation: u64, update: StateUpdate) -> bool {
        let mut state = self.lock();
        if !state.gate.is_current(key, generation) {
            return false;
        }
        state.store.set(key, update);
        true
    }

    /// Record a run's outcome and release its slot
    fn finish(&self, key: &str, generation: u64, outcome: RunOutcome) {
        let mut state = self.lock();
        let current = state.gate.is_current(key, generation);
        // Evicted run whose key has not been readmitted yet
        let orphaned = !current && !state.gate.is_active(key);

        match outcome {
            RunOutcome::Completed { path, total } if current || orphaned => {
                state.queue.remove(key);
                state.store.set(key, StateUpdate::completed(total, path));
                info!("Completed {}", key);
            }
            RunOutcome::Failed(e) if current => {
                warn!("Download of {} failed ({}): {}", key, e.kind(), e);
                state
                    .store
                    .set(key, StateUpdate::error(e.to_string()));
            }
            RunOutcome::Completed { .. } | RunOutcome::Failed(_) | RunOutcome::Cancelled => {
                if orphaned && !state.shutting_down {
                    // Acknowledge the requeue; the next admission starts over
                    state.store.set(
                        key,
                        StateUpdate {
                            need_restarted: Some(false),
                            ..StateUpdate::queued()
                        },
                    );
                    debug!("Run {} of {} stopped for requeue", generation, key);
                } else {
                    debug!("Discarding stale run {} of {}", generation, key);
                }
            }
        }

        state.gate.release_run(key, generation);
    }
}
