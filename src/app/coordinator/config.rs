//! Configuration structures for the download orchestrator
//!
//! This module defines the knobs of the scheduler: chunk size, the initial
//! concurrency limit and the capacity of the state broadcast channel.

use serde::{Deserialize, Serialize};

use crate::constants::{chunks, scheduler};

/// Configuration for the download orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Bytes requested per ranged GET
    pub chunk_size: u64,
    /// Maximum concurrent downloads; `None` admits everything
    pub max_concurrency: Option<usize>,
    /// Snapshots buffered per subscriber before it starts lagging
    pub broadcast_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            chunk_size: chunks::DEFAULT_CHUNK_SIZE,
            max_concurrency: None,
            broadcast_capacity: scheduler::BROADCAST_CAPACITY,
        }
    }
}

impl OrchestratorConfig {
    /// Set the chunk size in bytes
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the initial concurrency limit
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    /// Set the broadcast channel capacity
    pub fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("Chunk size cannot be zero".to_string());
        }

        if self.max_concurrency == Some(0) {
            return Err("Concurrency limit must be at least 1".to_string());
        }

        if self.broadcast_capacity == 0 {
            return Err("Broadcast capacity cannot be zero".to_string());
        }

        Ok(())
    }
}
