//! FIFO queue of resource keys waiting for a concurrency slot

use std::collections::VecDeque;

use tracing::debug;

/// Pending download requests in arrival order
///
/// A key appears at most once. Enqueueing a key that is already waiting keeps
/// its original position.
#[derive(Debug, Default, Clone)]
pub struct DownloadQueue {
    keys: VecDeque<String>,
}

impl DownloadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key to the back of the queue
    ///
    /// # Returns
    ///
    /// `true` if the key was added, `false` if it was already waiting
    pub fn enqueue(&mut self, key: &str) -> bool {
        if self.contains(key) {
            debug!("Key already queued: {}", key);
            return false;
        }
        self.keys.push_back(key.to_string());
        true
    }

    /// Take the oldest waiting key
    pub fn pop_front(&mut self) -> Option<String> {
        self.keys.pop_front()
    }

    /// Drop a key wherever it sits, returning whether it was present
    pub fn remove(&mut self, key: &str) -> bool {
        match self.keys.iter().position(|queued| queued == key) {
            Some(index) => {
                self.keys.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|queued| queued == key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Waiting keys, front first
    pub fn keys(&self) -> Vec<String> {
        self.keys.iter().cloned().collect()
    }

    /// Empty the queue, returning what was waiting
    pub fn clear(&mut self) -> Vec<String> {
        self.keys.drain(..).collect()
    }
}
