//! Concurrency gate for resource downloads
//!
//! The gate owns the active set: the keys currently counted against the
//! limit, in admission order. Each admission hands out a fresh
//! [`CancellationToken`] and a generation number so that a run evicted by a
//! lowered limit can be told apart from the run that later replaces it.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{ConfigError, ConfigResult};

/// Handle given to a run when its key is admitted
#[derive(Debug, Clone)]
pub struct ActiveRun {
    /// Cancelled when the run is evicted or the orchestrator shuts down
    pub token: CancellationToken,
    /// Distinguishes successive runs of the same key
    pub generation: u64,
}

/// Outcome of changing the limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitChange {
    /// More slots than before; the caller should drain the queue
    Raised,
    Unchanged,
    /// Fewer slots; `evicted` lists the keys whose runs were cancelled
    Lowered { evicted: Vec<String> },
}

#[derive(Debug)]
struct ActiveEntry {
    key: String,
    run: ActiveRun,
}

/// Admission control over the set of running downloads
#[derive(Debug)]
pub struct ConcurrencyGate {
    /// `None` admits everything
    limit: Option<usize>,
    active: Vec<ActiveEntry>,
    next_generation: u64,
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self {
            limit: None,
            active: Vec::new(),
            next_generation: 1,
        }
    }
}

impl ConcurrencyGate {
    /// Create a gate with an optional limit
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a limit of zero
    pub fn new(limit: Option<usize>) -> ConfigResult<Self> {
        if let Some(limit) = limit {
            validate_limit(limit)?;
        }
        Ok(Self {
            limit,
            ..Default::default()
        })
    }

    /// Whether another key may start now
    pub fn can_admit(&self) -> bool {
        match self.limit {
            Some(limit) => self.active.len() < limit,
            None => true,
        }
    }

    /// Add a key to the active set
    ///
    /// The caller is expected to have checked [`can_admit`](Self::can_admit).
    /// Admitting a key that is already active cancels its previous run.
    pub fn admit(&mut self, key: &str) -> ActiveRun {
        if let Some(index) = self.position(key) {
            let previous = self.active.remove(index);
            previous.run.token.cancel();
            warn!("Re-admitting active key {}, previous run cancelled", key);
        }

        let run = ActiveRun {
            token: CancellationToken::new(),
            generation: self.next_generation,
        };
        self.next_generation += 1;

        self.active.push(ActiveEntry {
            key: key.to_string(),
            run: run.clone(),
        });
        debug!(
            "Admitted {} (generation {}, {} active)",
            key,
            run.generation,
            self.active.len()
        );
        run
    }

    /// Remove a key from the active set regardless of generation
    pub fn release(&mut self, key: &str) -> bool {
        match self.position(key) {
            Some(index) => {
                self.active.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove a key only if `generation` is still its current run
    pub fn release_run(&mut self, key: &str, generation: u64) -> bool {
        if self.is_current(key, generation) {
            self.release(key)
        } else {
            false
        }
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Whether `generation` is the run currently holding a slot for `key`
    pub fn is_current(&self, key: &str, generation: u64) -> bool {
        self.active
            .iter()
            .any(|entry| entry.key == key && entry.run.generation == generation)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Active keys in admission order
    pub fn active_keys(&self) -> Vec<String> {
        self.active.iter().map(|entry| entry.key.clone()).collect()
    }

    /// Change the limit, evicting the most recently admitted keys if needed
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a limit of zero
    pub fn set_limit(&mut self, limit: usize) -> ConfigResult<LimitChange> {
        validate_limit(limit)?;

        let previous = self.limit.replace(limit);
        let change = match previous {
            Some(old) if old == limit => LimitChange::Unchanged,
            Some(old) if old < limit => LimitChange::Raised,
            _ => {
                let mut evicted = Vec::new();
                while self.active.len() > limit {
                    if let Some(entry) = self.active.pop() {
                        entry.run.token.cancel();
                        evicted.push(entry.key);
                    }
                }
                LimitChange::Lowered { evicted }
            }
        };

        debug!("Concurrency limit {:?} -> {} ({:?})", previous, limit, change);
        Ok(change)
    }

    /// Cancel every active run and empty the active set
    pub fn cancel_all(&mut self) -> Vec<String> {
        self.active
            .drain(..)
            .map(|entry| {
                entry.run.token.cancel();
                entry.key
            })
            .collect()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.active.iter().position(|entry| entry.key == key)
    }
}

fn validate_limit(limit: usize) -> ConfigResult<()> {
    if limit == 0 {
        return Err(ConfigError::InvalidValue {
            field: "max_concurrency".to_string(),
            value: limit.to_string(),
            reason: "Concurrency limit must be at least 1".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_gate_admits_everything() {
        let mut gate = ConcurrencyGate::new(None).unwrap();
        for i in 0..100 {
            assert!(gate.can_admit());
            gate.admit(&format!("k{}", i));
        }
        assert_eq!(gate.active_count(), 100);
        assert_eq!(gate.limit(), None);
    }

    #[test]
    fn test_limit_blocks_admission() {
        let mut gate = ConcurrencyGate::new(Some(2)).unwrap();
        gate.admit("a");
        gate.admit("b");
        assert!(!gate.can_admit());

        assert!(gate.release("a"));
        assert!(gate.can_admit());
        assert!(!gate.release("a"));
    }

    #[test]
    fn test_zero_limit_rejected() {
        assert!(ConcurrencyGate::new(Some(0)).is_err());
        let mut gate = ConcurrencyGate::new(Some(1)).unwrap();
        assert!(gate.set_limit(0).is_err());
        assert_eq!(gate.limit(), Some(1));
    }

    #[test]
    fn test_generations_are_unique() {
        let mut gate = ConcurrencyGate::new(None).unwrap();
        let first = gate.admit("a");
        gate.release("a");
        let second = gate.admit("a");

        assert_ne!(first.generation, second.generation);
        assert!(!gate.is_current("a", first.generation));
        assert!(gate.is_current("a", second.generation));

        // a stale run cannot release its successor
        assert!(!gate.release_run("a", first.generation));
        assert!(gate.is_active("a"));
        assert!(gate.release_run("a", second.generation));
        assert!(!gate.is_active("a"));
    }

    #[test]
    fn test_lowering_evicts_most_recent() {
        let mut gate = ConcurrencyGate::new(Some(3)).unwrap();
        let a = gate.admit("a");
        let b = gate.admit("b");
        let c = gate.admit("c");

        let change = gate.set_limit(1).unwrap();
        assert_eq!(
            change,
            LimitChange::Lowered {
                evicted: vec!["c".to_string(), "b".to_string()]
            }
        );
        assert!(!a.token.is_cancelled());
        assert!(b.token.is_cancelled());
        assert!(c.token.is_cancelled());
        assert_eq!(gate.active_keys(), vec!["a".to_string()]);
    }

    #[test]
    fn test_lowering_by_one_evicts_one() {
        let mut gate = ConcurrencyGate::new(Some(2)).unwrap();
        gate.admit("a");
        gate.admit("b");

        match gate.set_limit(1).unwrap() {
            LimitChange::Lowered { evicted } => assert_eq!(evicted, vec!["b".to_string()]),
            other => panic!("unexpected change {:?}", other),
        }
        assert_eq!(gate.active_count(), 1);
    }

    #[test]
    fn test_raise_and_unchanged() {
        let mut gate = ConcurrencyGate::new(Some(1)).unwrap();
        assert_eq!(gate.set_limit(1).unwrap(), LimitChange::Unchanged);
        assert_eq!(gate.set_limit(4).unwrap(), LimitChange::Raised);
        assert_eq!(
            gate.set_limit(3).unwrap(),
            LimitChange::Lowered { evicted: vec![] }
        );
    }

    #[test]
    fn test_readmit_cancels_previous_run() {
        let mut gate = ConcurrencyGate::new(None).unwrap();
        let first = gate.admit("a");
        let second = gate.admit("a");
        assert!(first.token.is_cancelled());
        assert!(!second.token.is_cancelled());
        assert_eq!(gate.active_count(), 1);
    }

    #[test]
    fn test_cancel_all() {
        let mut gate = ConcurrencyGate::new(None).unwrap();
        let a = gate.admit("a");
        gate.admit("b");
        let cancelled = gate.cancel_all();
        assert_eq!(cancelled.len(), 2);
        assert!(a.token.is_cancelled());
        assert_eq!(gate.active_count(), 0);
    }
}
