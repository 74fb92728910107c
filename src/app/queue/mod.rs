//! Admission control for resource downloads
//!
//! # Features
//!
//! - **FIFO queue**: keys waiting for a slot start in arrival order
//! - **Deduplication**: a key waits in the queue at most once
//! - **Mutable limit**: lowering the limit cancels the newest active runs so
//!   they can be requeued
//! - **Run generations**: an evicted run can never release the slot of the run
//!   that replaced it
//!
//! Neither type locks internally; the orchestrator keeps both behind the same
//! mutex as the state store so every admission decision sees one consistent
//! view.

pub mod core;
pub mod gate;

pub use self::core::DownloadQueue;
pub use gate::{ActiveRun, ConcurrencyGate, LimitChange};
