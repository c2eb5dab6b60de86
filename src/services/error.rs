//! Fatal conditions that abort a check run.
//!
//! Ordinary per-item problems never surface here; phases accumulate them
//! into their failure collections instead.

use thiserror::Error;

/// Conditions that make the rest of a run meaningless.
#[derive(Error, Debug)]
pub enum CheckError {
    /// A check needs at least two replicas to compare.
    #[error("need at least two replica addresses, got {0}")]
    InsufficientServers(usize),

    /// Fewer than two replicas share the reference history.
    #[error("need at least two synchronized replicas to compare, found {0}")]
    InsufficientSyncedReplicas(usize),
}
