// Nonce reconciliation between the staking subgraph and Heimdall
pub mod scheduler;

pub use scheduler::{Reconciler, ReconcilerConfig};

use chrono::{DateTime, Duration, Utc};

use crate::models::DestinationNonce;

/// Default minimum age of a stake-update block before it is relayed
pub const MIN_BLOCK_AGE_SECS: i64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    NoOp,
    /// Relay the stake update carrying this nonce
    CorrectWithNonce(u64),
}

/// Heimdall only ever moves one nonce at a time, so at most the next
/// missing update is targeted regardless of how far behind it is.
pub fn decide(source_nonce: u64, destination: DestinationNonce) -> Action {
    if destination.is_behind(source_nonce) {
        Action::CorrectWithNonce(destination.next())
    } else {
        Action::NoOp
    }
}

/// Reorg guard: true once `now - block_time >= min_age`
pub fn is_old_enough(block_time: DateTime<Utc>, now: DateTime<Utc>, min_age: Duration) -> bool {
    now.signed_duration_since(block_time) >= min_age
}
