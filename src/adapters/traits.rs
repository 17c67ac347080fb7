use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SyncResult;
use crate::models::{DestinationNonce, StakeUpdateRecord, ValidatorId};

/// Indexed view of the origin chain's `StakeUpdate` events
#[async_trait]
pub trait StakeUpdateSource: Send + Sync {
    /// Highest nonce indexed for the validator, 0 if it has no stake updates yet
    async fn latest_nonce(&self, validator_id: ValidatorId) -> SyncResult<u64>;

    /// The single stake update with exactly this nonce
    async fn stake_update(&self, validator_id: ValidatorId, nonce: u64) -> SyncResult<StakeUpdateRecord>;
}

/// Validator state on the destination ledger
#[async_trait]
pub trait ValidatorStateSource: Send + Sync {
    async fn validator_nonce(&self, validator_id: ValidatorId) -> SyncResult<DestinationNonce>;
}

/// Commit time of origin chain blocks
#[async_trait]
pub trait BlockTimeSource: Send + Sync {
    /// `block` is the decimal block number exactly as the subgraph reported it
    async fn block_time(&self, block: &str) -> SyncResult<DateTime<Utc>>;
}
