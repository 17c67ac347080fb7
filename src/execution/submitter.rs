use async_trait::async_trait;

use crate::error::SyncResult;
use crate::models::StakeUpdateRecord;

/// What a successful `submit` actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Handed to the signer, which accepted it for broadcast
    Broadcast,
    /// Only logged; nothing left the process
    DryRun,
}

/// Submitter trait - relays one stake update to Heimdall
///
/// Implementations must treat the record as read-only and pass its fields on
/// unchanged.
#[async_trait]
pub trait CorrectionSubmitter: Send + Sync {
    async fn submit(&self, record: &StakeUpdateRecord, chain_id: &str) -> SyncResult<Submission>;
}
