// Reconciliation loop - keeps Heimdall's view of a validator's stake in step
// with the staking subgraph.
//
// Each pass:
// - reads the Heimdall nonce (and, depending on policy, the subgraph nonce)
// - if Heimdall is behind, fetches the single next stake update
// - holds it back until its block is older than the reorg window
// - hands it to the submitter
//
// Failed passes are retried after a short delay, normal passes after the poll interval.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::Duration;
use tracing::{error, info, warn};

use crate::adapters::{BlockTimeSource, StakeUpdateSource, ValidatorStateSource};
use crate::config::SourceNoncePolicy;
use crate::error::{IterationError, Stage, SyncResult};
use crate::execution::{CorrectionSubmitter, Submission};
use crate::models::ValidatorId;
use crate::reconcile::{decide, is_old_enough, Action};

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub validator_id: ValidatorId,
    /// Heimdall chain id passed to the submitter
    pub chain_id: String,
    pub poll_interval: Duration,
    pub retry_delay: Duration,
    pub min_block_age: chrono::Duration,
    pub source_nonce_policy: SourceNoncePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    InSync,
    Submitted { nonce: u64 },
    /// Submitter ran in dry-run mode; Heimdall was not touched
    DryRun { nonce: u64 },
    /// Stake update found but its block is still inside the reorg window
    Deferred { nonce: u64, age_secs: i64 },
}

pub struct Reconciler {
    config: ReconcilerConfig,
    stake_updates: Arc<dyn StakeUpdateSource>,
    validators: Arc<dyn ValidatorStateSource>,
    blocks: Arc<dyn BlockTimeSource>,
    submitter: Arc<dyn CorrectionSubmitter>,
    source_nonce: Option<u64>,
}

impl Reconciler {
    pub fn new(
        config: ReconcilerConfig,
        stake_updates: Arc<dyn StakeUpdateSource>,
        validators: Arc<dyn ValidatorStateSource>,
        blocks: Arc<dyn BlockTimeSource>,
        submitter: Arc<dyn CorrectionSubmitter>,
    ) -> Self {
        Self {
            config,
            stake_updates,
            validators,
            blocks,
            submitter,
            source_nonce: None,
        }
    }

    /// Fetch the subgraph nonce and remember it
    pub async fn resolve_source_nonce(&mut self) -> SyncResult<u64> {
        let nonce = self.stake_updates.latest_nonce(self.config.validator_id).await?;
        self.source_nonce = Some(nonce);
        Ok(nonce)
    }

    async fn current_source_nonce(&mut self) -> SyncResult<u64> {
        match (self.config.source_nonce_policy, self.source_nonce) {
            (SourceNoncePolicy::Startup, Some(nonce)) => Ok(nonce),
            _ => self.resolve_source_nonce().await,
        }
    }

    /// One pass of the loop, without the trailing sleep
    pub async fn run_iteration(&mut self) -> Result<IterationOutcome, IterationError> {
        let validator_id = self.config.validator_id;

        let destination = self
            .validators
            .validator_nonce(validator_id)
            .await
            .map_err(Stage::DestinationNonce.wrap())?;

        let source_nonce = self
            .current_source_nonce()
            .await
            .map_err(Stage::SourceNonce.wrap())?;

        info!(
            validator_id,
            source_nonce,
            destination_nonce = %destination,
            "Ethereum nonce: {} Heimdall nonce: {}",
            source_nonce,
            destination
        );

        let nonce = match decide(source_nonce, destination) {
            Action::NoOp => return Ok(IterationOutcome::InSync),
            Action::CorrectWithNonce(nonce) => nonce,
        };

        info!(validator_id, nonce, "Processing stake update");

        let record = self
            .stake_updates
            .stake_update(validator_id, nonce)
            .await
            .map_err(Stage::FetchRecord.wrap())?;

        let block_time = self
            .blocks
            .block_time(&record.block)
            .await
            .map_err(Stage::BlockTime.wrap())?;

        let now = Utc::now();
        if !is_old_enough(block_time, now, self.config.min_block_age) {
            let age_secs = now.signed_duration_since(block_time).num_seconds();
            info!(
                validator_id,
                nonce,
                block = %record.block,
                age_secs,
                "Block is younger than {}s, skipping stake-update",
                self.config.min_block_age.num_seconds()
            );
            return Ok(IterationOutcome::Deferred { nonce, age_secs });
        }

        let submission = self
            .submitter
            .submit(&record, &self.config.chain_id)
            .await
            .map_err(Stage::Submit.wrap())?;

        match submission {
            Submission::Broadcast => {
                info!(
                    validator_id,
                    nonce,
                    tx_hash = %record.transaction_hash,
                    "✅ Stake update submitted"
                );
                Ok(IterationOutcome::Submitted { nonce })
            }
            Submission::DryRun => {
                info!(
                    validator_id,
                    nonce,
                    tx_hash = %record.transaction_hash,
                    "📝 Dry run, stake update not broadcast"
                );
                Ok(IterationOutcome::DryRun { nonce })
            }
        }
    }

    /// How long to wait before the next pass
    pub fn delay_after(&self, result: &Result<IterationOutcome, IterationError>) -> Duration {
        match result {
            Ok(_) => self.config.poll_interval,
            Err(_) => self.config.retry_delay,
        }
    }

    /// Run forever. Errors are logged and retried, never returned.
    pub async fn run(mut self) {
        info!(
            validator_id = self.config.validator_id,
            policy = ?self.config.source_nonce_policy,
            "🔄 Starting stake nonce sync loop"
        );

        loop {
            let result = self.run_iteration().await;

            if let Err(e) = &result {
                match e.stage {
                    Stage::DestinationNonce | Stage::SourceNonce => warn!(
                        validator_id = self.config.validator_id,
                        stage = %e.stage,
                        error = %e.source,
                        "❌ Error getting nonce for validator"
                    ),
                    _ => error!(
                        validator_id = self.config.validator_id,
                        stage = %e.stage,
                        error = %e.source,
                        "❌ Error processing stake update for validator"
                    ),
                }
            }

            tokio::time::sleep(self.delay_after(&result)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::DateTime;

    use super::*;
    use crate::error::SyncError;
    use crate::models::{DestinationNonce, StakeUpdateRecord};

    const VALIDATOR: ValidatorId = 31;

    struct FakeSubgraph {
        latest: AtomicU64,
        latest_calls: AtomicUsize,
        records: HashMap<u64, StakeUpdateRecord>,
        record_calls: Mutex<Vec<u64>>,
    }

    impl FakeSubgraph {
        fn new(latest: u64, nonces: &[u64]) -> Self {
            let records = nonces.iter().map(|&n| (n, record(n))).collect();
            Self {
                latest: AtomicU64::new(latest),
                latest_calls: AtomicUsize::new(0),
                records,
                record_calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl StakeUpdateSource for FakeSubgraph {
        async fn latest_nonce(&self, _validator_id: ValidatorId) -> SyncResult<u64> {
            self.latest_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.latest.load(Ordering::SeqCst))
        }

        async fn stake_update(&self, validator_id: ValidatorId, nonce: u64) -> SyncResult<StakeUpdateRecord> {
            self.record_calls.lock().unwrap().push(nonce);
            self.records
                .get(&nonce)
                .cloned()
                .ok_or(SyncError::UnexpectedRecordCount {
                    validator_id,
                    nonce,
                    count: 0,
                })
        }
    }

    /// `None` simulates Heimdall being unreachable
    struct FakeHeimdall(Option<DestinationNonce>);

    impl FakeHeimdall {
        fn returning(nonce: DestinationNonce) -> Self {
            Self(Some(nonce))
        }

        fn failing() -> Self {
            Self(None)
        }
    }

    #[async_trait]
    impl ValidatorStateSource for FakeHeimdall {
        async fn validator_nonce(&self, validator_id: ValidatorId) -> SyncResult<DestinationNonce> {
            self.0.ok_or_else(|| SyncError::HttpStatus {
                status: 503,
                url: format!("http://heimdall/staking/validator/{}", validator_id),
            })
        }
    }

    struct FixedBlockTime(DateTime<Utc>);

    #[async_trait]
    impl BlockTimeSource for FixedBlockTime {
        async fn block_time(&self, _block: &str) -> SyncResult<DateTime<Utc>> {
            Ok(self.0)
        }
    }

    #[derive(Default)]
    struct RecordingSubmitter {
        submitted: Mutex<Vec<(StakeUpdateRecord, String)>>,
        fail: bool,
        dry_run: bool,
    }

    #[async_trait]
    impl CorrectionSubmitter for RecordingSubmitter {
        async fn submit(&self, record: &StakeUpdateRecord, chain_id: &str) -> SyncResult<Submission> {
            self.submitted
                .lock()
                .unwrap()
                .push((record.clone(), chain_id.to_string()));
            if self.fail {
                return Err(SyncError::SignerFailed("exit status: 1".to_string()));
            }
            if self.dry_run {
                return Ok(Submission::DryRun);
            }
            Ok(Submission::Broadcast)
        }
    }

    fn record(nonce: u64) -> StakeUpdateRecord {
        StakeUpdateRecord {
            id: format!("0xabc-{}", nonce),
            validator_id: VALIDATOR.to_string(),
            total_staked: "10000000000000000000000".to_string(),
            block: format!("{}", 16_894_500 + nonce),
            nonce: nonce.to_string(),
            transaction_hash: format!("0x{:064x}", nonce),
            log_index: "42".to_string(),
        }
    }

    fn config(policy: SourceNoncePolicy) -> ReconcilerConfig {
        ReconcilerConfig {
            validator_id: VALIDATOR,
            chain_id: "heimdall-137".to_string(),
            poll_interval: Duration::from_secs(18),
            retry_delay: Duration::from_secs(1),
            min_block_age: chrono::Duration::minutes(10),
            source_nonce_policy: policy,
        }
    }

    struct Harness {
        reconciler: Reconciler,
        subgraph: Arc<FakeSubgraph>,
        submitter: Arc<RecordingSubmitter>,
    }

    fn harness(
        subgraph: FakeSubgraph,
        heimdall: FakeHeimdall,
        block_age: chrono::Duration,
        submitter: RecordingSubmitter,
        policy: SourceNoncePolicy,
    ) -> Harness {
        let subgraph = Arc::new(subgraph);
        let submitter = Arc::new(submitter);
        let reconciler = Reconciler::new(
            config(policy),
            subgraph.clone(),
            Arc::new(heimdall),
            Arc::new(FixedBlockTime(Utc::now() - block_age)),
            submitter.clone(),
        );
        Harness {
            reconciler,
            subgraph,
            submitter,
        }
    }

    #[tokio::test]
    async fn test_in_sync_does_not_submit() {
        let mut h = harness(
            FakeSubgraph::new(5, &[1, 2, 3, 4, 5]),
            FakeHeimdall::returning(DestinationNonce::Committed(5)),
            chrono::Duration::minutes(20),
            RecordingSubmitter::default(),
            SourceNoncePolicy::EveryIteration,
        );

        let result = h.reconciler.run_iteration().await;

        assert_eq!(result.as_ref().unwrap(), &IterationOutcome::InSync);
        assert!(h.submitter.submitted.lock().unwrap().is_empty());
        assert!(h.subgraph.record_calls.lock().unwrap().is_empty());
        assert_eq!(h.reconciler.delay_after(&result), Duration::from_secs(18));
    }

    #[tokio::test]
    async fn test_behind_submits_next_nonce_only() {
        let mut h = harness(
            FakeSubgraph::new(5, &[1, 2, 3, 4, 5]),
            FakeHeimdall::returning(DestinationNonce::Committed(3)),
            chrono::Duration::minutes(20),
            RecordingSubmitter::default(),
            SourceNoncePolicy::EveryIteration,
        );

        let result = h.reconciler.run_iteration().await;

        assert_eq!(result.as_ref().unwrap(), &IterationOutcome::Submitted { nonce: 4 });
        assert_eq!(*h.subgraph.record_calls.lock().unwrap(), vec![4]);

        let submitted = h.submitter.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].0, record(4));
        assert_eq!(submitted[0].1, "heimdall-137");
        assert_eq!(h.reconciler.delay_after(&result), Duration::from_secs(18));
    }

    #[tokio::test]
    async fn test_young_block_is_deferred_and_reevaluated() {
        let mut h = harness(
            FakeSubgraph::new(5, &[1, 2, 3, 4, 5]),
            FakeHeimdall::returning(DestinationNonce::Committed(3)),
            chrono::Duration::minutes(2),
            RecordingSubmitter::default(),
            SourceNoncePolicy::EveryIteration,
        );

        for _ in 0..2 {
            let result = h.reconciler.run_iteration().await;
            assert!(matches!(
                result,
                Ok(IterationOutcome::Deferred { nonce: 4, age_secs }) if age_secs < 600
            ));
            assert_eq!(h.reconciler.delay_after(&result), Duration::from_secs(18));
        }

        assert!(h.submitter.submitted.lock().unwrap().is_empty());
        assert_eq!(*h.subgraph.record_calls.lock().unwrap(), vec![4, 4]);
    }

    #[tokio::test]
    async fn test_unknown_validator_targets_nonce_zero() {
        let mut h = harness(
            FakeSubgraph::new(5, &[1, 2, 3, 4, 5]),
            FakeHeimdall::returning(DestinationNonce::Unknown),
            chrono::Duration::minutes(20),
            RecordingSubmitter::default(),
            SourceNoncePolicy::EveryIteration,
        );

        let result = h.reconciler.run_iteration().await;

        let err = result.as_ref().unwrap_err();
        assert_eq!(err.stage, Stage::FetchRecord);
        assert_eq!(*h.subgraph.record_calls.lock().unwrap(), vec![0]);
        assert!(h.submitter.submitted.lock().unwrap().is_empty());
        assert_eq!(h.reconciler.delay_after(&result), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_heimdall_failure_retries_quickly() {
        let mut h = harness(
            FakeSubgraph::new(5, &[]),
            FakeHeimdall::failing(),
            chrono::Duration::minutes(20),
            RecordingSubmitter::default(),
            SourceNoncePolicy::EveryIteration,
        );

        let result = h.reconciler.run_iteration().await;

        assert_eq!(result.as_ref().unwrap_err().stage, Stage::DestinationNonce);
        assert_eq!(h.reconciler.delay_after(&result), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_submit_failure_is_contained() {
        let mut h = harness(
            FakeSubgraph::new(5, &[4]),
            FakeHeimdall::returning(DestinationNonce::Committed(3)),
            chrono::Duration::minutes(20),
            RecordingSubmitter {
                fail: true,
                ..Default::default()
            },
            SourceNoncePolicy::EveryIteration,
        );

        let result = h.reconciler.run_iteration().await;

        assert_eq!(result.as_ref().unwrap_err().stage, Stage::Submit);
        assert_eq!(h.submitter.submitted.lock().unwrap().len(), 1);
        assert_eq!(h.reconciler.delay_after(&result), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_dry_run_is_reported_separately() {
        let mut h = harness(
            FakeSubgraph::new(5, &[4]),
            FakeHeimdall::returning(DestinationNonce::Committed(3)),
            chrono::Duration::minutes(20),
            RecordingSubmitter {
                dry_run: true,
                ..Default::default()
            },
            SourceNoncePolicy::EveryIteration,
        );

        let result = h.reconciler.run_iteration().await;

        assert_eq!(result.as_ref().unwrap(), &IterationOutcome::DryRun { nonce: 4 });
        assert_eq!(h.submitter.submitted.lock().unwrap().len(), 1);
        assert_eq!(h.reconciler.delay_after(&result), Duration::from_secs(18));
    }

    #[tokio::test]
    async fn test_startup_policy_keeps_first_source_nonce() {
        let mut h = harness(
            FakeSubgraph::new(5, &[]),
            FakeHeimdall::returning(DestinationNonce::Committed(5)),
            chrono::Duration::minutes(20),
            RecordingSubmitter::default(),
            SourceNoncePolicy::Startup,
        );

        assert_eq!(h.reconciler.resolve_source_nonce().await.unwrap(), 5);
        h.subgraph.latest.store(6, Ordering::SeqCst);

        let result = h.reconciler.run_iteration().await;
        assert_eq!(result.unwrap(), IterationOutcome::InSync);
        assert_eq!(h.subgraph.latest_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_every_iteration_policy_sees_new_updates() {
        let mut h = harness(
            FakeSubgraph::new(5, &[6]),
            FakeHeimdall::returning(DestinationNonce::Committed(5)),
            chrono::Duration::minutes(20),
            RecordingSubmitter::default(),
            SourceNoncePolicy::EveryIteration,
        );

        assert_eq!(h.reconciler.resolve_source_nonce().await.unwrap(), 5);
        h.subgraph.latest.store(6, Ordering::SeqCst);

        let result = h.reconciler.run_iteration().await;
        assert_eq!(result.unwrap(), IterationOutcome::Submitted { nonce: 6 });
        assert_eq!(h.subgraph.latest_calls.load(Ordering::SeqCst), 2);
    }
}
