use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, instrument};

use crate::error::{SyncError, SyncResult};
use crate::execution::submitter::{CorrectionSubmitter, Submission};
use crate::models::StakeUpdateRecord;

#[derive(Debug, Clone)]
pub struct HeimdallCliConfig {
    /// Path or name of the `heimdallcli` binary
    pub program: String,
    pub timeout: Duration,
    /// Log the command line instead of running it
    pub dry_run: bool,
}

/// Submits `stake-update` messages by shelling out to `heimdallcli`
pub struct HeimdallCliSubmitter {
    config: HeimdallCliConfig,
}

impl HeimdallCliSubmitter {
    pub fn new(config: HeimdallCliConfig) -> Self {
        Self { config }
    }

    /// `tx staking stake-update` arguments, values taken verbatim from the record
    pub fn stake_update_args(record: &StakeUpdateRecord, chain_id: &str) -> Vec<String> {
        [
            "tx",
            "staking",
            "stake-update",
            "--block-number",
            record.block.as_str(),
            "--id",
            record.validator_id.as_str(),
            "--log-index",
            record.log_index.as_str(),
            "--nonce",
            record.nonce.as_str(),
            "--staked-amount",
            record.total_staked.as_str(),
            "--tx-hash",
            record.transaction_hash.as_str(),
            "--chain-id",
            chain_id,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

#[async_trait]
impl CorrectionSubmitter for HeimdallCliSubmitter {
    #[instrument(skip(self, record), fields(validator_id = %record.validator_id, nonce = %record.nonce))]
    async fn submit(&self, record: &StakeUpdateRecord, chain_id: &str) -> SyncResult<Submission> {
        let args = Self::stake_update_args(record, chain_id);
        info!("{} {}", self.config.program, args.join(" "));

        if self.config.dry_run {
            info!("Dry run, not invoking {}", self.config.program);
            return Ok(Submission::DryRun);
        }

        let mut child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SyncError::SignerSpawn {
                program: self.config.program.clone(),
                source,
            })?;

        let status = match tokio::time::timeout(self.config.timeout, child.wait()).await {
            Ok(status) => status.map_err(|source| SyncError::SignerSpawn {
                program: self.config.program.clone(),
                source,
            })?,
            Err(_) => return Err(SyncError::SignerTimeout(self.config.timeout.as_millis() as u64)),
        };

        if !status.success() {
            return Err(SyncError::SignerFailed(status.to_string()));
        }

        Ok(Submission::Broadcast)
    }
}
