use std::time::Duration;

use serde::Deserialize;

/// How often the subgraph nonce is re-read once the loop is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceNoncePolicy {
    /// Resolve once at startup and keep it for the process lifetime
    Startup,
    /// Re-resolve at the top of every iteration
    EveryIteration,
}

impl Default for SourceNoncePolicy {
    fn default() -> Self {
        SourceNoncePolicy::EveryIteration
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub ethereum_rpc_url: String,
    pub polygon_sub_graph_url: String,
    pub heimdall_rest_url: String,
    pub heimdall_chain_id: String,

    #[serde(default = "default_heimdallcli_path")]
    pub heimdallcli_path: String,

    #[serde(default = "default_graph_timeout_secs")]
    pub graph_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub heimdall_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub ethereum_rpc_timeout_secs: u64,
    #[serde(default = "default_signer_timeout_secs")]
    pub signer_timeout_secs: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// Minimum age of a stake-update block before it is relayed (reorg protection)
    #[serde(default = "default_min_block_age_secs")]
    pub min_block_age_secs: u64,

    #[serde(default)]
    pub source_nonce_policy: SourceNoncePolicy,
    #[serde(default)]
    pub dry_run: bool,
}

fn default_heimdallcli_path() -> String {
    "heimdallcli".to_string()
}

fn default_graph_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_signer_timeout_secs() -> u64 {
    120
}

fn default_poll_interval_secs() -> u64 {
    18
}

fn default_retry_delay_secs() -> u64 {
    1
}

fn default_min_block_age_secs() -> u64 {
    crate::reconcile::MIN_BLOCK_AGE_SECS as u64
}

impl Config {
    /// Read the configuration from the process environment.
    ///
    /// Keys are matched case-insensitively, so both `heimdall_rest_url` (as
    /// written in `.env`) and `HEIMDALL_REST_URL` work.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(config::Environment::default())
    }

    fn from_source<S>(source: S) -> Result<Self, config::ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn min_block_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.min_block_age_secs as i64)
    }
}
