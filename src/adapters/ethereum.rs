use std::future::IntoFuture;
use std::time::Duration;

use alloy::providers::{Provider, RootProvider};
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::adapters::traits::BlockTimeSource;
use crate::error::{SyncError, SyncResult};
use crate::models::parse_decimal;

/// Origin (Ethereum) chain access through an alloy HTTP provider
pub struct EthereumClient {
    provider: RootProvider,
    timeout: Duration,
}

impl EthereumClient {
    pub fn new(rpc_url: &str, timeout: Duration) -> SyncResult<Self> {
        let url: Url = rpc_url
            .parse()
            .map_err(|e| SyncError::InvalidUrl(format!("{}: {}", rpc_url, e)))?;

        Ok(Self {
            provider: RootProvider::new_http(url),
            timeout,
        })
    }

    /// `eth_chainId`, used at startup to make sure the endpoint is reachable
    pub async fn chain_id(&self) -> SyncResult<u64> {
        let chain_id = self.bounded(self.provider.get_chain_id()).await??;
        Ok(chain_id)
    }

    async fn bounded<F: IntoFuture>(&self, call: F) -> SyncResult<F::Output> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| SyncError::RpcTimeout(self.timeout.as_millis() as u64))
    }
}

#[async_trait]
impl BlockTimeSource for EthereumClient {
    #[instrument(skip(self))]
    async fn block_time(&self, block: &str) -> SyncResult<DateTime<Utc>> {
        let number = parse_decimal("block", block)?;

        let block = self
            .bounded(self.provider.get_block_by_number(number.into()))
            .await??
            .ok_or(SyncError::BlockNotFound(number))?;

        let time = block_timestamp(block.header.inner.timestamp)?;
        debug!(number, %time, "Resolved block time");
        Ok(time)
    }
}

fn block_timestamp(secs: u64) -> SyncResult<DateTime<Utc>> {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| SyncError::MalformedResponse(format!("timestamp out of range: {}", secs)))
}
