use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::adapters::traits::StakeUpdateSource;
use crate::error::{SyncError, SyncResult};
use crate::models::{parse_decimal, GraphResponse, NonceEntry, StakeUpdateRecord, ValidatorId};

/// Client for the Polygon staking subgraph
pub struct SubgraphClient {
    client: Client,
    url: String,
}

impl SubgraphClient {
    pub fn new(url: String, timeout: Duration) -> SyncResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    async fn query<T: DeserializeOwned>(&self, query: String) -> SyncResult<Vec<T>> {
        let body = serde_json::json!({ "query": query });

        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::HttpStatus {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let bytes = response.bytes().await?;
        decode_stake_updates(&bytes)
    }
}

#[async_trait]
impl StakeUpdateSource for SubgraphClient {
    #[instrument(skip(self))]
    async fn latest_nonce(&self, validator_id: ValidatorId) -> SyncResult<u64> {
        let entries: Vec<NonceEntry> = self.query(latest_nonce_query(validator_id)).await?;
        let nonce = latest_nonce_from(&entries)?;
        debug!(nonce, "Latest subgraph nonce");
        Ok(nonce)
    }

    #[instrument(skip(self))]
    async fn stake_update(&self, validator_id: ValidatorId, nonce: u64) -> SyncResult<StakeUpdateRecord> {
        let records: Vec<StakeUpdateRecord> = self.query(stake_update_query(validator_id, nonce)).await?;
        single_record(records, validator_id, nonce)
    }
}

fn latest_nonce_query(validator_id: ValidatorId) -> String {
    format!(
        "{{ stakeUpdates(first: 1, orderBy: nonce, orderDirection: desc, where: {{validatorId: {}}}) {{ nonce }} }}",
        validator_id
    )
}

fn stake_update_query(validator_id: ValidatorId, nonce: u64) -> String {
    format!(
        "{{ stakeUpdates(where: {{validatorId: {}, nonce: {}}}) {{ id validatorId totalStaked block nonce transactionHash logIndex }} }}",
        validator_id, nonce
    )
}

fn decode_stake_updates<T: DeserializeOwned>(body: &[u8]) -> SyncResult<Vec<T>> {
    let response: GraphResponse<T> = serde_json::from_slice(body)?;
    response.into_stake_updates()
}

fn latest_nonce_from(entries: &[NonceEntry]) -> SyncResult<u64> {
    match entries.first() {
        Some(entry) => parse_decimal("nonce", &entry.nonce),
        None => Ok(0),
    }
}

/// A lookup by (validator, nonce) must match exactly one event
fn single_record(
    mut records: Vec<StakeUpdateRecord>,
    validator_id: ValidatorId,
    nonce: u64,
) -> SyncResult<StakeUpdateRecord> {
    if records.len() != 1 {
        return Err(SyncError::UnexpectedRecordCount {
            validator_id,
            nonce,
            count: records.len(),
        });
    }
    Ok(records.remove(0))
}
