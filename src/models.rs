use std::fmt;

use serde::Deserialize;

use crate::error::{SyncError, SyncResult};

pub type ValidatorId = u64;

/// Validator nonce as committed on Heimdall
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationNonce {
    Committed(u64),
    /// Heimdall reported an application error for the validator (not yet known there).
    /// Compares as -1.
    Unknown,
}

impl DestinationNonce {
    /// The nonce the next stake update has to carry
    pub fn next(&self) -> u64 {
        match self {
            DestinationNonce::Committed(n) => n + 1,
            DestinationNonce::Unknown => 0,
        }
    }

    pub fn is_behind(&self, source_nonce: u64) -> bool {
        match self {
            DestinationNonce::Committed(n) => source_nonce > *n,
            DestinationNonce::Unknown => true,
        }
    }
}

impl fmt::Display for DestinationNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationNonce::Committed(n) => write!(f, "{}", n),
            DestinationNonce::Unknown => write!(f, "-1"),
        }
    }
}

/// One `StakeUpdate` event as indexed by the subgraph.
///
/// Every field is kept as the exact text the subgraph returned so it can be
/// handed to `heimdallcli` without any reformatting.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeUpdateRecord {
    pub id: String,
    pub validator_id: String,
    pub total_staked: String,
    pub block: String,
    pub nonce: String,
    pub transaction_hash: String,
    pub log_index: String,
}

/// Only the nonce is selected by the latest-nonce query
#[derive(Debug, Clone, Deserialize)]
pub struct NonceEntry {
    pub nonce: String,
}

/// `{"data": {"stakeUpdates": [...]}, "errors": [...]}`
#[derive(Debug, Deserialize)]
pub struct GraphResponse<T> {
    pub data: Option<StakeUpdates<T>>,
    #[serde(default)]
    pub errors: Vec<GraphError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeUpdates<T> {
    pub stake_updates: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct GraphError {
    pub message: String,
}

impl<T> GraphResponse<T> {
    pub fn into_stake_updates(self) -> SyncResult<Vec<T>> {
        if !self.errors.is_empty() {
            let messages: Vec<String> = self.errors.into_iter().map(|e| e.message).collect();
            return Err(SyncError::Graph(messages.join("; ")));
        }

        self.data
            .map(|d| d.stake_updates)
            .ok_or_else(|| SyncError::MalformedResponse("subgraph response has no data".to_string()))
    }
}

/// Heimdall `GET /staking/validator/{id}` envelope
#[derive(Debug, Deserialize)]
pub struct ValidatorResponse {
    #[serde(default)]
    pub height: String,
    #[serde(default)]
    pub result: Option<ValidatorState>,
    #[serde(default)]
    pub error: String,
}

/// Only the nonce is read; the rest of the validator object (pubKey,
/// last_updated, ...) varies across Heimdall versions and is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorState {
    #[serde(default)]
    pub nonce: Option<u64>,
}

pub fn parse_decimal(field: &'static str, value: &str) -> SyncResult<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| SyncError::invalid_number(field, value, e))
}
