use std::fmt;
use std::num::ParseIntError;

use thiserror::Error;

/// Top-level error type for everything that can go wrong inside one sync iteration
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("JSON decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Subgraph returned errors: {0}")]
    Graph(String),

    #[error("Expected exactly one stake update for validator {validator_id} nonce {nonce}, got {count}")]
    UnexpectedRecordCount {
        validator_id: u64,
        nonce: u64,
        count: usize,
    },

    #[error("Invalid {field}: {value:?} ({source})")]
    InvalidNumber {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("Block {0} not found on origin chain")]
    BlockNotFound(u64),

    #[error("Origin chain RPC error: {0}")]
    Rpc(#[from] alloy::transports::TransportError),

    #[error("Origin chain RPC timed out after {0}ms")]
    RpcTimeout(u64),

    #[error("Invalid URL {0}")]
    InvalidUrl(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Failed to spawn signer {program}: {source}")]
    SignerSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Signer exited unsuccessfully: {0}")]
    SignerFailed(String),

    #[error("Signer timed out after {0}ms")]
    SignerTimeout(u64),
}

impl SyncError {
    pub fn invalid_number(field: &'static str, value: &str, source: ParseIntError) -> Self {
        SyncError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        }
    }
}

/// Result type alias for the agent
pub type SyncResult<T> = Result<T, SyncError>;

/// Step of a sync iteration, used to give failures context in the logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    SourceNonce,
    DestinationNonce,
    FetchRecord,
    BlockTime,
    Submit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::SourceNonce => "fetch subgraph nonce",
            Stage::DestinationNonce => "fetch heimdall nonce",
            Stage::FetchRecord => "fetch stake update",
            Stage::BlockTime => "resolve block time",
            Stage::Submit => "submit stake update",
        };
        f.write_str(name)
    }
}

/// A failed iteration; never escapes the poll loop
#[derive(Error, Debug)]
#[error("{stage} failed: {source}")]
pub struct IterationError {
    pub stage: Stage,
    #[source]
    pub source: SyncError,
}

impl Stage {
    pub fn wrap(self) -> impl FnOnce(SyncError) -> IterationError {
        move |source| IterationError { stage: self, source }
    }
}
