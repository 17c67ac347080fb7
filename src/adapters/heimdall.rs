use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::adapters::traits::ValidatorStateSource;
use crate::error::{SyncError, SyncResult};
use crate::models::{DestinationNonce, ValidatorId, ValidatorResponse};

/// Heimdall REST (LCD) client
pub struct HeimdallClient {
    client: Client,
    base_url: String,
}

impl HeimdallClient {
    pub fn new(base_url: &str, timeout: Duration) -> SyncResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn validator_url(&self, validator_id: ValidatorId) -> String {
        format!("{}/staking/validator/{}", self.base_url, validator_id)
    }
}

#[async_trait]
impl ValidatorStateSource for HeimdallClient {
    #[instrument(skip(self))]
    async fn validator_nonce(&self, validator_id: ValidatorId) -> SyncResult<DestinationNonce> {
        let url = self.validator_url(validator_id);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        let decoded = serde_json::from_slice::<ValidatorResponse>(&bytes);
        if let Ok(decoded) = &decoded {
            debug!(height = %decoded.height, status = status.as_u16(), "Heimdall validator response");
        }

        // Unknown validators come back as a non-2xx status carrying an `error`
        // field. Any other non-2xx body is a transport failure.
        if !status.is_success() {
            return match decoded {
                Ok(decoded) if !decoded.error.is_empty() => Ok(DestinationNonce::Unknown),
                _ => Err(SyncError::HttpStatus {
                    status: status.as_u16(),
                    url,
                }),
            };
        }

        destination_nonce_from(decoded?)
    }
}

fn destination_nonce_from(response: ValidatorResponse) -> SyncResult<DestinationNonce> {
    if !response.error.is_empty() {
        return Ok(DestinationNonce::Unknown);
    }

    response
        .result
        .and_then(|state| state.nonce)
        .map(DestinationNonce::Committed)
        .ok_or_else(|| SyncError::MalformedResponse("validator response has no result nonce".to_string()))
}
