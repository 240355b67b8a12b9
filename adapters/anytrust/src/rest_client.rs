use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use sov_da_interface::DaError;

use crate::fetcher::DataFetcher;
use crate::mirror::GetByHashResponse;

/// Fetches blobs from a storage node's read-only mirror.
#[derive(Debug, Clone)]
pub struct RestfulClient {
    base_url: String,
    client: reqwest::Client,
}

fn transport(e: reqwest::Error) -> DaError {
    if e.is_timeout() {
        DaError::TimeoutExceeded(e.to_string())
    } else {
        DaError::Transport(e.to_string())
    }
}

impl RestfulClient {
    /// Creates a client for the mirror at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Fails unless the mirror reports itself healthy.
    pub async fn health_check(&self) -> Result<(), DaError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(transport)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(DaError::Transport(format!(
                "mirror {} is unhealthy: {}",
                self.base_url,
                response.status()
            )))
        }
    }
}

#[async_trait]
impl DataFetcher for RestfulClient {
    async fn get_by_hash(&self, hash: &[u8; 32]) -> Result<Vec<u8>, DaError> {
        let response = self
            .client
            .get(format!("{}/get-by-hash/{}", self.base_url, hex::encode(hash)))
            .send()
            .await
            .map_err(transport)?;
        match response.status() {
            StatusCode::OK => {
                let body: GetByHashResponse = response.json().await.map_err(transport)?;
                Ok(body.data.0)
            }
            StatusCode::NOT_FOUND => Err(DaError::not_found(hash)),
            status => Err(DaError::Transport(format!(
                "mirror {} answered {status}",
                self.base_url
            ))),
        }
    }

    fn name(&self) -> String {
        self.base_url.clone()
    }
}
