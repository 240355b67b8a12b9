//! Clients of the committee members.

use std::time::Duration;

use async_trait::async_trait;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use sov_blob_store::ExpirationPolicy;
use sov_da_interface::{DaError, HexBytes, HexHash};
use sov_data_streaming::client::{request_with_deadline, single_param};
use sov_data_streaming::{DataStreamer, DAS_STREAMING_METHODS};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{AggregatorConfig, BackendConfig};
use crate::fetcher::DataFetcher;
use crate::protocol::{
    BackendStoreResult, StoreParams, DAS_EXPIRATION_POLICY, DAS_GET_BY_HASH, DAS_HEALTH_CHECK,
    DAS_STORE,
};

/// A committee member the aggregator can store to.
#[async_trait]
pub trait DasBackend: Send + Sync {
    /// Stores `message` until `timeout` and returns the member's signed acknowledgement.
    async fn store(
        &self,
        message: &[u8],
        timeout: u64,
        cancel: &CancellationToken,
    ) -> Result<BackendStoreResult, DaError>;

    /// Label used in logs and metrics.
    fn name(&self) -> String;
}

/// Talks to a remote storage node over JSON-RPC.
#[derive(Debug, Clone)]
pub struct RpcBackendClient {
    url: String,
    client: HttpClient,
    streamer: Option<DataStreamer>,
    request_timeout: Duration,
}

impl RpcBackendClient {
    /// Connects to `backend` with the aggregator's request settings.
    pub fn new(backend: &BackendConfig, config: &AggregatorConfig) -> anyhow::Result<Self> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let client = HttpClientBuilder::default()
            .max_request_size(u32::MAX)
            .max_response_size(u32::MAX)
            .request_timeout(request_timeout)
            .build(&backend.url)?;
        let streamer = if config.enable_chunked_store {
            Some(DataStreamer::new(
                &backend.url,
                DAS_STREAMING_METHODS,
                config.streamer,
            )?)
        } else {
            None
        };
        Ok(Self {
            url: backend.url.clone(),
            client,
            streamer,
            request_timeout,
        })
    }

    /// Checks that the node can serve requests.
    pub async fn health_check(&self, cancel: &CancellationToken) -> Result<(), DaError> {
        request_with_deadline(
            &self.client,
            DAS_HEALTH_CHECK,
            ArrayParams::new(),
            self.request_timeout,
            cancel,
        )
        .await
    }

    /// The node's retention policy.
    pub async fn expiration_policy(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ExpirationPolicy, DaError> {
        request_with_deadline(
            &self.client,
            DAS_EXPIRATION_POLICY,
            ArrayParams::new(),
            self.request_timeout,
            cancel,
        )
        .await
    }
}

#[async_trait]
impl DasBackend for RpcBackendClient {
    async fn store(
        &self,
        message: &[u8],
        timeout: u64,
        cancel: &CancellationToken,
    ) -> Result<BackendStoreResult, DaError> {
        match &self.streamer {
            Some(streamer) if message.len() > streamer.chunk_size() => {
                debug!(backend = %self.url, size = message.len(), "Using chunked store");
                streamer.stream_data(message, timeout, cancel).await
            }
            _ => {
                let params = StoreParams {
                    message: message.into(),
                    timeout,
                };
                request_with_deadline(
                    &self.client,
                    DAS_STORE,
                    single_param(params)?,
                    self.request_timeout,
                    cancel,
                )
                .await
            }
        }
    }

    fn name(&self) -> String {
        self.url.clone()
    }
}

#[async_trait]
impl DataFetcher for RpcBackendClient {
    async fn get_by_hash(&self, hash: &[u8; 32]) -> Result<Vec<u8>, DaError> {
        let data: HexBytes = request_with_deadline(
            &self.client,
            DAS_GET_BY_HASH,
            single_param(HexHash(*hash))?,
            self.request_timeout,
            &CancellationToken::new(),
        )
        .await?;
        Ok(data.0)
    }

    fn name(&self) -> String {
        self.url.clone()
    }
}
