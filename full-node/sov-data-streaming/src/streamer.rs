use std::time::Duration;

use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sov_da_interface::DaError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::{request_with_deadline, single_param};
use crate::protocol::{
    CommitStreamParams, SendChunkParams, StartStreamParams, StartStreamResult, StreamingMethods,
};

/// Room left in every chunk request for the JSON envelope.
const CHUNK_ENVELOPE_OVERHEAD: usize = 512;

/// Sender side settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DataStreamerConfig {
    /// Largest request body the receiving server accepts.
    #[serde(default = "default_max_store_chunk_body_size")]
    pub max_store_chunk_body_size: usize,
    /// Deadline of every individual call.
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
}

fn default_max_store_chunk_body_size() -> usize {
    5 * 1024 * 1024
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

impl Default for DataStreamerConfig {
    fn default() -> Self {
        Self {
            max_store_chunk_body_size: default_max_store_chunk_body_size(),
            rpc_timeout_secs: default_rpc_timeout_secs(),
        }
    }
}

impl DataStreamerConfig {
    /// Payload bytes carried by one chunk. Bytes are hex encoded, so each takes two characters.
    pub fn chunk_size(&self) -> usize {
        (self.max_store_chunk_body_size.saturating_sub(CHUNK_ENVELOPE_OVERHEAD) / 2).max(1)
    }

    /// Deadline of every individual call.
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

/// Sends payloads to a streaming surface in chunks.
#[derive(Debug, Clone)]
pub struct DataStreamer {
    client: HttpClient,
    methods: StreamingMethods,
    config: DataStreamerConfig,
}

impl DataStreamer {
    /// Connects to the streaming surface at `url`.
    pub fn new(
        url: &str,
        methods: StreamingMethods,
        config: DataStreamerConfig,
    ) -> anyhow::Result<Self> {
        let client = HttpClientBuilder::default()
            .max_request_size(config.max_store_chunk_body_size as u32)
            .request_timeout(config.rpc_timeout())
            .build(url)?;
        Ok(Self::with_client(client, methods, config))
    }

    /// Reuses an existing client.
    pub fn with_client(
        client: HttpClient,
        methods: StreamingMethods,
        config: DataStreamerConfig,
    ) -> Self {
        Self {
            client,
            methods,
            config,
        }
    }

    /// Payload bytes carried by one chunk.
    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size()
    }

    /// Streams `payload` and returns the service's response to the commit call.
    pub async fn stream_data<T: DeserializeOwned>(
        &self,
        payload: &[u8],
        timeout: u64,
        cancel: &CancellationToken,
    ) -> Result<T, DaError> {
        let chunk_size = self.chunk_size();
        let params = StartStreamParams::for_payload(payload.len(), chunk_size, timeout);
        let deadline = self.config.rpc_timeout();

        let StartStreamResult { message_id } = request_with_deadline(
            &self.client,
            self.methods.start,
            single_param(params)?,
            deadline,
            cancel,
        )
        .await?;
        debug!(message_id, n_chunks = params.n_chunks, "Streaming payload");

        for (chunk_id, chunk) in payload.chunks(chunk_size).enumerate() {
            let sent: Result<(), DaError> = request_with_deadline(
                &self.client,
                self.methods.chunk,
                single_param(SendChunkParams {
                    message_id,
                    chunk_id: chunk_id as u64,
                    chunk: chunk.into(),
                })?,
                deadline,
                cancel,
            )
            .await;
            if let Err(e) = sent {
                warn!(message_id, chunk_id, error = %e, "Abandoned stream");
                return Err(e);
            }
        }

        request_with_deadline(
            &self.client,
            self.methods.commit,
            single_param(CommitStreamParams { message_id })?,
            deadline,
            cancel,
        )
        .await
    }
}
