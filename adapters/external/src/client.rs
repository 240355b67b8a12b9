use std::time::Duration;

use async_trait::async_trait;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde::de::DeserializeOwned;
use sov_da_interface::{
    DaError, DaReader, DaValidator, DaWriter, HexHash, PreimageType, PreimagesMap,
};
use sov_data_streaming::client::{request_with_deadline, single_param};
use sov_data_streaming::{DataStreamer, DAPROVIDER_STREAMING_METHODS};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ExternalProviderConfig;
use crate::protocol::{
    CertificateValidityProofParams, MaxMessageSizeResult, PayloadResult, PreimagesResult,
    ProofResult, ReadPreimageProofParams, RecoverPayloadParams, StoreParams, StoreResult,
    SupportedHeaderBytesResult, COLLECT_PREIMAGES, GENERATE_CERTIFICATE_VALIDITY_PROOF,
    GENERATE_READ_PREIMAGE_PROOF, GET_MAX_MESSAGE_SIZE, GET_SUPPORTED_HEADER_BYTES,
    RECOVER_PAYLOAD, STORE,
};

/// Forwards the provider contracts to a remote `daprovider_*` endpoint.
#[derive(Debug, Clone)]
pub struct ExternalProviderClient {
    url: String,
    client: HttpClient,
    streamer: Option<DataStreamer>,
    header_bytes: Vec<u8>,
    rpc_timeout: Duration,
    cancel: CancellationToken,
}

impl ExternalProviderClient {
    /// Connects to the provider and queries the header bytes its reader owns.
    ///
    /// Every call is abandoned once `cancel` fires.
    pub async fn connect(
        config: &ExternalProviderConfig,
        cancel: CancellationToken,
    ) -> anyhow::Result<Self> {
        let rpc_timeout = Duration::from_secs(config.rpc_timeout_secs);
        let client = HttpClientBuilder::default()
            .max_request_size(config.max_request_size)
            .max_response_size(u32::MAX)
            .request_timeout(rpc_timeout)
            .build(&config.url)?;
        let streamer = if config.use_data_streaming {
            Some(DataStreamer::new(
                &config.url,
                DAPROVIDER_STREAMING_METHODS,
                config.streamer,
            )?)
        } else {
            None
        };

        let SupportedHeaderBytesResult { header_bytes } = request_with_deadline(
            &client,
            GET_SUPPORTED_HEADER_BYTES,
            ArrayParams::new(),
            rpc_timeout,
            &cancel,
        )
        .await?;
        if header_bytes.0.is_empty() {
            anyhow::bail!("provider at {} claims no header bytes", config.url);
        }
        info!(
            url = %config.url,
            header_bytes = hex::encode(&header_bytes.0),
            streaming = streamer.is_some(),
            "Connected to external DA provider"
        );

        Ok(Self {
            url: config.url.clone(),
            client,
            streamer,
            header_bytes: header_bytes.0,
            rpc_timeout,
            cancel,
        })
    }

    /// The provider's endpoint.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: ArrayParams,
    ) -> Result<R, DaError> {
        request_with_deadline(&self.client, method, params, self.rpc_timeout, &self.cancel).await
    }

    async fn store_once(
        &self,
        payload: &[u8],
        timeout: u64,
        allow_fallback: bool,
    ) -> Result<StoreResult, DaError> {
        match &self.streamer {
            Some(streamer) if payload.len() > streamer.chunk_size() => {
                debug!(url = %self.url, size = payload.len(), "Streaming payload to provider");
                streamer.stream_data(payload, timeout, &self.cancel).await
            }
            _ => {
                let params = StoreParams {
                    message: payload.into(),
                    timeout,
                    allow_fallback,
                };
                self.call(STORE, single_param(params)?).await
            }
        }
    }
}

#[async_trait]
impl DaReader for ExternalProviderClient {
    fn header_bytes(&self) -> Vec<u8> {
        self.header_bytes.clone()
    }

    async fn recover_payload_from_batch(
        &self,
        batch_num: u64,
        batch_block_hash: [u8; 32],
        sequencer_msg: &[u8],
        preimages: Option<&mut PreimagesMap>,
        validate: bool,
    ) -> Result<Vec<u8>, DaError> {
        let params = RecoverPayloadParams {
            batch_num,
            batch_block_hash: HexHash(batch_block_hash),
            sequencer_msg: sequencer_msg.into(),
            collect_preimages: preimages.is_some(),
            validate,
        };
        let result: PayloadResult = self.call(RECOVER_PAYLOAD, single_param(params)?).await?;
        if let Some(map) = preimages {
            match result.preimages {
                Some(received) => map.merge(received),
                None => {
                    return Err(DaError::Transport(format!(
                        "provider at {} returned no preimages for batch {batch_num}",
                        self.url
                    )))
                }
            }
        }
        Ok(result.payload.0)
    }

    async fn collect_preimages(
        &self,
        batch_num: u64,
        batch_block_hash: [u8; 32],
        sequencer_msg: &[u8],
    ) -> Result<PreimagesMap, DaError> {
        let params = RecoverPayloadParams {
            batch_num,
            batch_block_hash: HexHash(batch_block_hash),
            sequencer_msg: sequencer_msg.into(),
            collect_preimages: true,
            validate: false,
        };
        let PreimagesResult { preimages } =
            self.call(COLLECT_PREIMAGES, single_param(params)?).await?;
        Ok(preimages)
    }
}

#[async_trait]
impl DaWriter for ExternalProviderClient {
    async fn store(
        &self,
        payload: &[u8],
        timeout: u64,
        allow_fallback: bool,
    ) -> Result<Vec<u8>, DaError> {
        match self.store_once(payload, timeout, allow_fallback).await {
            Ok(StoreResult { serialized_da_cert }) => Ok(serialized_da_cert.0),
            // Streamed stores cannot carry the flag, so the provider may ask for a fallback the
            // caller did not allow.
            Err(DaError::FallbackRequested(reason)) if !allow_fallback => {
                warn!(url = %self.url, %reason, "Provider requested a disallowed fallback");
                Err(DaError::Internal(format!(
                    "provider requested fallback while disallowed: {reason}"
                )))
            }
            Err(e) => Err(e),
        }
    }

    async fn max_message_size(&self) -> Result<usize, DaError> {
        let MaxMessageSizeResult { max_size } =
            self.call(GET_MAX_MESSAGE_SIZE, ArrayParams::new()).await?;
        Ok(usize::try_from(max_size).unwrap_or(usize::MAX))
    }
}

#[async_trait]
impl DaValidator for ExternalProviderClient {
    async fn generate_proof(
        &self,
        preimage_type: PreimageType,
        hash: [u8; 32],
        offset: u64,
        certificate: &[u8],
    ) -> Result<Vec<u8>, DaError> {
        let params = ReadPreimageProofParams {
            preimage_type,
            hash: HexHash(hash),
            offset,
            certificate: certificate.into(),
        };
        let ProofResult { proof } = self
            .call(GENERATE_READ_PREIMAGE_PROOF, single_param(params)?)
            .await?;
        Ok(proof.0)
    }

    async fn generate_certificate_validity_proof(
        &self,
        certificate: &[u8],
    ) -> Result<Vec<u8>, DaError> {
        let params = CertificateValidityProofParams {
            certificate: certificate.into(),
        };
        let ProofResult { proof } = self
            .call(GENERATE_CERTIFICATE_VALIDITY_PROOF, single_param(params)?)
            .await?;
        Ok(proof.0)
    }
}
