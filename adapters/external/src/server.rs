use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::server::ServerHandle;
use jsonrpsee::types::ErrorObjectOwned;
use jsonrpsee::RpcModule;
use sov_da_interface::rpc::to_jsonrpsee_error_object;
use sov_da_interface::{DaError, DaReader, DaValidator, DaWriter, HexBytes};
use sov_data_streaming::{
    register_streaming_methods, DataStreamReceiver, DAPROVIDER_STREAMING_METHODS,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ProviderServerConfig;
use crate::protocol::{
    CertificateValidityProofParams, MaxMessageSizeResult, PayloadResult, PreimagesResult,
    ProofResult, ReadPreimageProofParams, RecoverPayloadParams, StoreParams, StoreResult,
    SupportedHeaderBytesResult, COLLECT_PREIMAGES, GENERATE_CERTIFICATE_VALIDITY_PROOF,
    GENERATE_READ_PREIMAGE_PROOF, GET_MAX_MESSAGE_SIZE, GET_SUPPORTED_HEADER_BYTES,
    RECOVER_PAYLOAD, STORE,
};

/// The provider implementations served over one endpoint. Any of them may be absent, in which
/// case its methods fail.
#[derive(Clone, Default)]
pub struct ProviderServer {
    reader: Option<Arc<dyn DaReader>>,
    writer: Option<Arc<dyn DaWriter>>,
    validator: Option<Arc<dyn DaValidator>>,
}

impl std::fmt::Debug for ProviderServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderServer")
            .field("reader", &self.reader.is_some())
            .field("writer", &self.writer.is_some())
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

impl ProviderServer {
    /// Serves `reader`.
    pub fn with_reader(mut self, reader: Arc<dyn DaReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Serves `writer`.
    pub fn with_writer(mut self, writer: Arc<dyn DaWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Serves `validator`.
    pub fn with_validator(mut self, validator: Arc<dyn DaValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    fn reader(&self) -> Result<&Arc<dyn DaReader>, DaError> {
        self.reader
            .as_ref()
            .ok_or_else(|| DaError::Internal("provider has no reader".to_string()))
    }

    fn writer(&self) -> Result<&Arc<dyn DaWriter>, DaError> {
        self.writer
            .as_ref()
            .ok_or_else(|| DaError::Internal("provider has no writer".to_string()))
    }

    fn validator(&self) -> Result<&Arc<dyn DaValidator>, DaError> {
        self.validator
            .as_ref()
            .ok_or_else(|| DaError::Internal("provider has no validator".to_string()))
    }

    async fn recover(&self, params: RecoverPayloadParams) -> Result<PayloadResult, DaError> {
        let mut preimages = params.collect_preimages.then(Default::default);
        let payload = self
            .reader()?
            .recover_payload_from_batch(
                params.batch_num,
                params.batch_block_hash.0,
                &params.sequencer_msg.0,
                preimages.as_mut(),
                params.validate,
            )
            .await?;
        Ok(PayloadResult {
            payload: HexBytes(payload),
            preimages,
        })
    }

    async fn store(
        &self,
        message: &[u8],
        timeout: u64,
        allow_fallback: bool,
    ) -> Result<StoreResult, DaError> {
        let cert = self
            .writer()?
            .store(message, timeout, allow_fallback)
            .await?;
        debug!(size = message.len(), cert_len = cert.len(), "Stored payload");
        Ok(StoreResult {
            serialized_da_cert: HexBytes(cert),
        })
    }
}

fn rpc_err(e: DaError) -> ErrorObjectOwned {
    to_jsonrpsee_error_object(e)
}

/// Builds the `daprovider_*` module, including the chunked store calls.
///
/// Streamed stores always allow a fallback request; the client turns an unwanted one into an
/// error.
pub fn get_provider_rpc_module(
    server: ProviderServer,
    receiver: Arc<DataStreamReceiver>,
) -> Result<RpcModule<ProviderServer>, jsonrpsee::core::Error> {
    let mut rpc = RpcModule::new(server);

    rpc.register_method(GET_SUPPORTED_HEADER_BYTES, |_, server| {
        let reader = server.reader().map_err(rpc_err)?;
        Ok::<_, ErrorObjectOwned>(SupportedHeaderBytesResult {
            header_bytes: HexBytes(reader.header_bytes()),
        })
    })?;

    rpc.register_async_method(RECOVER_PAYLOAD, |params, server| async move {
        let params: RecoverPayloadParams = params.one()?;
        server.recover(params).await.map_err(rpc_err)
    })?;

    rpc.register_async_method(COLLECT_PREIMAGES, |params, server| async move {
        let params: RecoverPayloadParams = params.one()?;
        let preimages = server
            .reader()
            .map_err(rpc_err)?
            .collect_preimages(
                params.batch_num,
                params.batch_block_hash.0,
                &params.sequencer_msg.0,
            )
            .await
            .map_err(rpc_err)?;
        Ok::<_, ErrorObjectOwned>(PreimagesResult { preimages })
    })?;

    rpc.register_async_method(STORE, |params, server| async move {
        let StoreParams {
            message,
            timeout,
            allow_fallback,
        } = params.one()?;
        server
            .store(&message.0, timeout, allow_fallback)
            .await
            .map_err(rpc_err)
    })?;

    rpc.register_async_method(GET_MAX_MESSAGE_SIZE, |_, server| async move {
        let max_size = server
            .writer()
            .map_err(rpc_err)?
            .max_message_size()
            .await
            .map_err(rpc_err)?;
        Ok::<_, ErrorObjectOwned>(MaxMessageSizeResult {
            max_size: max_size as u64,
        })
    })?;

    rpc.register_async_method(GENERATE_READ_PREIMAGE_PROOF, |params, server| async move {
        let ReadPreimageProofParams {
            preimage_type,
            hash,
            offset,
            certificate,
        } = params.one()?;
        let proof = server
            .validator()
            .map_err(rpc_err)?
            .generate_proof(preimage_type, hash.0, offset, &certificate.0)
            .await
            .map_err(rpc_err)?;
        Ok::<_, ErrorObjectOwned>(ProofResult {
            proof: HexBytes(proof),
        })
    })?;

    rpc.register_async_method(
        GENERATE_CERTIFICATE_VALIDITY_PROOF,
        |params, server| async move {
            let CertificateValidityProofParams { certificate } = params.one()?;
            let proof = server
                .validator()
                .map_err(rpc_err)?
                .generate_certificate_validity_proof(&certificate.0)
                .await
                .map_err(rpc_err)?;
            Ok::<_, ErrorObjectOwned>(ProofResult {
                proof: HexBytes(proof),
            })
        },
    )?;

    register_streaming_methods(
        &mut rpc,
        DAPROVIDER_STREAMING_METHODS,
        receiver,
        |server: Arc<ProviderServer>, message: Vec<u8>, timeout: u64| async move {
            server.store(&message, timeout, true).await
        },
    )?;

    Ok(rpc)
}

/// Serves `server` until `cancel` fires. Returns the bound address.
pub async fn start_provider_server(
    config: &ProviderServerConfig,
    server: ProviderServer,
    cancel: CancellationToken,
) -> anyhow::Result<(SocketAddr, ServerHandle)> {
    let receiver = Arc::new(DataStreamReceiver::new(config.streaming));
    receiver.spawn_gc(cancel.clone());
    let rpc = get_provider_rpc_module(server, receiver)?;

    let rpc_server = jsonrpsee::server::ServerBuilder::default()
        .max_request_body_size(config.max_request_body_size)
        .max_response_body_size(config.max_request_body_size)
        .build([config.address].as_ref())
        .await?;
    let bound_address = rpc_server.local_addr()?;
    let handle = rpc_server.start(rpc);
    info!(%bound_address, "Started DA provider server");

    let stop_handle = handle.clone();
    tokio::spawn(async move {
        cancel.cancelled().await;
        let _ = stop_handle.stop();
    });
    Ok((bound_address, handle))
}
