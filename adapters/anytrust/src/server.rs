use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use jsonrpsee::server::ServerHandle;
use jsonrpsee::types::ErrorObjectOwned;
use jsonrpsee::RpcModule;
use sov_blob_store::{spawn_retention_sweeper, ExpirationPolicy};
use sov_da_interface::rpc::to_jsonrpsee_error_object;
use sov_da_interface::{HexBytes, HexHash};
use sov_data_streaming::{
    register_streaming_methods, DataStreamReceiver, ReceiverConfig, DAS_STREAMING_METHODS,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::StorageNodeConfig;
use crate::mirror::start_mirror;
use crate::node::StorageNode;
use crate::protocol::{
    StoreParams, DAS_EXPIRATION_POLICY, DAS_GET_BY_HASH, DAS_HEALTH_CHECK, DAS_STORE,
};

/// Builds the storage node's RPC module, including the chunked store calls.
pub fn get_das_rpc_module(
    node: StorageNode,
    receiver: Arc<DataStreamReceiver>,
) -> Result<RpcModule<StorageNode>, jsonrpsee::core::Error> {
    let mut rpc = RpcModule::new(node);

    rpc.register_async_method(DAS_STORE, |params, node| async move {
        let StoreParams { message, timeout } = params.one()?;
        node.store(&message.0, timeout)
            .await
            .map_err(to_jsonrpsee_error_object)
    })?;

    rpc.register_async_method(DAS_GET_BY_HASH, |params, node| async move {
        let hash: HexHash = params.one()?;
        node.get_by_hash(&hash.0)
            .await
            .map(HexBytes)
            .map_err(to_jsonrpsee_error_object)
    })?;

    rpc.register_async_method(DAS_HEALTH_CHECK, |_, node| async move {
        node.health_check().await.map_err(to_jsonrpsee_error_object)
    })?;

    rpc.register_method(DAS_EXPIRATION_POLICY, |_, node| {
        Ok::<ExpirationPolicy, ErrorObjectOwned>(node.expiration_policy())
    })?;

    register_streaming_methods(
        &mut rpc,
        DAS_STREAMING_METHODS,
        receiver,
        |node: Arc<StorageNode>, message: Vec<u8>, timeout: u64| async move {
            node.store(&message, timeout).await
        },
    )?;

    Ok(rpc)
}

/// Serves `node` over JSON-RPC on `addr` until `cancel` fires. Returns the bound address.
pub async fn start_backend_server(
    addr: SocketAddr,
    node: StorageNode,
    streaming: ReceiverConfig,
    max_request_body_size: u32,
    cancel: CancellationToken,
) -> anyhow::Result<(SocketAddr, ServerHandle)> {
    let receiver = Arc::new(DataStreamReceiver::new(streaming));
    receiver.spawn_gc(cancel.clone());
    let rpc = get_das_rpc_module(node, receiver)?;

    let server = jsonrpsee::server::ServerBuilder::default()
        .max_request_body_size(max_request_body_size)
        .max_response_body_size(max_request_body_size)
        .build([addr].as_ref())
        .await?;
    let bound_address = server.local_addr()?;
    let handle = server.start(rpc);
    info!(%bound_address, "Started storage node RPC server");

    let stop_handle = handle.clone();
    tokio::spawn(async move {
        cancel.cancelled().await;
        let _ = stop_handle.stop();
    });
    Ok((bound_address, handle))
}

/// Addresses of a running storage node.
#[derive(Debug, Clone)]
pub struct StorageNodeHandle {
    /// Where the JSON-RPC server listens.
    pub rpc_address: SocketAddr,
    /// Where the read-only mirror listens.
    pub mirror_address: SocketAddr,
    /// Stops the JSON-RPC server.
    pub rpc_handle: ServerHandle,
}

/// Starts every service of a storage node: the RPC server, the mirror and the retention
/// sweeper. All of them stop when `cancel` fires.
pub async fn start_storage_node(
    config: &StorageNodeConfig,
    cancel: CancellationToken,
) -> anyhow::Result<(StorageNode, StorageNodeHandle)> {
    let node = StorageNode::from_config(config)?;
    let sweep_interval = Duration::from_secs(config.storage.retention.sweep_interval_secs);
    spawn_retention_sweeper(node.storage(), sweep_interval, cancel.clone());

    // hex doubles the payload on the wire
    let max_body = config
        .max_message_size
        .saturating_mul(2)
        .saturating_add(64 * 1024)
        .min(u32::MAX as usize) as u32;
    let (rpc_address, rpc_handle) = start_backend_server(
        config.rpc_address,
        node.clone(),
        config.streaming,
        max_body,
        cancel.clone(),
    )
    .await?;
    let (mirror_address, _) = start_mirror(config.mirror_address, node.clone(), cancel)?;
    Ok((
        node,
        StorageNodeHandle {
            rpc_address,
            mirror_address,
            rpc_handle,
        },
    ))
}
