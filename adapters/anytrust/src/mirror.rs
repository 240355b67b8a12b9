//! A read-only HTTP mirror of a storage node, independent of the JSON-RPC stack.

use std::net::SocketAddr;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sov_blob_store::ExpirationPolicy;
use sov_da_interface::{DaError, HexBytes};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::node::StorageNode;

/// Body of a successful `GET /get-by-hash/{hash}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetByHashResponse {
    /// The stored payload.
    pub data: HexBytes,
}

/// Body of `GET /expiration-policy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirationPolicyResponse {
    /// The node's retention policy.
    pub expiration_policy: ExpirationPolicy,
}

type MirrorError = (StatusCode, String);

fn status_of(e: DaError) -> MirrorError {
    match e {
        DaError::NotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// The mirror's routes.
pub fn mirror_router(node: StorageNode) -> Router {
    Router::new()
        .route("/get-by-hash/:hash", get(get_by_hash))
        .route("/health", get(health))
        .route("/expiration-policy", get(expiration_policy))
        .with_state(node)
}

async fn get_by_hash(
    State(node): State<StorageNode>,
    Path(hash): Path<String>,
) -> Result<Json<GetByHashResponse>, MirrorError> {
    let bytes = hex::decode(hash.trim_start_matches("0x"))
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid hash: {e}")))?;
    let hash: [u8; 32] = bytes
        .try_into()
        .map_err(|_| (StatusCode::BAD_REQUEST, "hash must be 32 bytes".to_string()))?;
    let data = node.get_by_hash(&hash).await.map_err(status_of)?;
    Ok(Json(GetByHashResponse { data: data.into() }))
}

async fn health(State(node): State<StorageNode>) -> Result<&'static str, MirrorError> {
    node.health_check().await.map_err(|e| {
        warn!(error = %e, "Health check failed");
        (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
    })?;
    Ok("OK")
}

async fn expiration_policy(State(node): State<StorageNode>) -> Json<ExpirationPolicyResponse> {
    Json(ExpirationPolicyResponse {
        expiration_policy: node.expiration_policy(),
    })
}

/// Serves the mirror on `addr` until `cancel` fires. Returns the bound address.
pub fn start_mirror(
    addr: SocketAddr,
    node: StorageNode,
    cancel: CancellationToken,
) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    let server = axum::Server::try_bind(&addr)?.serve(mirror_router(node).into_make_service());
    let bound_address = server.local_addr();
    info!(%bound_address, "Started read-only mirror");
    let handle = tokio::spawn(async move {
        if let Err(e) = server
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
        {
            warn!(error = %e, "Mirror stopped with an error");
        }
    });
    Ok((bound_address, handle))
}
