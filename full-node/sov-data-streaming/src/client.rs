//! Request helpers shared by every JSON-RPC client in the workspace.

use std::time::Duration;

use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::HttpClient;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sov_da_interface::rpc::from_client_error;
use sov_da_interface::DaError;
use tokio_util::sync::CancellationToken;

/// Builds positional params from a single serializable value.
pub fn single_param<P: Serialize>(param: P) -> Result<ArrayParams, DaError> {
    let mut params = ArrayParams::new();
    params
        .insert(param)
        .map_err(|e| DaError::Internal(format!("failed to serialize rpc params: {e}")))?;
    Ok(params)
}

/// Issues one request bounded by `deadline` that is abandoned as soon as `cancel` fires.
pub async fn request_with_deadline<R: DeserializeOwned>(
    client: &HttpClient,
    method: &str,
    params: ArrayParams,
    deadline: Duration,
    cancel: &CancellationToken,
) -> Result<R, DaError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(DaError::Cancelled),
        res = tokio::time::timeout(deadline, client.request::<R, _>(method, params)) => match res {
            Ok(res) => res.map_err(from_client_error),
            Err(_) => Err(DaError::TimeoutExceeded(format!(
                "{method} did not complete within {deadline:?}"
            ))),
        },
    }
}
