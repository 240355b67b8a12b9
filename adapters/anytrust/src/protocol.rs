//! The storage node's JSON-RPC surface.

use serde::{Deserialize, Serialize};
use sov_da_interface::{HexBytes, HexHash};

/// Stores a payload in a single request.
pub const DAS_STORE: &str = "das_store";
/// Returns a stored payload.
pub const DAS_GET_BY_HASH: &str = "das_getByHash";
/// Fails if the node cannot serve requests.
pub const DAS_HEALTH_CHECK: &str = "das_healthCheck";
/// Reports the node's retention policy.
pub const DAS_EXPIRATION_POLICY: &str = "das_expirationPolicy";

/// Parameters of [`DAS_STORE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreParams {
    /// The payload.
    pub message: HexBytes,
    /// Unix time until which the payload must be served.
    pub timeout: u64,
}

/// A storage node's signed acknowledgement of a stored payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStoreResult {
    /// Content hash of the stored payload.
    pub data_hash: HexHash,
    /// The timeout that was signed.
    pub timeout: u64,
    /// The node's signature over the signable fields.
    pub sig: HexBytes,
    /// Certificate version the signature is for.
    pub version: u8,
}
