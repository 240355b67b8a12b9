//! The `daprovider_*` JSON-RPC surface.

use serde::{Deserialize, Serialize};
use sov_da_interface::{HexBytes, HexHash, PreimageType, PreimagesMap};

/// Header bytes the provider's reader owns.
pub const GET_SUPPORTED_HEADER_BYTES: &str = "daprovider_getSupportedHeaderBytes";
/// Recovers a payload.
pub const RECOVER_PAYLOAD: &str = "daprovider_recoverPayload";
/// Recovers a payload only for its preimages.
pub const COLLECT_PREIMAGES: &str = "daprovider_collectPreimages";
/// Stores a payload in a single request.
pub const STORE: &str = "daprovider_store";
/// The writer's current size ceiling.
pub const GET_MAX_MESSAGE_SIZE: &str = "daprovider_getMaxMessageSize";
/// Proves a window of a preimage.
pub const GENERATE_READ_PREIMAGE_PROOF: &str = "daprovider_generateReadPreimageProof";
/// Proves whether a certificate is valid.
pub const GENERATE_CERTIFICATE_VALIDITY_PROOF: &str =
    "daprovider_generateCertificateValidityProof";

/// Result of [`GET_SUPPORTED_HEADER_BYTES`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedHeaderBytesResult {
    /// The claimed bytes.
    pub header_bytes: HexBytes,
}

/// Parameters of [`RECOVER_PAYLOAD`] and [`COLLECT_PREIMAGES`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverPayloadParams {
    /// Sequence number of the batch.
    pub batch_num: u64,
    /// Parent chain block the batch was posted in.
    pub batch_block_hash: HexHash,
    /// The sequencer message: 40-byte header and certificate.
    pub sequencer_msg: HexBytes,
    /// Return the preimages resolved during recovery.
    #[serde(default)]
    pub collect_preimages: bool,
    /// Check that the payload is a well-formed batch.
    #[serde(default)]
    pub validate: bool,
}

/// Result of [`RECOVER_PAYLOAD`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadResult {
    /// The recovered payload.
    pub payload: HexBytes,
    /// Present if preimages were requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preimages: Option<PreimagesMap>,
}

/// Result of [`COLLECT_PREIMAGES`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreimagesResult {
    /// Every preimage resolved during recovery.
    pub preimages: PreimagesMap,
}

/// Parameters of [`STORE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreParams {
    /// The payload.
    pub message: HexBytes,
    /// Unix time until which the payload must be retrievable.
    pub timeout: u64,
    /// Whether the provider may answer with a fallback request.
    #[serde(default)]
    pub allow_fallback: bool,
}

/// Result of [`STORE`] and of the streaming commit call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreResult {
    /// The certificate, header byte first.
    #[serde(rename = "serializedDACert")]
    pub serialized_da_cert: HexBytes,
}

/// Result of [`GET_MAX_MESSAGE_SIZE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaxMessageSizeResult {
    /// Largest payload the writer accepts right now.
    pub max_size: u64,
}

/// Parameters of [`GENERATE_READ_PREIMAGE_PROOF`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadPreimageProofParams {
    /// Type of the preimage.
    pub preimage_type: PreimageType,
    /// Hash the preimage is addressed by.
    pub hash: HexHash,
    /// Start of the proven window.
    pub offset: u64,
    /// The certificate, for certificate-addressed preimages.
    pub certificate: HexBytes,
}

/// Parameters of [`GENERATE_CERTIFICATE_VALIDITY_PROOF`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateValidityProofParams {
    /// The certificate to judge.
    pub certificate: HexBytes,
}

/// Result of both proof calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofResult {
    /// The provider specific proof bytes.
    pub proof: HexBytes,
}
