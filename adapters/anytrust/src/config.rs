use std::collections::HashSet;
use std::net::SocketAddr;

use serde::Deserialize;
use sov_blob_store::BlobStoreConfig;
use sov_da_interface::DaError;
use sov_data_streaming::{DataStreamerConfig, ReceiverConfig};

use crate::bls::BlsPublicKey;
use crate::keyset::{Keyset, MAX_KEYSET_SIZE};

/// One committee member as seen by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackendConfig {
    /// JSON-RPC endpoint of the storage node.
    pub url: String,
    /// Hex encoded compressed BLS public key.
    pub pubkey: String,
    /// Bit of the signer mask this member sets.
    pub signer_index: u8,
}

impl BackendConfig {
    /// Parses the configured public key.
    pub fn public_key(&self) -> Result<BlsPublicKey, DaError> {
        let bytes = hex::decode(self.pubkey.trim_start_matches("0x"))
            .map_err(|e| DaError::Internal(format!("backend {} pubkey: {e}", self.url)))?;
        BlsPublicKey::from_bytes(&bytes)
    }
}

/// Settings of the quorum writer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AggregatorConfig {
    /// Signatures required before a payload counts as stored.
    pub assumed_honest: u64,
    /// Every committee member.
    pub backends: Vec<BackendConfig>,
    /// Deadline of a single backend store.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Stream payloads that do not fit a single request.
    #[serde(default = "default_enable_chunked_store")]
    pub enable_chunked_store: bool,
    /// Chunking settings used when streaming.
    #[serde(default)]
    pub streamer: DataStreamerConfig,
    /// The largest payload the writer accepts.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_enable_chunked_store() -> bool {
    true
}

fn default_max_message_size() -> usize {
    16 * 1024 * 1024
}

impl AggregatorConfig {
    /// Checks `1 <= assumed_honest <= backends` and that signer bits are distinct and in range.
    pub fn validate(&self) -> Result<(), DaError> {
        let n = self.backends.len();
        if n == 0 || n > MAX_KEYSET_SIZE {
            return Err(DaError::Internal(format!(
                "committee of {n} backends, expected 1 to {MAX_KEYSET_SIZE}"
            )));
        }
        if self.assumed_honest == 0 || self.assumed_honest > n as u64 {
            return Err(DaError::Internal(format!(
                "assumed_honest {} must lie in 1..={n}",
                self.assumed_honest
            )));
        }
        let mut seen = HashSet::new();
        for backend in &self.backends {
            if backend.signer_index as usize >= n || !seen.insert(backend.signer_index) {
                return Err(DaError::Internal(format!(
                    "signer index {} of {} is out of range or repeated",
                    backend.signer_index, backend.url
                )));
            }
        }
        Ok(())
    }

    /// The keyset the committee is registered under, keys ordered by signer bit.
    pub fn keyset(&self) -> Result<Keyset, DaError> {
        self.validate()?;
        let mut backends: Vec<_> = self.backends.iter().collect();
        backends.sort_by_key(|b| b.signer_index);
        let pub_keys = backends
            .into_iter()
            .map(BackendConfig::public_key)
            .collect::<Result<Vec<_>, _>>()?;
        Keyset::new(self.assumed_honest, pub_keys)
    }
}

/// Settings of a storage node.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StorageNodeConfig {
    /// Address of the JSON-RPC server.
    #[serde(default = "default_rpc_address")]
    pub rpc_address: SocketAddr,
    /// Address of the read-only HTTP mirror.
    #[serde(default = "default_mirror_address")]
    pub mirror_address: SocketAddr,
    /// Hex encoded 32 byte seed of the signing key.
    pub signing_key_seed: String,
    /// Where blobs are kept.
    #[serde(default)]
    pub storage: BlobStoreConfig,
    /// Limits of chunked stores.
    #[serde(default)]
    pub streaming: ReceiverConfig,
    /// Largest payload accepted by a single store.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_rpc_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9876))
}

fn default_mirror_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9877))
}
