use sov_da_interface::hash::keccak256;
use sov_da_interface::{DaError, PreimageResolver, PreimageType};

/// Errors of the Merkle and trie walks.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The requested index lies outside the committed range.
    #[error("index {index} is out of range for {count} entries")]
    IndexOutOfRange {
        /// Requested index.
        index: u64,
        /// Number of committed entries.
        count: u64,
    },
    /// A node could not be resolved.
    #[error("failed to resolve preimage: {0}")]
    Preimage(#[from] DaError),
    /// The resolver returned bytes that do not hash to the requested hash.
    #[error("preimage of {} does not hash to it", hex::encode(.0))]
    HashMismatch([u8; 32]),
    /// A trie node is not valid RLP.
    #[error("failed to decode trie node: {0}")]
    Rlp(#[from] alloy_rlp::Error),
    /// A node decoded but does not have the shape of any node kind.
    #[error("invalid node: {0}")]
    InvalidNode(String),
    /// The key is not part of the trie.
    #[error("key does not exist in trie")]
    KeyNotFound,
    /// A leaf or extension path diverges from the key.
    #[error("node path diverges from the key after {0} nibbles")]
    PathMismatch(usize),
}

impl From<LookupError> for DaError {
    fn from(e: LookupError) -> Self {
        match e {
            LookupError::Preimage(e) => e,
            LookupError::IndexOutOfRange { .. }
            | LookupError::KeyNotFound
            | LookupError::PathMismatch(_) => DaError::NotFound(e.to_string()),
            LookupError::HashMismatch(_) => DaError::VerificationFailed(e.to_string()),
            LookupError::Rlp(_) | LookupError::InvalidNode(_) => {
                DaError::MalformedPayload(e.to_string())
            }
        }
    }
}

/// Resolves a keccak preimage and checks that it hashes back to `hash`.
pub(crate) fn resolve_keccak<R: PreimageResolver + ?Sized>(
    resolver: &R,
    hash: &[u8; 32],
) -> Result<Vec<u8>, LookupError> {
    let preimage = resolver.resolve(PreimageType::Keccak256, hash)?;
    if keccak256(&preimage) != *hash {
        return Err(LookupError::HashMismatch(*hash));
    }
    Ok(preimage)
}
