//! The error taxonomy shared by every DA provider.

/// Errors raised by DA readers, writers, validators and their transports.
///
/// The policy signals [`DaError::MessageTooLarge`] and [`DaError::FallbackRequested`] are
/// distinct variants so that the batch poster can branch on them by type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum DaError {
    /// The payload exceeds the size ceiling the provider currently accepts. The caller should
    /// rebuild a smaller payload and retry against the same provider.
    #[error("message of {size} bytes exceeds the provider limit (reported max: {max:?})")]
    MessageTooLarge {
        /// Size of the rejected payload.
        size: usize,
        /// The ceiling reported by the provider, if it reported one.
        max: Option<usize>,
    },
    /// The provider explicitly asks the caller to move on to the next writer.
    #[error("provider requested fallback: {0}")]
    FallbackRequested(String),
    /// The requested data is absent or has expired.
    #[error("not found: {0}")]
    NotFound(String),
    /// A deadline elapsed before the operation completed.
    #[error("deadline exceeded: {0}")]
    TimeoutExceeded(String),
    /// A quorum store did not collect enough valid signatures.
    #[error("quorum not reached: got {collected} of {required} required signatures from {backends} backends")]
    QuorumNotReached {
        /// Signatures required.
        required: usize,
        /// Valid signatures collected before giving up.
        collected: usize,
        /// Number of backends the payload was sent to.
        backends: usize,
    },
    /// A signature, keyset or hash check failed.
    #[error("verification failed: {0}")]
    VerificationFailed(String),
    /// A certificate could not be parsed or violates a structural invariant.
    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),
    /// A recovered payload is not a well-formed batch.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    /// The block a read was pinned to is no longer part of the canonical chain.
    #[error("block {block_hash} is no longer canonical")]
    Reorged {
        /// Hex encoded block hash.
        block_hash: String,
    },
    /// The operation was abandoned because of an external cancellation.
    #[error("operation cancelled")]
    Cancelled,
    /// A transport level failure while talking to a remote service.
    #[error("transport error: {0}")]
    Transport(String),
    /// Any other failure.
    #[error("{0}")]
    Internal(String),
}

impl DaError {
    /// Returns true for the signals the batch poster acts on rather than treats as failures.
    pub fn is_policy_signal(&self) -> bool {
        matches!(
            self,
            DaError::MessageTooLarge { .. } | DaError::FallbackRequested(_)
        )
    }

    /// Returns true if retrying the whole operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DaError::TimeoutExceeded(_)
                | DaError::QuorumNotReached { .. }
                | DaError::Transport(_)
                | DaError::Reorged { .. }
        )
    }

    /// Returns true if a node applying a batch must halt instead of skipping it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DaError::MalformedCertificate(_)
                | DaError::MalformedPayload(_)
                | DaError::VerificationFailed(_)
        )
    }

    /// Builds a [`DaError::Reorged`] for the given block hash.
    pub fn reorged(block_hash: &[u8; 32]) -> Self {
        DaError::Reorged {
            block_hash: hex::encode(block_hash),
        }
    }

    /// Builds a [`DaError::NotFound`] for the given content hash.
    pub fn not_found(hash: &[u8; 32]) -> Self {
        DaError::NotFound(hex::encode(hash))
    }
}

impl From<anyhow::Error> for DaError {
    fn from(e: anyhow::Error) -> Self {
        DaError::Internal(format!("{e:#}"))
    }
}

impl From<std::io::Error> for DaError {
    fn from(e: std::io::Error) -> Self {
        DaError::Internal(e.to_string())
    }
}
