//! The contracts every DA provider implements.

use async_trait::async_trait;

use crate::preimage::{PreimageType, PreimagesMap};
use crate::DaError;

/// Recovers batch payloads from the certificates a provider produced.
///
/// Recovery must be deterministic: the same sequencer message pinned to the same parent chain
/// block yields the same bytes for every caller, forever.
///
/// Provider readers do not check `batch_block_hash` against the parent chain themselves and are
/// not reorg-safe on their own. Node code reads through `PayloadReconstructor` (in
/// `sov-payload-reconstructor`), which rejects blocks that are not canonical before and after
/// recovery.
#[async_trait]
pub trait DaReader: Send + Sync {
    /// The header bytes this reader owns. Readers registered together must claim disjoint sets.
    fn header_bytes(&self) -> Vec<u8>;

    /// Returns true if this reader owns `byte`.
    fn is_valid_header_byte(&self, byte: u8) -> bool {
        self.header_bytes().contains(&byte)
    }

    /// Recovers the payload referenced by `sequencer_msg` (40-byte header followed by the body).
    ///
    /// `batch_block_hash` is the parent chain block the message was posted in; see the trait docs
    /// for who enforces that it is still canonical. Every object resolved from outside the
    /// message is recorded into `preimages` when a map is supplied. If `validate` is set, the payload must additionally decode as a batch whose
    /// messages lie within the header bounds.
    async fn recover_payload_from_batch(
        &self,
        batch_num: u64,
        batch_block_hash: [u8; 32],
        sequencer_msg: &[u8],
        preimages: Option<&mut PreimagesMap>,
        validate: bool,
    ) -> Result<Vec<u8>, DaError>;

    /// Recovers the payload only to collect the preimages needed to replay it offline.
    async fn collect_preimages(
        &self,
        batch_num: u64,
        batch_block_hash: [u8; 32],
        sequencer_msg: &[u8],
    ) -> Result<PreimagesMap, DaError> {
        let mut preimages = PreimagesMap::default();
        self.recover_payload_from_batch(
            batch_num,
            batch_block_hash,
            sequencer_msg,
            Some(&mut preimages),
            false,
        )
        .await?;
        Ok(preimages)
    }
}

/// Stores payloads and returns the certificate that is posted on-chain in their place.
#[async_trait]
pub trait DaWriter: Send + Sync {
    /// Stores `payload` until at least `timeout` (unix seconds) and returns its certificate.
    ///
    /// The certificate must be recoverable without this writer's in-memory state. Fails with
    /// [`DaError::MessageTooLarge`] when the payload exceeds the current ceiling and, only when
    /// `allow_fallback` is set, with [`DaError::FallbackRequested`] to ask for the next writer.
    async fn store(
        &self,
        payload: &[u8],
        timeout: u64,
        allow_fallback: bool,
    ) -> Result<Vec<u8>, DaError>;

    /// The largest payload this writer currently accepts.
    async fn max_message_size(&self) -> Result<usize, DaError>;
}

/// Produces proofs consumed by the fraud-proof machine.
#[async_trait]
pub trait DaValidator: Send + Sync {
    /// Proves the 32-byte window at `offset` of the preimage of `hash`.
    ///
    /// For [`PreimageType::DaCertificate`] the hash is the keccak hash of `certificate`; other
    /// preimage types ignore `certificate`.
    async fn generate_proof(
        &self,
        preimage_type: PreimageType,
        hash: [u8; 32],
        offset: u64,
        certificate: &[u8],
    ) -> Result<Vec<u8>, DaError>;

    /// Proves whether `certificate` is valid under this provider's rules.
    async fn generate_certificate_validity_proof(
        &self,
        certificate: &[u8],
    ) -> Result<Vec<u8>, DaError>;
}
