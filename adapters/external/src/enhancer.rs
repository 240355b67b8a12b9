//! Rewrites one-step proofs that stopped on a provider specific marker.
//!
//! The fraud-proof machine cannot authenticate content held by an external provider. When a
//! step needs such content it emits a raw proof whose first byte carries
//! [`PROOF_ENHANCEMENT_FLAG`] and whose last byte names the kind of enhancement. The matching
//! [`ProofEnhancer`] locates the certificate in the inbox and splices it, together with the
//! provider's sub-proof, into the proof:
//!
//! ```text
//! raw:      prefix ‖ trailer ‖ marker
//! enhanced: prefix (flag cleared) ‖ cert_len u64 ‖ certificate ‖ provider proof
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sov_da_interface::hash::keccak256;
use sov_da_interface::header::HeaderByteClaims;
use sov_da_interface::{DaError, DaValidator, PreimageType, SequencerMessage};
use tracing::debug;

/// Set on the first proof byte when the proof needs enhancement.
pub const PROOF_ENHANCEMENT_FLAG: u8 = 0x80;
/// Trailer `cert_hash ‖ offset u64 ‖ marker`.
pub const MARKER_READ_PREIMAGE: u8 = 0xDA;
/// Trailer `cert_hash ‖ marker`.
pub const MARKER_CERTIFICATE_VALIDITY: u8 = 0xDB;

/// Locates the sequencer message a proven step read from.
#[async_trait]
pub trait InboxTracker: Send + Sync {
    /// The batch that delivered message `message_num`.
    async fn find_batch_containing_message(&self, message_num: u64) -> Result<u64, DaError>;

    /// The sequencer message posted for `batch_num`, header included.
    async fn sequencer_message_bytes(&self, batch_num: u64) -> Result<Vec<u8>, DaError>;
}

/// Validators keyed by the header bytes of the certificates they prove.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    claims: HeaderByteClaims,
    validators: HashMap<u8, Arc<dyn DaValidator>>,
}

impl std::fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("claims", &self.claims)
            .finish_non_exhaustive()
    }
}

impl ValidatorRegistry {
    /// Registers `validator` for every byte in `header_bytes`.
    pub fn register(
        &mut self,
        name: &str,
        header_bytes: &[u8],
        validator: Arc<dyn DaValidator>,
    ) -> Result<(), DaError> {
        self.claims.claim(name, header_bytes)?;
        for byte in header_bytes {
            self.validators.insert(*byte, validator.clone());
        }
        Ok(())
    }

    /// The validator owning `header_byte`.
    pub fn validator_for(&self, header_byte: u8) -> Option<&Arc<dyn DaValidator>> {
        self.validators.get(&header_byte)
    }
}

/// Rewrites one kind of marked proof.
#[async_trait]
pub trait ProofEnhancer: Send + Sync {
    /// Returns the enhanced form of `proof`, which was produced while executing `message_num`.
    async fn enhance(&self, message_num: u64, proof: &[u8]) -> Result<Vec<u8>, DaError>;
}

struct CertificateSource {
    inbox: Arc<dyn InboxTracker>,
    validators: ValidatorRegistry,
}

impl CertificateSource {
    /// Fetches the certificate of the batch holding `message_num` and checks it against
    /// `cert_hash`.
    async fn certificate(
        &self,
        message_num: u64,
        cert_hash: &[u8; 32],
    ) -> Result<(Vec<u8>, Arc<dyn DaValidator>), DaError> {
        let batch_num = self.inbox.find_batch_containing_message(message_num).await?;
        let sequencer_msg = self.inbox.sequencer_message_bytes(batch_num).await?;
        let msg = SequencerMessage::parse(&sequencer_msg)?;
        if keccak256(msg.body) != *cert_hash {
            return Err(DaError::VerificationFailed(format!(
                "certificate of batch {batch_num} does not hash to {}",
                hex::encode(cert_hash)
            )));
        }
        let header_byte = msg.header_byte().ok_or_else(|| {
            DaError::MalformedCertificate(format!("batch {batch_num} has an empty certificate"))
        })?;
        let validator = self
            .validators
            .validator_for(header_byte)
            .cloned()
            .ok_or_else(|| {
                DaError::Internal(format!("no validator for header byte 0x{header_byte:02x}"))
            })?;
        Ok((msg.body.to_vec(), validator))
    }
}

fn split_trailer(proof: &[u8], trailer_len: usize) -> Result<(Vec<u8>, &[u8]), DaError> {
    // at least one prefix byte carrying the flag
    if proof.len() < trailer_len + 2 {
        return Err(DaError::Internal(format!(
            "proof of {} bytes is too short for its marker",
            proof.len()
        )));
    }
    let split = proof.len() - 1 - trailer_len;
    let mut prefix = proof[..split].to_vec();
    prefix[0] &= !PROOF_ENHANCEMENT_FLAG;
    Ok((prefix, &proof[split..proof.len() - 1]))
}

fn read_hash(bytes: &[u8]) -> [u8; 32] {
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes[..32]);
    hash
}

fn assemble(mut prefix: Vec<u8>, cert: &[u8], provider_proof: &[u8]) -> Vec<u8> {
    prefix.reserve(8 + cert.len() + provider_proof.len());
    prefix.extend_from_slice(&(cert.len() as u64).to_be_bytes());
    prefix.extend_from_slice(cert);
    prefix.extend_from_slice(provider_proof);
    prefix
}

/// Handles [`MARKER_READ_PREIMAGE`]: proves a window of the payload behind a certificate.
pub struct ReadPreimageProofEnhancer {
    source: CertificateSource,
}

impl ReadPreimageProofEnhancer {
    /// Creates the enhancer.
    pub fn new(inbox: Arc<dyn InboxTracker>, validators: ValidatorRegistry) -> Self {
        Self {
            source: CertificateSource { inbox, validators },
        }
    }
}

#[async_trait]
impl ProofEnhancer for ReadPreimageProofEnhancer {
    async fn enhance(&self, message_num: u64, proof: &[u8]) -> Result<Vec<u8>, DaError> {
        let (prefix, trailer) = split_trailer(proof, 32 + 8)?;
        let cert_hash = read_hash(trailer);
        let mut offset = [0u8; 8];
        offset.copy_from_slice(&trailer[32..]);
        let offset = u64::from_be_bytes(offset);

        let (cert, validator) = self.source.certificate(message_num, &cert_hash).await?;
        let provider_proof = validator
            .generate_proof(PreimageType::DaCertificate, cert_hash, offset, &cert)
            .await?;
        debug!(message_num, offset, "Enhanced read-preimage proof");
        Ok(assemble(prefix, &cert, &provider_proof))
    }
}

/// Handles [`MARKER_CERTIFICATE_VALIDITY`]: proves whether a certificate is valid.
pub struct CertificateValidityProofEnhancer {
    source: CertificateSource,
}

impl CertificateValidityProofEnhancer {
    /// Creates the enhancer.
    pub fn new(inbox: Arc<dyn InboxTracker>, validators: ValidatorRegistry) -> Self {
        Self {
            source: CertificateSource { inbox, validators },
        }
    }
}

#[async_trait]
impl ProofEnhancer for CertificateValidityProofEnhancer {
    async fn enhance(&self, message_num: u64, proof: &[u8]) -> Result<Vec<u8>, DaError> {
        let (prefix, trailer) = split_trailer(proof, 32)?;
        let cert_hash = read_hash(trailer);
        let (cert, validator) = self.source.certificate(message_num, &cert_hash).await?;
        let provider_proof = validator.generate_certificate_validity_proof(&cert).await?;
        debug!(message_num, "Enhanced certificate validity proof");
        Ok(assemble(prefix, &cert, &provider_proof))
    }
}

/// Dispatches marked proofs to the enhancer registered for their marker.
#[derive(Clone, Default)]
pub struct ProofEnhancementManager {
    enhancers: HashMap<u8, Arc<dyn ProofEnhancer>>,
}

impl std::fmt::Debug for ProofEnhancementManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut markers: Vec<_> = self.enhancers.keys().collect();
        markers.sort();
        f.debug_struct("ProofEnhancementManager")
            .field("markers", &markers)
            .finish()
    }
}

impl ProofEnhancementManager {
    /// A manager with both built-in enhancers registered.
    pub fn with_default_enhancers(
        inbox: Arc<dyn InboxTracker>,
        validators: ValidatorRegistry,
    ) -> Self {
        let mut manager = Self::default();
        manager.register(
            MARKER_READ_PREIMAGE,
            Arc::new(ReadPreimageProofEnhancer::new(
                inbox.clone(),
                validators.clone(),
            )),
        );
        manager.register(
            MARKER_CERTIFICATE_VALIDITY,
            Arc::new(CertificateValidityProofEnhancer::new(inbox, validators)),
        );
        manager
    }

    /// Registers `enhancer` for `marker`, replacing any previous one.
    pub fn register(&mut self, marker: u8, enhancer: Arc<dyn ProofEnhancer>) {
        self.enhancers.insert(marker, enhancer);
    }

    /// Enhances `proof` if its flag is set and returns it unchanged otherwise.
    pub async fn maybe_enhance(&self, message_num: u64, proof: &[u8]) -> Result<Vec<u8>, DaError> {
        let (Some(first), Some(marker)) = (proof.first(), proof.last()) else {
            return Ok(proof.to_vec());
        };
        if first & PROOF_ENHANCEMENT_FLAG == 0 {
            return Ok(proof.to_vec());
        }
        let enhancer = self.enhancers.get(marker).ok_or_else(|| {
            DaError::Internal(format!("no proof enhancer for marker 0x{marker:02x}"))
        })?;
        enhancer.enhance(message_num, proof).await
    }
}

#[cfg(test)]
mod tests {
    use sov_da_interface::message::SequencerMessageHeader;

    use super::*;

    struct StaticInbox {
        sequencer_msg: Vec<u8>,
    }

    #[async_trait]
    impl InboxTracker for StaticInbox {
        async fn find_batch_containing_message(&self, message_num: u64) -> Result<u64, DaError> {
            Ok(message_num / 10)
        }

        async fn sequencer_message_bytes(&self, batch_num: u64) -> Result<Vec<u8>, DaError> {
            match batch_num {
                4 => Ok(self.sequencer_msg.clone()),
                _ => Err(DaError::NotFound(format!("batch {batch_num}"))),
            }
        }
    }

    /// Echoes its inputs so the splice is observable.
    struct EchoValidator;

    #[async_trait]
    impl DaValidator for EchoValidator {
        async fn generate_proof(
            &self,
            _preimage_type: PreimageType,
            _hash: [u8; 32],
            offset: u64,
            _certificate: &[u8],
        ) -> Result<Vec<u8>, DaError> {
            Ok(offset.to_be_bytes().to_vec())
        }

        async fn generate_certificate_validity_proof(
            &self,
            _certificate: &[u8],
        ) -> Result<Vec<u8>, DaError> {
            Ok(vec![1, 1])
        }
    }

    fn cert() -> Vec<u8> {
        vec![0x01, 0xff, 7, 7, 7]
    }

    fn manager() -> ProofEnhancementManager {
        let sequencer_msg = SequencerMessage::encode(&SequencerMessageHeader::default(), &cert());
        let mut validators = ValidatorRegistry::default();
        validators
            .register("echo", &[0x01], Arc::new(EchoValidator))
            .unwrap();
        ProofEnhancementManager::with_default_enhancers(
            Arc::new(StaticInbox { sequencer_msg }),
            validators,
        )
    }

    fn marked_proof(trailer: &[u8], marker: u8) -> Vec<u8> {
        let mut proof = vec![0x05 | PROOF_ENHANCEMENT_FLAG, 0xaa];
        proof.extend_from_slice(trailer);
        proof.push(marker);
        proof
    }

    #[tokio::test]
    async fn unflagged_proof_passes_through() {
        let proof = vec![0x05, 1, 2, MARKER_READ_PREIMAGE];
        assert_eq!(manager().maybe_enhance(42, &proof).await.unwrap(), proof);
        assert!(manager().maybe_enhance(42, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_preimage_proof_is_spliced() {
        let mut trailer = keccak256(&cert()).to_vec();
        trailer.extend_from_slice(&64u64.to_be_bytes());
        let proof = marked_proof(&trailer, MARKER_READ_PREIMAGE);

        let enhanced = manager().maybe_enhance(42, &proof).await.unwrap();
        let mut expected = vec![0x05, 0xaa];
        expected.extend_from_slice(&(cert().len() as u64).to_be_bytes());
        expected.extend_from_slice(&cert());
        expected.extend_from_slice(&64u64.to_be_bytes());
        assert_eq!(enhanced, expected);
    }

    #[tokio::test]
    async fn validity_proof_is_spliced() {
        let proof = marked_proof(&keccak256(&cert()), MARKER_CERTIFICATE_VALIDITY);
        let enhanced = manager().maybe_enhance(40, &proof).await.unwrap();
        assert_eq!(enhanced[0], 0x05);
        assert_eq!(&enhanced[enhanced.len() - 2..], &[1, 1]);
    }

    #[tokio::test]
    async fn certificate_hash_mismatch_is_rejected() {
        let proof = marked_proof(&[9u8; 32], MARKER_CERTIFICATE_VALIDITY);
        assert!(matches!(
            manager().maybe_enhance(42, &proof).await,
            Err(DaError::VerificationFailed(_))
        ));
    }

    #[tokio::test]
    async fn unknown_marker_and_short_proof_fail() {
        let proof = marked_proof(&[0u8; 32], 0x42);
        assert!(manager().maybe_enhance(42, &proof).await.is_err());
        let short = vec![PROOF_ENHANCEMENT_FLAG, MARKER_CERTIFICATE_VALIDITY];
        assert!(manager().maybe_enhance(42, &short).await.is_err());
    }

    #[tokio::test]
    async fn message_outside_known_batches_propagates_not_found() {
        let proof = marked_proof(&keccak256(&cert()), MARKER_CERTIFICATE_VALIDITY);
        assert!(matches!(
            manager().maybe_enhance(99, &proof).await,
            Err(DaError::NotFound(_))
        ));
    }
}
