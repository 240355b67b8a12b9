use std::sync::Arc;

use async_trait::async_trait;
use sov_blob_store::StorageService;
use sov_da_interface::hash::keccak256;
use sov_da_interface::header::DA_CERTIFICATE_HEADER_FLAG;
use sov_da_interface::message::validate_batch;
use sov_da_interface::preimage::record_if;
use sov_da_interface::{
    tree, DaError, DaReader, DaValidator, DaWriter, PreimageType, PreimagesMap, SequencerMessage,
};
use tracing::debug;

use crate::ReferenceDaConfig;

/// Second byte of every reference certificate.
pub const REFERENCE_PROVIDER_TYPE: u8 = 0xff;
/// `header ‖ provider type ‖ data hash`
pub const REFERENCE_CERTIFICATE_LEN: usize = 34;
/// First byte of read-preimage proofs.
pub const READ_PREIMAGE_PROOF_VERSION: u8 = 1;
/// Second byte of certificate validity proofs.
pub const VALIDITY_PROOF_VERSION: u8 = 1;

/// Builds the certificate of a payload with content hash `data_hash`.
pub fn reference_certificate(data_hash: &[u8; 32]) -> Vec<u8> {
    let mut cert = Vec::with_capacity(REFERENCE_CERTIFICATE_LEN);
    cert.push(DA_CERTIFICATE_HEADER_FLAG);
    cert.push(REFERENCE_PROVIDER_TYPE);
    cert.extend_from_slice(data_hash);
    cert
}

/// Extracts the data hash from a reference certificate.
pub fn parse_certificate(cert: &[u8]) -> Result<[u8; 32], DaError> {
    if cert.len() != REFERENCE_CERTIFICATE_LEN {
        return Err(DaError::MalformedCertificate(format!(
            "reference certificate must be {REFERENCE_CERTIFICATE_LEN} bytes, got {}",
            cert.len()
        )));
    }
    if cert[0] != DA_CERTIFICATE_HEADER_FLAG || cert[1] != REFERENCE_PROVIDER_TYPE {
        return Err(DaError::MalformedCertificate(format!(
            "unexpected certificate prefix {}",
            hex::encode(&cert[..2])
        )));
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&cert[2..]);
    Ok(hash)
}

/// Stores payloads in a shared blob store and addresses them by content hash.
#[derive(Clone)]
pub struct ReferenceDaProvider {
    store: Arc<dyn StorageService>,
    config: ReferenceDaConfig,
}

impl std::fmt::Debug for ReferenceDaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceDaProvider")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ReferenceDaProvider {
    /// Creates a provider over `store`. Every provider built over the same store sees the same
    /// payloads.
    pub fn new(store: Arc<dyn StorageService>, config: ReferenceDaConfig) -> Self {
        Self { store, config }
    }

    async fn payload_for(&self, cert: &[u8]) -> Result<Vec<u8>, DaError> {
        let data_hash = parse_certificate(cert)?;
        let payload = self.store.get_by_hash(&data_hash).await?;
        if !tree::valid_hash(&data_hash, &payload) {
            return Err(DaError::VerificationFailed(format!(
                "stored payload does not hash to {}",
                hex::encode(data_hash)
            )));
        }
        Ok(payload)
    }
}

#[async_trait]
impl DaReader for ReferenceDaProvider {
    fn header_bytes(&self) -> Vec<u8> {
        vec![DA_CERTIFICATE_HEADER_FLAG]
    }

    async fn recover_payload_from_batch(
        &self,
        batch_num: u64,
        _batch_block_hash: [u8; 32],
        sequencer_msg: &[u8],
        mut preimages: Option<&mut PreimagesMap>,
        validate: bool,
    ) -> Result<Vec<u8>, DaError> {
        let msg = SequencerMessage::parse(sequencer_msg)?;
        let payload = self.payload_for(msg.body).await?;

        record_if(
            &mut preimages,
            PreimageType::DaCertificate,
            keccak256(msg.body),
            &payload,
        );
        tree::record_hash(&payload, preimages);

        if validate {
            validate_batch(&msg.header, &payload)?;
        }
        debug!(batch_num, size = payload.len(), "Recovered reference payload");
        Ok(payload)
    }
}

#[async_trait]
impl DaWriter for ReferenceDaProvider {
    async fn store(
        &self,
        payload: &[u8],
        timeout: u64,
        _allow_fallback: bool,
    ) -> Result<Vec<u8>, DaError> {
        if payload.len() > self.config.max_message_size {
            return Err(DaError::MessageTooLarge {
                size: payload.len(),
                max: Some(self.config.max_message_size),
            });
        }
        let data_hash = self.store.put(payload, timeout).await?;
        Ok(reference_certificate(&data_hash))
    }

    async fn max_message_size(&self) -> Result<usize, DaError> {
        Ok(self.config.max_message_size)
    }
}

#[async_trait]
impl DaValidator for ReferenceDaProvider {
    async fn generate_proof(
        &self,
        preimage_type: PreimageType,
        hash: [u8; 32],
        offset: u64,
        certificate: &[u8],
    ) -> Result<Vec<u8>, DaError> {
        if preimage_type != PreimageType::DaCertificate {
            return Err(DaError::Internal(format!(
                "reference provider cannot prove {preimage_type:?} preimages"
            )));
        }
        if keccak256(certificate) != hash {
            return Err(DaError::VerificationFailed(
                "certificate does not match the requested hash".to_string(),
            ));
        }
        let payload = self.payload_for(certificate).await?;
        let start = usize::try_from(offset)
            .unwrap_or(usize::MAX)
            .min(payload.len());
        let end = start.saturating_add(32).min(payload.len());

        let mut proof = Vec::with_capacity(1 + 8 + 32);
        proof.push(READ_PREIMAGE_PROOF_VERSION);
        proof.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        proof.extend_from_slice(&payload[start..end]);
        Ok(proof)
    }

    async fn generate_certificate_validity_proof(
        &self,
        certificate: &[u8],
    ) -> Result<Vec<u8>, DaError> {
        let valid = match self.payload_for(certificate).await {
            Ok(_) => true,
            Err(e) if e.is_fatal() || matches!(e, DaError::NotFound(_)) => false,
            Err(e) => return Err(e),
        };
        Ok(vec![valid as u8, VALIDITY_PROOF_VERSION])
    }
}

#[cfg(test)]
mod tests {
    use sov_blob_store::{MemoryBlobStore, RetentionConfig};
    use sov_da_interface::message::{encode_batch, SequencerMessageHeader};
    use sov_da_interface::{unix_now, BatchMessage};

    use super::*;

    fn provider(max_message_size: usize) -> ReferenceDaProvider {
        ReferenceDaProvider::new(
            Arc::new(MemoryBlobStore::new(RetentionConfig::default())),
            ReferenceDaConfig { max_message_size },
        )
    }

    fn batch() -> (SequencerMessageHeader, Vec<u8>) {
        let messages = vec![BatchMessage {
            timestamp: 10,
            block_number: 5,
            delayed_messages_read: 0,
            data: (0..100u8).collect(),
        }];
        (
            SequencerMessageHeader::bounding(&messages, 0),
            encode_batch(&messages).unwrap(),
        )
    }

    #[tokio::test]
    async fn store_then_recover_round_trips() {
        let provider = provider(1024);
        let (header, payload) = batch();
        let cert = provider
            .store(&payload, unix_now() + 60, false)
            .await
            .unwrap();
        assert_eq!(cert.len(), REFERENCE_CERTIFICATE_LEN);
        assert!(provider.is_valid_header_byte(cert[0]));

        let msg = SequencerMessage::encode(&header, &cert);
        let mut preimages = PreimagesMap::default();
        let recovered = provider
            .recover_payload_from_batch(0, [0u8; 32], &msg, Some(&mut preimages), true)
            .await
            .unwrap();
        assert_eq!(recovered, payload);
        assert_eq!(
            preimages.get(PreimageType::DaCertificate, &keccak256(&cert)),
            Some(payload.as_slice())
        );
    }

    #[tokio::test]
    async fn re_store_after_timeout_is_recoverable() {
        let provider = provider(1024);
        let (header, payload) = batch();
        let stale = provider.store(&payload, unix_now() - 1, false).await.unwrap();
        let cert = provider
            .store(&payload, unix_now() + 3_600, false)
            .await
            .unwrap();
        assert_eq!(stale, cert);

        let msg = SequencerMessage::encode(&header, &cert);
        let recovered = provider
            .recover_payload_from_batch(0, [0u8; 32], &msg, None, true)
            .await
            .unwrap();
        assert_eq!(recovered, payload);
    }

    #[tokio::test]
    async fn oversized_payload_reports_the_ceiling() {
        let provider = provider(8);
        assert_eq!(
            provider.store(&[0u8; 9], unix_now() + 60, true).await,
            Err(DaError::MessageTooLarge {
                size: 9,
                max: Some(8)
            })
        );
    }

    #[tokio::test]
    async fn read_preimage_proof_carries_the_window_at_offset() {
        let provider = provider(1024);
        let (_, payload) = batch();
        let cert = provider
            .store(&payload, unix_now() + 60, false)
            .await
            .unwrap();

        let proof = provider
            .generate_proof(PreimageType::DaCertificate, keccak256(&cert), 10, &cert)
            .await
            .unwrap();
        assert_eq!(proof[0], READ_PREIMAGE_PROOF_VERSION);
        assert_eq!(&proof[1..9], &(payload.len() as u64).to_be_bytes());
        assert_eq!(&proof[9..], &payload[10..42]);

        let tail = provider
            .generate_proof(
                PreimageType::DaCertificate,
                keccak256(&cert),
                payload.len() as u64 - 3,
                &cert,
            )
            .await
            .unwrap();
        assert_eq!(tail.len(), 9 + 3);

        assert!(matches!(
            provider
                .generate_proof(PreimageType::DaCertificate, [0u8; 32], 0, &cert)
                .await,
            Err(DaError::VerificationFailed(_))
        ));
    }

    #[tokio::test]
    async fn validity_proof_reflects_availability() {
        let provider = provider(1024);
        let cert = provider.store(b"x", unix_now() + 60, false).await.unwrap();
        assert_eq!(
            provider
                .generate_certificate_validity_proof(&cert)
                .await
                .unwrap(),
            vec![1, 1]
        );
        let unknown = reference_certificate(&[3u8; 32]);
        assert_eq!(
            provider
                .generate_certificate_validity_proof(&unknown)
                .await
                .unwrap(),
            vec![0, 1]
        );
        assert_eq!(
            provider
                .generate_certificate_validity_proof(&[0x01])
                .await
                .unwrap(),
            vec![0, 1]
        );
    }
}
