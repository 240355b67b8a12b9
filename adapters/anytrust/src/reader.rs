use std::sync::Arc;

use async_trait::async_trait;
use sov_da_interface::header::{ANYTRUST_HEADER_FLAG, TREE_DAS_MESSAGE_HEADER_FLAG};
use sov_da_interface::hash::keccak256;
use sov_da_interface::message::validate_batch;
use sov_da_interface::preimage::record_if;
use sov_da_interface::{tree, DaError, DaReader, PreimageType, PreimagesMap, SequencerMessage};
use tracing::debug;

use crate::certificate::DataAvailabilityCertificate;
use crate::fetcher::DataFetcher;
use crate::verifier::CertificateVerifier;

/// Certificates must promise availability for at least this long past the batch's newest
/// message.
pub const MIN_CERTIFICATE_LIFETIME_SECS: u64 = 7 * 24 * 60 * 60;

/// Recovers payloads from quorum certificates.
#[derive(Clone)]
pub struct AnyTrustReader {
    verifier: CertificateVerifier,
    fetcher: Arc<dyn DataFetcher>,
}

impl AnyTrustReader {
    /// Creates a reader that verifies with `verifier` and fetches from `fetcher`.
    pub fn new(verifier: CertificateVerifier, fetcher: Arc<dyn DataFetcher>) -> Self {
        Self { verifier, fetcher }
    }
}

impl std::fmt::Debug for AnyTrustReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyTrustReader")
            .field("fetcher", &self.fetcher.name())
            .finish()
    }
}

fn hash_matches(cert: &DataAvailabilityCertificate, data: &[u8]) -> bool {
    match cert.version {
        0 => keccak256(data) == cert.data_hash,
        _ => tree::hash(data) == cert.data_hash,
    }
}

#[async_trait]
impl DaReader for AnyTrustReader {
    fn header_bytes(&self) -> Vec<u8> {
        vec![
            ANYTRUST_HEADER_FLAG,
            ANYTRUST_HEADER_FLAG | TREE_DAS_MESSAGE_HEADER_FLAG,
        ]
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
        let cert = DataAvailabilityCertificate::deserialize(msg.body)?;

        let min_timeout = msg
            .header
            .max_timestamp
            .saturating_add(MIN_CERTIFICATE_LIFETIME_SECS);
        if cert.timeout < min_timeout {
            return Err(DaError::MalformedCertificate(format!(
                "certificate expires at {} but must last until {min_timeout}",
                cert.timeout
            )));
        }

        self.verifier
            .verify(&cert, batch_num, preimages.as_deref_mut())
            .await?;

        let data = self.fetcher.get_by_hash(&cert.data_hash).await?;
        if !hash_matches(&cert, &data) {
            return Err(DaError::VerificationFailed(format!(
                "fetched data does not hash to {}",
                hex::encode(cert.data_hash)
            )));
        }
        if cert.version == 0 {
            record_if(&mut preimages, PreimageType::Keccak256, cert.data_hash, &data);
        } else {
            tree::record_hash(&data, preimages);
        }

        if validate {
            validate_batch(&msg.header, &data)?;
        }
        debug!(
            batch_num,
            data_hash = hex::encode(cert.data_hash),
            size = data.len(),
            "Recovered payload from certificate"
        );
        Ok(data)
    }
}
