use std::sync::Arc;

use sov_da_interface::{DaError, PreimagesMap};
use tracing::debug;

use crate::certificate::DataAvailabilityCertificate;
use crate::keyset_registry::KeysetFetcher;

/// Checks certificates against the keysets registered on-chain.
#[derive(Clone)]
pub struct CertificateVerifier {
    keysets: Arc<dyn KeysetFetcher>,
}

impl CertificateVerifier {
    /// Creates a verifier backed by `keysets`.
    pub fn new(keysets: Arc<dyn KeysetFetcher>) -> Self {
        Self { keysets }
    }

    /// Verifies that `cert` was signed by enough members of a keyset registered for
    /// `batch_num`. The keyset's tree preimages are recorded when a map is supplied.
    pub async fn verify(
        &self,
        cert: &DataAvailabilityCertificate,
        batch_num: u64,
        mut preimages: Option<&mut PreimagesMap>,
    ) -> Result<(), DaError> {
        let keyset = self
            .keysets
            .get_keyset_by_hash(&cert.keyset_hash, batch_num)
            .await?;
        if keyset.record_hash(&mut preimages) != cert.keyset_hash {
            return Err(DaError::VerificationFailed(format!(
                "registry returned a keyset that does not hash to {}",
                hex::encode(cert.keyset_hash)
            )));
        }
        keyset.verify_signature(cert.signers_mask, &cert.signable_fields(), &cert.sig)?;
        debug!(
            data_hash = hex::encode(cert.data_hash),
            signers = cert.signers_mask.count_ones(),
            "Verified certificate"
        );
        Ok(())
    }
}

impl std::fmt::Debug for CertificateVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateVerifier").finish_non_exhaustive()
    }
}
