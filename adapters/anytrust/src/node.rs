use std::sync::Arc;

use async_trait::async_trait;
use sov_blob_store::{BlobStore, ExpirationPolicy, StorageService};
use sov_da_interface::{unix_now, DaError};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::backend::DasBackend;
use crate::bls::{BlsPrivateKey, BlsPublicKey};
use crate::certificate::{signable_fields, CURRENT_CERTIFICATE_VERSION};
use crate::config::StorageNodeConfig;
use crate::protocol::BackendStoreResult;

/// A committee member: stores payloads and signs that it will serve them until their timeout.
#[derive(Clone)]
pub struct StorageNode {
    signer: Arc<BlsPrivateKey>,
    store: Arc<dyn StorageService>,
    max_message_size: usize,
}

impl StorageNode {
    /// Creates a node that persists into `store` and signs with `signer`.
    pub fn new(
        signer: BlsPrivateKey,
        store: Arc<dyn StorageService>,
        max_message_size: usize,
    ) -> Self {
        Self {
            signer: Arc::new(signer),
            store,
            max_message_size,
        }
    }

    /// Opens the configured blob store and signing key.
    pub fn from_config(config: &StorageNodeConfig) -> anyhow::Result<Self> {
        let seed = hex::decode(config.signing_key_seed.trim_start_matches("0x"))?;
        let signer = BlsPrivateKey::from_seed(&seed)?;
        let store = BlobStore::from_config(&config.storage)?;
        Ok(Self::new(signer, Arc::new(store), config.max_message_size))
    }

    /// The underlying blob store.
    pub fn storage(&self) -> Arc<dyn StorageService> {
        self.store.clone()
    }

    /// The key this node signs with.
    pub fn public_key(&self) -> BlsPublicKey {
        self.signer.public_key()
    }

    /// Stores `message` until at least `timeout` and signs `(data hash, timeout)`.
    pub async fn store(&self, message: &[u8], timeout: u64) -> Result<BackendStoreResult, DaError> {
        if message.len() > self.max_message_size {
            return Err(DaError::MessageTooLarge {
                size: message.len(),
                max: Some(self.max_message_size),
            });
        }
        if timeout <= unix_now() {
            return Err(DaError::Internal(format!(
                "requested timeout {timeout} has already passed"
            )));
        }
        let data_hash = self.store.put(message, timeout).await?;
        self.store.refresh(&data_hash, timeout).await?;
        let sig = self.signer.sign(&signable_fields(
            &data_hash,
            timeout,
            CURRENT_CERTIFICATE_VERSION,
        ));
        info!(
            data_hash = hex::encode(data_hash),
            size = message.len(),
            timeout,
            "Stored and signed payload"
        );
        Ok(BackendStoreResult {
            data_hash: data_hash.into(),
            timeout,
            sig: sig.to_bytes().to_vec().into(),
            version: CURRENT_CERTIFICATE_VERSION,
        })
    }

    /// Returns a stored payload.
    pub async fn get_by_hash(&self, hash: &[u8; 32]) -> Result<Vec<u8>, DaError> {
        self.store.get_by_hash(hash).await
    }

    /// Fails if the underlying store cannot serve requests.
    pub async fn health_check(&self) -> Result<(), DaError> {
        self.store.health_check().await
    }

    /// The retention policy of the underlying store.
    pub fn expiration_policy(&self) -> ExpirationPolicy {
        self.store.expiration_policy()
    }
}

impl std::fmt::Debug for StorageNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageNode")
            .field("public_key", &self.public_key())
            .field("max_message_size", &self.max_message_size)
            .finish()
    }
}

#[async_trait]
impl DasBackend for StorageNode {
    async fn store(
        &self,
        message: &[u8],
        timeout: u64,
        cancel: &CancellationToken,
    ) -> Result<BackendStoreResult, DaError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(DaError::Cancelled),
            res = StorageNode::store(self, message, timeout) => res,
        }
    }

    fn name(&self) -> String {
        format!("local:{}", hex::encode(&self.public_key().to_bytes()[..4]))
    }
}

#[cfg(test)]
mod tests {
    use sov_blob_store::{MemoryBlobStore, RetentionConfig};

    use super::*;
    use crate::bls::BlsSignature;

    fn node(max: usize) -> StorageNode {
        StorageNode::new(
            BlsPrivateKey::from_seed(&[1u8; 32]).unwrap(),
            Arc::new(MemoryBlobStore::new(RetentionConfig::default())),
            max,
        )
    }

    #[tokio::test]
    async fn signs_what_it_stored() {
        let node = node(1024);
        let timeout = unix_now() + 600;
        let ack = node.store(b"payload", timeout).await.unwrap();
        let sig = BlsSignature::from_bytes(&ack.sig.0).unwrap();
        assert!(sig.verify(
            &signable_fields(&ack.data_hash.0, timeout, ack.version),
            &node.public_key()
        ));
        assert_eq!(
            node.get_by_hash(&ack.data_hash.0).await.unwrap(),
            b"payload".to_vec()
        );
    }

    #[tokio::test]
    async fn rejects_oversized_and_expired_stores() {
        let node = node(4);
        assert_eq!(
            node.store(b"too long", unix_now() + 600).await,
            Err(DaError::MessageTooLarge {
                size: 8,
                max: Some(4)
            })
        );
        assert!(node.store(b"ok", unix_now() - 1).await.is_err());
    }
}
