//! Lookup of keysets registered on the parent chain.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use sov_da_interface::DaError;

use crate::keyset::Keyset;

/// Resolves a keyset hash to the keyset valid for a given batch.
#[async_trait]
pub trait KeysetFetcher: Send + Sync {
    /// Fails with [`DaError::VerificationFailed`] if `hash` was not registered for `batch_num`.
    async fn get_keyset_by_hash(&self, hash: &[u8; 32], batch_num: u64)
        -> Result<Keyset, DaError>;
}

#[derive(Debug, Clone)]
struct Registration {
    keyset: Keyset,
    from_batch: u64,
    until_batch: Option<u64>,
}

/// A registry kept in memory, standing in for the inbox contract's keyset table.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKeysetRegistry {
    keysets: Arc<RwLock<HashMap<[u8; 32], Registration>>>,
}

fn poisoned<E: std::fmt::Display>(e: E) -> DaError {
    DaError::Internal(format!("keyset registry lock poisoned: {e}"))
}

impl InMemoryKeysetRegistry {
    /// Registers `keyset` as valid from `from_batch` on and returns its hash.
    pub fn register(&self, keyset: Keyset, from_batch: u64) -> Result<[u8; 32], DaError> {
        let hash = keyset.hash();
        self.keysets.write().map_err(poisoned)?.insert(
            hash,
            Registration {
                keyset,
                from_batch,
                until_batch: None,
            },
        );
        Ok(hash)
    }

    /// Ends the validity of a keyset. Batches from `at_batch` on no longer accept it.
    pub fn invalidate(&self, hash: &[u8; 32], at_batch: u64) -> Result<(), DaError> {
        let mut keysets = self.keysets.write().map_err(poisoned)?;
        let registration = keysets
            .get_mut(hash)
            .ok_or_else(|| DaError::not_found(hash))?;
        registration.until_batch = Some(at_batch);
        Ok(())
    }
}

#[async_trait]
impl KeysetFetcher for InMemoryKeysetRegistry {
    async fn get_keyset_by_hash(
        &self,
        hash: &[u8; 32],
        batch_num: u64,
    ) -> Result<Keyset, DaError> {
        let keysets = self.keysets.read().map_err(poisoned)?;
        match keysets.get(hash) {
            Some(r)
                if batch_num >= r.from_batch
                    && r.until_batch.map_or(true, |until| batch_num < until) =>
            {
                Ok(r.keyset.clone())
            }
            Some(_) => Err(DaError::VerificationFailed(format!(
                "keyset {} is not valid for batch {batch_num}",
                hex::encode(hash)
            ))),
            None => Err(DaError::VerificationFailed(format!(
                "keyset {} is not registered",
                hex::encode(hash)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bls::BlsPrivateKey;

    #[tokio::test]
    async fn validity_range_is_enforced() {
        let pk = BlsPrivateKey::from_seed(&[5u8; 32]).unwrap().public_key();
        let keyset = Keyset::new(1, vec![pk]).unwrap();
        let registry = InMemoryKeysetRegistry::default();
        let hash = registry.register(keyset.clone(), 10).unwrap();

        assert!(registry.get_keyset_by_hash(&hash, 9).await.is_err());
        assert_eq!(registry.get_keyset_by_hash(&hash, 10).await.unwrap(), keyset);

        registry.invalidate(&hash, 20).unwrap();
        assert!(registry.get_keyset_by_hash(&hash, 19).await.is_ok());
        assert!(matches!(
            registry.get_keyset_by_hash(&hash, 20).await,
            Err(DaError::VerificationFailed(_))
        ));
        assert!(matches!(
            registry.get_keyset_by_hash(&[0u8; 32], 15).await,
            Err(DaError::VerificationFailed(_))
        ));
    }
}
