use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use sov_da_interface::{tree, unix_now, DaError};
use tracing::debug;

use crate::metrics::record_operation;
use crate::{ExpirationPolicy, RetentionConfig, StorageService};

#[derive(Debug, Clone)]
struct Entry {
    data: Arc<[u8]>,
    expiry: u64,
}

/// An in-memory blob store.
///
/// Clones share the same underlying map, so a single instance can be handed to every component
/// that needs it.
#[derive(Debug, Clone)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<[u8; 32], Entry>>>,
    retention: RetentionConfig,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    pub fn new(retention: RetentionConfig) -> Self {
        Self {
            blobs: Default::default(),
            retention,
        }
    }

    /// Number of stored blobs, expired or not.
    pub fn len(&self) -> usize {
        self.blobs.read().map(|blobs| blobs.len()).unwrap_or_default()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> DaError {
    DaError::Internal(format!("blob map lock poisoned: {e}"))
}

#[async_trait]
impl StorageService for MemoryBlobStore {
    async fn put(&self, data: &[u8], expiry: u64) -> Result<[u8; 32], DaError> {
        let hash = tree::hash(data);
        let now = unix_now();
        let live = |entry: &Entry| !self.retention.is_expired(entry.expiry, now);
        // Re-storing a live blob only takes the shared lock.
        if self.blobs.read().map_err(poisoned)?.get(&hash).is_some_and(live) {
            record_operation("memory", "put", "exists");
            return Ok(hash);
        }
        let expiry = self.retention.effective_expiry(expiry, now);
        let mut blobs = self.blobs.write().map_err(poisoned)?;
        match blobs.get(&hash) {
            Some(entry) if live(entry) => {
                record_operation("memory", "put", "exists");
                return Ok(hash);
            }
            // An expired copy the sweeper has not reached yet is replaced.
            _ => {
                blobs.insert(
                    hash,
                    Entry {
                        data: data.into(),
                        expiry,
                    },
                );
            }
        }
        drop(blobs);
        debug!(hash = hex::encode(hash), size = data.len(), expiry, "Stored blob");
        record_operation("memory", "put", "ok");
        Ok(hash)
    }

    async fn get_by_hash(&self, hash: &[u8; 32]) -> Result<Vec<u8>, DaError> {
        let blobs = self.blobs.read().map_err(poisoned)?;
        match blobs.get(hash) {
            Some(entry) if !self.retention.is_expired(entry.expiry, unix_now()) => {
                record_operation("memory", "get", "ok");
                Ok(entry.data.to_vec())
            }
            _ => {
                record_operation("memory", "get", "not_found");
                Err(DaError::not_found(hash))
            }
        }
    }

    async fn refresh(&self, hash: &[u8; 32], expiry: u64) -> Result<(), DaError> {
        let expiry = self.retention.effective_expiry(expiry, unix_now());
        let mut blobs = self.blobs.write().map_err(poisoned)?;
        let entry = blobs.get_mut(hash).ok_or_else(|| DaError::not_found(hash))?;
        entry.expiry = entry.expiry.max(expiry);
        Ok(())
    }

    async fn sweep_expired(&self, now: u64) -> Result<usize, DaError> {
        if !self.retention.enable_expiry {
            return Ok(0);
        }
        let mut blobs = self.blobs.write().map_err(poisoned)?;
        let before = blobs.len();
        blobs.retain(|_, entry| entry.expiry > now);
        let removed = before - blobs.len();
        crate::metrics::BLOB_STORE_SWEPT
            .with_label_values(&["memory"])
            .inc_by(removed as u64);
        Ok(removed)
    }

    fn expiration_policy(&self) -> ExpirationPolicy {
        self.retention.policy()
    }

    async fn health_check(&self) -> Result<(), DaError> {
        self.blobs.read().map(|_| ()).map_err(poisoned)
    }
}
