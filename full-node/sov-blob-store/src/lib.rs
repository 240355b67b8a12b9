#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

mod config;
mod memory;
mod metrics;
mod retention;
mod rocks;
mod rocks_db_config;

use async_trait::async_trait;
pub use config::{BlobStoreConfig, StorageBackend};
pub use memory::MemoryBlobStore;
pub use retention::{spawn_retention_sweeper, RetentionConfig};
pub use rocks::RocksBlobStore;
pub use rocks_db_config::{gen_rocksdb_options, RocksdbConfig};
use serde::{Deserialize, Serialize};
use sov_da_interface::DaError;

/// How long stored blobs are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpirationPolicy {
    /// Blobs are never pruned.
    KeepForever,
    /// Blobs are pruned once the expiry supplied at store time has passed.
    DiscardAfterDataTimeout,
    /// Blobs are pruned at their expiry, which is clamped to at most this many seconds after
    /// they were stored.
    DiscardAfterMaxRetention(u64),
}

/// A local blob store keyed by content tree hash.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Stores `data` until `expiry` (unix seconds) and returns its content hash. Storing data that
    /// is already present is a no-op and keeps the existing expiry.
    async fn put(&self, data: &[u8], expiry: u64) -> Result<[u8; 32], DaError>;

    /// Returns the blob addressed by `hash`, failing with [`DaError::NotFound`] if it is absent
    /// or expired.
    async fn get_by_hash(&self, hash: &[u8; 32]) -> Result<Vec<u8>, DaError>;

    /// Extends the expiry of a stored blob. Expiries are never shortened.
    async fn refresh(&self, hash: &[u8; 32], expiry: u64) -> Result<(), DaError>;

    /// Deletes every blob whose expiry is at or before `now`, returning how many were removed.
    async fn sweep_expired(&self, now: u64) -> Result<usize, DaError>;

    /// The retention policy this store enforces.
    fn expiration_policy(&self) -> ExpirationPolicy;

    /// Fails if the store cannot currently serve requests.
    async fn health_check(&self) -> Result<(), DaError>;
}

/// The configured blob store backend.
#[derive(Debug)]
pub enum BlobStore {
    /// [`MemoryBlobStore`]
    Memory(MemoryBlobStore),
    /// [`RocksBlobStore`]
    RocksDb(RocksBlobStore),
}

impl BlobStore {
    /// Opens the backend selected by `config`.
    pub fn from_config(config: &BlobStoreConfig) -> anyhow::Result<Self> {
        Ok(match &config.backend {
            StorageBackend::Memory => BlobStore::Memory(MemoryBlobStore::new(config.retention)),
            StorageBackend::RocksDb { path, rocksdb } => {
                BlobStore::RocksDb(RocksBlobStore::open(path, rocksdb, config.retention)?)
            }
        })
    }
}

#[async_trait]
impl StorageService for BlobStore {
    async fn put(&self, data: &[u8], expiry: u64) -> Result<[u8; 32], DaError> {
        match self {
            BlobStore::Memory(store) => store.put(data, expiry).await,
            BlobStore::RocksDb(store) => store.put(data, expiry).await,
        }
    }

    async fn get_by_hash(&self, hash: &[u8; 32]) -> Result<Vec<u8>, DaError> {
        match self {
            BlobStore::Memory(store) => store.get_by_hash(hash).await,
            BlobStore::RocksDb(store) => store.get_by_hash(hash).await,
        }
    }

    async fn refresh(&self, hash: &[u8; 32], expiry: u64) -> Result<(), DaError> {
        match self {
            BlobStore::Memory(store) => store.refresh(hash, expiry).await,
            BlobStore::RocksDb(store) => store.refresh(hash, expiry).await,
        }
    }

    async fn sweep_expired(&self, now: u64) -> Result<usize, DaError> {
        match self {
            BlobStore::Memory(store) => store.sweep_expired(now).await,
            BlobStore::RocksDb(store) => store.sweep_expired(now).await,
        }
    }

    fn expiration_policy(&self) -> ExpirationPolicy {
        match self {
            BlobStore::Memory(store) => store.expiration_policy(),
            BlobStore::RocksDb(store) => store.expiration_policy(),
        }
    }

    async fn health_check(&self) -> Result<(), DaError> {
        match self {
            BlobStore::Memory(store) => store.health_check().await,
            BlobStore::RocksDb(store) => store.health_check().await,
        }
    }
}
