//! Sources the reader fetches payloads from.

use std::sync::Arc;

use async_trait::async_trait;
use sov_blob_store::StorageService;
use sov_da_interface::{tree, DaError};
use tracing::warn;

/// Anything that serves blobs by content hash.
#[async_trait]
pub trait DataFetcher: Send + Sync {
    /// Returns the blob addressed by `hash`. Implementations are not trusted to return the
    /// right bytes; callers check the hash.
    async fn get_by_hash(&self, hash: &[u8; 32]) -> Result<Vec<u8>, DaError>;

    /// Label used in logs.
    fn name(&self) -> String;
}

/// Serves blobs straight from a local store.
#[derive(Clone)]
pub struct StorageFetcher {
    store: Arc<dyn StorageService>,
}

impl StorageFetcher {
    /// Wraps `store`.
    pub fn new(store: Arc<dyn StorageService>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DataFetcher for StorageFetcher {
    async fn get_by_hash(&self, hash: &[u8; 32]) -> Result<Vec<u8>, DaError> {
        self.store.get_by_hash(hash).await
    }

    fn name(&self) -> String {
        "local-store".to_string()
    }
}

/// Tries a list of fetchers in order and returns the first blob that matches the hash.
#[derive(Clone, Default)]
pub struct MultiFetcher {
    fetchers: Vec<Arc<dyn DataFetcher>>,
}

impl MultiFetcher {
    /// Creates a fetcher over `fetchers`, tried in the given order.
    pub fn new(fetchers: Vec<Arc<dyn DataFetcher>>) -> Self {
        Self { fetchers }
    }
}

#[async_trait]
impl DataFetcher for MultiFetcher {
    async fn get_by_hash(&self, hash: &[u8; 32]) -> Result<Vec<u8>, DaError> {
        for fetcher in &self.fetchers {
            match fetcher.get_by_hash(hash).await {
                Ok(data) if tree::valid_hash(hash, &data) => return Ok(data),
                Ok(_) => warn!(
                    source = fetcher.name(),
                    hash = hex::encode(hash),
                    "Source returned data that does not match the requested hash"
                ),
                Err(e) => warn!(
                    source = fetcher.name(),
                    hash = hex::encode(hash),
                    error = %e,
                    "Failed to fetch blob"
                ),
            }
        }
        Err(DaError::not_found(hash))
    }

    fn name(&self) -> String {
        format!("multi({})", self.fetchers.len())
    }
}

#[cfg(test)]
mod tests {
    use sov_blob_store::{MemoryBlobStore, RetentionConfig};
    use sov_da_interface::unix_now;

    use super::*;

    struct Liar;

    #[async_trait]
    impl DataFetcher for Liar {
        async fn get_by_hash(&self, _hash: &[u8; 32]) -> Result<Vec<u8>, DaError> {
            Ok(b"not what you asked for".to_vec())
        }

        fn name(&self) -> String {
            "liar".to_string()
        }
    }

    #[tokio::test]
    async fn skips_sources_returning_wrong_data() {
        let store = MemoryBlobStore::new(RetentionConfig::default());
        let hash = store.put(b"payload", unix_now() + 60).await.unwrap();
        let honest: Arc<dyn DataFetcher> = Arc::new(StorageFetcher::new(Arc::new(store)));

        let fetcher = MultiFetcher::new(vec![Arc::new(Liar), honest]);
        assert_eq!(fetcher.get_by_hash(&hash).await.unwrap(), b"payload".to_vec());

        let only_liar = MultiFetcher::new(vec![Arc::new(Liar)]);
        assert!(matches!(
            only_liar.get_by_hash(&hash).await,
            Err(DaError::NotFound(_))
        ));
    }
}
