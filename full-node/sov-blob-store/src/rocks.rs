use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rocksdb::{ColumnFamily, IteratorMode, WriteBatch, DB};
use sov_da_interface::{tree, unix_now, DaError};
use tracing::debug;

use crate::metrics::{record_operation, BLOB_STORE_SWEPT};
use crate::rocks_db_config::gen_rocksdb_options;
use crate::{ExpirationPolicy, RetentionConfig, RocksdbConfig, StorageService};

/// Column family mapping `content hash -> expiry_be ‖ blob`.
const BLOBS_CF: &str = "blobs";
/// Column family indexing `expiry_be ‖ content hash -> ()`, scanned in order by the sweeper.
const EXPIRY_INDEX_CF: &str = "expiry_index";
/// Key written by health checks.
const HEALTH_KEY: &[u8] = b"__health";

/// A RocksDB backed blob store.
#[derive(Clone)]
pub struct RocksBlobStore {
    db: Arc<DB>,
    retention: RetentionConfig,
}

impl std::fmt::Debug for RocksBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksBlobStore")
            .field("path", &self.db.path())
            .field("retention", &self.retention)
            .finish()
    }
}

fn db_err(e: rocksdb::Error) -> DaError {
    DaError::Internal(format!("rocksdb: {e}"))
}

fn index_key(expiry: u64, hash: &[u8; 32]) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(&expiry.to_be_bytes());
    key.extend_from_slice(hash);
    key
}

fn split_entry(value: &[u8]) -> Result<(u64, &[u8]), DaError> {
    if value.len() < 8 {
        return Err(DaError::Internal("corrupted blob entry".to_string()));
    }
    let mut expiry = [0u8; 8];
    expiry.copy_from_slice(&value[..8]);
    Ok((u64::from_be_bytes(expiry), &value[8..]))
}

impl RocksBlobStore {
    /// Opens (or creates) the database at `path`.
    pub fn open(
        path: impl AsRef<Path>,
        rocksdb_config: &RocksdbConfig,
        retention: RetentionConfig,
    ) -> anyhow::Result<Self> {
        let options = gen_rocksdb_options(rocksdb_config, false);
        let db = DB::open_cf(&options, path, [BLOBS_CF, EXPIRY_INDEX_CF])?;
        Ok(Self {
            db: Arc::new(db),
            retention,
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, DaError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| DaError::Internal(format!("missing column family {name}")))
    }

    fn stored_expiry(&self, hash: &[u8; 32]) -> Result<Option<u64>, DaError> {
        match self.db.get_cf(self.cf(BLOBS_CF)?, hash).map_err(db_err)? {
            Some(value) => Ok(Some(split_entry(&value)?.0)),
            None => Ok(None),
        }
    }

    fn write_entry(&self, hash: &[u8; 32], expiry: u64, data: &[u8]) -> Result<(), DaError> {
        let mut value = Vec::with_capacity(8 + data.len());
        value.extend_from_slice(&expiry.to_be_bytes());
        value.extend_from_slice(data);

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(BLOBS_CF)?, hash, value);
        if self.retention.enable_expiry {
            batch.put_cf(self.cf(EXPIRY_INDEX_CF)?, index_key(expiry, hash), b"");
        }
        self.db.write(batch).map_err(db_err)
    }
}

#[async_trait]
impl StorageService for RocksBlobStore {
    async fn put(&self, data: &[u8], expiry: u64) -> Result<[u8; 32], DaError> {
        let hash = tree::hash(data);
        let now = unix_now();
        // An expired copy the sweeper has not reached yet is overwritten.
        if matches!(
            self.stored_expiry(&hash)?,
            Some(stored) if !self.retention.is_expired(stored, now)
        ) {
            record_operation("rocksdb", "put", "exists");
            return Ok(hash);
        }
        let expiry = self.retention.effective_expiry(expiry, now);
        self.write_entry(&hash, expiry, data)?;
        debug!(hash = hex::encode(hash), size = data.len(), expiry, "Stored blob");
        record_operation("rocksdb", "put", "ok");
        Ok(hash)
    }

    async fn get_by_hash(&self, hash: &[u8; 32]) -> Result<Vec<u8>, DaError> {
        let value = self.db.get_cf(self.cf(BLOBS_CF)?, hash).map_err(db_err)?;
        if let Some(value) = value {
            let (expiry, data) = split_entry(&value)?;
            if !self.retention.is_expired(expiry, unix_now()) {
                record_operation("rocksdb", "get", "ok");
                return Ok(data.to_vec());
            }
        }
        record_operation("rocksdb", "get", "not_found");
        Err(DaError::not_found(hash))
    }

    async fn refresh(&self, hash: &[u8; 32], expiry: u64) -> Result<(), DaError> {
        let value = self
            .db
            .get_cf(self.cf(BLOBS_CF)?, hash)
            .map_err(db_err)?
            .ok_or_else(|| DaError::not_found(hash))?;
        let (old_expiry, data) = split_entry(&value)?;
        let expiry = self.retention.effective_expiry(expiry, unix_now());
        if expiry > old_expiry {
            // The stale index entry is skipped by the sweeper, which re-reads the stored expiry.
            self.write_entry(hash, expiry, data)?;
        }
        Ok(())
    }

    async fn sweep_expired(&self, now: u64) -> Result<usize, DaError> {
        if !self.retention.enable_expiry {
            return Ok(0);
        }
        let blobs = self.cf(BLOBS_CF)?;
        let index = self.cf(EXPIRY_INDEX_CF)?;
        let mut batch = WriteBatch::default();
        let mut removed = HashSet::new();
        for item in self.db.iterator_cf(index, IteratorMode::Start) {
            let (key, _) = item.map_err(db_err)?;
            if key.len() != 40 {
                batch.delete_cf(index, &key);
                continue;
            }
            let (expiry, hash_bytes) = split_entry(&key)?;
            if expiry > now {
                break;
            }
            let mut hash = [0u8; 32];
            hash.copy_from_slice(hash_bytes);
            if matches!(self.stored_expiry(&hash)?, Some(stored) if stored <= now)
                && removed.insert(hash)
            {
                batch.delete_cf(blobs, hash);
            }
            batch.delete_cf(index, &key);
        }
        self.db.write(batch).map_err(db_err)?;
        BLOB_STORE_SWEPT
            .with_label_values(&["rocksdb"])
            .inc_by(removed.len() as u64);
        Ok(removed.len())
    }

    fn expiration_policy(&self) -> ExpirationPolicy {
        self.retention.policy()
    }

    async fn health_check(&self) -> Result<(), DaError> {
        self.db
            .get_cf(self.cf(BLOBS_CF)?, HEALTH_KEY)
            .map(|_| ())
            .map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn blobs_survive_reopen() {
        let dir = tempdir().unwrap();
        let expiry = unix_now() + 3_600;
        let hash = {
            let store =
                RocksBlobStore::open(dir.path(), &RocksdbConfig::default(), Default::default())
                    .unwrap();
            store.put(b"persisted", expiry).await.unwrap()
        };
        let store =
            RocksBlobStore::open(dir.path(), &RocksdbConfig::default(), Default::default())
                .unwrap();
        assert_eq!(store.get_by_hash(&hash).await.unwrap(), b"persisted".to_vec());
        store.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_blobs() {
        let dir = tempdir().unwrap();
        let store =
            RocksBlobStore::open(dir.path(), &RocksdbConfig::default(), Default::default())
                .unwrap();
        let now = unix_now();
        let old = store.put(b"old", now + 10).await.unwrap();
        let fresh = store.put(b"fresh", now + 1_000).await.unwrap();
        let refreshed = store.put(b"refreshed", now + 10).await.unwrap();
        store.refresh(&refreshed, now + 1_000).await.unwrap();

        assert_eq!(store.sweep_expired(now + 20).await.unwrap(), 1);
        assert!(matches!(
            store.get_by_hash(&old).await,
            Err(DaError::NotFound(_))
        ));
        assert!(store.get_by_hash(&fresh).await.is_ok());
        assert!(store.get_by_hash(&refreshed).await.is_ok());
        assert_eq!(store.sweep_expired(now + 20).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn put_of_existing_blob_is_a_no_op() {
        let dir = tempdir().unwrap();
        let store =
            RocksBlobStore::open(dir.path(), &RocksdbConfig::default(), Default::default())
                .unwrap();
        let now = unix_now();
        let hash = store.put(b"same", now + 10).await.unwrap();
        assert_eq!(store.put(b"same", now + 1_000).await.unwrap(), hash);
        assert_eq!(store.stored_expiry(&hash).unwrap(), Some(now + 10));
    }

    #[tokio::test]
    async fn re_store_after_expiry_writes_a_fresh_copy() {
        let dir = tempdir().unwrap();
        let store =
            RocksBlobStore::open(dir.path(), &RocksdbConfig::default(), Default::default())
                .unwrap();
        let now = unix_now();
        let hash = store.put(b"payload", now - 1).await.unwrap();
        assert!(matches!(
            store.get_by_hash(&hash).await,
            Err(DaError::NotFound(_))
        ));

        assert_eq!(store.put(b"payload", now + 3_600).await.unwrap(), hash);
        assert_eq!(store.get_by_hash(&hash).await.unwrap(), b"payload".to_vec());
        assert_eq!(store.stored_expiry(&hash).unwrap(), Some(now + 3_600));
    }
}
