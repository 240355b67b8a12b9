use std::path::PathBuf;

use serde::Deserialize;

use crate::{RetentionConfig, RocksdbConfig};

/// Which backend persists blobs.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageBackend {
    /// Keep blobs in process memory.
    #[default]
    Memory,
    /// Persist blobs in a RocksDB database at `path`.
    RocksDb {
        /// Database directory.
        path: PathBuf,
        /// Tuning options.
        #[serde(default)]
        rocksdb: RocksdbConfig,
    },
}

/// Blob store configuration.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct BlobStoreConfig {
    /// The persistence backend.
    #[serde(default)]
    pub backend: StorageBackend,
    /// Retention settings.
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use sov_da_interface::config::from_toml_path;
    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn parse_rocksdb_config() {
        let config = r#"
            [backend]
            type = "rocks_db"
            path = "/tmp/blobs"

            [retention]
            max_retention_secs = 86400
        "#;

        let mut config_file = NamedTempFile::new().unwrap();
        config_file.write_all(config.as_bytes()).unwrap();

        let config: BlobStoreConfig = from_toml_path(config_file.path()).unwrap();
        let expected = BlobStoreConfig {
            backend: StorageBackend::RocksDb {
                path: PathBuf::from("/tmp/blobs"),
                rocksdb: RocksdbConfig::default(),
            },
            retention: RetentionConfig {
                enable_expiry: true,
                max_retention_secs: Some(86400),
                sweep_interval_secs: 60,
            },
        };
        assert_eq!(config, expected);
    }

    #[test]
    fn empty_config_is_memory_backed() {
        let config: BlobStoreConfig = toml::from_str("").unwrap();
        assert_eq!(config, BlobStoreConfig::default());
    }
}
