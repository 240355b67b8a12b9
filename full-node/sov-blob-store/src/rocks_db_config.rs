use rocksdb::Options;
use serde::Deserialize;

/// RocksDB tuning for the blob database.
/// See <https://github.com/facebook/rocksdb/blob/master/include/rocksdb/options.h>
/// and <https://github.com/facebook/rocksdb/wiki/BlobDB> for what each knob does.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RocksdbConfig {
    /// Files the database may keep open at once.
    #[serde(default = "default_max_open_files")]
    pub max_open_files: i32,
    /// WAL size after which column families backed by the oldest WAL get flushed.
    #[serde(default = "default_max_total_wal_size")]
    pub max_total_wal_size: u64,
    /// Background flush and compaction threads.
    #[serde(default = "default_max_background_jobs")]
    pub max_background_jobs: i32,
    /// Values at least this large are written to separate blob files instead of the LSM tree.
    /// `0` disables blob separation.
    #[serde(default = "default_min_blob_size")]
    pub min_blob_size: u64,
}

fn default_max_open_files() -> i32 {
    5000
}

fn default_max_total_wal_size() -> u64 {
    1u64 << 30
}

fn default_max_background_jobs() -> i32 {
    16
}

fn default_min_blob_size() -> u64 {
    4 * 1024
}

impl Default for RocksdbConfig {
    fn default() -> Self {
        Self {
            max_open_files: default_max_open_files(),
            max_total_wal_size: default_max_total_wal_size(),
            max_background_jobs: default_max_background_jobs(),
            min_blob_size: default_min_blob_size(),
        }
    }
}

/// Builds the [`rocksdb::Options`] the blob database is opened with.
pub fn gen_rocksdb_options(config: &RocksdbConfig, readonly: bool) -> Options {
    let mut opts = Options::default();
    opts.set_max_open_files(config.max_open_files);
    opts.set_max_total_wal_size(config.max_total_wal_size);
    opts.set_max_background_jobs(config.max_background_jobs);
    if config.min_blob_size > 0 {
        opts.set_enable_blob_files(true);
        opts.set_min_blob_size(config.min_blob_size);
    }
    if !readonly {
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_atomic_flush(true);
    }
    opts
}
