use serde::Deserialize;
use sov_anytrust_adapter::AggregatorConfig;
use sov_external_da_adapter::ExternalProviderConfig;

/// One off-chain writer of the chain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WriterConfig {
    /// A quorum committee.
    AnyTrust(AggregatorConfig),
    /// An out of process provider.
    External(ExternalProviderConfig),
}

/// Batch poster settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BatchPosterConfig {
    /// Off-chain writers, highest priority first.
    #[serde(default)]
    pub writers: Vec<WriterConfig>,
    /// Never post batches inline when the off-chain writers fail; defer them instead.
    #[serde(default)]
    pub disable_on_chain_fallback: bool,
    /// Batches posted on-chain after a fallback before off-chain writers are retried.
    #[serde(default = "default_on_chain_fallback_batch_count")]
    pub on_chain_fallback_batch_count: u32,
    /// Largest uncompressed payload posted inline.
    #[serde(default = "default_max_on_chain_batch_size")]
    pub max_on_chain_batch_size: usize,
    /// Ceiling used when a writer cannot report its own.
    #[serde(default = "default_max_message_size")]
    pub default_max_message_size: usize,
    /// How long off-chain writers must keep a batch.
    #[serde(default = "default_retention_period_secs")]
    pub retention_period_secs: u64,
    /// Pause between cycles that posted nothing.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Brotli quality of inline batches.
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
    /// Capacity of the message queue.
    #[serde(default = "default_max_pending_messages")]
    pub max_pending_messages: usize,
}

fn default_on_chain_fallback_batch_count() -> u32 {
    10
}

fn default_max_on_chain_batch_size() -> usize {
    100_000
}

fn default_max_message_size() -> usize {
    1024 * 1024
}

fn default_retention_period_secs() -> u64 {
    15 * 24 * 60 * 60
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_compression_level() -> u32 {
    11
}

fn default_max_pending_messages() -> usize {
    100_000
}

impl Default for BatchPosterConfig {
    fn default() -> Self {
        Self {
            writers: Vec::new(),
            disable_on_chain_fallback: false,
            on_chain_fallback_batch_count: default_on_chain_fallback_batch_count(),
            max_on_chain_batch_size: default_max_on_chain_batch_size(),
            default_max_message_size: default_max_message_size(),
            retention_period_secs: default_retention_period_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            compression_level: default_compression_level(),
            max_pending_messages: default_max_pending_messages(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use sov_da_interface::config::from_toml_path;
    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn writer_chain_keeps_its_order() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            br#"
            disable_on_chain_fallback = true

            [[writers]]
            type = "external"
            url = "http://127.0.0.1:9880"

            [[writers]]
            type = "any_trust"
            assumed_honest = 1

            [[writers.backends]]
            url = "http://127.0.0.1:9876"
            pubkey = "00"
            signer_index = 0
            "#,
        )
        .unwrap();
        let config: BatchPosterConfig = from_toml_path(file.path()).unwrap();
        assert!(config.disable_on_chain_fallback);
        assert_eq!(config.on_chain_fallback_batch_count, 10);
        assert!(matches!(config.writers[0], WriterConfig::External(_)));
        match &config.writers[1] {
            WriterConfig::AnyTrust(aggregator) => {
                assert_eq!(aggregator.assumed_honest, 1);
                assert_eq!(aggregator.backends.len(), 1);
            }
            other => panic!("unexpected writer {other:?}"),
        }
    }
}
