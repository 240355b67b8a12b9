use std::net::SocketAddr;

use serde::Deserialize;
use sov_data_streaming::{DataStreamerConfig, ReceiverConfig};

/// How to reach an external provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExternalProviderConfig {
    /// JSON-RPC endpoint of the provider.
    pub url: String,
    /// Deadline of every call.
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    /// Largest single request the provider accepts.
    #[serde(default = "default_max_request_size")]
    pub max_request_size: u32,
    /// Stream payloads that do not fit a single request.
    #[serde(default = "default_use_data_streaming")]
    pub use_data_streaming: bool,
    /// Chunking settings used when streaming.
    #[serde(default)]
    pub streamer: DataStreamerConfig,
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

fn default_max_request_size() -> u32 {
    5 * 1024 * 1024
}

fn default_use_data_streaming() -> bool {
    true
}

impl ExternalProviderConfig {
    /// Settings for `url` with every other field at its default.
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            rpc_timeout_secs: default_rpc_timeout_secs(),
            max_request_size: default_max_request_size(),
            use_data_streaming: default_use_data_streaming(),
            streamer: DataStreamerConfig::default(),
        }
    }
}

/// Settings of a provider server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderServerConfig {
    /// Listen address.
    #[serde(default = "default_address")]
    pub address: SocketAddr,
    /// Largest request body accepted.
    #[serde(default = "default_max_request_body_size")]
    pub max_request_body_size: u32,
    /// Limits of chunked stores.
    #[serde(default)]
    pub streaming: ReceiverConfig,
}

fn default_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9880))
}

fn default_max_request_body_size() -> u32 {
    16 * 1024 * 1024
}

impl Default for ProviderServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            max_request_body_size: default_max_request_body_size(),
            streaming: ReceiverConfig::default(),
        }
    }
}
