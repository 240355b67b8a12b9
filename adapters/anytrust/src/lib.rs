#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

mod aggregator;
mod backend;
pub mod bls;
pub mod certificate;
mod config;
mod fetcher;
pub mod keyset;
mod keyset_registry;
mod metrics;
pub mod mirror;
mod node;
pub mod protocol;
mod reader;
mod rest_client;
mod server;
mod verifier;
mod writer;

pub use aggregator::Aggregator;
pub use backend::{DasBackend, RpcBackendClient};
pub use certificate::DataAvailabilityCertificate;
pub use config::{AggregatorConfig, BackendConfig, StorageNodeConfig};
pub use fetcher::{DataFetcher, MultiFetcher, StorageFetcher};
pub use keyset::Keyset;
pub use keyset_registry::{InMemoryKeysetRegistry, KeysetFetcher};
pub use mirror::{mirror_router, start_mirror};
pub use node::StorageNode;
pub use reader::{AnyTrustReader, MIN_CERTIFICATE_LIFETIME_SECS};
pub use rest_client::RestfulClient;
pub use server::{
    get_das_rpc_module, start_backend_server, start_storage_node, StorageNodeHandle,
};
pub use verifier::CertificateVerifier;
pub use writer::AnyTrustWriter;
