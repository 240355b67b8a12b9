#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

mod client;
mod config;
pub mod enhancer;
pub mod protocol;
mod server;

pub use client::ExternalProviderClient;
pub use config::{ExternalProviderConfig, ProviderServerConfig};
pub use enhancer::{
    CertificateValidityProofEnhancer, InboxTracker, ProofEnhancementManager, ProofEnhancer,
    ReadPreimageProofEnhancer, ValidatorRegistry,
};
pub use server::{get_provider_rpc_module, start_provider_server, ProviderServer};
