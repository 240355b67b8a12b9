#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

pub mod chain;
pub mod config;
mod error;
pub mod hash;
pub mod header;
pub mod hex_bytes;
pub mod inline;
pub mod message;
#[cfg(feature = "mocks")]
pub mod mocks;
pub mod preimage;
pub mod provider;
#[cfg(feature = "rpc")]
pub mod rpc;
pub mod tree;

pub use chain::ParentChain;
pub use error::DaError;
pub use hex_bytes::{HexBytes, HexHash};
pub use message::{BatchMessage, SequencerMessage, SequencerMessageHeader};
pub use preimage::{PreimageResolver, PreimageType, PreimagesMap};
pub use provider::{DaReader, DaValidator, DaWriter};

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
