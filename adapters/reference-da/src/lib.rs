#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

mod config;
#[cfg(feature = "test-utils")]
pub mod faults;
mod provider;

pub use config::ReferenceDaConfig;
pub use provider::{
    parse_certificate, reference_certificate, ReferenceDaProvider, READ_PREIMAGE_PROOF_VERSION,
    REFERENCE_CERTIFICATE_LEN, REFERENCE_PROVIDER_TYPE, VALIDITY_PROOF_VERSION,
};
