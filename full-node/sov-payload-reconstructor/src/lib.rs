#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

mod config;
pub mod delayed;
mod lookup;
mod readers;
mod reconstructor;
mod registry;
pub mod trie;

pub use config::ReconstructorConfig;
pub use delayed::{read_delayed_message, DelayedMessageTree};
pub use lookup::LookupError;
pub use readers::{BlobFetcher, BlobHashesReader, InlineReader};
pub use reconstructor::PayloadReconstructor;
pub use registry::{ReaderKind, ReaderRegistry};
pub use trie::{fetch_indexed_value, fetch_trie_value};
