#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

mod config;
mod metrics;
mod poster;
mod queue;
mod writers;

pub use config::{BatchPosterConfig, WriterConfig};
pub use poster::{BatchPoster, InboxSink, PostOutcome, PostedBatch, PostedBy};
pub use queue::MessageQueue;
pub use writers::{OnChainWriter, WriterKind};
