#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

pub mod client;
pub mod protocol;
mod receiver;
mod server;
mod streamer;

pub use protocol::{
    MessageId, StartStreamParams, StreamingMethods, DAPROVIDER_STREAMING_METHODS,
    DAS_STREAMING_METHODS,
};
pub use receiver::{DataStreamReceiver, ReassembledMessage, ReceiverConfig, StreamError};
pub use server::register_streaming_methods;
pub use streamer::{DataStreamer, DataStreamerConfig};
