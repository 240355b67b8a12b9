//! Wire types of the streaming protocol.

use serde::{Deserialize, Serialize};
use sov_da_interface::HexBytes;

/// Identifier of a streaming session.
pub type MessageId = u64;

/// The RPC method names of one streaming surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamingMethods {
    /// Opens a session.
    pub start: &'static str,
    /// Delivers one chunk.
    pub chunk: &'static str,
    /// Finalizes a session.
    pub commit: &'static str,
}

/// Streaming methods exposed by external DA providers.
pub const DAPROVIDER_STREAMING_METHODS: StreamingMethods = StreamingMethods {
    start: "daprovider_startChunkedStore",
    chunk: "daprovider_sendChunk",
    commit: "daprovider_commitChunkedStore",
};

/// Streaming methods exposed by quorum storage backends.
pub const DAS_STREAMING_METHODS: StreamingMethods = StreamingMethods {
    start: "das_startChunkedStore",
    chunk: "das_sendChunk",
    commit: "das_commitChunkedStore",
};

/// Parameters of the start call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartStreamParams {
    /// Number of chunks that will follow.
    pub n_chunks: u64,
    /// Size of every chunk but the last.
    pub chunk_size: u64,
    /// Size of the reassembled payload.
    pub total_size: u64,
    /// Storage timeout handed to the service with the payload.
    pub timeout: u64,
}

impl StartStreamParams {
    /// Computes the geometry for streaming `total_size` bytes in chunks of `chunk_size`.
    pub fn for_payload(total_size: usize, chunk_size: usize, timeout: u64) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            n_chunks: total_size.div_ceil(chunk_size) as u64,
            chunk_size: chunk_size as u64,
            total_size: total_size as u64,
            timeout,
        }
    }

    /// Expected size of chunk `chunk_id`.
    pub fn expected_chunk_len(&self, chunk_id: u64) -> u64 {
        if chunk_id + 1 == self.n_chunks {
            (self.total_size - 1) % self.chunk_size + 1
        } else {
            self.chunk_size
        }
    }
}

/// Result of the start call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartStreamResult {
    /// The session id to send chunks under.
    pub message_id: MessageId,
}

/// Parameters of the chunk call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendChunkParams {
    /// The session id.
    pub message_id: MessageId,
    /// Zero based sequence number of the chunk.
    pub chunk_id: u64,
    /// Chunk bytes.
    pub chunk: HexBytes,
}

/// Parameters of the commit call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitStreamParams {
    /// The session id.
    pub message_id: MessageId,
}
