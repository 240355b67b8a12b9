use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Deserialize;
use sov_da_interface::DaError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::{MessageId, StartStreamParams};

/// Errors raised while reassembling a stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The start parameters are inconsistent.
    #[error("invalid stream parameters: {0}")]
    InvalidParams(String),
    /// The declared total size exceeds the receiver's bound.
    #[error("stream of {size} bytes exceeds the maximum of {max} bytes")]
    TooLarge {
        /// Declared size.
        size: u64,
        /// Receiver bound.
        max: u64,
    },
    /// Too many sessions are open.
    #[error("too many pending streams (limit {0})")]
    TooManyPending(usize),
    /// No open session has this id.
    #[error("unknown or expired stream {0}")]
    UnknownSession(MessageId),
    /// A chunk arrived ahead of its predecessors.
    #[error("stream {message_id}: expected chunk {expected}, got {got}")]
    OutOfOrder {
        /// Session id.
        message_id: MessageId,
        /// The next chunk the session accepts.
        expected: u64,
        /// The chunk that was sent.
        got: u64,
    },
    /// A chunk that was already received was sent again.
    #[error("stream {message_id}: duplicate chunk {chunk_id}")]
    DuplicateChunk {
        /// Session id.
        message_id: MessageId,
        /// Chunk sequence number.
        chunk_id: u64,
    },
    /// A chunk was re-sent with different content. The session is aborted.
    #[error("stream {message_id}: chunk {chunk_id} conflicts with the one received earlier")]
    ConflictingChunk {
        /// Session id.
        message_id: MessageId,
        /// Chunk sequence number.
        chunk_id: u64,
    },
    /// The chunk has the wrong size.
    #[error("stream {message_id}: chunk {chunk_id} has {got} bytes, expected {expected}")]
    ChunkSize {
        /// Session id.
        message_id: MessageId,
        /// Chunk sequence number.
        chunk_id: u64,
        /// Expected length.
        expected: u64,
        /// Actual length.
        got: u64,
    },
    /// The session was committed before all chunks arrived.
    #[error("stream {message_id}: received {received} of {expected} chunks")]
    Incomplete {
        /// Session id.
        message_id: MessageId,
        /// Chunks received.
        received: u64,
        /// Chunks declared.
        expected: u64,
    },
}

impl From<StreamError> for DaError {
    fn from(e: StreamError) -> Self {
        match e {
            StreamError::TooLarge { size, max } => DaError::MessageTooLarge {
                size: size as usize,
                max: Some(max as usize),
            },
            other => DaError::Internal(other.to_string()),
        }
    }
}

/// Limits enforced by a [`DataStreamReceiver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ReceiverConfig {
    /// Maximum number of concurrently open sessions.
    #[serde(default = "default_max_pending_messages")]
    pub max_pending_messages: usize,
    /// Sessions idle for longer than this are dropped.
    #[serde(default = "default_message_collection_expiry_secs")]
    pub message_collection_expiry_secs: u64,
    /// Maximum size of a reassembled payload.
    #[serde(default = "default_max_total_size")]
    pub max_total_size: u64,
}

fn default_max_pending_messages() -> usize {
    10
}

fn default_message_collection_expiry_secs() -> u64 {
    60
}

fn default_max_total_size() -> u64 {
    64 * 1024 * 1024
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            max_pending_messages: default_max_pending_messages(),
            message_collection_expiry_secs: default_message_collection_expiry_secs(),
            max_total_size: default_max_total_size(),
        }
    }
}

impl ReceiverConfig {
    fn expiry(&self) -> Duration {
        Duration::from_secs(self.message_collection_expiry_secs)
    }
}

#[derive(Debug)]
struct Session {
    params: StartStreamParams,
    received: u64,
    buffer: Vec<u8>,
    last_update: Instant,
}

/// A payload reassembled from a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassembledMessage {
    /// The payload bytes.
    pub data: Vec<u8>,
    /// The storage timeout declared at start.
    pub timeout: u64,
}

/// Reassembles streamed payloads. Each session has its own buffer.
#[derive(Debug, Default)]
pub struct DataStreamReceiver {
    sessions: Mutex<HashMap<MessageId, Session>>,
    config: ReceiverConfig,
}

impl DataStreamReceiver {
    /// Creates a receiver with the given limits.
    pub fn new(config: ReceiverConfig) -> Self {
        Self {
            sessions: Default::default(),
            config,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<MessageId, Session>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Opens a session and returns its id.
    pub fn start_receiving(&self, params: StartStreamParams) -> Result<MessageId, StreamError> {
        if params.n_chunks == 0 || params.chunk_size == 0 || params.total_size == 0 {
            return Err(StreamError::InvalidParams(
                "chunk count, chunk size and total size must be positive".to_string(),
            ));
        }
        if params.n_chunks != params.total_size.div_ceil(params.chunk_size) {
            return Err(StreamError::InvalidParams(format!(
                "{} chunks of {} bytes cannot hold {} bytes",
                params.n_chunks, params.chunk_size, params.total_size
            )));
        }
        if params.total_size > self.config.max_total_size {
            return Err(StreamError::TooLarge {
                size: params.total_size,
                max: self.config.max_total_size,
            });
        }

        let mut sessions = self.lock();
        expire_locked(&mut sessions, Instant::now(), self.config.expiry());
        if sessions.len() >= self.config.max_pending_messages {
            return Err(StreamError::TooManyPending(
                self.config.max_pending_messages,
            ));
        }
        let mut message_id: MessageId = rand::random();
        while sessions.contains_key(&message_id) {
            message_id = rand::random();
        }
        sessions.insert(
            message_id,
            Session {
                params,
                received: 0,
                buffer: Vec::with_capacity(params.total_size as usize),
                last_update: Instant::now(),
            },
        );
        debug!(
            message_id,
            n_chunks = params.n_chunks,
            total_size = params.total_size,
            "Opened stream"
        );
        Ok(message_id)
    }

    /// Appends chunk `chunk_id` to a session.
    pub fn receive_chunk(
        &self,
        message_id: MessageId,
        chunk_id: u64,
        chunk: &[u8],
    ) -> Result<(), StreamError> {
        let mut sessions = self.lock();
        let expiry = self.config.expiry();
        let expired = match sessions.get(&message_id) {
            Some(session) => session.last_update.elapsed() > expiry,
            None => return Err(StreamError::UnknownSession(message_id)),
        };
        if expired {
            sessions.remove(&message_id);
            return Err(StreamError::UnknownSession(message_id));
        }
        let session = sessions
            .get_mut(&message_id)
            .ok_or(StreamError::UnknownSession(message_id))?;

        let params = session.params;
        if chunk_id >= params.n_chunks {
            return Err(StreamError::InvalidParams(format!(
                "chunk {chunk_id} is out of range for a stream of {} chunks",
                params.n_chunks
            )));
        }
        if chunk_id < session.received {
            let start = (chunk_id * params.chunk_size) as usize;
            let end = start + params.expected_chunk_len(chunk_id) as usize;
            if session.buffer.get(start..end) == Some(chunk) {
                return Err(StreamError::DuplicateChunk {
                    message_id,
                    chunk_id,
                });
            }
            sessions.remove(&message_id);
            warn!(message_id, chunk_id, "Aborted stream on conflicting chunk");
            return Err(StreamError::ConflictingChunk {
                message_id,
                chunk_id,
            });
        }
        if chunk_id > session.received {
            return Err(StreamError::OutOfOrder {
                message_id,
                expected: session.received,
                got: chunk_id,
            });
        }
        let expected = params.expected_chunk_len(chunk_id);
        if chunk.len() as u64 != expected {
            return Err(StreamError::ChunkSize {
                message_id,
                chunk_id,
                expected,
                got: chunk.len() as u64,
            });
        }

        session.buffer.extend_from_slice(chunk);
        session.received += 1;
        session.last_update = Instant::now();
        Ok(())
    }

    /// Closes a session and returns its payload. The session is removed whether or not it was
    /// complete.
    pub fn finalize_receiving(
        &self,
        message_id: MessageId,
    ) -> Result<ReassembledMessage, StreamError> {
        let session = self
            .lock()
            .remove(&message_id)
            .ok_or(StreamError::UnknownSession(message_id))?;
        if session.received != session.params.n_chunks {
            return Err(StreamError::Incomplete {
                message_id,
                received: session.received,
                expected: session.params.n_chunks,
            });
        }
        debug!(message_id, size = session.buffer.len(), "Finalized stream");
        Ok(ReassembledMessage {
            data: session.buffer,
            timeout: session.params.timeout,
        })
    }

    /// Drops every session idle since before `now - expiry`, returning how many were dropped.
    pub fn expire_sessions(&self, now: Instant) -> usize {
        expire_locked(&mut self.lock(), now, self.config.expiry())
    }

    /// Number of open sessions.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Spawns a task that drops abandoned sessions until `cancel` fires.
    pub fn spawn_gc(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let receiver = Arc::clone(self);
        let period = (receiver.config.expiry() / 2).max(Duration::from_millis(100));
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(period) => {}
                }
                let dropped = receiver.expire_sessions(Instant::now());
                if dropped > 0 {
                    info!(dropped, "Dropped abandoned streams");
                }
            }
        })
    }
}

fn expire_locked(
    sessions: &mut HashMap<MessageId, Session>,
    now: Instant,
    expiry: Duration,
) -> usize {
    let before = sessions.len();
    sessions.retain(|_, session| now.saturating_duration_since(session.last_update) <= expiry);
    before - sessions.len()
}
