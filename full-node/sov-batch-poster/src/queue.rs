use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::bail;
use sov_da_interface::message::EMPTY_BATCH_LEN;
use sov_da_interface::BatchMessage;

use crate::metrics::BATCH_POSTER_PENDING_MESSAGES;

/// Messages waiting to be posted, in the order they were sequenced.
///
/// Producers append while the poster builds batches. The lock is only held to copy messages out
/// or to drop the ones already posted, never across a store.
#[derive(Debug)]
pub struct MessageQueue {
    pending: Mutex<VecDeque<BatchMessage>>,
    max_pending_messages: usize,
}

impl MessageQueue {
    /// Creates an empty queue holding at most `max_pending_messages`.
    pub fn new(max_pending_messages: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            max_pending_messages,
        }
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, VecDeque<BatchMessage>>> {
        self.pending
            .lock()
            .map_err(|e| anyhow::anyhow!("message queue lock poisoned: {e}"))
    }

    /// Appends a message. Fails if the queue is full.
    pub fn push(&self, message: BatchMessage) -> anyhow::Result<()> {
        let mut pending = self.lock()?;
        if pending.len() >= self.max_pending_messages {
            bail!("Message queue is full")
        }
        pending.push_back(message);
        BATCH_POSTER_PENDING_MESSAGES.set(pending.len() as i64);
        Ok(())
    }

    /// Number of pending messages.
    pub fn len(&self) -> usize {
        self.lock().map(|pending| pending.len()).unwrap_or_default()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the longest prefix of the queue whose encoded batch fits in `max_payload_size`.
    ///
    /// The result is empty if even the first message does not fit.
    pub fn peek_batch(&self, max_payload_size: usize) -> anyhow::Result<Vec<BatchMessage>> {
        let pending = self.lock()?;
        let mut batch = Vec::new();
        let mut size = EMPTY_BATCH_LEN;
        for message in pending.iter() {
            size += message.encoded_len();
            if size > max_payload_size {
                break;
            }
            batch.push(message.clone());
        }
        Ok(batch)
    }

    /// The first pending message.
    pub fn front(&self) -> Option<BatchMessage> {
        self.lock().ok().and_then(|pending| pending.front().cloned())
    }

    /// Drops the first `count` messages once their batch was posted.
    pub(crate) fn advance(&self, count: usize) -> anyhow::Result<()> {
        let mut pending = self.lock()?;
        if count > pending.len() {
            bail!(
                "Cannot drop {count} posted messages, only {} pending",
                pending.len()
            )
        }
        pending.drain(..count);
        BATCH_POSTER_PENDING_MESSAGES.set(pending.len() as i64);
        Ok(())
    }
}
