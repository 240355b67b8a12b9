use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use sov_da_interface::message::encode_batch;
use sov_da_interface::{
    unix_now, BatchMessage, DaError, DaWriter, SequencerMessage, SequencerMessageHeader,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::BatchPosterConfig;
use crate::metrics::{
    BATCH_POSTER_DEFERRALS, BATCH_POSTER_FALLBACKS, BATCH_POSTER_POSTS, BATCH_POSTER_RESIZES,
};
use crate::queue::MessageQueue;
use crate::writers::{OnChainWriter, WriterKind};

/// The inbox contract sequencer messages are posted to.
#[async_trait]
pub trait InboxSink: Send + Sync {
    /// Submits one sequencer message: 40-byte header followed by the writer's body.
    async fn post_sequencer_message(&self, sequencer_msg: Vec<u8>) -> Result<(), DaError>;
}

/// Which writer produced a posted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostedBy {
    /// The off-chain writer at `index` of the chain.
    Writer {
        /// Position in the chain.
        index: usize,
        /// Kind of the writer.
        kind: &'static str,
    },
    /// The inline fallback.
    OnChain,
}

/// A batch accepted by the inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedBatch {
    /// Who stored the payload.
    pub posted_by: PostedBy,
    /// Number of queue messages the batch carries.
    pub message_count: usize,
    /// The bytes handed to the inbox.
    pub sequencer_msg: Vec<u8>,
}

/// Result of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    /// The queue was empty.
    Idle,
    /// A batch was posted.
    Posted(PostedBatch),
    /// Every off-chain writer failed and on-chain fallback is disabled. The messages stay
    /// queued.
    Deferred {
        /// Why the last writer failed.
        reason: String,
    },
}

#[derive(Debug, Default)]
struct PosterState {
    on_chain_batches_remaining: u32,
}

/// Drives the writer chain.
pub struct BatchPoster {
    config: BatchPosterConfig,
    queue: Arc<MessageQueue>,
    writers: RwLock<Arc<Vec<WriterKind>>>,
    on_chain: OnChainWriter,
    inbox: Arc<dyn InboxSink>,
    state: Mutex<PosterState>,
}

impl std::fmt::Debug for BatchPoster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchPoster")
            .field("writers", &self.writers_snapshot())
            .field("pending", &self.queue.len())
            .finish_non_exhaustive()
    }
}

fn label(posted_by: PostedBy) -> &'static str {
    match posted_by {
        PostedBy::Writer { kind, .. } => kind,
        PostedBy::OnChain => "on_chain",
    }
}

impl BatchPoster {
    /// Creates a poster over `writers`, highest priority first.
    pub fn new(
        config: BatchPosterConfig,
        writers: Vec<WriterKind>,
        inbox: Arc<dyn InboxSink>,
    ) -> Self {
        let on_chain =
            OnChainWriter::new(config.max_on_chain_batch_size, config.compression_level);
        Self {
            queue: Arc::new(MessageQueue::new(config.max_pending_messages)),
            writers: RwLock::new(Arc::new(writers)),
            on_chain,
            inbox,
            state: Mutex::new(PosterState::default()),
            config,
        }
    }

    /// Connects every configured writer.
    pub async fn from_config(
        config: BatchPosterConfig,
        inbox: Arc<dyn InboxSink>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Self> {
        let mut writers = Vec::with_capacity(config.writers.len());
        for writer in &config.writers {
            writers.push(WriterKind::from_config(writer, cancel.clone()).await?);
        }
        Ok(Self::new(config, writers, inbox))
    }

    /// The queue producers append to.
    pub fn queue(&self) -> Arc<MessageQueue> {
        self.queue.clone()
    }

    /// Replaces the whole writer chain. A cycle already running finishes with the old chain.
    pub fn replace_writers(&self, writers: Vec<WriterKind>) {
        info!(
            writers = ?writers.iter().map(WriterKind::label).collect::<Vec<_>>(),
            "Replacing writer chain"
        );
        match self.writers.write() {
            Ok(mut current) => *current = Arc::new(writers),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(writers),
        }
    }

    fn writers_snapshot(&self) -> Arc<Vec<WriterKind>> {
        match self.writers.read() {
            Ok(writers) => writers.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn ceiling_of(&self, writer: &WriterKind) -> usize {
        match writer.max_message_size().await {
            Ok(size) if size > 0 => size,
            Ok(_) => self.config.default_max_message_size,
            Err(e) => {
                warn!(
                    writer = writer.label(),
                    error = %e,
                    default = self.config.default_max_message_size,
                    "Writer did not report its size ceiling"
                );
                self.config.default_max_message_size
            }
        }
    }

    /// Builds and posts at most one batch.
    ///
    /// Fails if the batch could be neither stored nor deferred, for instance when the inbox
    /// rejects it. The messages stay queued in that case.
    pub async fn post_next_batch(&self) -> Result<PostOutcome, DaError> {
        let mut state = self.state.lock().await;
        if self.queue.is_empty() {
            return Ok(PostOutcome::Idle);
        }
        let writers = self.writers_snapshot();

        if writers.is_empty() {
            return self.post_on_chain(&mut state).await;
        }
        if state.on_chain_batches_remaining > 0 && !self.config.disable_on_chain_fallback {
            debug!(
                remaining = state.on_chain_batches_remaining,
                "Posting on-chain until the fallback period ends"
            );
            return self.post_on_chain(&mut state).await;
        }

        let failure = match self.try_writers(&writers).await? {
            Ok(posted) => return Ok(PostOutcome::Posted(posted)),
            Err(failure) => failure,
        };

        if self.config.disable_on_chain_fallback {
            BATCH_POSTER_DEFERRALS.inc();
            warn!(
                reason = %failure,
                pending = self.queue.len(),
                "All DA writers failed and on-chain fallback is disabled, deferring batch"
            );
            return Ok(PostOutcome::Deferred {
                reason: failure.to_string(),
            });
        }
        BATCH_POSTER_FALLBACKS.with_label_values(&["chain"]).inc();
        info!(
            reason = %failure,
            fallback_batches = self.config.on_chain_fallback_batch_count,
            "DA writers exhausted, falling back to on-chain posting"
        );
        state.on_chain_batches_remaining = self.config.on_chain_fallback_batch_count;
        self.post_on_chain(&mut state).await
    }

    /// Walks the chain. The outer error aborts the cycle; the inner one is the failure handed
    /// to the fallback policy.
    async fn try_writers(
        &self,
        writers: &[WriterKind],
    ) -> Result<Result<PostedBatch, DaError>, DaError> {
        let mut index = 0;
        // ceiling learned from the last rejection of the current writer
        let mut reported: Option<usize> = None;
        loop {
            let writer = &writers[index];
            let has_next = index + 1 < writers.len();
            let allow_fallback = has_next || !self.config.disable_on_chain_fallback;

            let live = self.ceiling_of(writer).await;
            let ceiling = reported.map_or(live, |reported| reported.min(live));
            let messages = self.build(ceiling)?;

            let failure = if messages.is_empty() {
                DaError::MessageTooLarge {
                    size: self
                        .queue
                        .front()
                        .map(|m| m.encoded_len())
                        .unwrap_or_default(),
                    max: Some(ceiling),
                }
            } else {
                let payload = encode_batch(&messages)?;
                debug!(
                    writer = writer.label(),
                    index,
                    size = payload.len(),
                    messages = messages.len(),
                    ceiling,
                    "Storing batch"
                );
                let timeout = unix_now() + self.config.retention_period_secs;
                match writer.store(&payload, timeout, allow_fallback).await {
                    Ok(body) => {
                        let posted_by = PostedBy::Writer {
                            index,
                            kind: writer.label(),
                        };
                        return self.publish(posted_by, &messages, &body).await.map(Ok);
                    }
                    Err(DaError::MessageTooLarge { size, max }) => {
                        let next = max.unwrap_or(size).min(payload.len() - 1);
                        BATCH_POSTER_RESIZES.inc();
                        info!(
                            writer = writer.label(),
                            index,
                            size = payload.len(),
                            next_ceiling = next,
                            "Writer rejected batch size, rebuilding smaller"
                        );
                        reported = Some(next);
                        continue;
                    }
                    Err(DaError::Cancelled) => return Err(DaError::Cancelled),
                    Err(e @ DaError::FallbackRequested(_)) => e,
                    Err(e) => {
                        error!(writer = writer.label(), index, error = %e, "DA writer failed");
                        return Ok(Err(e));
                    }
                }
            };

            if !has_next {
                return Ok(Err(failure));
            }
            BATCH_POSTER_FALLBACKS
                .with_label_values(&[writer.label()])
                .inc();
            warn!(
                writer = writer.label(),
                index,
                reason = %failure,
                next = writers[index + 1].label(),
                "Falling back to the next DA writer"
            );
            index += 1;
            reported = None;
        }
    }

    fn build(&self, ceiling: usize) -> Result<Vec<BatchMessage>, DaError> {
        Ok(self.queue.peek_batch(ceiling)?)
    }

    async fn post_on_chain(&self, state: &mut PosterState) -> Result<PostOutcome, DaError> {
        let ceiling = self.on_chain.max_message_size().await?;
        let messages = self.build(ceiling)?;
        if messages.is_empty() {
            return Err(DaError::Internal(format!(
                "pending message does not fit the on-chain ceiling of {ceiling} bytes"
            )));
        }
        let payload = encode_batch(&messages)?;
        let body = self.on_chain.store(&payload, 0, false).await?;
        let posted = self.publish(PostedBy::OnChain, &messages, &body).await?;
        state.on_chain_batches_remaining = state.on_chain_batches_remaining.saturating_sub(1);
        if state.on_chain_batches_remaining == 0 && !self.writers_snapshot().is_empty() {
            info!("On-chain fallback period complete, will retry DA writers");
        }
        Ok(PostOutcome::Posted(posted))
    }

    async fn publish(
        &self,
        posted_by: PostedBy,
        messages: &[BatchMessage],
        body: &[u8],
    ) -> Result<PostedBatch, DaError> {
        let after_delayed = messages
            .last()
            .map(|m| m.delayed_messages_read)
            .unwrap_or_default();
        let header = SequencerMessageHeader::bounding(messages, after_delayed);
        let sequencer_msg = SequencerMessage::encode(&header, body);
        self.inbox
            .post_sequencer_message(sequencer_msg.clone())
            .await?;
        self.queue.advance(messages.len())?;

        BATCH_POSTER_POSTS.with_label_values(&[label(posted_by)]).inc();
        info!(
            writer = label(posted_by),
            messages = messages.len(),
            size = sequencer_msg.len(),
            "Posted batch"
        );
        Ok(PostedBatch {
            posted_by,
            message_count: messages.len(),
            sequencer_msg,
        })
    }

    /// Posts batches until `cancel` fires, pausing whenever a cycle posted nothing.
    pub async fn run(&self, cancel: CancellationToken) {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        info!(writers = self.writers_snapshot().len(), "Starting batch poster");
        while !cancel.is_cancelled() {
            let pause = match self.post_next_batch().await {
                Ok(PostOutcome::Posted(_)) => false,
                Ok(PostOutcome::Idle | PostOutcome::Deferred { .. }) => true,
                Err(DaError::Cancelled) => break,
                Err(e) => {
                    error!(error = %e, "Batch posting failed");
                    true
                }
            };
            if pause {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        }
        info!(pending = self.queue.len(), "Batch poster stopped");
    }
}
