//! Adversarial decorators. Each wraps a real provider and misbehaves in one configured way.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sov_da_interface::{DaError, DaReader, DaValidator, DaWriter, PreimageType, PreimagesMap};
use tracing::debug;

/// How a [`FaultyWriter`] misbehaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterFault {
    /// Asks for fallback whenever the caller allows it, and fails otherwise.
    RequestFallback,
    /// Fails every store with this error.
    Fail(DaError),
    /// Advertises `advertised` as its ceiling but rejects payloads above `actual`.
    UnderreportedCeiling {
        /// What `max_message_size` returns.
        advertised: usize,
        /// What stores actually accept.
        actual: usize,
    },
    /// The ceiling starts at `start` and drops by `step` after every successful store, never
    /// going below `floor`.
    ShrinkingCeiling {
        /// Initial ceiling.
        start: usize,
        /// Decrease per successful store.
        step: usize,
        /// Lowest ceiling.
        floor: usize,
    },
}

#[derive(Debug, Default)]
struct WriterLog {
    ceiling: Option<usize>,
    attempted: Vec<usize>,
    stored: Vec<Vec<u8>>,
}

/// A writer that injects [`WriterFault`]s in front of a real writer.
pub struct FaultyWriter {
    inner: Arc<dyn DaWriter>,
    fault: WriterFault,
    log: Mutex<WriterLog>,
}

impl FaultyWriter {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn DaWriter>, fault: WriterFault) -> Self {
        let ceiling = match fault {
            WriterFault::ShrinkingCeiling { start, .. } => Some(start),
            WriterFault::UnderreportedCeiling { actual, .. } => Some(actual),
            _ => None,
        };
        Self {
            inner,
            fault,
            log: Mutex::new(WriterLog {
                ceiling,
                ..Default::default()
            }),
        }
    }

    fn log(&self) -> std::sync::MutexGuard<'_, WriterLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sizes of every payload handed to this writer, in call order.
    pub fn attempted_sizes(&self) -> Vec<usize> {
        self.log().attempted.clone()
    }

    /// Payloads that were stored successfully, in call order.
    pub fn stored_payloads(&self) -> Vec<Vec<u8>> {
        self.log().stored.clone()
    }

    /// The ceiling currently enforced, if the fault imposes one.
    pub fn current_ceiling(&self) -> Option<usize> {
        self.log().ceiling
    }
}

#[async_trait]
impl DaWriter for FaultyWriter {
    async fn store(
        &self,
        payload: &[u8],
        timeout: u64,
        allow_fallback: bool,
    ) -> Result<Vec<u8>, DaError> {
        let ceiling = {
            let mut log = self.log();
            log.attempted.push(payload.len());
            log.ceiling
        };
        match &self.fault {
            WriterFault::RequestFallback if allow_fallback => {
                return Err(DaError::FallbackRequested("injected".to_string()))
            }
            WriterFault::RequestFallback => {
                return Err(DaError::Transport("injected failure".to_string()))
            }
            WriterFault::Fail(e) => return Err(e.clone()),
            _ => {}
        }
        if let Some(max) = ceiling.filter(|max| payload.len() > *max) {
            debug!(size = payload.len(), max, "Rejecting payload above injected ceiling");
            return Err(DaError::MessageTooLarge {
                size: payload.len(),
                max: Some(max),
            });
        }

        let cert = self.inner.store(payload, timeout, allow_fallback).await?;
        let mut log = self.log();
        log.stored.push(payload.to_vec());
        if let WriterFault::ShrinkingCeiling { step, floor, .. } = self.fault {
            log.ceiling = log.ceiling.map(|c| c.saturating_sub(step).max(floor));
        }
        Ok(cert)
    }

    async fn max_message_size(&self) -> Result<usize, DaError> {
        if let WriterFault::UnderreportedCeiling { advertised, .. } = self.fault {
            return Ok(advertised);
        }
        let ceiling = self.log().ceiling;
        match ceiling {
            Some(ceiling) => Ok(ceiling),
            None => self.inner.max_message_size().await,
        }
    }
}

/// A reader that returns altered payloads for a selected set of batches and honest ones
/// otherwise.
pub struct DivergentReader {
    inner: Arc<dyn DaReader>,
    batches: HashSet<u64>,
}

impl DivergentReader {
    /// Wraps `inner`, diverging on every batch in `batches`.
    pub fn new(inner: Arc<dyn DaReader>, batches: impl IntoIterator<Item = u64>) -> Self {
        Self {
            inner,
            batches: batches.into_iter().collect(),
        }
    }
}

#[async_trait]
impl DaReader for DivergentReader {
    fn header_bytes(&self) -> Vec<u8> {
        self.inner.header_bytes()
    }

    async fn recover_payload_from_batch(
        &self,
        batch_num: u64,
        batch_block_hash: [u8; 32],
        sequencer_msg: &[u8],
        preimages: Option<&mut PreimagesMap>,
        validate: bool,
    ) -> Result<Vec<u8>, DaError> {
        let mut payload = self
            .inner
            .recover_payload_from_batch(
                batch_num,
                batch_block_hash,
                sequencer_msg,
                preimages,
                validate,
            )
            .await?;
        if self.batches.contains(&batch_num) {
            match payload.last_mut() {
                Some(last) => *last ^= 0xff,
                None => payload.push(0),
            }
        }
        Ok(payload)
    }
}

/// A validator whose proofs have one byte flipped.
pub struct CorruptingValidator {
    inner: Arc<dyn DaValidator>,
    byte_index: usize,
}

impl CorruptingValidator {
    /// Wraps `inner`, flipping the byte at `byte_index` (wrapped to the proof length).
    pub fn new(inner: Arc<dyn DaValidator>, byte_index: usize) -> Self {
        Self { inner, byte_index }
    }

    fn corrupt(&self, mut proof: Vec<u8>) -> Vec<u8> {
        if !proof.is_empty() {
            let i = self.byte_index % proof.len();
            proof[i] ^= 0xff;
        }
        proof
    }
}

#[async_trait]
impl DaValidator for CorruptingValidator {
    async fn generate_proof(
        &self,
        preimage_type: PreimageType,
        hash: [u8; 32],
        offset: u64,
        certificate: &[u8],
    ) -> Result<Vec<u8>, DaError> {
        self.inner
            .generate_proof(preimage_type, hash, offset, certificate)
            .await
            .map(|proof| self.corrupt(proof))
    }

    async fn generate_certificate_validity_proof(
        &self,
        certificate: &[u8],
    ) -> Result<Vec<u8>, DaError> {
        self.inner
            .generate_certificate_validity_proof(certificate)
            .await
            .map(|proof| self.corrupt(proof))
    }
}
