use std::sync::Arc;

use async_trait::async_trait;
use sov_da_interface::{DaError, DaWriter};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::aggregator::Aggregator;

/// The quorum writer behind the [`DaWriter`] contract.
#[derive(Debug, Clone)]
pub struct AnyTrustWriter {
    aggregator: Arc<Aggregator>,
    cancel: CancellationToken,
}

impl AnyTrustWriter {
    /// Wraps `aggregator`. Stores in flight are abandoned once `cancel` fires.
    pub fn new(aggregator: Arc<Aggregator>, cancel: CancellationToken) -> Self {
        Self { aggregator, cancel }
    }
}

#[async_trait]
impl DaWriter for AnyTrustWriter {
    async fn store(
        &self,
        payload: &[u8],
        timeout: u64,
        allow_fallback: bool,
    ) -> Result<Vec<u8>, DaError> {
        let max = self.aggregator.max_message_size();
        if payload.len() > max {
            return Err(DaError::MessageTooLarge {
                size: payload.len(),
                max: Some(max),
            });
        }
        match self.aggregator.store(payload, timeout, &self.cancel).await {
            Ok(cert) => Ok(cert.serialize()),
            Err(e @ (DaError::QuorumNotReached { .. } | DaError::TimeoutExceeded(_)))
                if allow_fallback =>
            {
                warn!(error = %e, "Committee store failed, requesting fallback");
                Err(DaError::FallbackRequested(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn max_message_size(&self) -> Result<usize, DaError> {
        Ok(self.aggregator.max_message_size())
    }
}
