use std::sync::Arc;

use async_trait::async_trait;
use sov_anytrust_adapter::{Aggregator, AnyTrustWriter};
use sov_da_interface::inline::encode_inline;
use sov_da_interface::{DaError, DaWriter};
use sov_external_da_adapter::ExternalProviderClient;
#[cfg(feature = "test-utils")]
use sov_reference_da::{faults::FaultyWriter, ReferenceDaProvider};
use tokio_util::sync::CancellationToken;

use crate::config::WriterConfig;

/// An off-chain writer of the chain.
#[derive(Clone)]
pub enum WriterKind {
    /// A quorum committee.
    AnyTrust(AnyTrustWriter),
    /// An out of process provider.
    External(ExternalProviderClient),
    /// The in-process reference provider.
    #[cfg(feature = "test-utils")]
    Reference(ReferenceDaProvider),
    /// A fault-injecting decorator.
    #[cfg(feature = "test-utils")]
    Faulty(Arc<FaultyWriter>),
}

impl std::fmt::Debug for WriterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl WriterKind {
    /// Connects the writer described by `config`. Its requests are abandoned once `cancel`
    /// fires.
    pub async fn from_config(
        config: &WriterConfig,
        cancel: CancellationToken,
    ) -> anyhow::Result<Self> {
        match config {
            WriterConfig::AnyTrust(aggregator) => {
                let aggregator = Aggregator::from_config(aggregator)?;
                Ok(Self::AnyTrust(AnyTrustWriter::new(
                    Arc::new(aggregator),
                    cancel,
                )))
            }
            WriterConfig::External(provider) => Ok(Self::External(
                ExternalProviderClient::connect(provider, cancel).await?,
            )),
        }
    }

    /// Label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AnyTrust(_) => "anytrust",
            Self::External(_) => "external",
            #[cfg(feature = "test-utils")]
            Self::Reference(_) => "reference",
            #[cfg(feature = "test-utils")]
            Self::Faulty(_) => "faulty",
        }
    }
}

#[async_trait]
impl DaWriter for WriterKind {
    async fn store(
        &self,
        payload: &[u8],
        timeout: u64,
        allow_fallback: bool,
    ) -> Result<Vec<u8>, DaError> {
        match self {
            Self::AnyTrust(writer) => writer.store(payload, timeout, allow_fallback).await,
            Self::External(writer) => writer.store(payload, timeout, allow_fallback).await,
            #[cfg(feature = "test-utils")]
            Self::Reference(writer) => writer.store(payload, timeout, allow_fallback).await,
            #[cfg(feature = "test-utils")]
            Self::Faulty(writer) => writer.store(payload, timeout, allow_fallback).await,
        }
    }

    async fn max_message_size(&self) -> Result<usize, DaError> {
        match self {
            Self::AnyTrust(writer) => writer.max_message_size().await,
            Self::External(writer) => writer.max_message_size().await,
            #[cfg(feature = "test-utils")]
            Self::Reference(writer) => writer.max_message_size().await,
            #[cfg(feature = "test-utils")]
            Self::Faulty(writer) => writer.max_message_size().await,
        }
    }
}

/// Posts batches inline, brotli compressed. Always available.
#[derive(Debug, Clone, Copy)]
pub struct OnChainWriter {
    max_batch_size: usize,
    compression_level: u32,
}

impl OnChainWriter {
    /// Accepts payloads of up to `max_batch_size` bytes.
    pub fn new(max_batch_size: usize, compression_level: u32) -> Self {
        Self {
            max_batch_size,
            compression_level,
        }
    }
}

#[async_trait]
impl DaWriter for OnChainWriter {
    async fn store(
        &self,
        payload: &[u8],
        _timeout: u64,
        _allow_fallback: bool,
    ) -> Result<Vec<u8>, DaError> {
        if payload.len() > self.max_batch_size {
            return Err(DaError::MessageTooLarge {
                size: payload.len(),
                max: Some(self.max_batch_size),
            });
        }
        encode_inline(payload, self.compression_level)
    }

    async fn max_message_size(&self) -> Result<usize, DaError> {
        Ok(self.max_batch_size)
    }
}

#[cfg(test)]
mod tests {
    use sov_da_interface::header::BROTLI_MESSAGE_HEADER_BYTE;
    use sov_da_interface::inline::decode_inline;

    use super::*;

    #[tokio::test]
    async fn inline_batches_decompress_to_the_payload() {
        let writer = OnChainWriter::new(1024, 11);
        let payload = vec![7u8; 1000];
        let body = writer.store(&payload, 0, false).await.unwrap();
        assert_eq!(body[0], BROTLI_MESSAGE_HEADER_BYTE);
        assert!(body.len() < payload.len());
        assert_eq!(decode_inline(&body, 1024).unwrap(), payload);
    }

    #[tokio::test]
    async fn oversized_inline_batch_reports_the_ceiling() {
        let writer = OnChainWriter::new(10, 11);
        assert_eq!(
            writer.store(&[0u8; 11], 0, false).await,
            Err(DaError::MessageTooLarge {
                size: 11,
                max: Some(10),
            })
        );
    }
}
