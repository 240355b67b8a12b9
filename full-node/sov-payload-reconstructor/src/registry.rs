use std::collections::BTreeMap;
#[cfg(feature = "test-utils")]
use std::sync::Arc;

use async_trait::async_trait;
use sov_anytrust_adapter::AnyTrustReader;
use sov_da_interface::header::HeaderByteClaims;
use sov_da_interface::{DaError, DaReader, PreimagesMap};
use sov_external_da_adapter::ExternalProviderClient;
#[cfg(feature = "test-utils")]
use sov_reference_da::{faults::DivergentReader, ReferenceDaProvider};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ReconstructorConfig;
use crate::readers::{BlobHashesReader, InlineReader};

/// A reader a header byte can be dispatched to.
#[derive(Clone)]
pub enum ReaderKind {
    /// Quorum certificates.
    AnyTrust(AnyTrustReader),
    /// Certificates of an out of process provider.
    External(ExternalProviderClient),
    /// Brotli compressed data posted inline.
    Inline(InlineReader),
    /// Versioned hashes of blobs.
    BlobHashes(BlobHashesReader),
    /// The in-process reference provider.
    #[cfg(feature = "test-utils")]
    Reference(ReferenceDaProvider),
    /// A decorator returning altered payloads for selected batches.
    #[cfg(feature = "test-utils")]
    Divergent(Arc<DivergentReader>),
}

impl std::fmt::Debug for ReaderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl ReaderKind {
    /// Label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AnyTrust(_) => "anytrust",
            Self::External(_) => "external",
            Self::Inline(_) => "inline",
            Self::BlobHashes(_) => "blob_hashes",
            #[cfg(feature = "test-utils")]
            Self::Reference(_) => "reference",
            #[cfg(feature = "test-utils")]
            Self::Divergent(_) => "divergent",
        }
    }
}

#[async_trait]
impl DaReader for ReaderKind {
    fn header_bytes(&self) -> Vec<u8> {
        match self {
            Self::AnyTrust(reader) => reader.header_bytes(),
            Self::External(reader) => reader.header_bytes(),
            Self::Inline(reader) => reader.header_bytes(),
            Self::BlobHashes(reader) => reader.header_bytes(),
            #[cfg(feature = "test-utils")]
            Self::Reference(reader) => reader.header_bytes(),
            #[cfg(feature = "test-utils")]
            Self::Divergent(reader) => reader.header_bytes(),
        }
    }

    async fn recover_payload_from_batch(
        &self,
        batch_num: u64,
        batch_block_hash: [u8; 32],
        sequencer_msg: &[u8],
        preimages: Option<&mut PreimagesMap>,
        validate: bool,
    ) -> Result<Vec<u8>, DaError> {
        match self {
            Self::AnyTrust(reader) => {
                reader
                    .recover_payload_from_batch(
                        batch_num,
                        batch_block_hash,
                        sequencer_msg,
                        preimages,
                        validate,
                    )
                    .await
            }
            Self::External(reader) => {
                reader
                    .recover_payload_from_batch(
                        batch_num,
                        batch_block_hash,
                        sequencer_msg,
                        preimages,
                        validate,
                    )
                    .await
            }
            Self::Inline(reader) => {
                reader
                    .recover_payload_from_batch(
                        batch_num,
                        batch_block_hash,
                        sequencer_msg,
                        preimages,
                        validate,
                    )
                    .await
            }
            Self::BlobHashes(reader) => {
                reader
                    .recover_payload_from_batch(
                        batch_num,
                        batch_block_hash,
                        sequencer_msg,
                        preimages,
                        validate,
                    )
                    .await
            }
            #[cfg(feature = "test-utils")]
            Self::Reference(reader) => {
                reader
                    .recover_payload_from_batch(
                        batch_num,
                        batch_block_hash,
                        sequencer_msg,
                        preimages,
                        validate,
                    )
                    .await
            }
            #[cfg(feature = "test-utils")]
            Self::Divergent(reader) => {
                reader
                    .recover_payload_from_batch(
                        batch_num,
                        batch_block_hash,
                        sequencer_msg,
                        preimages,
                        validate,
                    )
                    .await
            }
        }
    }

    async fn collect_preimages(
        &self,
        batch_num: u64,
        batch_block_hash: [u8; 32],
        sequencer_msg: &[u8],
    ) -> Result<PreimagesMap, DaError> {
        match self {
            Self::External(reader) => {
                reader
                    .collect_preimages(batch_num, batch_block_hash, sequencer_msg)
                    .await
            }
            _ => {
                let mut preimages = PreimagesMap::default();
                self.recover_payload_from_batch(
                    batch_num,
                    batch_block_hash,
                    sequencer_msg,
                    Some(&mut preimages),
                    false,
                )
                .await?;
                Ok(preimages)
            }
        }
    }
}

/// Maps every header byte to the one reader that owns it.
#[derive(Debug, Clone, Default)]
pub struct ReaderRegistry {
    readers: Vec<ReaderKind>,
    by_header_byte: BTreeMap<u8, usize>,
    claims: HeaderByteClaims,
}

impl ReaderRegistry {
    /// Registers the inline reader and connects every configured external provider.
    pub async fn from_config(
        config: &ReconstructorConfig,
        cancel: CancellationToken,
    ) -> anyhow::Result<Self> {
        let mut registry = Self::default();
        registry.register(ReaderKind::Inline(InlineReader::new(
            config.max_decompressed_size,
        )))?;
        for provider in &config.external_providers {
            let client = ExternalProviderClient::connect(provider, cancel.clone()).await?;
            registry.register(ReaderKind::External(client))?;
        }
        Ok(registry)
    }

    /// Adds `reader`. Fails, registering nothing, if any of its header bytes is already owned.
    pub fn register(&mut self, reader: ReaderKind) -> Result<(), DaError> {
        let header_bytes = reader.header_bytes();
        self.claims.claim(reader.label(), &header_bytes)?;
        info!(
            reader = reader.label(),
            header_bytes = hex::encode(&header_bytes),
            "Registered DA reader"
        );
        let index = self.readers.len();
        for byte in header_bytes {
            self.by_header_byte.insert(byte, index);
        }
        self.readers.push(reader);
        Ok(())
    }

    /// The reader owning `header_byte`.
    pub fn reader_for(&self, header_byte: u8) -> Option<&ReaderKind> {
        self.by_header_byte
            .get(&header_byte)
            .and_then(|index| self.readers.get(*index))
    }

    /// Every registered header byte, in ascending order.
    pub fn header_bytes(&self) -> Vec<u8> {
        self.by_header_byte.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sov_da_interface::header::{BLOB_HASHES_HEADER_FLAG, BROTLI_MESSAGE_HEADER_BYTE};

    use super::*;
    use crate::readers::BlobFetcher;

    struct NoBlobs;

    #[async_trait]
    impl BlobFetcher for NoBlobs {
        async fn get_blobs(
            &self,
            _batch_block_hash: [u8; 32],
            versioned_hashes: &[[u8; 32]],
        ) -> Result<Vec<Vec<u8>>, DaError> {
            Err(DaError::not_found(&versioned_hashes[0]))
        }
    }

    #[test]
    fn header_bytes_dispatch_to_their_owner() {
        let mut registry = ReaderRegistry::default();
        registry
            .register(ReaderKind::Inline(InlineReader::new(1024)))
            .unwrap();
        registry
            .register(ReaderKind::BlobHashes(BlobHashesReader::new(Arc::new(NoBlobs))))
            .unwrap();

        assert_eq!(
            registry.header_bytes(),
            vec![BROTLI_MESSAGE_HEADER_BYTE, BLOB_HASHES_HEADER_FLAG]
        );
        assert!(matches!(
            registry.reader_for(BLOB_HASHES_HEADER_FLAG),
            Some(ReaderKind::BlobHashes(_))
        ));
        assert!(registry.reader_for(0x80).is_none());
    }

    #[test]
    fn overlapping_reader_is_refused() {
        let mut registry = ReaderRegistry::default();
        registry
            .register(ReaderKind::Inline(InlineReader::new(1024)))
            .unwrap();
        assert!(registry
            .register(ReaderKind::Inline(InlineReader::new(2048)))
            .is_err());
        assert_eq!(registry.readers.len(), 1);
    }
}
