use std::sync::Arc;

use async_trait::async_trait;
use sov_da_interface::{DaError, DaReader, ParentChain, PreimagesMap, SequencerMessage};
use tracing::{debug, warn};

use crate::registry::ReaderRegistry;

/// Recovers payloads of any registered scheme, pinned to a canonical parent chain block.
pub struct PayloadReconstructor {
    registry: ReaderRegistry,
    parent_chain: Arc<dyn ParentChain>,
}

impl std::fmt::Debug for PayloadReconstructor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadReconstructor")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl PayloadReconstructor {
    /// Dispatches through `registry` and checks block hashes against `parent_chain`.
    pub fn new(registry: ReaderRegistry, parent_chain: Arc<dyn ParentChain>) -> Self {
        Self {
            registry,
            parent_chain,
        }
    }

    /// The readers dispatched to.
    pub fn registry(&self) -> &ReaderRegistry {
        &self.registry
    }
}

#[async_trait]
impl DaReader for PayloadReconstructor {
    fn header_bytes(&self) -> Vec<u8> {
        self.registry.header_bytes()
    }

    async fn recover_payload_from_batch(
        &self,
        batch_num: u64,
        batch_block_hash: [u8; 32],
        sequencer_msg: &[u8],
        preimages: Option<&mut PreimagesMap>,
        validate: bool,
    ) -> Result<Vec<u8>, DaError> {
        let msg = SequencerMessage::parse(sequencer_msg)?;
        let header_byte = msg.header_byte().ok_or_else(|| {
            DaError::MalformedCertificate("sequencer message has an empty body".to_string())
        })?;
        let reader = self.registry.reader_for(header_byte).ok_or_else(|| {
            DaError::MalformedCertificate(format!(
                "no reader owns header byte 0x{header_byte:02x}"
            ))
        })?;

        self.parent_chain.ensure_canonical(&batch_block_hash).await?;
        let mut scratch = preimages.as_ref().map(|_| PreimagesMap::default());
        let recovered = reader
            .recover_payload_from_batch(
                batch_num,
                batch_block_hash,
                sequencer_msg,
                scratch.as_mut(),
                validate,
            )
            .await;
        // Whatever was read from a block that left the canonical chain, errors included, is
        // reported as the reorg.
        if let Err(e) = self.parent_chain.ensure_canonical(&batch_block_hash).await {
            warn!(
                batch_num,
                block_hash = hex::encode(batch_block_hash),
                reader = reader.label(),
                "Parent chain reorged during recovery"
            );
            return Err(e);
        }
        let payload = recovered?;

        if let (Some(map), Some(scratch)) = (preimages, scratch) {
            map.merge(scratch);
        }
        debug!(
            batch_num,
            reader = reader.label(),
            size = payload.len(),
            "Reconstructed batch payload"
        );
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use sov_da_interface::inline::encode_inline;
    use sov_da_interface::message::SequencerMessageHeader;
    use sov_da_interface::mocks::MockParentChain;

    use super::*;
    use crate::readers::InlineReader;
    use crate::registry::ReaderKind;

    fn reconstructor(chain: &MockParentChain) -> PayloadReconstructor {
        let mut registry = ReaderRegistry::default();
        registry
            .register(ReaderKind::Inline(InlineReader::new(1 << 20)))
            .unwrap();
        PayloadReconstructor::new(registry, Arc::new(chain.clone()))
    }

    fn inline_message(payload: &[u8]) -> Vec<u8> {
        SequencerMessage::encode(
            &SequencerMessageHeader::default(),
            &encode_inline(payload, 5).unwrap(),
        )
    }

    #[tokio::test]
    async fn reads_are_pinned_to_canonical_blocks() {
        let chain = MockParentChain::default();
        let reconstructor = reconstructor(&chain);
        let msg = inline_message(b"opaque bytes");

        assert!(matches!(
            reconstructor
                .recover_payload_from_batch(1, [7u8; 32], &msg, None, false)
                .await,
            Err(DaError::Reorged { .. })
        ));

        chain.add_block([7u8; 32]);
        assert_eq!(
            reconstructor
                .recover_payload_from_batch(1, [7u8; 32], &msg, None, false)
                .await
                .unwrap(),
            b"opaque bytes"
        );
    }

    #[tokio::test]
    async fn unknown_or_missing_header_byte_is_malformed() {
        let chain = MockParentChain::default();
        chain.add_block([1u8; 32]);
        let reconstructor = reconstructor(&chain);

        let header = SequencerMessageHeader::default();
        for body in [&[][..], &[0x42, 1, 2][..]] {
            let msg = SequencerMessage::encode(&header, body);
            assert!(matches!(
                reconstructor
                    .recover_payload_from_batch(0, [1u8; 32], &msg, None, false)
                    .await,
                Err(DaError::MalformedCertificate(_))
            ));
        }
    }
}
