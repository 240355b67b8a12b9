use std::sync::Arc;

use async_trait::async_trait;
use sov_da_interface::header::{BLOB_HASHES_HEADER_FLAG, BROTLI_MESSAGE_HEADER_BYTE};
use sov_da_interface::inline::decode_inline;
use sov_da_interface::message::validate_batch;
use sov_da_interface::preimage::record_if;
use sov_da_interface::{DaError, DaReader, PreimageType, PreimagesMap, SequencerMessage};
use tracing::debug;

/// Reads batches posted inline, brotli compressed.
#[derive(Debug, Clone, Copy)]
pub struct InlineReader {
    max_decompressed_size: usize,
}

impl InlineReader {
    /// Refuses bodies that decompress to more than `max_decompressed_size` bytes.
    pub fn new(max_decompressed_size: usize) -> Self {
        Self {
            max_decompressed_size,
        }
    }
}

#[async_trait]
impl DaReader for InlineReader {
    fn header_bytes(&self) -> Vec<u8> {
        vec![BROTLI_MESSAGE_HEADER_BYTE]
    }

    async fn recover_payload_from_batch(
        &self,
        batch_num: u64,
        _batch_block_hash: [u8; 32],
        sequencer_msg: &[u8],
        _preimages: Option<&mut PreimagesMap>,
        validate: bool,
    ) -> Result<Vec<u8>, DaError> {
        let msg = SequencerMessage::parse(sequencer_msg)?;
        let payload = decode_inline(msg.body, self.max_decompressed_size)?;
        if validate {
            validate_batch(&msg.header, &payload)?;
        }
        debug!(batch_num, size = payload.len(), "Recovered inline payload");
        Ok(payload)
    }
}

/// Source of the blobs attached to parent chain blocks.
#[async_trait]
pub trait BlobFetcher: Send + Sync {
    /// Returns the blobs with the given versioned hashes, in the same order, as attached to
    /// block `batch_block_hash`.
    async fn get_blobs(
        &self,
        batch_block_hash: [u8; 32],
        versioned_hashes: &[[u8; 32]],
    ) -> Result<Vec<Vec<u8>>, DaError>;
}

/// Reads batches whose data was posted in blobs. The body lists the blobs' versioned hashes.
#[derive(Clone)]
pub struct BlobHashesReader {
    fetcher: Arc<dyn BlobFetcher>,
}

impl std::fmt::Debug for BlobHashesReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobHashesReader").finish_non_exhaustive()
    }
}

impl BlobHashesReader {
    /// Creates a reader fetching blobs from `fetcher`.
    pub fn new(fetcher: Arc<dyn BlobFetcher>) -> Self {
        Self { fetcher }
    }
}

fn versioned_hashes(body: &[u8]) -> Result<Vec<[u8; 32]>, DaError> {
    let hashes = match body.split_first() {
        Some((&BLOB_HASHES_HEADER_FLAG, hashes)) => hashes,
        _ => {
            return Err(DaError::MalformedCertificate(
                "body does not start with the blob hashes header byte".to_string(),
            ))
        }
    };
    if hashes.is_empty() || hashes.len() % 32 != 0 {
        return Err(DaError::MalformedCertificate(format!(
            "blob hash list of {} bytes is not a non-empty multiple of 32",
            hashes.len()
        )));
    }
    Ok(hashes
        .chunks_exact(32)
        .map(|chunk| {
            let mut hash = [0u8; 32];
            hash.copy_from_slice(chunk);
            hash
        })
        .collect())
}

#[async_trait]
impl DaReader for BlobHashesReader {
    fn header_bytes(&self) -> Vec<u8> {
        vec![BLOB_HASHES_HEADER_FLAG]
    }

    async fn recover_payload_from_batch(
        &self,
        batch_num: u64,
        batch_block_hash: [u8; 32],
        sequencer_msg: &[u8],
        mut preimages: Option<&mut PreimagesMap>,
        validate: bool,
    ) -> Result<Vec<u8>, DaError> {
        let msg = SequencerMessage::parse(sequencer_msg)?;
        let hashes = versioned_hashes(msg.body)?;
        let blobs = self.fetcher.get_blobs(batch_block_hash, &hashes).await?;
        if blobs.len() != hashes.len() {
            return Err(DaError::VerificationFailed(format!(
                "fetched {} blobs for {} versioned hashes",
                blobs.len(),
                hashes.len()
            )));
        }

        let mut payload = Vec::with_capacity(blobs.iter().map(Vec::len).sum());
        for (hash, blob) in hashes.iter().zip(&blobs) {
            record_if(&mut preimages, PreimageType::EthVersionedHash, *hash, blob);
            payload.extend_from_slice(blob);
        }

        if validate {
            validate_batch(&msg.header, &payload)?;
        }
        debug!(
            batch_num,
            blobs = blobs.len(),
            size = payload.len(),
            "Recovered payload from blobs"
        );
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use sov_da_interface::inline::encode_inline;
    use sov_da_interface::message::{encode_batch, SequencerMessageHeader};
    use sov_da_interface::BatchMessage;

    use super::*;

    fn batch() -> (SequencerMessageHeader, Vec<u8>) {
        let messages = vec![BatchMessage {
            timestamp: 1_700_000_000,
            block_number: 12,
            delayed_messages_read: 3,
            data: b"inline batch inline batch inline batch".to_vec(),
        }];
        (
            SequencerMessageHeader::bounding(&messages, 3),
            encode_batch(&messages).unwrap(),
        )
    }

    #[tokio::test]
    async fn inline_payload_is_decompressed_and_validated() {
        let (header, payload) = batch();
        let msg = SequencerMessage::encode(&header, &encode_inline(&payload, 11).unwrap());
        let reader = InlineReader::new(1 << 20);
        assert_eq!(
            reader
                .recover_payload_from_batch(0, [0u8; 32], &msg, None, true)
                .await
                .unwrap(),
            payload
        );

        let narrow = SequencerMessageHeader {
            max_timestamp: header.min_timestamp - 1,
            min_timestamp: header.min_timestamp - 2,
            ..header
        };
        let msg = SequencerMessage::encode(&narrow, &encode_inline(&payload, 11).unwrap());
        assert!(matches!(
            reader
                .recover_payload_from_batch(0, [0u8; 32], &msg, None, true)
                .await,
            Err(DaError::MalformedPayload(_))
        ));
    }

    #[test]
    fn blob_hash_lists_must_be_whole_hashes() {
        assert_eq!(
            versioned_hashes(&[&[BLOB_HASHES_HEADER_FLAG][..], &[7u8; 64]].concat()).unwrap(),
            vec![[7u8; 32], [7u8; 32]]
        );
        assert!(matches!(
            versioned_hashes(&[BLOB_HASHES_HEADER_FLAG]),
            Err(DaError::MalformedCertificate(_))
        ));
        assert!(matches!(
            versioned_hashes(&[&[BLOB_HASHES_HEADER_FLAG][..], &[7u8; 33]].concat()),
            Err(DaError::MalformedCertificate(_))
        ));
    }
}
