use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rand::RngCore;
use sov_anytrust_adapter::bls::BlsPrivateKey;
use sov_anytrust_adapter::{
    Aggregator, AggregatorConfig, AnyTrustReader, AnyTrustWriter, BackendConfig,
    CertificateVerifier, DasBackend, InMemoryKeysetRegistry, StorageFetcher, StorageNode,
    MIN_CERTIFICATE_LIFETIME_SECS,
};
use sov_blob_store::{MemoryBlobStore, RetentionConfig, StorageService};
use sov_da_interface::hash::{keccak256, sha256};
use sov_da_interface::inline::encode_inline;
use sov_da_interface::message::{encode_batch, SequencerMessageHeader};
use sov_da_interface::mocks::MockParentChain;
use sov_da_interface::{
    tree, unix_now, BatchMessage, DaError, DaReader, DaWriter, PreimageType, PreimagesMap,
    SequencerMessage,
};
use sov_payload_reconstructor::{
    BlobFetcher, BlobHashesReader, InlineReader, PayloadReconstructor, ReaderKind,
    ReaderRegistry,
};
use sov_reference_da::faults::DivergentReader;
use sov_reference_da::{ReferenceDaConfig, ReferenceDaProvider};
use tokio_util::sync::CancellationToken;

const BLOCK: [u8; 32] = [0xb1; 32];

#[derive(Default)]
struct MemoryBlobs {
    blobs: HashMap<[u8; 32], Vec<u8>>,
    reorg_on_fetch: Option<MockParentChain>,
}

impl MemoryBlobs {
    /// Attaches `data` as one blob and returns its versioned hash.
    fn attach(&mut self, data: Vec<u8>) -> [u8; 32] {
        let mut hash = sha256(&data);
        hash[0] = 0x01;
        self.blobs.insert(hash, data);
        hash
    }
}

#[async_trait]
impl BlobFetcher for MemoryBlobs {
    async fn get_blobs(
        &self,
        batch_block_hash: [u8; 32],
        versioned_hashes: &[[u8; 32]],
    ) -> Result<Vec<Vec<u8>>, DaError> {
        if let Some(chain) = &self.reorg_on_fetch {
            chain.reorg_out(&batch_block_hash);
        }
        versioned_hashes
            .iter()
            .map(|hash| {
                self.blobs
                    .get(hash)
                    .cloned()
                    .ok_or_else(|| DaError::not_found(hash))
            })
            .collect()
    }
}

fn batch() -> (SequencerMessageHeader, Vec<u8>) {
    let now = unix_now();
    let mut data = vec![0u8; 3_000];
    rand::thread_rng().fill_bytes(&mut data);
    let messages = vec![
        BatchMessage {
            timestamp: now - 10,
            block_number: 90,
            delayed_messages_read: 2,
            data,
        },
        BatchMessage {
            timestamp: now,
            block_number: 91,
            delayed_messages_read: 2,
            data: b"second message".to_vec(),
        },
    ];
    (
        SequencerMessageHeader::bounding(&messages, 2),
        encode_batch(&messages).unwrap(),
    )
}

struct Committee {
    writer: AnyTrustWriter,
    reader: AnyTrustReader,
}

fn committee(store: Arc<MemoryBlobStore>) -> Committee {
    let node = StorageNode::new(
        BlsPrivateKey::from_seed(&[5u8; 32]).unwrap(),
        store.clone(),
        1 << 20,
    );
    let config = AggregatorConfig {
        assumed_honest: 1,
        backends: vec![BackendConfig {
            url: "in-process".to_string(),
            pubkey: hex::encode(node.public_key().to_bytes()),
            signer_index: 0,
        }],
        request_timeout_secs: 5,
        enable_chunked_store: false,
        streamer: Default::default(),
        max_message_size: 1 << 20,
    };
    let aggregator =
        Aggregator::new(&config, vec![Arc::new(node) as Arc<dyn DasBackend>]).unwrap();

    let keysets = InMemoryKeysetRegistry::default();
    keysets.register(config.keyset().unwrap(), 0).unwrap();
    Committee {
        writer: AnyTrustWriter::new(Arc::new(aggregator), CancellationToken::new()),
        reader: AnyTrustReader::new(
            CertificateVerifier::new(Arc::new(keysets)),
            Arc::new(StorageFetcher::new(store as Arc<dyn StorageService>)),
        ),
    }
}

fn far_timeout() -> u64 {
    unix_now() + MIN_CERTIFICATE_LIFETIME_SECS + 3_600
}

#[tokio::test]
async fn every_scheme_round_trips_through_one_reconstructor() {
    let chain = MockParentChain::default();
    chain.add_block(BLOCK);

    let shared = Arc::new(MemoryBlobStore::new(RetentionConfig::default()));
    let reference = ReferenceDaProvider::new(
        shared.clone(),
        ReferenceDaConfig {
            max_message_size: 1 << 20,
        },
    );
    let committee = committee(Arc::new(MemoryBlobStore::new(RetentionConfig::default())));

    let (header, payload) = batch();
    let mut blobs = MemoryBlobs::default();
    let half = payload.len() / 2;
    let first_blob = blobs.attach(payload[..half].to_vec());
    let second_blob = blobs.attach(payload[half..].to_vec());

    let mut registry = ReaderRegistry::default();
    for reader in [
        ReaderKind::Inline(InlineReader::new(1 << 20)),
        ReaderKind::Reference(reference.clone()),
        ReaderKind::AnyTrust(committee.reader.clone()),
        ReaderKind::BlobHashes(BlobHashesReader::new(Arc::new(blobs))),
    ] {
        registry.register(reader).unwrap();
    }
    let reconstructor = PayloadReconstructor::new(registry, Arc::new(chain.clone()));

    let reference_cert = reference.store(&payload, far_timeout(), false).await.unwrap();
    let anytrust_cert = committee
        .writer
        .store(&payload, far_timeout(), false)
        .await
        .unwrap();
    let blob_body = [&[0x50][..], &first_blob, &second_blob].concat();
    let bodies = [
        encode_inline(&payload, 11).unwrap(),
        reference_cert.clone(),
        anytrust_cert,
        blob_body,
    ];

    for (batch_num, body) in bodies.iter().enumerate() {
        let msg = SequencerMessage::encode(&header, body);
        let mut preimages = PreimagesMap::default();
        let recovered = reconstructor
            .recover_payload_from_batch(
                batch_num as u64,
                BLOCK,
                &msg,
                Some(&mut preimages),
                true,
            )
            .await
            .unwrap();
        assert_eq!(recovered, payload, "header byte 0x{:02x}", body[0]);
    }

    let reference_msg = SequencerMessage::encode(&header, &reference_cert);
    let preimages = reconstructor
        .collect_preimages(1, BLOCK, &reference_msg)
        .await
        .unwrap();
    assert_eq!(
        preimages.get(PreimageType::DaCertificate, &keccak256(&reference_cert)),
        Some(payload.as_slice())
    );
    assert_eq!(
        tree::content(&tree::hash(&payload), &preimages).unwrap(),
        payload
    );

    let blob_msg = SequencerMessage::encode(&header, &bodies[3]);
    let preimages = reconstructor
        .collect_preimages(3, BLOCK, &blob_msg)
        .await
        .unwrap();
    assert_eq!(
        preimages.get(PreimageType::EthVersionedHash, &second_blob),
        Some(&payload[half..])
    );
}

#[tokio::test]
async fn reorg_during_recovery_discards_the_read() {
    let chain = MockParentChain::default();
    chain.add_block(BLOCK);

    let (header, payload) = batch();
    let mut blobs = MemoryBlobs {
        reorg_on_fetch: Some(chain.clone()),
        ..Default::default()
    };
    let hash = blobs.attach(payload.clone());

    let mut registry = ReaderRegistry::default();
    registry
        .register(ReaderKind::BlobHashes(BlobHashesReader::new(Arc::new(blobs))))
        .unwrap();
    let reconstructor = PayloadReconstructor::new(registry, Arc::new(chain));

    let msg = SequencerMessage::encode(&header, &[&[0x50][..], &hash].concat());
    let mut preimages = PreimagesMap::default();
    let result = reconstructor
        .recover_payload_from_batch(0, BLOCK, &msg, Some(&mut preimages), true)
        .await;
    assert!(matches!(result, Err(DaError::Reorged { .. })));
    assert!(preimages.is_empty());
}

#[tokio::test]
async fn divergent_reader_disagrees_only_on_selected_batches() {
    let chain = MockParentChain::default();
    chain.add_block(BLOCK);

    let store = Arc::new(MemoryBlobStore::new(RetentionConfig::default()));
    let honest = ReferenceDaProvider::new(
        store,
        ReferenceDaConfig {
            max_message_size: 1 << 20,
        },
    );

    let reconstructor_over = |reader: ReaderKind| {
        let mut registry = ReaderRegistry::default();
        registry.register(reader).unwrap();
        PayloadReconstructor::new(registry, Arc::new(chain.clone()))
    };
    let honest_node = reconstructor_over(ReaderKind::Reference(honest.clone()));
    let faulty_node = reconstructor_over(ReaderKind::Divergent(Arc::new(DivergentReader::new(
        Arc::new(honest.clone()),
        [2],
    ))));

    let (header, payload) = batch();
    let cert = honest.store(&payload, far_timeout(), false).await.unwrap();
    let msg = SequencerMessage::encode(&header, &cert);

    for batch_num in 0..4u64 {
        let expected = honest_node
            .recover_payload_from_batch(batch_num, BLOCK, &msg, None, false)
            .await
            .unwrap();
        let observed = faulty_node
            .recover_payload_from_batch(batch_num, BLOCK, &msg, None, false)
            .await
            .unwrap();
        assert_eq!(expected == observed, batch_num != 2);
    }
}
