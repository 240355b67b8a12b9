use std::sync::Arc;
use std::time::Duration;

use sov_anytrust_adapter::bls::BlsPrivateKey;
use sov_anytrust_adapter::{
    start_storage_node, Aggregator, AggregatorConfig, AnyTrustWriter, BackendConfig,
    DataAvailabilityCertificate, DataFetcher, RestfulClient, StorageNodeConfig,
};
use sov_blob_store::{BlobStoreConfig, RocksdbConfig, StorageBackend};
use sov_da_interface::{tree, unix_now, DaWriter};
use sov_data_streaming::DataStreamerConfig;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const SEED: [u8; 32] = [0x11; 32];

struct Deployment {
    _dir: TempDir,
    cancel: CancellationToken,
    writer: AnyTrustWriter,
    mirror: RestfulClient,
    rpc_handle: jsonrpsee::server::ServerHandle,
}

async fn deploy(streamer: DataStreamerConfig) -> Deployment {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let node_config = StorageNodeConfig {
        rpc_address: "127.0.0.1:0".parse().unwrap(),
        mirror_address: "127.0.0.1:0".parse().unwrap(),
        signing_key_seed: hex::encode(SEED),
        storage: BlobStoreConfig {
            backend: StorageBackend::RocksDb {
                path: dir.path().join("blobs"),
                rocksdb: RocksdbConfig::default(),
            },
            retention: Default::default(),
        },
        streaming: Default::default(),
        max_message_size: 1 << 20,
    };
    let (_, handle) = start_storage_node(&node_config, cancel.clone())
        .await
        .unwrap();

    let pubkey = BlsPrivateKey::from_seed(&SEED).unwrap().public_key();
    let aggregator_config = AggregatorConfig {
        assumed_honest: 1,
        backends: vec![BackendConfig {
            url: format!("http://{}", handle.rpc_address),
            pubkey: hex::encode(pubkey.to_bytes()),
            signer_index: 0,
        }],
        request_timeout_secs: 5,
        enable_chunked_store: true,
        streamer,
        max_message_size: 1 << 20,
    };
    let aggregator = Aggregator::from_config(&aggregator_config).unwrap();
    let writer = AnyTrustWriter::new(Arc::new(aggregator), cancel.clone());
    let mirror = RestfulClient::new(
        format!("http://{}", handle.mirror_address),
        Duration::from_secs(5),
    )
    .unwrap();

    Deployment {
        _dir: dir,
        cancel,
        writer,
        mirror,
        rpc_handle: handle.rpc_handle,
    }
}

#[tokio::test]
async fn single_member_committee_serves_stored_payloads() {
    let deployment = deploy(DataStreamerConfig::default()).await;
    let payload = b"a batch worth keeping".to_vec();

    let cert = deployment
        .writer
        .store(&payload, unix_now() + 3_600, false)
        .await
        .unwrap();
    let cert = DataAvailabilityCertificate::deserialize(&cert).unwrap();
    assert_eq!(cert.signers_mask, 1);
    assert_eq!(cert.data_hash, tree::hash(&payload));

    deployment.mirror.health_check().await.unwrap();
    assert_eq!(
        deployment.mirror.get_by_hash(&cert.data_hash).await.unwrap(),
        payload
    );

    deployment.cancel.cancel();
    deployment.rpc_handle.stopped().await;
    assert!(deployment
        .writer
        .store(b"after shutdown", unix_now() + 3_600, false)
        .await
        .is_err());
}

#[tokio::test]
async fn payloads_above_one_frame_are_stored_in_chunks() {
    let deployment = deploy(DataStreamerConfig {
        max_store_chunk_body_size: 2 * 1024,
        rpc_timeout_secs: 5,
    })
    .await;
    let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 199) as u8).collect();

    let cert = deployment
        .writer
        .store(&payload, unix_now() + 3_600, false)
        .await
        .unwrap();
    let cert = DataAvailabilityCertificate::deserialize(&cert).unwrap();
    assert_eq!(
        deployment.mirror.get_by_hash(&cert.data_hash).await.unwrap(),
        payload
    );
    deployment.cancel.cancel();
}
