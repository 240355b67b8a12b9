use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use jsonrpsee::RpcModule;
use sov_da_interface::DaError;
use sov_data_streaming::{
    register_streaming_methods, DataStreamReceiver, DataStreamer, DataStreamerConfig,
    ReceiverConfig, DAS_STREAMING_METHODS,
};
use tokio_util::sync::CancellationToken;

type Received = Mutex<Vec<(Vec<u8>, u64)>>;

async fn streaming_server(
    receiver_config: ReceiverConfig,
) -> (jsonrpsee::server::ServerHandle, SocketAddr, Arc<Received>) {
    let received = Arc::new(Received::default());
    let mut rpc = RpcModule::new(received.clone());
    register_streaming_methods(
        &mut rpc,
        DAS_STREAMING_METHODS,
        Arc::new(DataStreamReceiver::new(receiver_config)),
        |ctx: Arc<Arc<Received>>, data: Vec<u8>, timeout: u64| async move {
            let len = data.len();
            ctx.lock().unwrap().push((data, timeout));
            Ok::<_, DaError>(len)
        },
    )
    .unwrap();

    let server = jsonrpsee::server::ServerBuilder::default()
        .build("127.0.0.1:0")
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    (server.start(rpc), addr, received)
}

fn streamer(addr: SocketAddr) -> DataStreamer {
    let config = DataStreamerConfig {
        max_store_chunk_body_size: 512 + 2 * 300,
        rpc_timeout_secs: 5,
    };
    DataStreamer::new(&format!("http://{addr}"), DAS_STREAMING_METHODS, config).unwrap()
}

#[tokio::test]
async fn payload_is_reassembled_across_many_chunks() {
    let (_handle, addr, received) = streaming_server(ReceiverConfig::default()).await;
    let streamer = streamer(addr);
    assert_eq!(streamer.chunk_size(), 300);

    let payload: Vec<u8> = (0..5_000u32).map(|i| (i * 7 % 256) as u8).collect();
    let len: usize = streamer
        .stream_data(&payload, 42, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(len, payload.len());
    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0], (payload, 42));
}

#[tokio::test]
async fn oversized_stream_surfaces_as_message_too_large() {
    let (_handle, addr, received) = streaming_server(ReceiverConfig {
        max_total_size: 1_000,
        ..Default::default()
    })
    .await;

    let err = streamer(addr)
        .stream_data::<usize>(&[1u8; 1_001], 42, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        DaError::MessageTooLarge {
            size: 1_001,
            max: Some(1_000)
        }
    );
    assert!(received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cancelled_stream_is_abandoned() {
    let (_handle, addr, received) = streaming_server(ReceiverConfig::default()).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = streamer(addr)
        .stream_data::<usize>(&[1u8; 2_000], 42, &cancel)
        .await
        .unwrap_err();

    assert_eq!(err, DaError::Cancelled);
    assert!(received.lock().unwrap().is_empty());
}
