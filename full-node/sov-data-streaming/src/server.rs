use std::future::Future;
use std::sync::Arc;

use jsonrpsee::types::ErrorObjectOwned;
use jsonrpsee::RpcModule;
use serde::Serialize;
use sov_da_interface::rpc::to_jsonrpsee_error_object;
use sov_da_interface::DaError;

use crate::protocol::{
    CommitStreamParams, SendChunkParams, StartStreamParams, StartStreamResult, StreamingMethods,
};
use crate::receiver::{DataStreamReceiver, StreamError};

fn stream_error(e: StreamError) -> ErrorObjectOwned {
    to_jsonrpsee_error_object(e.into())
}

/// Registers the three streaming calls on `rpc`.
///
/// Once a session is committed, `on_complete` receives the module context, the reassembled
/// payload and its storage timeout; its result is returned to the sender.
pub fn register_streaming_methods<C, F, Fut, T>(
    rpc: &mut RpcModule<C>,
    methods: StreamingMethods,
    receiver: Arc<DataStreamReceiver>,
    on_complete: F,
) -> Result<(), jsonrpsee::core::Error>
where
    C: Send + Sync + 'static,
    F: Fn(Arc<C>, Vec<u8>, u64) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<T, DaError>> + Send + 'static,
    T: Serialize + Clone + Send + 'static,
{
    let start_receiver = receiver.clone();
    rpc.register_method(methods.start, move |params, _| {
        let params: StartStreamParams = params.one()?;
        let message_id = start_receiver
            .start_receiving(params)
            .map_err(stream_error)?;
        Ok::<_, ErrorObjectOwned>(StartStreamResult { message_id })
    })?;

    let chunk_receiver = receiver.clone();
    rpc.register_method(methods.chunk, move |params, _| {
        let SendChunkParams {
            message_id,
            chunk_id,
            chunk,
        } = params.one()?;
        chunk_receiver
            .receive_chunk(message_id, chunk_id, &chunk.0)
            .map_err(stream_error)?;
        Ok::<_, ErrorObjectOwned>(())
    })?;

    rpc.register_async_method(methods.commit, move |params, ctx| {
        let receiver = receiver.clone();
        let on_complete = on_complete.clone();
        async move {
            let CommitStreamParams { message_id } = params.one()?;
            let message = receiver
                .finalize_receiving(message_id)
                .map_err(stream_error)?;
            on_complete(ctx, message.data, message.timeout)
                .await
                .map_err(to_jsonrpsee_error_object)
        }
    })?;
    Ok(())
}
