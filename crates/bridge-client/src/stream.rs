//! Stream proxy.
//!
//! The service owns every writing stream. The caller holds only a
//! `StreamHandle`, and each mutation is another RPC keyed by the handle id.

use shared_types::{ops, ApiValue, RpcError, StreamHandle, StreamType};
use std::sync::Arc;
use tracing::debug;

use crate::correlator::RpcClient;

/// Caller-side proxy for a stream living in the service process.
#[derive(Clone)]
pub struct WritingStream {
    handle: StreamHandle,
    stream_type: StreamType,
    client: Arc<RpcClient>,
}

impl WritingStream {
    pub(crate) fn new(handle: StreamHandle, stream_type: StreamType, client: Arc<RpcClient>) -> Self {
        Self {
            handle,
            stream_type,
            client,
        }
    }

    pub fn id(&self) -> &str {
        &self.handle.id
    }

    pub fn handle(&self) -> &StreamHandle {
        &self.handle
    }

    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    /// Push a frame of values to the stream.
    pub async fn update(&self, data: &[f64]) -> Result<(), RpcError> {
        update_stream(&self.client, &self.handle, data).await
    }

    /// Destroy the stream on the service side.
    ///
    /// A second destroy of the same stream fails with `UnknownStream`.
    pub async fn destroy(&self) -> Result<(), RpcError> {
        destroy_stream(&self.client, &self.handle).await
    }
}

pub(crate) async fn update_stream(
    client: &RpcClient,
    handle: &StreamHandle,
    data: &[f64],
) -> Result<(), RpcError> {
    let args = vec![
        ApiValue::from(handle.id.as_str()),
        ApiValue::from(data.to_vec()),
    ];
    client
        .call_on_stream(ops::STREAM_UPDATE, args, &handle.epoch)
        .await?;
    Ok(())
}

pub(crate) async fn destroy_stream(client: &RpcClient, handle: &StreamHandle) -> Result<(), RpcError> {
    let args = vec![ApiValue::from(handle.id.as_str())];
    client
        .call_on_stream(ops::STREAM_DESTROY, args, &handle.epoch)
        .await?;
    debug!(stream_id = %handle.id, "Stream destroyed");
    Ok(())
}

impl std::fmt::Debug for WritingStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritingStream")
            .field("handle", &self.handle)
            .field("stream_type", &self.stream_type)
            .finish()
    }
}
