//! Typed plugin client.
//!
//! One method per registered operation, each a thin call into the
//! correlator that converts typed arguments to `ApiValue`s and the decoded
//! result back.

use shared_bus::MessageBus;
use shared_types::{
    ops, ApiValue, BridgeConfig, ComplexSummary, NotificationKind, PluginData, RpcError,
    SchemaRegistry, Shape, ShapeId, StreamHandle, StreamInfo, StreamType,
};
use std::sync::Arc;
use tracing::info;

use crate::correlator::RpcClient;
use crate::stream::{destroy_stream, update_stream, WritingStream};

/// Frontend view of the plugin host API.
#[derive(Clone)]
pub struct PluginClient {
    rpc: Arc<RpcClient>,
}

impl PluginClient {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        registry: Arc<SchemaRegistry>,
        config: &BridgeConfig,
    ) -> Self {
        Self::from_rpc(Arc::new(RpcClient::new(bus, registry, config)))
    }

    pub fn from_rpc(rpc: Arc<RpcClient>) -> Self {
        Self { rpc }
    }

    /// Underlying correlator, for untyped calls and statistics.
    pub fn rpc(&self) -> &Arc<RpcClient> {
        &self.rpc
    }

    /// Upload shapes; returns the assigned ids in input order.
    pub async fn upload_shapes(&self, shapes: &[Shape]) -> Result<Vec<ShapeId>, RpcError> {
        let args = vec![ApiValue::from_typed(shapes)?];
        let ids = self.rpc.call(ops::UPLOAD_SHAPES, args).await?;
        Ok(ids.into_typed()?)
    }

    /// Create a writing stream over `atom_indices`.
    pub async fn create_writing_stream(
        &self,
        atom_indices: &[u32],
        stream_type: StreamType,
    ) -> Result<WritingStream, RpcError> {
        let args = vec![
            ApiValue::from(atom_indices.to_vec()),
            ApiValue::from(stream_type.as_str()),
        ];
        let info: StreamInfo = self
            .rpc
            .call(ops::CREATE_WRITING_STREAM, args)
            .await?
            .into_typed()?;

        info!(
            stream_id = %info.id,
            stream_type = stream_type.as_str(),
            "Writing stream created"
        );
        Ok(WritingStream::new(
            StreamHandle::from(info),
            stream_type,
            Arc::clone(&self.rpc),
        ))
    }

    /// Push data to a stream by handle.
    pub async fn stream_update(&self, handle: &StreamHandle, data: &[f64]) -> Result<(), RpcError> {
        update_stream(&self.rpc, handle, data).await
    }

    /// Destroy a stream by handle.
    pub async fn stream_destroy(&self, handle: &StreamHandle) -> Result<(), RpcError> {
        destroy_stream(&self.rpc, handle).await
    }

    pub async fn get_plugin_data(&self) -> Result<PluginData, RpcError> {
        let data = self.rpc.call(ops::GET_PLUGIN_DATA, vec![]).await?;
        Ok(data.into_typed()?)
    }

    pub async fn send_notification(
        &self,
        kind: NotificationKind,
        message: &str,
    ) -> Result<(), RpcError> {
        let args = vec![ApiValue::from(kind.as_str()), ApiValue::from(message)];
        self.rpc.call(ops::SEND_NOTIFICATION, args).await?;
        Ok(())
    }

    pub async fn open_url(&self, url: &str) -> Result<(), RpcError> {
        self.rpc.call(ops::OPEN_URL, vec![ApiValue::from(url)]).await?;
        Ok(())
    }

    pub async fn request_complex_list(&self) -> Result<Vec<ComplexSummary>, RpcError> {
        let list = self.rpc.call(ops::REQUEST_COMPLEX_LIST, vec![]).await?;
        Ok(list.into_typed()?)
    }
}
