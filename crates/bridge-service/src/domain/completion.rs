//! Completion callbacks for callback-kind operations.
//!
//! A completion is bound to one request: its descriptor (for the result
//! codec) and its response channel. `complete` consumes it, so a request is
//! answered at most once. A completion dropped without firing answers the
//! caller with a `host_failure` marker instead of leaving it to time out.

use shared_bus::{MessageBus, MessagePublisher};
use shared_types::{
    ApiValue, OperationDescriptor, RemoteError, ResponseChannel, RpcResponse, StreamInfo,
};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, error, warn};

use crate::domain::streams::StreamRegistry;
use crate::ports::{HostError, HostStream};

/// Publishes the single response of one request.
pub(crate) struct Responder {
    bus: Arc<dyn MessageBus>,
    response_channel: ResponseChannel,
    function: String,
}

impl Responder {
    pub(crate) fn new(
        bus: Arc<dyn MessageBus>,
        response_channel: ResponseChannel,
        function: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            response_channel,
            function: function.into(),
        }
    }

    pub(crate) async fn send(self, response: RpcResponse) {
        let message = match response.to_message() {
            Ok(message) => message,
            Err(e) => {
                error!(function = %self.function, error = %e, "Response could not be serialized");
                return;
            }
        };

        match self.bus.publish(self.response_channel.as_str(), message).await {
            Ok(0) => debug!(
                function = %self.function,
                response_channel = %self.response_channel,
                "Response dropped (caller no longer listening)"
            ),
            Ok(_) => debug!(
                function = %self.function,
                response_channel = %self.response_channel,
                "Published response"
            ),
            Err(e) => warn!(
                function = %self.function,
                response_channel = %self.response_channel,
                error = %e,
                "Failed to publish response"
            ),
        }
    }
}

/// Turn an operation outcome into the response payload.
pub(crate) fn encode_outcome(
    descriptor: &OperationDescriptor,
    outcome: Result<ApiValue, HostError>,
) -> RpcResponse {
    match outcome.and_then(|value| {
        descriptor
            .encode_result(&value)
            .map_err(|e| HostError::Failed(format!("result did not encode: {e}")))
    }) {
        Ok(wire) => RpcResponse::Value(wire),
        Err(e) => {
            warn!(function = descriptor.name(), error = %e, "Operation failed");
            RpcResponse::Error(RemoteError::host_failure(e.to_string()))
        }
    }
}

struct Pending {
    descriptor: OperationDescriptor,
    responder: Responder,
    runtime: Handle,
    permit: Option<OwnedSemaphorePermit>,
}

impl Pending {
    fn fire(self, outcome: Result<ApiValue, HostError>) {
        let response = encode_outcome(&self.descriptor, outcome);
        let Self {
            responder,
            runtime,
            permit,
            ..
        } = self;
        runtime.spawn(async move {
            responder.send(response).await;
            drop(permit);
        });
    }
}

/// Result callback handed to the host for a callback-kind operation.
///
/// May be completed from any thread.
pub struct Completion {
    inner: Option<Pending>,
}

impl Completion {
    /// Must be created inside the tokio runtime that publishes the response.
    pub(crate) fn new(descriptor: OperationDescriptor, responder: Responder) -> Self {
        Self {
            inner: Some(Pending {
                descriptor,
                responder,
                runtime: Handle::current(),
                permit: None,
            }),
        }
    }

    /// Keep a dispatch permit until the response is published.
    pub(crate) fn holding(mut self, permit: OwnedSemaphorePermit) -> Self {
        if let Some(pending) = self.inner.as_mut() {
            pending.permit = Some(permit);
        }
        self
    }

    /// Name of the operation this completion answers.
    pub fn function(&self) -> &str {
        self.inner
            .as_ref()
            .map_or("", |pending| pending.descriptor.name())
    }

    /// Deliver the operation's result to the caller.
    pub fn complete(mut self, outcome: Result<ApiValue, HostError>) {
        if let Some(pending) = self.inner.take() {
            pending.fire(outcome);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(pending) = self.inner.take() {
            warn!(
                function = pending.descriptor.name(),
                "Completion dropped without a result"
            );
            pending.fire(Err(HostError::Failed(
                "operation finished without delivering a result".into(),
            )));
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("function", &self.function())
            .field("pending", &self.inner.is_some())
            .finish()
    }
}

/// Callback handed to the host for a stream-producing operation.
///
/// Completing with a stream registers it and answers the caller with its
/// `StreamInfo`.
pub struct StreamCompletion {
    completion: Completion,
    streams: Arc<StreamRegistry>,
    epoch: Arc<str>,
}

impl StreamCompletion {
    pub(crate) fn new(completion: Completion, streams: Arc<StreamRegistry>, epoch: Arc<str>) -> Self {
        Self {
            completion,
            streams,
            epoch,
        }
    }

    pub fn function(&self) -> &str {
        self.completion.function()
    }

    pub fn complete(self, outcome: Result<Arc<dyn HostStream>, HostError>) {
        let Self {
            completion,
            streams,
            epoch,
        } = self;

        let info = outcome.and_then(|stream| {
            let id = streams.insert(Arc::clone(&stream)).map_err(|e| {
                // Unregistered streams are unreachable, release them now.
                if let Err(destroy_error) = stream.destroy() {
                    warn!(stream_id = %stream.id(), error = %destroy_error, "Rejected stream did not destroy");
                }
                HostError::Failed(e.to_string())
            })?;
            let info = StreamInfo {
                id,
                epoch: epoch.to_string(),
            };
            ApiValue::from_typed(&info).map_err(HostError::from)
        });

        completion.complete(info);
    }
}

impl std::fmt::Debug for StreamCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCompletion")
            .field("completion", &self.completion)
            .field("epoch", &self.epoch)
            .finish()
    }
}
