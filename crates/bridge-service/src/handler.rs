//! Per-request dispatch unit.
//!
//! ```text
//! received ─► decoded ─► dispatched ─┬─► completed (sync) ─────────────┬─► published
//!                                    └─► awaiting callback ─► completed┘
//! ```
//!
//! Every failure in here is confined to the one request: it is reported
//! through the host's notifications and, when the response channel is known,
//! answered with an error marker.

use serde_json::Value;
use shared_bus::{BusMessage, MessageBus};
use shared_types::{
    ApiValue, CodecError, DispatchKind, NotificationKind, OperationDescriptor, OperationRole,
    RemoteError, ResponseChannel, RpcRequest, RpcResponse, SchemaRegistry, StreamMutation,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;
use tokio::task::JoinError;
use tracing::{debug, warn};

use crate::domain::completion::{encode_outcome, Completion, Responder, StreamCompletion};
use crate::domain::streams::StreamRegistry;
use crate::ports::{HostError, PluginHost};

/// Statistics for the dispatcher
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Messages taken off the request channel
    pub messages_received: AtomicU64,
    /// Requests handed to the host
    pub requests_dispatched: AtomicU64,
    /// Requests rejected before reaching the host
    pub requests_rejected: AtomicU64,
    /// Operation bodies that failed or panicked
    pub host_failures: AtomicU64,
}

impl DispatchStats {
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn requests_dispatched(&self) -> u64 {
        self.requests_dispatched.load(Ordering::Relaxed)
    }

    pub fn requests_rejected(&self) -> u64 {
        self.requests_rejected.load(Ordering::Relaxed)
    }

    pub fn host_failures(&self) -> u64 {
        self.host_failures.load(Ordering::Relaxed)
    }
}

/// State shared by every dispatch unit.
pub(crate) struct DispatchContext {
    pub(crate) bus: Arc<dyn MessageBus>,
    pub(crate) registry: Arc<SchemaRegistry>,
    pub(crate) host: Arc<dyn PluginHost>,
    pub(crate) streams: Arc<StreamRegistry>,
    pub(crate) epoch: Arc<str>,
    pub(crate) stats: DispatchStats,
}

impl DispatchContext {
    fn report(&self, message: &str) {
        warn!(reason = message, "Request rejected");
        self.host.send_notification(NotificationKind::Error, message);
    }

    fn responder(&self, request: &RpcRequest) -> Responder {
        Responder::new(
            Arc::clone(&self.bus),
            request.response_channel.clone(),
            request.function.clone(),
        )
    }
}

/// Handle one inbound message.
///
/// The permit is held until the response is published; callback operations
/// hand it to their completion.
pub(crate) async fn handle_message(
    ctx: Arc<DispatchContext>,
    message: BusMessage,
    permit: OwnedSemaphorePermit,
) {
    let request = match RpcRequest::from_message(&message) {
        Ok(request) => request,
        Err(e) => {
            ctx.stats.requests_rejected.fetch_add(1, Ordering::Relaxed);
            ctx.report(&format!("JSON decode failure: {e}"));
            if let Some(channel) = salvage_response_channel(&message) {
                let responder = Responder::new(Arc::clone(&ctx.bus), channel, "<malformed>");
                let marker = RemoteError::validation(&[CodecError::Encoding(e.to_string())]);
                responder.send(RpcResponse::Error(marker)).await;
            }
            return;
        }
    };

    debug!(
        function = %request.function,
        response_channel = %request.response_channel,
        "Received request"
    );

    let descriptor = match ctx.registry.lookup(&request.function) {
        Ok(descriptor) => descriptor.clone(),
        Err(e) => {
            ctx.stats.requests_rejected.fetch_add(1, Ordering::Relaxed);
            ctx.report(&e.to_string());
            ctx.responder(&request)
                .send(RpcResponse::Error(RemoteError::unknown_operation(&request.function)))
                .await;
            return;
        }
    };

    let args = match descriptor.decode_args(&request.args) {
        Ok(args) => args,
        Err(errors) => {
            ctx.stats.requests_rejected.fetch_add(1, Ordering::Relaxed);
            let marker = RemoteError::validation(&errors);
            ctx.report(&format!("Invalid arguments for {}: {}", request.function, marker.message));
            ctx.responder(&request).send(RpcResponse::Error(marker)).await;
            return;
        }
    };

    let responder = ctx.responder(&request);
    ctx.stats.requests_dispatched.fetch_add(1, Ordering::Relaxed);

    match (descriptor.role(), descriptor.dispatch()) {
        (OperationRole::StreamMutation(mutation), _) => {
            mutate_stream(&ctx, descriptor, mutation, args, responder).await;
        }
        (OperationRole::StreamProducer, _) => {
            let completion = StreamCompletion::new(
                Completion::new(descriptor.clone(), responder).holding(permit),
                Arc::clone(&ctx.streams),
                Arc::clone(&ctx.epoch),
            );
            let host = Arc::clone(&ctx.host);
            let function = descriptor.name().to_string();
            let joined =
                tokio::task::spawn_blocking(move || host.create_stream(&function, args, completion))
                    .await;
            // An unwound completion has already answered the caller.
            if let Err(e) = joined {
                ctx.stats.host_failures.fetch_add(1, Ordering::Relaxed);
                report_join_error(&ctx, descriptor.name(), &e);
            }
        }
        (OperationRole::Ordinary, DispatchKind::Callback) => {
            let completion = Completion::new(descriptor.clone(), responder).holding(permit);
            let host = Arc::clone(&ctx.host);
            let function = descriptor.name().to_string();
            let joined = tokio::task::spawn_blocking(move || {
                host.invoke_with_callback(&function, args, completion)
            })
            .await;
            if let Err(e) = joined {
                ctx.stats.host_failures.fetch_add(1, Ordering::Relaxed);
                report_join_error(&ctx, descriptor.name(), &e);
            }
        }
        (OperationRole::Ordinary, DispatchKind::Sync) => {
            let host = Arc::clone(&ctx.host);
            let function = descriptor.name().to_string();
            let joined = tokio::task::spawn_blocking(move || host.invoke(&function, args)).await;
            let outcome = joined.unwrap_or_else(|e| {
                report_join_error(&ctx, descriptor.name(), &e);
                Err(join_failure(&e))
            });
            if outcome.is_err() {
                ctx.stats.host_failures.fetch_add(1, Ordering::Relaxed);
            }
            responder.send(encode_outcome(&descriptor, outcome)).await;
        }
    }
}

/// Route a stream mutation to the live stream named by the first argument.
async fn mutate_stream(
    ctx: &DispatchContext,
    descriptor: OperationDescriptor,
    mutation: StreamMutation,
    args: Vec<ApiValue>,
    responder: Responder,
) {
    let mut args = args.into_iter();
    let stream_id = args
        .next()
        .and_then(|id| id.as_str().map(str::to_string))
        .unwrap_or_default();
    let rest: Vec<ApiValue> = args.collect();

    let stream = match mutation {
        StreamMutation::Update => ctx.streams.get(&stream_id),
        StreamMutation::Destroy => ctx.streams.remove(&stream_id),
    };

    let Some(stream) = stream else {
        debug!(stream_id = %stream_id, function = descriptor.name(), "Unknown stream");
        responder
            .send(RpcResponse::Error(RemoteError::unknown_stream(&stream_id, &ctx.epoch)))
            .await;
        return;
    };

    let joined = tokio::task::spawn_blocking(move || match mutation {
        StreamMutation::Update => stream.update(rest),
        StreamMutation::Destroy => stream.destroy(),
    })
    .await;

    let outcome = match joined {
        Ok(Err(HostError::StreamGone(_))) => {
            // Lost a race with a concurrent destroy
            debug!(stream_id = %stream_id, function = descriptor.name(), "Stream gone");
            responder
                .send(RpcResponse::Error(RemoteError::unknown_stream(&stream_id, &ctx.epoch)))
                .await;
            return;
        }
        Ok(result) => result.map(|()| ApiValue::Null),
        Err(e) => {
            report_join_error(ctx, descriptor.name(), &e);
            Err(join_failure(&e))
        }
    };
    if outcome.is_err() {
        ctx.stats.host_failures.fetch_add(1, Ordering::Relaxed);
    }
    if mutation == StreamMutation::Destroy {
        debug!(stream_id = %stream_id, "Stream removed");
    }
    responder.send(encode_outcome(&descriptor, outcome)).await;
}

fn join_failure(e: &JoinError) -> HostError {
    if e.is_panic() {
        HostError::Failed("operation panicked".into())
    } else {
        HostError::Failed("operation cancelled".into())
    }
}

fn report_join_error(ctx: &DispatchContext, function: &str, e: &JoinError) {
    let message = format!("{function}: {}", join_failure(e));
    warn!(function = function, panic = e.is_panic(), "Operation body did not return");
    ctx.host.send_notification(NotificationKind::Error, &message);
}

/// Best effort: find the response channel of a request that did not parse.
fn salvage_response_channel(message: &str) -> Option<ResponseChannel> {
    let value: Value = serde_json::from_str(message).ok()?;
    value
        .get("response_channel")?
        .as_str()
        .map(|channel| ResponseChannel::from(channel.to_string()))
}
