//! # Request Dispatcher
//!
//! Single cooperative poll loop over the shared request channel.
//!
//! Each iteration:
//!
//! 1. Run host bookkeeping (`PluginHost::tick`); `Break` ends the loop
//! 2. Poll one message, unless one is already parked
//! 3. Acquire a dispatch permit and spawn a dispatch unit for the message
//! 4. Sleep `idle_backoff` when there was nothing to do
//!
//! At most `max_in_flight` dispatch units run at once. A message that finds
//! every permit taken stays parked while the loop keeps ticking the host, so
//! callback completions still make progress under load.

use shared_bus::{BusMessage, MessageBus, MessageSubscriber, SubscriptionError};
use shared_types::{BridgeConfig, SchemaRegistry};
use std::ops::ControlFlow;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::DispatchError;
use crate::domain::streams::StreamRegistry;
use crate::handler::{handle_message, DispatchContext, DispatchStats};
use crate::ports::PluginHost;

/// Callee side of the bridge.
pub struct Dispatcher {
    ctx: Arc<DispatchContext>,
    request_channel: String,
    permits: Arc<Semaphore>,
    max_in_flight: usize,
    idle_backoff: Duration,
}

impl Dispatcher {
    /// Create a dispatcher with a fresh service epoch.
    pub fn new(
        bus: Arc<dyn MessageBus>,
        registry: Arc<SchemaRegistry>,
        host: Arc<dyn PluginHost>,
        config: &BridgeConfig,
    ) -> Self {
        let max_in_flight = config.max_in_flight.max(1);
        Self {
            ctx: Arc::new(DispatchContext {
                bus,
                registry,
                host,
                streams: Arc::new(StreamRegistry::new()),
                epoch: Arc::from(Uuid::new_v4().to_string()),
                stats: DispatchStats::default(),
            }),
            request_channel: config.request_channel.clone(),
            permits: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
            idle_backoff: config.idle_backoff,
        }
    }

    /// Identifier of this service instance, carried in `StreamInfo`.
    pub fn epoch(&self) -> &str {
        &self.ctx.epoch
    }

    pub fn request_channel(&self) -> &str {
        &self.request_channel
    }

    /// Live streams created through this dispatcher.
    pub fn streams(&self) -> &Arc<StreamRegistry> {
        &self.ctx.streams
    }

    /// Get statistics
    pub fn stats(&self) -> &DispatchStats {
        &self.ctx.stats
    }

    /// Dispatch units currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.permits.available_permits()
    }

    /// Run the poll loop until the host stops it or the channel closes.
    #[instrument(skip(self), name = "dispatcher", fields(channel = %self.request_channel))]
    pub async fn run(&self) -> Result<(), DispatchError> {
        let mut subscription = self.ctx.bus.subscribe(&self.request_channel)?;
        info!(epoch = %self.ctx.epoch, "Polling for requests");

        let mut parked: Option<BusMessage> = None;

        loop {
            if let ControlFlow::Break(()) = self.ctx.host.tick() {
                info!("Host stopped the dispatcher");
                return Ok(());
            }

            if parked.is_none() {
                parked = match subscription.poll() {
                    Ok(message) => message,
                    Err(SubscriptionError::Closed) => {
                        warn!("Request channel closed");
                        return Err(DispatchError::BusClosed);
                    }
                };
            }

            let Some(message) = parked.take() else {
                tokio::time::sleep(self.idle_backoff).await;
                continue;
            };

            match Arc::clone(&self.permits).try_acquire_owned() {
                Ok(permit) => {
                    self.ctx.stats.messages_received.fetch_add(1, Ordering::Relaxed);
                    tokio::spawn(handle_message(Arc::clone(&self.ctx), message, permit));
                    tokio::task::yield_now().await;
                }
                Err(_) => {
                    debug!(in_flight = self.in_flight(), "All dispatch permits taken, message parked");
                    parked = Some(message);
                    tokio::time::sleep(self.idle_backoff).await;
                }
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("request_channel", &self.request_channel)
            .field("epoch", &self.ctx.epoch)
            .field("max_in_flight", &self.max_in_flight)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryHost;
    use serde_json::json;
    use shared_bus::{InMemoryMessageBus, MessagePublisher, Subscription};
    use shared_types::{
        ops, plugin_api, RemoteErrorKind, ResponseChannel, RpcRequest, RpcResponse,
    };
    use tokio::time::timeout;

    const CHANNEL: &str = "requests";

    struct Harness {
        bus: Arc<InMemoryMessageBus>,
        host: Arc<InMemoryHost>,
        dispatcher: Arc<Dispatcher>,
    }

    fn harness(max_in_flight: usize) -> Harness {
        let bus = Arc::new(InMemoryMessageBus::new());
        let host = Arc::new(InMemoryHost::new());
        let config = BridgeConfig::default()
            .with_channel(CHANNEL)
            .with_max_in_flight(max_in_flight);
        let dispatcher = Arc::new(Dispatcher::new(
            bus.clone(),
            Arc::new(plugin_api().unwrap()),
            host.clone(),
            &config,
        ));
        let runner = Arc::clone(&dispatcher);
        tokio::spawn(async move { runner.run().await });
        Harness {
            bus,
            host,
            dispatcher,
        }
    }

    impl Harness {
        /// Publish a raw request and subscribe to its response channel first.
        async fn send(&self, function: &str, args: Vec<serde_json::Value>) -> Subscription {
            let channel = ResponseChannel::generate();
            let sub = self.bus.subscribe(channel.as_str()).unwrap();
            let message = RpcRequest::new(function, args, channel).to_message().unwrap();
            self.wait_for_listener().await;
            self.bus.publish(CHANNEL, message).await.unwrap();
            sub
        }

        async fn wait_for_listener(&self) {
            while self.bus.subscriber_count(CHANNEL) == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }
    }

    async fn response(sub: &mut Subscription) -> RpcResponse {
        let message = timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("timeout")
            .expect("message");
        RpcResponse::from_message(&message).unwrap()
    }

    #[tokio::test]
    async fn test_sync_operation_answers() {
        let h = harness(4);
        let mut sub = h.send(ops::OPEN_URL, vec![json!("https://example.org")]).await;

        assert_eq!(response(&mut sub).await, RpcResponse::Value(serde_json::Value::Null));
        assert_eq!(h.host.opened_urls(), vec!["https://example.org".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_operation_answers_marker() {
        let h = harness(4);
        let mut sub = h.send("does_not_exist", vec![]).await;

        match response(&mut sub).await {
            RpcResponse::Error(err) => assert_eq!(err.kind, RemoteErrorKind::UnknownOperation),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(h.dispatcher.stats().requests_rejected(), 1);
        assert_eq!(h.host.notifications().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_argument_answers_validation() {
        let h = harness(4);
        let mut sub = h
            .send(ops::CREATE_WRITING_STREAM, vec![json!([1]), json!("velocity")])
            .await;

        match response(&mut sub).await {
            RpcResponse::Error(err) => {
                assert_eq!(err.kind, RemoteErrorKind::Validation);
                assert_eq!(err.field.as_deref(), Some("stream_type"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_message_does_not_stop_loop() {
        let h = harness(4);
        h.wait_for_listener().await;
        h.bus.publish(CHANNEL, "{not json".to_string()).await.unwrap();

        let mut sub = h.send(ops::GET_PLUGIN_DATA, vec![]).await;
        assert!(matches!(response(&mut sub).await, RpcResponse::Value(_)));
        assert_eq!(h.dispatcher.stats().requests_rejected(), 1);
    }

    #[tokio::test]
    async fn test_stream_lifecycle_and_epoch() {
        let h = harness(4);
        let mut sub = h.send(ops::CREATE_WRITING_STREAM, vec![json!([0, 1]), json!("position")]).await;

        let RpcResponse::Value(info) = response(&mut sub).await else {
            panic!("stream creation failed");
        };
        assert_eq!(info, json!({"id": "s1", "epoch": h.dispatcher.epoch()}));
        assert!(h.dispatcher.streams().contains("s1"));

        let mut sub = h.send(ops::STREAM_DESTROY, vec![json!("s1")]).await;
        assert_eq!(response(&mut sub).await, RpcResponse::Value(serde_json::Value::Null));

        let mut sub = h.send(ops::STREAM_DESTROY, vec![json!("s1")]).await;
        match response(&mut sub).await {
            RpcResponse::Error(err) => {
                assert_eq!(err.kind, RemoteErrorKind::UnknownStream);
                assert_eq!(err.stream_id.as_deref(), Some("s1"));
                assert_eq!(err.epoch.as_deref(), Some(h.dispatcher.epoch()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_host_stop_ends_loop() {
        let bus = Arc::new(InMemoryMessageBus::new());
        let host = Arc::new(InMemoryHost::new());
        host.stop();
        let dispatcher = Dispatcher::new(
            bus,
            Arc::new(plugin_api().unwrap()),
            host,
            &BridgeConfig::default(),
        );

        let result = timeout(Duration::from_secs(1), dispatcher.run()).await;
        assert_eq!(result.expect("loop did not stop"), Ok(()));
    }

    #[tokio::test]
    async fn test_closed_bus_fails_subscribe() {
        let bus = Arc::new(InMemoryMessageBus::new());
        bus.close();
        let dispatcher = Dispatcher::new(
            bus,
            Arc::new(plugin_api().unwrap()),
            Arc::new(InMemoryHost::new()),
            &BridgeConfig::default(),
        );

        assert!(matches!(dispatcher.run().await, Err(DispatchError::Bus(_))));
    }

    #[tokio::test]
    async fn test_parked_message_waits_for_permit() {
        let h = harness(1);
        h.host.hold_callbacks(true);

        let mut first = h.send(ops::REQUEST_COMPLEX_LIST, vec![]).await;
        let mut second = h.send(ops::OPEN_URL, vec![json!("https://example.org/a")]).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.host.opened_urls().is_empty());

        h.host.hold_callbacks(false);
        assert!(matches!(response(&mut first).await, RpcResponse::Value(_)));
        assert_eq!(response(&mut second).await, RpcResponse::Value(serde_json::Value::Null));
        assert_eq!(h.dispatcher.stats().messages_received(), 2);
    }
}
