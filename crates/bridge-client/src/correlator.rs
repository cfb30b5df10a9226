//! Request Correlator - caller side of the bridge.
//!
//! Every call owns a private response channel:
//!
//! 1. Look up the operation and encode its arguments
//! 2. Generate a fresh response channel and subscribe to it
//! 3. Publish the request on the shared request channel
//! 4. Wait for one reply, bounded by the configured timeout
//! 5. Release the subscription and decode the reply
//!
//! Subscribing before publishing means a fast reply cannot arrive before
//! anyone listens. Releasing the subscription after the first reply means a
//! redelivered copy lands on no subscriber and is dropped by the bus.

use serde_json::Value;
use shared_bus::{BusError, MessageBus, MessagePublisher, MessageSubscriber};
use shared_types::{
    ApiValue, BridgeConfig, OperationDescriptor, ResponseChannel, RpcError, RpcRequest,
    RpcResponse, SchemaRegistry,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Statistics for one client
#[derive(Debug, Default)]
pub struct ClientStats {
    /// Requests published
    pub calls_started: AtomicU64,
    /// Calls that returned a decoded value
    pub calls_completed: AtomicU64,
    /// Calls that saw no reply in time
    pub timeouts: AtomicU64,
    /// Calls answered with an error or an undecodable reply
    pub failures: AtomicU64,
}

impl ClientStats {
    pub fn calls_started(&self) -> u64 {
        self.calls_started.load(Ordering::Relaxed)
    }

    pub fn calls_completed(&self) -> u64 {
        self.calls_completed.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

fn bus_error(err: BusError) -> RpcError {
    RpcError::Bus(err.to_string())
}

/// Correlates each request with its private response channel.
pub struct RpcClient {
    /// Bus carrying requests and responses
    bus: Arc<dyn MessageBus>,
    /// Operation table shared with the service
    registry: Arc<SchemaRegistry>,
    /// Shared channel the service polls
    request_channel: String,
    /// Wait bound for every call
    timeout: Duration,
    /// Statistics
    stats: ClientStats,
}

impl RpcClient {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        registry: Arc<SchemaRegistry>,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            bus,
            registry,
            request_channel: config.request_channel.clone(),
            timeout: config.rpc_timeout,
            stats: ClientStats::default(),
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn request_channel(&self) -> &str {
        &self.request_channel
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Get statistics
    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    /// Invoke `function` remotely and wait for its result.
    ///
    /// Fails without touching the bus when the operation is unknown or an
    /// argument does not encode.
    pub async fn call(&self, function: &str, args: Vec<ApiValue>) -> Result<ApiValue, RpcError> {
        self.call_with_epoch(function, args, None).await
    }

    /// Invoke a mutation on a stream created by the service instance `epoch`.
    ///
    /// An unknown-stream reply from a different epoch becomes
    /// `RpcError::StreamExpired`.
    pub async fn call_on_stream(
        &self,
        function: &str,
        args: Vec<ApiValue>,
        epoch: &str,
    ) -> Result<ApiValue, RpcError> {
        self.call_with_epoch(function, args, Some(epoch)).await
    }

    async fn call_with_epoch(
        &self,
        function: &str,
        args: Vec<ApiValue>,
        epoch: Option<&str>,
    ) -> Result<ApiValue, RpcError> {
        let descriptor = self.registry.lookup(function)?;
        let encoded = descriptor.encode_args(&args)?;

        let response_channel = ResponseChannel::generate();
        let message = RpcRequest::new(function, encoded, response_channel.clone()).to_message()?;

        let mut subscription = self
            .bus
            .subscribe(response_channel.as_str())
            .map_err(bus_error)?;

        self.stats.calls_started.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        if let Err(e) = self.bus.publish(&self.request_channel, message).await {
            subscription.unsubscribe();
            self.stats.failures.fetch_add(1, Ordering::Relaxed);
            return Err(bus_error(e));
        }

        debug!(
            function = function,
            response_channel = %response_channel,
            request_channel = %self.request_channel,
            "Sent RPC request"
        );

        let outcome = tokio::time::timeout(self.timeout, subscription.recv()).await;
        subscription.unsubscribe();

        let reply = match outcome {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                return Err(RpcError::Bus("response channel closed".into()));
            }
            Err(_) => {
                self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    function = function,
                    response_channel = %response_channel,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "RPC timed out"
                );
                return Err(RpcError::Timeout(function.to_string()));
            }
        };

        debug!(
            function = function,
            response_channel = %response_channel,
            response_time_ms = started.elapsed().as_millis() as u64,
            "Response received"
        );

        let result = decode_reply(descriptor, &reply, epoch);
        match &result {
            Ok(_) => self.stats.calls_completed.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.stats.failures.fetch_add(1, Ordering::Relaxed),
        };
        result
    }
}

fn decode_reply(
    descriptor: &OperationDescriptor,
    reply: &str,
    epoch: Option<&str>,
) -> Result<ApiValue, RpcError> {
    match RpcResponse::from_message(reply)? {
        RpcResponse::Error(remote) => Err(remote.into_rpc_error(descriptor.name(), epoch)),
        RpcResponse::Value(Value::Null)
            if descriptor.result().is_some_and(|codec| !codec.is_nullable()) =>
        {
            Err(RpcError::remote(descriptor.name(), "answered without a result"))
        }
        RpcResponse::Value(value) => Ok(descriptor.decode_result(&value)?),
    }
}
