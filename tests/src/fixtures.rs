//! Shared test fixtures.

use bridge_client::PluginClient;
use bridge_runtime::BridgeRuntime;
use bridge_service::PluginHost;
use shared_bus::InMemoryMessageBus;
use shared_types::{BridgeConfig, Shape, Vector3};
use std::sync::Arc;
use std::time::Duration;

/// Timeout used by fixtures unless a test asks for another.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(2);

/// A started runtime and a client bound to it.
pub struct TestBridge {
    pub bus: Arc<InMemoryMessageBus>,
    pub runtime: BridgeRuntime,
    pub client: PluginClient,
}

impl TestBridge {
    /// Start a runtime for `host` on `bus` and wait until it listens.
    pub async fn start(bus: Arc<InMemoryMessageBus>, host: Arc<dyn PluginHost>) -> Self {
        Self::start_with(bus, host, BridgeConfig::default().with_rpc_timeout(TEST_TIMEOUT)).await
    }

    pub async fn start_with(
        bus: Arc<InMemoryMessageBus>,
        host: Arc<dyn PluginHost>,
        config: BridgeConfig,
    ) -> Self {
        let runtime = BridgeRuntime::new(config, bus.clone(), host).expect("runtime");
        runtime.start().expect("start");
        wait_for_listener(&bus, &runtime.config().request_channel).await;
        let client = runtime.client();
        Self {
            bus,
            runtime,
            client,
        }
    }

    pub fn channel(&self) -> &str {
        &self.runtime.config().request_channel
    }
}

/// Wait until something subscribes to `channel`.
pub async fn wait_for_listener(bus: &InMemoryMessageBus, channel: &str) {
    while bus.subscriber_count(channel) == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// `count` spheres along the x axis.
pub fn spheres(count: usize) -> Vec<Shape> {
    (0..count)
        .map(|i| Shape::sphere(Vector3::new(i as f64, 0.0, 0.0), 0.5 + i as f64))
        .collect()
}
