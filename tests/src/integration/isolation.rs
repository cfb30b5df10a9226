//! # Failure Isolation
//!
//! A request that fails in any way, including a panicking operation body or
//! a message that is not a request at all, affects only itself. The poll
//! loop keeps serving later and interleaved requests.

#[cfg(test)]
mod tests {
    use bridge_service::{Completion, HostError, InMemoryHost, PluginHost, StreamCompletion};
    use shared_bus::{InMemoryMessageBus, MessagePublisher};
    use shared_types::{ops, ApiValue, BridgeConfig, NotificationKind, RpcError};
    use std::ops::ControlFlow;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::fixtures::{TestBridge, TEST_TIMEOUT};

    /// Delegates to an `InMemoryHost` but panics inside one operation.
    struct PanickingHost {
        inner: Arc<InMemoryHost>,
        panics_on: &'static str,
    }

    impl PluginHost for PanickingHost {
        fn invoke(&self, function: &str, args: Vec<ApiValue>) -> Result<ApiValue, HostError> {
            if function == self.panics_on {
                panic!("{function} exploded");
            }
            self.inner.invoke(function, args)
        }

        fn invoke_with_callback(&self, function: &str, args: Vec<ApiValue>, completion: Completion) {
            if function == self.panics_on {
                panic!("{function} exploded");
            }
            self.inner.invoke_with_callback(function, args, completion);
        }

        fn create_stream(&self, function: &str, args: Vec<ApiValue>, completion: StreamCompletion) {
            self.inner.create_stream(function, args, completion);
        }

        fn send_notification(&self, kind: NotificationKind, message: &str) {
            self.inner.send_notification(kind, message);
        }

        fn tick(&self) -> ControlFlow<()> {
            self.inner.tick()
        }
    }

    async fn panicking_bridge(panics_on: &'static str) -> (TestBridge, Arc<InMemoryHost>) {
        let inner = Arc::new(InMemoryHost::new());
        let host = Arc::new(PanickingHost {
            inner: inner.clone(),
            panics_on,
        });
        let bridge = TestBridge::start(Arc::new(InMemoryMessageBus::new()), host).await;
        (bridge, inner)
    }

    fn assert_remote_failure(err: RpcError, expected_function: &str) {
        match err {
            RpcError::RemoteFailure { function, .. } => assert_eq!(function, expected_function),
            other => panic!("expected remote failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_panicking_sync_operation_answers_and_loop_survives() {
        let (bridge, host) = panicking_bridge(ops::OPEN_URL).await;

        let (failing, succeeding) = tokio::join!(
            bridge.client.open_url("https://example.org"),
            bridge.client.get_plugin_data(),
        );
        assert_remote_failure(failing.unwrap_err(), ops::OPEN_URL);
        assert!(succeeding.is_ok());

        // Later requests are still served
        assert!(bridge.client.get_plugin_data().await.is_ok());

        let stats = bridge.runtime.dispatcher().stats();
        assert_eq!(stats.host_failures(), 1);
        assert!(host
            .notifications()
            .iter()
            .any(|(kind, message)| *kind == NotificationKind::Error && message.contains("panicked")));
    }

    #[tokio::test]
    async fn test_panicking_callback_operation_answers() {
        let (bridge, _host) = panicking_bridge(ops::REQUEST_COMPLEX_LIST).await;

        assert_remote_failure(
            bridge.client.request_complex_list().await.unwrap_err(),
            ops::REQUEST_COMPLEX_LIST,
        );
        assert!(bridge.client.get_plugin_data().await.is_ok());
    }

    #[tokio::test]
    async fn test_garbage_on_request_channel_is_skipped() {
        let host = Arc::new(InMemoryHost::new());
        let bridge = TestBridge::start(Arc::new(InMemoryMessageBus::new()), host.clone()).await;

        for garbage in ["", "[]", "{\"function\": 1}", "not json at all"] {
            bridge
                .bus
                .publish(bridge.channel(), garbage.to_string())
                .await
                .unwrap();
        }

        bridge.client.open_url("https://example.org").await.unwrap();
        assert_eq!(host.opened_urls(), vec!["https://example.org"]);
        assert_eq!(bridge.runtime.dispatcher().stats().requests_rejected(), 4);
    }

    #[tokio::test]
    async fn test_backpressure_parks_until_callback_completes() {
        let host = Arc::new(InMemoryHost::new());
        let config = BridgeConfig::default()
            .with_rpc_timeout(TEST_TIMEOUT)
            .with_max_in_flight(1);
        let bridge =
            TestBridge::start_with(Arc::new(InMemoryMessageBus::new()), host.clone(), config).await;
        host.hold_callbacks(true);

        let client = bridge.client.clone();
        let held = tokio::spawn(async move { client.request_complex_list().await });
        while host.queued_callbacks() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let client = bridge.client.clone();
        let parked = tokio::spawn(async move { client.open_url("https://example.org").await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(host.opened_urls().is_empty());
        assert_eq!(bridge.runtime.dispatcher().in_flight(), 1);

        host.hold_callbacks(false);
        assert!(held.await.unwrap().unwrap().is_empty());
        parked.await.unwrap().unwrap();
        assert_eq!(host.opened_urls(), vec!["https://example.org"]);
    }

    #[tokio::test]
    async fn test_backlog_beyond_bus_capacity_is_served() {
        let host = Arc::new(InMemoryHost::new());
        let config = BridgeConfig::default()
            .with_rpc_timeout(TEST_TIMEOUT)
            .with_max_in_flight(1);
        let bridge = TestBridge::start_with(
            Arc::new(InMemoryMessageBus::with_capacity(4)),
            host.clone(),
            config,
        )
        .await;
        host.hold_callbacks(true);

        let client = bridge.client.clone();
        let held = tokio::spawn(async move { client.request_complex_list().await });
        while host.queued_callbacks() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        // Ten requests queue behind the held one, well past the bus capacity
        let waiting: Vec<_> = (0..10)
            .map(|i| {
                let client = bridge.client.clone();
                tokio::spawn(async move { client.open_url(&format!("https://example.org/{i}")).await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(host.opened_urls().is_empty());

        host.hold_callbacks(false);
        held.await.unwrap().unwrap();
        for call in waiting {
            call.await.unwrap().unwrap();
        }

        assert_eq!(host.opened_urls().len(), 10);
        assert_eq!(bridge.client.rpc().stats().timeouts(), 0);
        assert_eq!(bridge.runtime.dispatcher().stats().requests_dispatched(), 11);
    }
}
