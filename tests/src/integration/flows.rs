//! # Call Flows
//!
//! Request/response round trips through the whole bridge:
//!
//! 1. **Structured round trip**: `upload_shapes` encodes a list of records,
//!    the host assigns ids, the caller gets them back in input order
//! 2. **Caller-side rejection**: unknown operations and invalid arguments
//!    fail before anything is published
//! 3. **Timeouts**: a call without an answer fails `Timeout` and releases its
//!    response channel; a late answer is never observed
//! 4. **Channel tokens**: every call uses a fresh response channel

#[cfg(test)]
mod tests {
    use bridge_client::PluginClient;
    use bridge_service::InMemoryHost;
    use serde_json::json;
    use shared_bus::{InMemoryMessageBus, MessagePublisher, MessageSubscriber};
    use shared_types::{
        plugin_api, BridgeConfig, ComplexSummary, PluginData, ResponseChannel, RpcError,
        RpcRequest, RpcResponse, Shape, Vector3,
    };
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::fixtures::{spheres, TestBridge};

    // =========================================================================
    // ROUND TRIPS
    // =========================================================================

    #[tokio::test]
    async fn test_upload_shapes_returns_ids_in_input_order() {
        let host = Arc::new(InMemoryHost::new());
        let bridge = TestBridge::start(Arc::new(InMemoryMessageBus::new()), host.clone()).await;

        let shapes = vec![
            Shape::sphere(Vector3::new(1.0, 2.0, 3.0), 1.5),
            Shape::label(Vector3::new(0.0, 0.0, 0.0), "origin"),
        ];
        let ids = bridge.client.upload_shapes(&shapes).await.unwrap();

        assert_eq!(ids, vec![1, 2]);
        let stored = host.shapes();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].position, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(stored[1].text.as_deref(), Some("origin"));
        assert_eq!(stored[1].index, Some(2));
    }

    #[tokio::test]
    async fn test_sync_and_callback_results() {
        let data = PluginData {
            plugin_id: 11,
            session_id: 4,
            version_table: [("Shape".to_string(), 2)].into_iter().collect(),
        };
        let complexes = vec![ComplexSummary {
            index: 0,
            name: "protein".into(),
            visible: true,
        }];
        let host = Arc::new(
            InMemoryHost::new()
                .with_plugin_data(data.clone())
                .with_complexes(complexes.clone()),
        );
        let bridge = TestBridge::start(Arc::new(InMemoryMessageBus::new()), host).await;

        assert_eq!(bridge.client.get_plugin_data().await.unwrap(), data);
        assert_eq!(bridge.client.request_complex_list().await.unwrap(), complexes);
        bridge.runtime.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_many_sequential_calls() {
        let host = Arc::new(InMemoryHost::new());
        let bridge = TestBridge::start(Arc::new(InMemoryMessageBus::new()), host.clone()).await;

        for batch in 1..=5 {
            let ids = bridge.client.upload_shapes(&spheres(batch)).await.unwrap();
            assert_eq!(ids.len(), batch);
        }

        assert_eq!(host.shapes().len(), 15);
        assert_eq!(bridge.client.rpc().stats().calls_completed(), 5);
        assert_eq!(bridge.runtime.dispatcher().stats().requests_dispatched(), 5);
    }

    // =========================================================================
    // CALLER-SIDE REJECTION
    // =========================================================================

    #[tokio::test]
    async fn test_unknown_operation_publishes_nothing() {
        let bus = Arc::new(InMemoryMessageBus::new());
        let bridge = TestBridge::start(bus.clone(), Arc::new(InMemoryHost::new())).await;

        let err = bridge
            .client
            .rpc()
            .call("does_not_exist", vec![])
            .await
            .unwrap_err();

        assert_eq!(err, RpcError::UnknownOperation("does_not_exist".into()));
        assert_eq!(bus.messages_published(), 0);
    }

    #[tokio::test]
    async fn test_invalid_shape_names_field_path() {
        let bus = Arc::new(InMemoryMessageBus::new());
        let bridge = TestBridge::start(bus.clone(), Arc::new(InMemoryHost::new())).await;

        let mut shapes = spheres(3);
        shapes[1].radius = -1.0;
        let err = bridge.client.upload_shapes(&shapes).await.unwrap_err();

        match err {
            RpcError::Validation { field, .. } => assert_eq!(field, "shapes[1].radius"),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(bus.messages_published(), 0);
    }

    #[tokio::test]
    async fn test_host_failure_reaches_caller() {
        let host = Arc::new(InMemoryHost::new());
        host.fail_with(shared_types::ops::OPEN_URL, "browser unavailable");
        let bridge = TestBridge::start(Arc::new(InMemoryMessageBus::new()), host).await;

        match bridge.client.open_url("https://example.org").await.unwrap_err() {
            RpcError::RemoteFailure { function, message } => {
                assert_eq!(function, "open_url");
                assert!(message.contains("browser unavailable"));
            }
            other => panic!("expected remote failure, got {other:?}"),
        }
    }

    // =========================================================================
    // TIMEOUTS
    // =========================================================================

    #[tokio::test]
    async fn test_timeout_releases_response_channel() {
        let bus = Arc::new(InMemoryMessageBus::new());
        let config = BridgeConfig::default().with_rpc_timeout(Duration::from_millis(50));
        let client = PluginClient::new(bus.clone(), Arc::new(plugin_api().unwrap()), &config);

        let err = client.open_url("https://example.org").await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(bus.channel_count(), 0);
        assert_eq!(client.rpc().stats().timeouts(), 1);
    }

    #[tokio::test]
    async fn test_late_response_not_observed() {
        let bus = Arc::new(InMemoryMessageBus::new());
        let config = BridgeConfig::default().with_rpc_timeout(Duration::from_millis(50));
        let client = PluginClient::new(bus.clone(), Arc::new(plugin_api().unwrap()), &config);

        // Answers the first request too late and the second at once.
        let mut requests = bus.subscribe(&config.request_channel).unwrap();
        let responder_bus = bus.clone();
        tokio::spawn(async move {
            for (delay, plugin_id) in [(150, 1), (0, 2)] {
                let Some(message) = requests.recv().await else {
                    return;
                };
                let request = RpcRequest::from_message(&message).unwrap();
                tokio::time::sleep(Duration::from_millis(delay)).await;
                let body = json!({"plugin_id": plugin_id, "session_id": 0, "version_table": {}});
                let response = RpcResponse::Value(body).to_message().unwrap();
                let _ = responder_bus
                    .publish(request.response_channel.as_str(), response)
                    .await;
            }
        });

        assert!(client.get_plugin_data().await.unwrap_err().is_timeout());
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(client.get_plugin_data().await.unwrap().plugin_id, 2);
    }

    // =========================================================================
    // CHANNEL TOKENS
    // =========================================================================

    #[test]
    fn test_response_channels_unique() {
        let tokens: HashSet<String> = (0..10_000)
            .map(|_| ResponseChannel::generate().as_str().to_string())
            .collect();
        assert_eq!(tokens.len(), 10_000);
    }

    #[tokio::test]
    async fn test_redelivered_response_ignored() {
        let bus = Arc::new(InMemoryMessageBus::new().with_duplicate_delivery());
        let host = Arc::new(InMemoryHost::new().with_plugin_data(PluginData {
            plugin_id: 5,
            ..PluginData::default()
        }));
        let bridge = TestBridge::start(bus, host).await;

        assert_eq!(bridge.client.get_plugin_data().await.unwrap().plugin_id, 5);
        assert_eq!(bridge.client.get_plugin_data().await.unwrap().plugin_id, 5);
        let stats = bridge.client.rpc().stats();
        assert_eq!(stats.calls_completed(), 2);
        assert_eq!(stats.failures(), 0);
        // Each call took one response and released its channel
        assert_eq!(bridge.bus.channel_count(), 1);
    }
}
