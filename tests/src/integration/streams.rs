//! # Stream Lifecycle
//!
//! ```text
//! create_writing_stream ──► StreamInfo { id, epoch } ──► update* ──► destroy
//!                                                                      │
//!                                   second destroy ─► UnknownStream ◄──┘
//! ```
//!
//! A handle from a service instance that has since restarted fails
//! `StreamExpired` instead of `UnknownStream`.

#[cfg(test)]
mod tests {
    use bridge_service::{HostStream, InMemoryHost};
    use shared_bus::InMemoryMessageBus;
    use shared_types::{BridgeConfig, RpcError, StreamType};
    use std::sync::Arc;

    use crate::fixtures::{TestBridge, TEST_TIMEOUT};

    #[tokio::test]
    async fn test_create_update_destroy() {
        let host = Arc::new(InMemoryHost::new());
        let bridge = TestBridge::start(Arc::new(InMemoryMessageBus::new()), host.clone()).await;

        let stream = bridge
            .client
            .create_writing_stream(&[0, 1, 2], StreamType::Position)
            .await
            .unwrap();
        assert_eq!(stream.id(), "s1");
        assert_eq!(stream.handle().epoch, bridge.runtime.dispatcher().epoch());

        stream.update(&[1.0, 2.0, 3.0]).await.unwrap();
        stream.update(&[4.0, 5.0, 6.0]).await.unwrap();
        let backing = host.stream("s1").unwrap();
        assert_eq!(backing.frames(), vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        assert_eq!(backing.atom_indices(), &[0, 1, 2]);

        stream.destroy().await.unwrap();
        assert!(backing.is_destroyed());
        assert_eq!(
            stream.destroy().await.unwrap_err(),
            RpcError::UnknownStream("s1".into())
        );
    }

    #[tokio::test]
    async fn test_update_after_destroy_is_unknown_stream() {
        let bridge =
            TestBridge::start(Arc::new(InMemoryMessageBus::new()), Arc::new(InMemoryHost::new()))
                .await;

        let stream = bridge
            .client
            .create_writing_stream(&[3], StreamType::Scale)
            .await
            .unwrap();
        bridge.client.stream_destroy(stream.handle()).await.unwrap();

        assert_eq!(
            bridge.client.stream_update(stream.handle(), &[2.0]).await.unwrap_err(),
            RpcError::UnknownStream(stream.id().to_string())
        );
    }

    #[tokio::test]
    async fn test_update_racing_destroy_is_unknown_stream() {
        let host = Arc::new(InMemoryHost::new());
        let bridge = TestBridge::start(Arc::new(InMemoryMessageBus::new()), host.clone()).await;
        let stream = bridge
            .client
            .create_writing_stream(&[0], StreamType::Position)
            .await
            .unwrap();

        // The destroy ran between the update's lookup and its host call:
        // the host stream is gone while the registry still lists it.
        host.stream(stream.id()).unwrap().destroy().unwrap();
        assert!(bridge.runtime.dispatcher().streams().contains(stream.id()));

        assert_eq!(
            stream.update(&[1.0]).await.unwrap_err(),
            RpcError::UnknownStream(stream.id().to_string())
        );
        assert_eq!(bridge.runtime.dispatcher().stats().host_failures(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_streams_are_independent() {
        let host = Arc::new(InMemoryHost::new());
        let bridge = TestBridge::start(Arc::new(InMemoryMessageBus::new()), host.clone()).await;

        let (a, b) = tokio::join!(
            bridge.client.create_writing_stream(&[0], StreamType::Color),
            bridge.client.create_writing_stream(&[1], StreamType::Label),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.id(), b.id());

        a.destroy().await.unwrap();
        b.update(&[0.5]).await.unwrap();

        assert_eq!(bridge.runtime.dispatcher().streams().ids(), vec![b.id().to_string()]);
        assert_eq!(host.stream(b.id()).unwrap().frames(), vec![vec![0.5]]);
    }

    #[tokio::test]
    async fn test_concurrent_destroy_single_winner() {
        let bridge =
            TestBridge::start(Arc::new(InMemoryMessageBus::new()), Arc::new(InMemoryHost::new()))
                .await;
        let stream = bridge
            .client
            .create_writing_stream(&[0], StreamType::Position)
            .await
            .unwrap();

        let results = futures::future::join_all((0..4).map(|_| stream.destroy())).await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| *e == RpcError::UnknownStream(stream.id().to_string())));
    }

    #[tokio::test]
    async fn test_handle_from_previous_instance_expires() {
        let bus = Arc::new(InMemoryMessageBus::new());
        let config = BridgeConfig::default()
            .with_channel("plugin-requests")
            .with_rpc_timeout(TEST_TIMEOUT);

        let first =
            TestBridge::start_with(bus.clone(), Arc::new(InMemoryHost::new()), config.clone()).await;
        let stream = first
            .client
            .create_writing_stream(&[0], StreamType::Position)
            .await
            .unwrap();
        first.runtime.shutdown().await.unwrap();

        let second = TestBridge::start_with(bus, Arc::new(InMemoryHost::new()), config).await;
        assert_ne!(second.runtime.dispatcher().epoch(), stream.handle().epoch);

        assert_eq!(
            stream.update(&[1.0]).await.unwrap_err(),
            RpcError::StreamExpired("s1".into())
        );
    }
}
