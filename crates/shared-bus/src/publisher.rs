//! # Channel Publisher
//!
//! Defines the publishing side of the bus and the in-memory implementation.

use crate::subscriber::{BusMessage, MessageSubscriber, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Errors from bus operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus has been shut down.
    #[error("Message bus closed")]
    Closed,

    /// The broker could not be reached.
    #[error("Message bus unavailable: {0}")]
    Unavailable(String),
}

/// Trait for publishing messages to a named channel.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publish `message` on `channel`.
    ///
    /// # Returns
    ///
    /// The number of subscriptions that received the message. Zero is not an
    /// error: a message nobody listens for is silently dropped.
    async fn publish(&self, channel: &str, message: BusMessage) -> Result<usize, BusError>;

    /// Get the total number of messages published.
    fn messages_published(&self) -> u64;
}

/// A complete bus: both publishing and subscribing.
pub trait MessageBus: MessagePublisher + MessageSubscriber {}

impl<T: MessagePublisher + MessageSubscriber + ?Sized> MessageBus for T {}

type ChannelTable = Arc<RwLock<HashMap<String, Vec<mpsc::UnboundedSender<BusMessage>>>>>;

/// In-memory implementation of the message bus.
///
/// Every subscription owns an unbounded `tokio::sync::mpsc` queue. A channel
/// is created on first subscription and removed when its last subscription
/// is released. A subscriber that stops draining delays only itself and
/// loses nothing; it is warned about once its backlog reaches `capacity`.
/// Suitable for single-process operation and tests; cross-process deployments
/// use an adapter over a real broker (e.g., Redis pub/sub).
pub struct InMemoryMessageBus {
    /// Live channels by name.
    channels: ChannelTable,

    /// Total messages published.
    messages_published: AtomicU64,

    /// Backlog depth at which a subscription reports itself as slow.
    capacity: usize,

    /// Set once `close()` has been called.
    closed: AtomicBool,

    /// Deliver every message twice (exercises at-least-once consumers).
    duplicate_delivery: bool,
}

impl InMemoryMessageBus {
    /// Create a new in-memory bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new in-memory bus with the given slow-subscriber threshold.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            messages_published: AtomicU64::new(0),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
            duplicate_delivery: false,
        }
    }

    /// Deliver every published message twice.
    #[must_use]
    pub fn with_duplicate_delivery(mut self) -> Self {
        self.duplicate_delivery = true;
        self
    }

    /// Number of live subscriptions on `channel`.
    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .get(channel)
            .map_or(0, |senders| senders.iter().filter(|s| !s.is_closed()).count())
    }

    /// Number of channels with at least one subscription.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    /// Get the slow-subscriber threshold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Shut the bus down. Existing subscriptions observe `Closed`; further
    /// publishes fail with `BusError::Closed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.channels.write().clear();
        debug!("In-memory bus closed");
    }

    /// Whether `close()` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessagePublisher for InMemoryMessageBus {
    async fn publish(&self, channel: &str, message: BusMessage) -> Result<usize, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        self.messages_published.fetch_add(1, Ordering::Relaxed);

        let Some(senders) = self.channels.read().get(channel).cloned() else {
            debug!(channel = channel, "Message dropped (no subscribers)");
            return Ok(0);
        };

        let mut receivers = 0;
        for sender in &senders {
            if self.duplicate_delivery {
                let _ = sender.send(message.clone());
            }
            if sender.send(message.clone()).is_ok() {
                receivers += 1;
            }
        }

        if receivers == 0 {
            debug!(channel = channel, "Message dropped (no receivers)");
        } else {
            trace!(channel = channel, receivers = receivers, "Message published");
        }
        Ok(receivers)
    }

    fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }
}

impl MessageSubscriber for InMemoryMessageBus {
    fn subscribe(&self, channel: &str) -> Result<Subscription, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        self.channels
            .write()
            .entry(channel.to_string())
            .or_default()
            .push(sender);

        debug!(channel = channel, "New subscription created");

        let table = Arc::clone(&self.channels);
        let key = channel.to_string();
        let subscription = Subscription::new(channel, receiver, move || {
            let mut channels = table.write();
            if let Some(senders) = channels.get_mut(&key) {
                senders.retain(|s| !s.is_closed());
                if senders.is_empty() {
                    channels.remove(&key);
                }
            }
        });
        Ok(subscription.with_backlog_warning(self.capacity))
    }
}
