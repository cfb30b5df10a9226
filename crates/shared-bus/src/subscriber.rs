//! # Channel Subscriber
//!
//! Defines the subscription side of the bus.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::publisher::BusError;

/// Payload carried on a bus channel (serialized JSON text).
pub type BusMessage = String;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The channel was closed by the bus or the subscription was released.
    #[error("Bus channel closed")]
    Closed,
}

/// Trait for subscribing to a named channel.
pub trait MessageSubscriber: Send + Sync {
    /// Subscribe to `channel`. Messages published after this call returns
    /// are delivered to the subscription.
    fn subscribe(&self, channel: &str) -> Result<Subscription, BusError>;
}

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// A subscription handle for receiving messages on one channel.
///
/// When dropped, the subscription is released just as with `unsubscribe()`.
pub struct Subscription {
    /// Channel this subscription listens on.
    channel: String,

    /// This subscription's queue. `None` once released.
    receiver: Option<mpsc::UnboundedReceiver<BusMessage>>,

    /// Bus-provided cleanup, run once after the receiver is dropped.
    release: Option<ReleaseHook>,

    /// Backlog depth that triggers a slow-subscriber warning.
    backlog_warning: usize,

    /// Set while the backlog is above `backlog_warning`.
    backlogged: bool,
}

impl Subscription {
    /// Create a new subscription.
    ///
    /// Bus adapters feed `receiver` and pass a `release` hook that detaches
    /// the channel from their broker.
    pub fn new(
        channel: impl Into<String>,
        receiver: mpsc::UnboundedReceiver<BusMessage>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            channel: channel.into(),
            receiver: Some(receiver),
            release: Some(Box::new(release)),
            backlog_warning: usize::MAX,
            backlogged: false,
        }
    }

    /// Warn once the number of queued messages reaches `depth`.
    #[must_use]
    pub fn with_backlog_warning(mut self, depth: usize) -> Self {
        self.backlog_warning = depth.max(1);
        self
    }

    /// Messages delivered to this subscription and not yet received.
    #[must_use]
    pub fn backlog(&self) -> usize {
        self.receiver.as_ref().map_or(0, mpsc::UnboundedReceiver::len)
    }

    /// Channel this subscription listens on.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Try to receive the next message without blocking.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(message))` - A message was available
    /// - `Ok(None)` - No message available (would block)
    /// - `Err(SubscriptionError::Closed)` - The channel was closed
    pub fn poll(&mut self) -> Result<Option<BusMessage>, SubscriptionError> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Err(SubscriptionError::Closed);
        };

        match receiver.try_recv() {
            Ok(message) => {
                self.track_backlog();
                Ok(Some(message))
            }
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(SubscriptionError::Closed),
        }
    }

    /// Receive the next message.
    ///
    /// # Returns
    ///
    /// - `Some(message)` - The next message
    /// - `None` - The channel was closed (bus dropped or subscription released)
    pub async fn recv(&mut self) -> Option<BusMessage> {
        let message = self.receiver.as_mut()?.recv().await?;
        self.track_backlog();
        Some(message)
    }

    fn track_backlog(&mut self) {
        let backlog = self.backlog();
        if backlog >= self.backlog_warning {
            if !self.backlogged {
                warn!(channel = %self.channel, backlog = backlog, "Slow subscriber, messages queueing");
            }
            self.backlogged = true;
        } else if backlog < self.backlog_warning / 2 {
            self.backlogged = false;
        }
    }

    /// Release the subscription. Messages published afterwards are not seen.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        // Receiver goes first so the bus sees this queue as closed.
        self.receiver.take();
        if let Some(hook) = self.release.take() {
            hook();
            debug!(channel = %self.channel, "Subscription released");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("active", &self.receiver.is_some())
            .field("backlog", &self.backlog())
            .finish()
    }
}
