//! # Shared Bus - Publish/Subscribe Transport for the Plugin Bridge
//!
//! The frontend driver and the backend plugin service never share memory or a
//! socket. Everything they exchange travels as text messages on named channels
//! of a publish/subscribe bus.
//!
//! ## Channel Model
//!
//! ```text
//! ┌──────────────┐   publish(request_channel)   ┌──────────────┐
//! │   Frontend   │ ───────────────┐             │   Backend    │
//! │  (caller)    │                ▼             │  (callee)    │
//! └──────────────┘         ┌──────────────┐     └──────────────┘
//!        ↑                 │  Message Bus │            │
//!        │ subscribe(resp) │              │ ←──────────┘
//!        └──────────────── │              │  publish(response_channel)
//!                          └──────────────┘
//! ```
//!
//! ## Delivery Contract
//!
//! - Delivery is at-least-once per channel; no ordering across channels.
//! - Each subscription queues independently. A subscriber that stops
//!   draining builds a backlog and loses nothing.
//! - A message published to a channel with no subscriber is dropped.
//! - Subscriptions release their channel on `unsubscribe()` or drop.
//!
//! `InMemoryMessageBus` implements the contract in-process. Cross-process
//! deployments plug in an adapter implementing `MessagePublisher` and
//! `MessageSubscriber` over their broker of choice.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use publisher::{BusError, InMemoryMessageBus, MessageBus, MessagePublisher};
pub use subscriber::{BusMessage, MessageSubscriber, Subscription, SubscriptionError};

/// Backlog depth at which a subscription is reported as a slow subscriber.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
