//! # Bridge Client
//!
//! Caller side of the plugin bridge.
//!
//! ## Architecture
//!
//! ```text
//! PluginClient ──► RpcClient ──publish──► request channel ──► (service)
//!                      ▲
//!                      └──── private response channel ◄────── (service)
//! ```
//!
//! - `RpcClient` correlates each call with a private response channel and
//!   bounds the wait with the deployment timeout.
//! - `PluginClient` exposes one typed method per registered operation.
//! - `WritingStream` proxies a stream owned by the service.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod client;
pub mod correlator;
pub mod stream;

pub use client::PluginClient;
pub use correlator::{ClientStats, RpcClient};
pub use stream::WritingStream;
