//! # Bridge Service
//!
//! Callee side of the plugin bridge. Runs inside the plugin host process,
//! takes requests off the shared request channel and answers each on its
//! private response channel.
//!
//! ## Request Lifecycle
//!
//! ```text
//! request channel ─► Dispatcher ─► handle_message ─┬─► PluginHost::invoke ──────────┐
//!                    (poll loop)   (decode, route) ├─► invoke_with_callback ─► Completion
//!                                                  ├─► create_stream ─► StreamCompletion
//!                                                  └─► StreamRegistry (update/destroy)
//!                                                                                    │
//! response channel ◄─────────────────────────── encoded result or error marker ◄────┘
//! ```
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! | Layer | Module | Contents |
//! |-------|--------|----------|
//! | Outer | `adapters/` | `InMemoryHost` |
//! | Middle | `ports/host.rs` | `PluginHost`, `HostStream` |
//! | Inner | `domain/` | completions, stream registry, errors |
//! | Service | `dispatcher.rs`, `handler.rs` | poll loop and dispatch units |
//!
//! ## Failure Isolation
//!
//! A malformed request, an unknown operation, invalid arguments or a
//! panicking operation body affect only that request. The loop keeps
//! serving; the caller receives an error marker when its response channel
//! is known.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod dispatcher;
pub mod domain;
mod handler;
pub mod ports;

pub use adapters::{InMemoryHost, MemoryStream};
pub use dispatcher::Dispatcher;
pub use domain::*;
pub use handler::DispatchStats;
pub use ports::*;
