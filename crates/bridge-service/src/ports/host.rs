//! # Outbound Port - PluginHost
//!
//! The plugin host executes the operations the bridge transports. The
//! dispatcher only decodes arguments and routes them here; it never knows
//! what an operation does.
//!
//! ## Completion Styles
//!
//! | Registry kind | Host method | Result delivery |
//! |---------------|-------------|-----------------|
//! | sync | `invoke` | return value |
//! | callback | `invoke_with_callback` | `Completion::complete`, exactly once, any time |
//! | stream producer | `create_stream` | `StreamCompletion::complete` |
//!
//! Every method except `tick` runs on a blocking worker thread, so bodies
//! may block without stalling the poll loop.

use shared_types::{ApiValue, CodecError, NotificationKind};
use std::ops::ControlFlow;
use thiserror::Error;

use crate::domain::completion::{Completion, StreamCompletion};

/// Errors raised by host operation bodies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The host has no body for this operation.
    #[error("Operation not supported by host: {0}")]
    Unsupported(String),

    /// An argument decoded but the host cannot use it.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation ran and failed.
    #[error("Host operation failed: {0}")]
    Failed(String),

    /// The stream was destroyed before this mutation reached it.
    #[error("Stream is gone: {0}")]
    StreamGone(String),
}

impl From<CodecError> for HostError {
    fn from(err: CodecError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

/// Host API the dispatcher drives.
pub trait PluginHost: Send + Sync + 'static {
    /// Run a sync operation and return its result.
    fn invoke(&self, function: &str, args: Vec<ApiValue>) -> Result<ApiValue, HostError>;

    /// Start a callback operation.
    ///
    /// The host must eventually call `completion.complete(..)`. Dropping the
    /// completion unfired answers the caller with a failure.
    fn invoke_with_callback(&self, function: &str, args: Vec<ApiValue>, completion: Completion);

    /// Create a stream resource and hand it to `completion`.
    fn create_stream(&self, function: &str, args: Vec<ApiValue>, completion: StreamCompletion);

    /// Show a user-visible diagnostic. Dispatch failures are reported here.
    fn send_notification(&self, kind: NotificationKind, message: &str);

    /// Per-iteration bookkeeping (network receive, pending callbacks).
    ///
    /// Called once per poll loop iteration on the loop itself and must not
    /// block. `ControlFlow::Break` stops the dispatcher.
    fn tick(&self) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// A long-lived stream owned by the host.
pub trait HostStream: Send + Sync {
    /// Identifier issued by the host; unique among live streams.
    fn id(&self) -> &str;

    /// Push a frame. `args` are the mutation arguments after the stream id.
    fn update(&self, args: Vec<ApiValue>) -> Result<(), HostError>;

    /// Release the stream.
    fn destroy(&self) -> Result<(), HostError>;
}
