//! Service-side error types.
//!
//! Only loop-level failures are errors of the dispatcher itself. Failures of
//! a single request are answered on its response channel and reported to the
//! host; they never surface here.

use shared_bus::BusError;
use thiserror::Error;

/// Errors that stop the dispatcher loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The request subscription ended.
    #[error("Request channel closed")]
    BusClosed,

    /// Subscribing to the request channel failed.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}

/// Stream registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamRegistryError {
    /// The host issued an id that is already live.
    #[error("Stream id already registered: {0}")]
    DuplicateStream(String),
}
