//! # Error Types
//!
//! Errors surfaced at the call boundary of the bridge.

use thiserror::Error;

use crate::codec::CodecError;
use crate::envelope::EnvelopeError;

/// Errors returned to callers of the bridge.
///
/// Callers branch on the variant: `Timeout` means "never answered", while
/// `RemoteFailure` means "answered with an error".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// The operation name is absent from the registry.
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// A value could not be turned into or from its transport form.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// A value is outside its declared type or range.
    #[error("Validation failed for `{field}`: {reason}")]
    Validation { field: String, reason: String },

    /// No correlated response arrived within the configured timeout.
    #[error("RPC timed out: {0}")]
    Timeout(String),

    /// A stream mutation referenced an id with no live resource.
    #[error("Unknown stream: {0}")]
    UnknownStream(String),

    /// The stream was owned by a service instance that is no longer running.
    #[error("Stream expired (owning service restarted): {0}")]
    StreamExpired(String),

    /// The callee answered with a failure.
    #[error("Remote failure in {function}: {message}")]
    RemoteFailure { function: String, message: String },

    /// The message bus rejected a publish or subscribe.
    #[error("Bus error: {0}")]
    Bus(String),
}

impl RpcError {
    pub fn remote(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteFailure {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Whether the callee never answered.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<CodecError> for RpcError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Validation { field, reason } => Self::Validation { field, reason },
            CodecError::Encoding(message) => Self::Encoding(message),
        }
    }
}

impl From<EnvelopeError> for RpcError {
    fn from(err: EnvelopeError) -> Self {
        Self::Encoding(err.to_string())
    }
}
