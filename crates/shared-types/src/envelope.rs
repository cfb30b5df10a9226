//! # Wire Envelopes
//!
//! The two messages that travel on the bus.
//!
//! ## Request (shared inbound channel)
//!
//! ```json
//! {"function": "upload_shapes", "args": [[...]], "kwargs": {}, "response_channel": "6f1c..."}
//! ```
//!
//! `kwargs` is reserved. It is always emitted empty and ignored on receipt.
//!
//! ## Response (private response channel)
//!
//! The encoded result alone, or `null`. A callee-side failure is sent as the
//! reserved marker object `{"$error": {...}}` so the caller can tell
//! "answered with an error" apart from "answered with a value".

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::codec::CodecError;
use crate::errors::RpcError;

/// Reserved key of the response error marker.
pub const ERROR_MARKER: &str = "$error";

/// Envelope parse and serialization errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    #[error("Envelope could not be serialized: {0}")]
    Serialize(String),
}

/// Opaque token naming the private channel a response is published on.
///
/// Generated from 128 random bits, so channels are never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseChannel(String);

impl ResponseChannel {
    /// Generate a fresh, globally unique token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ResponseChannel {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl fmt::Display for ResponseChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A call published on the shared inbound channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Operation name.
    pub function: String,
    /// Positional arguments, already encoded.
    pub args: Vec<Value>,
    /// Reserved; always empty.
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    /// Where the single response goes.
    pub response_channel: ResponseChannel,
}

impl RpcRequest {
    pub fn new(function: impl Into<String>, args: Vec<Value>, response_channel: ResponseChannel) -> Self {
        Self {
            function: function.into(),
            args,
            kwargs: Map::new(),
            response_channel,
        }
    }

    pub fn to_message(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(|e| EnvelopeError::Serialize(e.to_string()))
    }

    pub fn from_message(message: &str) -> Result<Self, EnvelopeError> {
        serde_json::from_str(message).map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }
}

/// Kinds of callee-side failure carried by the error marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    UnknownOperation,
    Validation,
    UnknownStream,
    HostFailure,
}

/// Body of the `$error` response marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    /// Epoch of the service instance that produced the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<String>,
}

impl RemoteError {
    fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            field: None,
            stream_id: None,
            epoch: None,
        }
    }

    pub fn unknown_operation(name: &str) -> Self {
        Self::new(RemoteErrorKind::UnknownOperation, format!("unknown operation {name}"))
    }

    /// Build a validation marker from one or more argument failures.
    ///
    /// The first failing field is named; every reason is kept in the message.
    pub fn validation(errors: &[CodecError]) -> Self {
        let message = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        let field = errors.iter().find_map(|e| match e {
            CodecError::Validation { field, .. } => Some(field.clone()),
            CodecError::Encoding(_) => None,
        });
        Self {
            field,
            ..Self::new(RemoteErrorKind::Validation, message)
        }
    }

    pub fn unknown_stream(stream_id: &str, epoch: &str) -> Self {
        Self {
            stream_id: Some(stream_id.to_string()),
            epoch: Some(epoch.to_string()),
            ..Self::new(RemoteErrorKind::UnknownStream, format!("unknown stream {stream_id}"))
        }
    }

    pub fn host_failure(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::HostFailure, message)
    }

    /// Map the marker to the caller-side error.
    ///
    /// `known_epoch` is the epoch the caller learned when the stream was
    /// created. An `unknown_stream` from a different epoch means the owning
    /// service restarted and becomes `StreamExpired`.
    pub fn into_rpc_error(self, function: &str, known_epoch: Option<&str>) -> RpcError {
        match self.kind {
            RemoteErrorKind::UnknownOperation => RpcError::UnknownOperation(function.to_string()),
            RemoteErrorKind::Validation => RpcError::Validation {
                field: self.field.unwrap_or_else(|| function.to_string()),
                reason: self.message,
            },
            RemoteErrorKind::UnknownStream => {
                let id = self.stream_id.unwrap_or_default();
                match (known_epoch, self.epoch.as_deref()) {
                    (Some(known), Some(current)) if known != current => RpcError::StreamExpired(id),
                    _ => RpcError::UnknownStream(id),
                }
            }
            RemoteErrorKind::HostFailure => RpcError::remote(function, self.message),
        }
    }
}

/// Payload published on a response channel.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcResponse {
    /// The encoded result (possibly `null`).
    Value(Value),
    /// A callee-side failure.
    Error(RemoteError),
}

impl RpcResponse {
    pub fn to_message(&self) -> Result<String, EnvelopeError> {
        let serialize = |e: serde_json::Error| EnvelopeError::Serialize(e.to_string());
        match self {
            Self::Value(value) => serde_json::to_string(value).map_err(serialize),
            Self::Error(err) => {
                let body = serde_json::to_value(err).map_err(serialize)?;
                let mut marker = Map::new();
                marker.insert(ERROR_MARKER.to_string(), body);
                serde_json::to_string(&Value::Object(marker)).map_err(serialize)
            }
        }
    }

    pub fn from_message(message: &str) -> Result<Self, EnvelopeError> {
        let value: Value =
            serde_json::from_str(message).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

        match value {
            Value::Object(mut map) if map.len() == 1 && map.contains_key(ERROR_MARKER) => {
                let body = map.remove(ERROR_MARKER).unwrap_or(Value::Null);
                serde_json::from_value(body)
                    .map(Self::Error)
                    .map_err(|e| EnvelopeError::Malformed(e.to_string()))
            }
            other => Ok(Self::Value(other)),
        }
    }
}
