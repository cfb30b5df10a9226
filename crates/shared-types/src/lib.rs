//! # Shared Types Crate
//!
//! Everything both sides of the bridge must agree on: the native value model,
//! codecs, the operation schema registry, wire envelopes, the error taxonomy,
//! the plugin API table and the deployment configuration.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: The caller and the service load the same
//!   `SchemaRegistry` from `api::plugin_api()`.
//! - **Codecs Resolved Once**: A `Codec` is either structured or scalar, chosen
//!   when the registry is built and never inspected by value at call time.
//! - **Typed Failures**: Every failure at the call boundary is an `RpcError`
//!   variant callers can branch on.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod api;
pub mod codec;
pub mod config;
pub mod entities;
pub mod envelope;
pub mod errors;
pub mod registry;
pub mod value;

pub use api::{ops, plugin_api};
pub use codec::{Codec, CodecError, Field, ScalarCodec, ScalarKind, Schema};
pub use config::{BridgeConfig, ConfigError};
pub use entities::*;
pub use envelope::{
    EnvelopeError, RemoteError, RemoteErrorKind, ResponseChannel, RpcRequest, RpcResponse,
    ERROR_MARKER,
};
pub use errors::RpcError;
pub use registry::{
    DispatchKind, OperationDescriptor, OperationRole, Param, RegistryBuilder, RegistryError,
    SchemaRegistry, StreamMutation,
};
pub use value::ApiValue;
