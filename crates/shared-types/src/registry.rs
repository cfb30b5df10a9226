//! # Operation Schema Registry
//!
//! Static mapping from operation name to its descriptor: positional parameter
//! codecs, an optional result codec, how the operation completes, and whether
//! it produces or mutates a stream.
//!
//! The registry is built once at process start and never mutated afterwards.
//! Both sides of the bridge MUST build it from the same table; a mismatch is a
//! deployment error, not something either side recovers from at runtime.

use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::codec::{Codec, CodecError, ScalarKind};
use crate::errors::RpcError;
use crate::value::ApiValue;

/// How the callee learns an operation's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchKind {
    /// The result is the return value of the invocation.
    Sync,
    /// The invocation receives a completion that is fired later, exactly once.
    Callback,
}

/// Mutations the bridge routes to a live stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamMutation {
    Update,
    Destroy,
}

/// Role an operation plays with respect to stream resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationRole {
    Ordinary,
    /// Creates a long-lived stream owned by the service side.
    StreamProducer,
    /// Mutates a live stream; the first argument is the stream id.
    StreamMutation(StreamMutation),
}

/// A named positional parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub codec: Codec,
}

/// Registry build errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Operation registered twice: {0}")]
    DuplicateOperation(String),

    #[error("Stream producer {0} must be callback-kind")]
    StreamProducerNotCallback(String),

    #[error("Stream producer {0} must declare a result codec")]
    StreamProducerWithoutResult(String),

    #[error("Stream mutation {0} must take a text stream id as its first parameter")]
    StreamMutationWithoutId(String),
}

/// Descriptor of one remotely callable operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationDescriptor {
    name: String,
    params: Vec<Param>,
    result: Option<Codec>,
    dispatch: DispatchKind,
    role: OperationRole,
}

impl OperationDescriptor {
    fn new(name: impl Into<String>, dispatch: DispatchKind) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            result: None,
            dispatch,
            role: OperationRole::Ordinary,
        }
    }

    /// An operation whose result is its return value.
    pub fn sync(name: impl Into<String>) -> Self {
        Self::new(name, DispatchKind::Sync)
    }

    /// An operation that delivers its result through a completion callback.
    pub fn callback(name: impl Into<String>) -> Self {
        Self::new(name, DispatchKind::Callback)
    }

    /// Append a positional parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, codec: impl Into<Codec>) -> Self {
        self.params.push(Param {
            name: name.into(),
            codec: codec.into(),
        });
        self
    }

    /// Declare the result codec. Without one the result is always `null`.
    #[must_use]
    pub fn returns(mut self, codec: impl Into<Codec>) -> Self {
        self.result = Some(codec.into());
        self
    }

    #[must_use]
    pub fn stream_producer(mut self) -> Self {
        self.role = OperationRole::StreamProducer;
        self
    }

    #[must_use]
    pub fn stream_mutation(mut self, mutation: StreamMutation) -> Self {
        self.role = OperationRole::StreamMutation(mutation);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn result(&self) -> Option<&Codec> {
        self.result.as_ref()
    }

    pub fn dispatch(&self) -> DispatchKind {
        self.dispatch
    }

    pub fn role(&self) -> OperationRole {
        self.role
    }

    pub fn is_stream_producer(&self) -> bool {
        self.role == OperationRole::StreamProducer
    }

    /// Fail unless `count` matches the declared parameter count.
    pub fn check_arity(&self, count: usize) -> Result<(), CodecError> {
        if count == self.params.len() {
            Ok(())
        } else {
            Err(CodecError::Encoding(format!(
                "{} expects {} argument(s), got {count}",
                self.name,
                self.params.len()
            )))
        }
    }

    /// Encode positional arguments in order.
    pub fn encode_args(&self, args: &[ApiValue]) -> Result<Vec<Value>, CodecError> {
        self.check_arity(args.len())?;
        self.params
            .iter()
            .zip(args)
            .map(|(param, arg)| param.codec.encode(&param.name, arg))
            .collect()
    }

    /// Decode positional arguments, collecting every failing argument.
    pub fn decode_args(&self, args: &[Value]) -> Result<Vec<ApiValue>, Vec<CodecError>> {
        self.check_arity(args.len()).map_err(|e| vec![e])?;

        let mut decoded = Vec::with_capacity(args.len());
        let mut errors = Vec::new();
        for (param, arg) in self.params.iter().zip(args) {
            match param.codec.decode(&param.name, arg) {
                Ok(value) => decoded.push(value),
                Err(e) => errors.push(e),
            }
        }

        if errors.is_empty() {
            Ok(decoded)
        } else {
            Err(errors)
        }
    }

    /// Encode a result. Operations without a result codec always yield `null`.
    pub fn encode_result(&self, value: &ApiValue) -> Result<Value, CodecError> {
        match &self.result {
            Some(codec) => codec.encode("result", value),
            None => Ok(Value::Null),
        }
    }

    /// Decode a result. Operations without a result codec always yield `Null`.
    pub fn decode_result(&self, wire: &Value) -> Result<ApiValue, CodecError> {
        match &self.result {
            Some(codec) => codec.decode("result", wire),
            None => Ok(ApiValue::Null),
        }
    }

    fn validate(&self) -> Result<(), RegistryError> {
        match self.role {
            OperationRole::Ordinary => Ok(()),
            OperationRole::StreamProducer if self.dispatch != DispatchKind::Callback => {
                Err(RegistryError::StreamProducerNotCallback(self.name.clone()))
            }
            OperationRole::StreamProducer if self.result.is_none() => {
                Err(RegistryError::StreamProducerWithoutResult(self.name.clone()))
            }
            OperationRole::StreamProducer => Ok(()),
            OperationRole::StreamMutation(_) => {
                let takes_id = self.params.first().is_some_and(|p| {
                    matches!(&p.codec, Codec::Scalar(s) if matches!(s.kind(), ScalarKind::Text { .. }))
                });
                if takes_id {
                    Ok(())
                } else {
                    Err(RegistryError::StreamMutationWithoutId(self.name.clone()))
                }
            }
        }
    }
}

/// Immutable operation table keyed by name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    operations: HashMap<String, OperationDescriptor>,
}

impl SchemaRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Look up an operation by name.
    pub fn lookup(&self, name: &str) -> Result<&OperationDescriptor, RpcError> {
        self.operations
            .get(name)
            .ok_or_else(|| RpcError::UnknownOperation(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Collects descriptors and validates them into a `SchemaRegistry`.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    operations: Vec<OperationDescriptor>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn operation(mut self, descriptor: OperationDescriptor) -> Self {
        self.operations.push(descriptor);
        self
    }

    pub fn build(self) -> Result<SchemaRegistry, RegistryError> {
        let mut operations = HashMap::with_capacity(self.operations.len());
        for descriptor in self.operations {
            descriptor.validate()?;
            let name = descriptor.name.clone();
            if operations.insert(name.clone(), descriptor).is_some() {
                return Err(RegistryError::DuplicateOperation(name));
            }
        }
        Ok(SchemaRegistry { operations })
    }
}
