//! # Codecs
//!
//! Per-value conversion between native `ApiValue`s and transport JSON.
//!
//! Two kinds, resolved once when the registry is built:
//!
//! | Kind | Native | Transport |
//! |------|--------|-----------|
//! | `Structured(Schema)` | `Record` (or `List` of records when `many`) | JSON object (array) |
//! | `Scalar(ScalarCodec)` | `Bool`/`Int`/`Float`/`Text`/`Bytes`/`List`/`Record` | JSON primitive or container |
//!
//! Both directions validate. Every failure names the offending field by its
//! path, e.g. `shapes[1].position.x`. Codecs are pure and never perform I/O.

use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::value::ApiValue;

/// Errors raised while converting a value to or from its transport form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The value does not satisfy the declared type or range.
    #[error("Validation failed for `{field}`: {reason}")]
    Validation { field: String, reason: String },

    /// The value cannot be represented at all (wrong arity, unserializable).
    #[error("Encoding failed: {0}")]
    Encoding(String),
}

impl CodecError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

fn field_path(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

fn index_path(path: &str, index: usize) -> String {
    format!("{path}[{index}]")
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// CODEC
// =============================================================================

/// A value codec: either a record schema or a validated scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum Codec {
    Structured(Arc<Schema>),
    Scalar(ScalarCodec),
}

impl Codec {
    /// Encode a native value into its transport form.
    ///
    /// `path` names the value in validation errors.
    pub fn encode(&self, path: &str, value: &ApiValue) -> Result<Value, CodecError> {
        match self {
            Self::Structured(schema) => schema.encode(path, value),
            Self::Scalar(scalar) => scalar.encode(path, value),
        }
    }

    /// Decode a transport value into its native form.
    pub fn decode(&self, path: &str, wire: &Value) -> Result<ApiValue, CodecError> {
        match self {
            Self::Structured(schema) => schema.decode(path, wire),
            Self::Scalar(scalar) => scalar.decode(path, wire),
        }
    }

    /// Whether the codec accepts `null`.
    pub fn is_nullable(&self) -> bool {
        match self {
            Self::Structured(_) => false,
            Self::Scalar(scalar) => scalar.nullable,
        }
    }
}

impl From<Schema> for Codec {
    fn from(schema: Schema) -> Self {
        Self::Structured(Arc::new(schema))
    }
}

impl From<Arc<Schema>> for Codec {
    fn from(schema: Arc<Schema>) -> Self {
        Self::Structured(schema)
    }
}

impl From<ScalarCodec> for Codec {
    fn from(scalar: ScalarCodec) -> Self {
        Self::Scalar(scalar)
    }
}

// =============================================================================
// STRUCTURED (SCHEMA)
// =============================================================================

/// One named field of a record schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub codec: Codec,
    pub required: bool,
}

/// Record schema for rich domain values.
///
/// Unknown fields are rejected in both directions. Missing optional fields
/// stay absent, so well-formed transport records survive a decode/encode
/// cycle unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
    many: bool,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            many: false,
        }
    }

    /// Add a required field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, codec: impl Into<Codec>) -> Self {
        self.fields.push(Field {
            name: name.into(),
            codec: codec.into(),
            required: true,
        });
        self
    }

    /// Add an optional field.
    #[must_use]
    pub fn optional(mut self, name: impl Into<String>, codec: impl Into<Codec>) -> Self {
        self.fields.push(Field {
            name: name.into(),
            codec: codec.into(),
            required: false,
        });
        self
    }

    /// Treat the transport value as a list of records.
    #[must_use]
    pub fn many(mut self) -> Self {
        self.many = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn is_many(&self) -> bool {
        self.many
    }

    fn encode(&self, path: &str, value: &ApiValue) -> Result<Value, CodecError> {
        if !self.many {
            return self.encode_record(path, value);
        }
        let ApiValue::List(items) = value else {
            return Err(CodecError::validation(
                path,
                format!("expected list of {}, got {}", self.name, value.type_name()),
            ));
        };
        items
            .iter()
            .enumerate()
            .map(|(i, item)| self.encode_record(&index_path(path, i), item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    fn decode(&self, path: &str, wire: &Value) -> Result<ApiValue, CodecError> {
        if !self.many {
            return self.decode_record(path, wire);
        }
        let Value::Array(items) = wire else {
            return Err(CodecError::validation(
                path,
                format!("expected array of {}, got {}", self.name, json_type(wire)),
            ));
        };
        items
            .iter()
            .enumerate()
            .map(|(i, item)| self.decode_record(&index_path(path, i), item))
            .collect::<Result<Vec<_>, _>>()
            .map(ApiValue::List)
    }

    fn encode_record(&self, path: &str, value: &ApiValue) -> Result<Value, CodecError> {
        let ApiValue::Record(record) = value else {
            return Err(CodecError::validation(
                path,
                format!("expected {} record, got {}", self.name, value.type_name()),
            ));
        };
        self.reject_unknown(path, record.keys())?;

        let mut out = Map::new();
        for field in &self.fields {
            let field_path = field_path(path, &field.name);
            match record.get(&field.name) {
                Some(v) => {
                    out.insert(field.name.clone(), field.codec.encode(&field_path, v)?);
                }
                None if field.required => {
                    return Err(CodecError::validation(field_path, "missing required field"));
                }
                None => {}
            }
        }
        Ok(Value::Object(out))
    }

    fn decode_record(&self, path: &str, wire: &Value) -> Result<ApiValue, CodecError> {
        let Value::Object(object) = wire else {
            return Err(CodecError::validation(
                path,
                format!("expected {} object, got {}", self.name, json_type(wire)),
            ));
        };
        self.reject_unknown(path, object.keys())?;

        let mut out = BTreeMap::new();
        for field in &self.fields {
            let field_path = field_path(path, &field.name);
            match object.get(&field.name) {
                Some(v) => {
                    out.insert(field.name.clone(), field.codec.decode(&field_path, v)?);
                }
                None if field.required => {
                    return Err(CodecError::validation(field_path, "missing required field"));
                }
                None => {}
            }
        }
        Ok(ApiValue::Record(out))
    }

    fn reject_unknown<'a>(
        &self,
        path: &str,
        mut keys: impl Iterator<Item = &'a String>,
    ) -> Result<(), CodecError> {
        match keys.find(|key| !self.fields.iter().any(|f| &f.name == *key)) {
            Some(unknown) => Err(CodecError::validation(
                field_path(path, unknown),
                format!("unknown field for {}", self.name),
            )),
            None => Ok(()),
        }
    }
}

// =============================================================================
// SCALAR
// =============================================================================

/// Declared type (and range) of a scalar value.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarKind {
    Bool,
    Int { min: i64, max: i64 },
    /// Accepts integers and widens them.
    Float { min: f64, max: f64 },
    Text { max_len: Option<usize> },
    /// Text restricted to a fixed set of names.
    Choice(&'static [&'static str]),
    /// Hex string on the wire.
    Bytes,
    List(Box<ScalarKind>),
    /// String-keyed map; native form is a `Record`.
    Dict(Box<ScalarKind>),
}

/// Scalar codec: validated primitive conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarCodec {
    kind: ScalarKind,
    nullable: bool,
}

impl ScalarCodec {
    pub fn new(kind: ScalarKind) -> Self {
        Self {
            kind,
            nullable: false,
        }
    }

    pub fn boolean() -> Self {
        Self::new(ScalarKind::Bool)
    }

    pub fn int() -> Self {
        Self::int_range(i64::MIN, i64::MAX)
    }

    pub fn int_range(min: i64, max: i64) -> Self {
        Self::new(ScalarKind::Int { min, max })
    }

    pub fn float() -> Self {
        Self::float_range(f64::MIN, f64::MAX)
    }

    pub fn float_range(min: f64, max: f64) -> Self {
        Self::new(ScalarKind::Float { min, max })
    }

    pub fn text() -> Self {
        Self::new(ScalarKind::Text { max_len: None })
    }

    pub fn text_max(max_len: usize) -> Self {
        Self::new(ScalarKind::Text {
            max_len: Some(max_len),
        })
    }

    pub fn choice(options: &'static [&'static str]) -> Self {
        Self::new(ScalarKind::Choice(options))
    }

    pub fn bytes() -> Self {
        Self::new(ScalarKind::Bytes)
    }

    pub fn list_of(item: ScalarKind) -> Self {
        Self::new(ScalarKind::List(Box::new(item)))
    }

    pub fn dict_of(value: ScalarKind) -> Self {
        Self::new(ScalarKind::Dict(Box::new(value)))
    }

    /// Accept `null` in addition to the declared kind.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn kind(&self) -> &ScalarKind {
        &self.kind
    }

    fn encode(&self, path: &str, value: &ApiValue) -> Result<Value, CodecError> {
        match value {
            ApiValue::Null if self.nullable => Ok(Value::Null),
            ApiValue::Null => Err(CodecError::validation(path, "null is not allowed")),
            _ => self.kind.encode(path, value),
        }
    }

    fn decode(&self, path: &str, wire: &Value) -> Result<ApiValue, CodecError> {
        match wire {
            Value::Null if self.nullable => Ok(ApiValue::Null),
            Value::Null => Err(CodecError::validation(path, "null is not allowed")),
            _ => self.kind.decode(path, wire),
        }
    }
}

impl ScalarKind {
    fn describe(&self) -> String {
        match self {
            Self::Bool => "bool".into(),
            Self::Int { .. } => "int".into(),
            Self::Float { .. } => "float".into(),
            Self::Text { .. } => "text".into(),
            Self::Choice(options) => format!("one of {options:?}"),
            Self::Bytes => "hex bytes".into(),
            Self::List(item) => format!("list of {}", item.describe()),
            Self::Dict(value) => format!("map of {}", value.describe()),
        }
    }

    fn mismatch(&self, path: &str, got: &str) -> CodecError {
        CodecError::validation(path, format!("expected {}, got {got}", self.describe()))
    }

    fn check_int(path: &str, i: i64, min: i64, max: i64) -> Result<i64, CodecError> {
        if i < min || i > max {
            return Err(CodecError::validation(
                path,
                format!("{i} is outside [{min}, {max}]"),
            ));
        }
        Ok(i)
    }

    fn check_float(path: &str, f: f64, min: f64, max: f64) -> Result<f64, CodecError> {
        if !f.is_finite() {
            return Err(CodecError::validation(path, "not a finite number"));
        }
        if f < min || f > max {
            return Err(CodecError::validation(
                path,
                format!("{f} is outside [{min}, {max}]"),
            ));
        }
        Ok(f)
    }

    fn check_text<'a>(&self, path: &str, s: &'a str) -> Result<&'a str, CodecError> {
        match self {
            Self::Text {
                max_len: Some(max_len),
            } if s.chars().count() > *max_len => Err(CodecError::validation(
                path,
                format!("longer than {max_len} characters"),
            )),
            Self::Choice(options) if !options.contains(&s) => Err(CodecError::validation(
                path,
                format!("{s:?} is not one of {options:?}"),
            )),
            _ => Ok(s),
        }
    }

    fn encode(&self, path: &str, value: &ApiValue) -> Result<Value, CodecError> {
        match (self, value) {
            (Self::Bool, ApiValue::Bool(b)) => Ok(Value::Bool(*b)),
            (Self::Int { min, max }, ApiValue::Int(i)) => {
                Self::check_int(path, *i, *min, *max).map(Value::from)
            }
            (Self::Float { min, max }, ApiValue::Int(i)) => {
                Self::check_float(path, *i as f64, *min, *max)?;
                Ok(Value::from(*i))
            }
            (Self::Float { min, max }, ApiValue::Float(f)) => {
                let f = Self::check_float(path, *f, *min, *max)?;
                Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| CodecError::validation(path, "not a finite number"))
            }
            (Self::Text { .. } | Self::Choice(_), ApiValue::Text(s)) => {
                self.check_text(path, s).map(|s| Value::String(s.to_string()))
            }
            (Self::Bytes, ApiValue::Bytes(bytes)) => Ok(Value::String(hex::encode(bytes))),
            (Self::List(item), ApiValue::List(items)) => items
                .iter()
                .enumerate()
                .map(|(i, v)| item.encode(&index_path(path, i), v))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            (Self::Dict(inner), ApiValue::Record(entries)) => entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), inner.encode(&field_path(path, k), v)?)))
                .collect::<Result<Map<_, _>, CodecError>>()
                .map(Value::Object),
            _ => Err(self.mismatch(path, value.type_name())),
        }
    }

    fn decode(&self, path: &str, wire: &Value) -> Result<ApiValue, CodecError> {
        match (self, wire) {
            (Self::Bool, Value::Bool(b)) => Ok(ApiValue::Bool(*b)),
            (Self::Int { min, max }, Value::Number(n)) if !n.is_f64() => {
                let i = n
                    .as_i64()
                    .ok_or_else(|| CodecError::validation(path, format!("{n} overflows int")))?;
                Self::check_int(path, i, *min, *max).map(ApiValue::Int)
            }
            // Integral transport numbers stay integral so they re-encode unchanged
            (Self::Float { min, max }, Value::Number(n)) if !n.is_f64() && n.is_i64() => {
                let i = n.as_i64().unwrap_or_default();
                Self::check_float(path, i as f64, *min, *max)?;
                Ok(ApiValue::Int(i))
            }
            (Self::Float { min, max }, Value::Number(n)) => {
                let f = n.as_f64().unwrap_or(f64::NAN);
                Self::check_float(path, f, *min, *max).map(ApiValue::Float)
            }
            (Self::Text { .. } | Self::Choice(_), Value::String(s)) => {
                self.check_text(path, s).map(ApiValue::from)
            }
            (Self::Bytes, Value::String(s)) => hex::decode(s)
                .map(ApiValue::Bytes)
                .map_err(|e| CodecError::validation(path, format!("invalid hex: {e}"))),
            (Self::List(item), Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, v)| item.decode(&index_path(path, i), v))
                .collect::<Result<Vec<_>, _>>()
                .map(ApiValue::List),
            (Self::Dict(inner), Value::Object(entries)) => entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), inner.decode(&field_path(path, k), v)?)))
                .collect::<Result<BTreeMap<_, _>, CodecError>>()
                .map(ApiValue::Record),
            _ => Err(self.mismatch(path, json_type(wire))),
        }
    }
}
