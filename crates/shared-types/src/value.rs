//! # Native Values
//!
//! `ApiValue` is the in-process form of every operation argument and result.
//! Codecs turn it into transport JSON and back; typed domain structs convert
//! to and from it through serde.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

use crate::codec::CodecError;

/// A dynamically typed native value handed to or returned by an operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ApiValue {
    /// Absent value.
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Raw bytes. Transported as a hex string by the `Bytes` scalar codec.
    Bytes(Vec<u8>),
    List(Vec<ApiValue>),
    /// Named fields of a record (object graph node).
    Record(BTreeMap<String, ApiValue>),
}

impl ApiValue {
    /// Convert a typed domain value into its native form.
    pub fn from_typed<T: Serialize + ?Sized>(value: &T) -> Result<Self, CodecError> {
        serde_json::to_value(value)
            .map(Self::from_json)
            .map_err(|e| CodecError::Encoding(e.to_string()))
    }

    /// Convert this native value into a typed domain value.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, CodecError> {
        serde_json::from_value(self.into_json()).map_err(|e| CodecError::Encoding(e.to_string()))
    }

    /// Structural conversion from plain JSON.
    ///
    /// Integers that fit `i64` become `Int`; every other number becomes `Float`.
    pub fn from_json(json: Value) -> Self {
        match json {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::Text(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::Record(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Structural conversion to plain JSON.
    ///
    /// Bytes become an array of numbers (serde's `Vec<u8>` form) and
    /// non-finite floats become `null`.
    pub fn into_json(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(b),
            Self::Int(i) => Value::Number(i.into()),
            Self::Float(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
            Self::Text(s) => Value::String(s),
            Self::Bytes(bytes) => Value::Array(bytes.into_iter().map(Value::from).collect()),
            Self::List(items) => Value::Array(items.into_iter().map(Self::into_json).collect()),
            Self::Record(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, v.into_json()))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }

    /// Short type name used in validation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Record(_) => "record",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ApiValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&BTreeMap<String, ApiValue>> {
        match self {
            Self::Record(fields) => Some(fields),
            _ => None,
        }
    }

    /// Look up a record field.
    pub fn get(&self, field: &str) -> Option<&ApiValue> {
        self.as_record().and_then(|fields| fields.get(field))
    }
}

impl From<bool> for ApiValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ApiValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ApiValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for ApiValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for ApiValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for ApiValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for ApiValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl<T: Into<ApiValue>> From<Vec<T>> for ApiValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}
