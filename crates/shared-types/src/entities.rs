//! # Plugin Domain Entities
//!
//! Typed forms of the values carried by the plugin API operations. They
//! convert to and from `ApiValue` through serde, and the schemas in
//! `crate::api` describe their transport shape.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier assigned to an uploaded shape by the host.
pub type ShapeId = i64;

/// A point or direction in workspace coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// RGBA colour, one byte per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Self = Self::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

/// Kind of shape rendered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeType {
    Sphere,
    Line,
    Label,
    Mesh,
}

impl ShapeType {
    pub const NAMES: &'static [&'static str] = &["sphere", "line", "label", "mesh"];
}

/// A shape to upload. `index` is unset until the host assigns one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<ShapeId>,
    pub shape_type: ShapeType,
    pub position: Vector3,
    pub radius: f64,
    pub color: Color,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Shape {
    pub fn sphere(position: Vector3, radius: f64) -> Self {
        Self {
            index: None,
            shape_type: ShapeType::Sphere,
            position,
            radius,
            color: Color::default(),
            text: None,
        }
    }

    pub fn label(position: Vector3, text: impl Into<String>) -> Self {
        Self {
            index: None,
            shape_type: ShapeType::Label,
            position,
            radius: 0.0,
            color: Color::default(),
            text: Some(text.into()),
        }
    }
}

/// What a writing stream writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    Position,
    Color,
    Scale,
    Label,
}

impl StreamType {
    pub const NAMES: &'static [&'static str] = &["position", "color", "scale", "label"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::Color => "color",
            Self::Scale => "scale",
            Self::Label => "label",
        }
    }
}

/// Result of a stream-creating operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Identifier issued by the service.
    pub id: String,
    /// Epoch of the service instance that owns the stream.
    pub epoch: String,
}

/// Which side of the bridge a resource lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// The driver process issuing calls.
    Frontend,
    /// The service process executing them.
    Backend,
}

/// Caller-side reference to a stream owned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamHandle {
    pub id: String,
    pub epoch: String,
    pub owner: Endpoint,
}

impl From<StreamInfo> for StreamHandle {
    fn from(info: StreamInfo) -> Self {
        Self {
            id: info.id,
            epoch: info.epoch,
            owner: Endpoint::Backend,
        }
    }
}

/// Session information the frontend needs to build requests.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PluginData {
    pub plugin_id: i64,
    pub session_id: i64,
    /// Serializer version per message type.
    pub version_table: BTreeMap<String, i64>,
}

/// One entry of the host's complex list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexSummary {
    pub index: i64,
    pub name: String,
    pub visible: bool,
}

/// Severity of a user-visible notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Message,
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    pub const NAMES: &'static [&'static str] = &["message", "success", "warning", "error"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
