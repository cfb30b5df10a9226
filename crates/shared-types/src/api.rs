//! # Plugin API Operation Table
//!
//! The operations the frontend may invoke on the plugin host, with the codecs
//! both sides use to move their arguments and results across the bus.
//!
//! | Operation | Kind | Role |
//! |-----------|------|------|
//! | `upload_shapes` | callback | ordinary |
//! | `create_writing_stream` | callback | stream producer |
//! | `stream_update` | sync | stream update |
//! | `stream_destroy` | sync | stream destroy |
//! | `get_plugin_data` | sync | ordinary |
//! | `send_notification` | sync | ordinary |
//! | `open_url` | sync | ordinary |
//! | `request_complex_list` | callback | ordinary |

use crate::codec::{ScalarCodec, ScalarKind, Schema};
use crate::entities::{NotificationKind, ShapeType, StreamType};
use crate::registry::{OperationDescriptor, RegistryError, SchemaRegistry, StreamMutation};

/// Operation names.
pub mod ops {
    pub const UPLOAD_SHAPES: &str = "upload_shapes";
    pub const CREATE_WRITING_STREAM: &str = "create_writing_stream";
    pub const STREAM_UPDATE: &str = "stream_update";
    pub const STREAM_DESTROY: &str = "stream_destroy";
    pub const GET_PLUGIN_DATA: &str = "get_plugin_data";
    pub const SEND_NOTIFICATION: &str = "send_notification";
    pub const OPEN_URL: &str = "open_url";
    pub const REQUEST_COMPLEX_LIST: &str = "request_complex_list";
}

/// Longest URL `open_url` accepts.
pub const MAX_URL_LEN: usize = 2048;

fn vector3_schema() -> Schema {
    Schema::new("Vector3")
        .field("x", ScalarCodec::float())
        .field("y", ScalarCodec::float())
        .field("z", ScalarCodec::float())
}

fn color_schema() -> Schema {
    Schema::new("Color")
        .field("r", ScalarCodec::int_range(0, 255))
        .field("g", ScalarCodec::int_range(0, 255))
        .field("b", ScalarCodec::int_range(0, 255))
        .field("a", ScalarCodec::int_range(0, 255))
}

/// Schema of one `Shape` record.
pub fn shape_schema() -> Schema {
    Schema::new("Shape")
        .optional("index", ScalarCodec::int())
        .field("shape_type", ScalarCodec::choice(ShapeType::NAMES))
        .field("position", vector3_schema())
        .field("radius", ScalarCodec::float_range(0.0, f64::MAX))
        .field("color", color_schema())
        .optional("text", ScalarCodec::text())
}

pub fn stream_info_schema() -> Schema {
    Schema::new("StreamInfo")
        .field("id", ScalarCodec::text())
        .field("epoch", ScalarCodec::text())
}

pub fn plugin_data_schema() -> Schema {
    Schema::new("PluginData")
        .field("plugin_id", ScalarCodec::int())
        .field("session_id", ScalarCodec::int())
        .field(
            "version_table",
            ScalarCodec::dict_of(ScalarKind::Int {
                min: 0,
                max: i64::MAX,
            }),
        )
}

pub fn complex_summary_schema() -> Schema {
    Schema::new("ComplexSummary")
        .field("index", ScalarCodec::int())
        .field("name", ScalarCodec::text())
        .field("visible", ScalarCodec::boolean())
}

/// Build the registry both processes load.
pub fn plugin_api() -> Result<SchemaRegistry, RegistryError> {
    SchemaRegistry::builder()
        .operation(
            OperationDescriptor::callback(ops::UPLOAD_SHAPES)
                .param("shapes", shape_schema().many())
                .returns(ScalarCodec::list_of(ScalarKind::Int {
                    min: i64::MIN,
                    max: i64::MAX,
                })),
        )
        .operation(
            OperationDescriptor::callback(ops::CREATE_WRITING_STREAM)
                .param(
                    "atom_indices",
                    ScalarCodec::list_of(ScalarKind::Int {
                        min: 0,
                        max: i64::MAX,
                    }),
                )
                .param("stream_type", ScalarCodec::choice(StreamType::NAMES))
                .returns(stream_info_schema())
                .stream_producer(),
        )
        .operation(
            OperationDescriptor::sync(ops::STREAM_UPDATE)
                .param("stream_id", ScalarCodec::text())
                .param(
                    "data",
                    ScalarCodec::list_of(ScalarKind::Float {
                        min: f64::MIN,
                        max: f64::MAX,
                    }),
                )
                .stream_mutation(StreamMutation::Update),
        )
        .operation(
            OperationDescriptor::sync(ops::STREAM_DESTROY)
                .param("stream_id", ScalarCodec::text())
                .stream_mutation(StreamMutation::Destroy),
        )
        .operation(OperationDescriptor::sync(ops::GET_PLUGIN_DATA).returns(plugin_data_schema()))
        .operation(
            OperationDescriptor::sync(ops::SEND_NOTIFICATION)
                .param("kind", ScalarCodec::choice(NotificationKind::NAMES))
                .param("message", ScalarCodec::text()),
        )
        .operation(
            OperationDescriptor::sync(ops::OPEN_URL).param("url", ScalarCodec::text_max(MAX_URL_LEN)),
        )
        .operation(
            OperationDescriptor::callback(ops::REQUEST_COMPLEX_LIST)
                .returns(complex_summary_schema().many()),
        )
        .build()
}
