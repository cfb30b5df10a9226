//! # Bridge Telemetry
//!
//! Structured logging for both sides of the plugin bridge.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bridge_telemetry::{init_tracing, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_tracing(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BRIDGE_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `BRIDGE_JSON_LOGS` | `false` (`true` in containers) | JSON formatted output |
//! | `BRIDGE_SERVICE_NAME` | `plugin-bridge` | Service name recorded on startup |

mod config;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use tracing_setup::init_tracing;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Failed to install tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Span carrying the bridge side and operation name.
///
/// ```rust,ignore
/// let _span = bridge_span!("dispatch", side = "service", function = "open_url").entered();
/// ```
#[macro_export]
macro_rules! bridge_span {
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}
