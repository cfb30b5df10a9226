//! Bridge configuration with validation.
//!
//! Both processes read the same variables:
//!
//! | Variable | Default |
//! |----------|---------|
//! | `BRIDGE_CHANNEL` | fresh UUID |
//! | `BRIDGE_RPC_TIMEOUT_MS` | `10000` |
//! | `BRIDGE_MAX_IN_FLIGHT` | `64` |
//! | `BRIDGE_IDLE_BACKOFF_MS` | `1` |

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub const ENV_CHANNEL: &str = "BRIDGE_CHANNEL";
pub const ENV_RPC_TIMEOUT_MS: &str = "BRIDGE_RPC_TIMEOUT_MS";
pub const ENV_MAX_IN_FLIGHT: &str = "BRIDGE_MAX_IN_FLIGHT";
pub const ENV_IDLE_BACKOFF_MS: &str = "BRIDGE_IDLE_BACKOFF_MS";

/// Default time a caller waits for its response.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Default cap on concurrently running dispatch units.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// Default sleep between idle dispatcher ticks.
pub const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// Deployment-wide bridge settings.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Shared inbound channel the service polls.
    pub request_channel: String,
    /// How long a caller waits for a correlated response.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub rpc_timeout: Duration,
    /// Dispatch units allowed to run at once.
    pub max_in_flight: usize,
    /// Sleep between dispatcher ticks that found no message.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub idle_backoff: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_channel: Uuid::new_v4().to_string(),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            idle_backoff: DEFAULT_IDLE_BACKOFF,
        }
    }
}

impl BridgeConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source. Unset variables keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(channel) = lookup(ENV_CHANNEL) {
            config.request_channel = channel;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_RPC_TIMEOUT_MS)? {
            config.rpc_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var(&lookup, ENV_MAX_IN_FLIGHT)? {
            config.max_in_flight = n;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_IDLE_BACKOFF_MS)? {
            config.idle_backoff = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.request_channel = channel.into();
        self
    }

    #[must_use]
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_channel.trim().is_empty() {
            return Err(ConfigError::EmptyChannel);
        }

        if self.rpc_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "rpc_timeout cannot be 0".into(),
            ));
        }

        if self.max_in_flight == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_in_flight cannot be 0".into(),
            ));
        }

        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The request channel name is blank
    #[error("request channel cannot be empty")]
    EmptyChannel,
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// An environment variable did not parse
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}
