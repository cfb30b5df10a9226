//! # Bridge Runtime Binary
//!
//! Standalone plugin service backed by the in-memory bus and host.
//!
//! ## Configuration
//!
//! | Variable | Default |
//! |----------|---------|
//! | `BRIDGE_CHANNEL` | fresh UUID |
//! | `BRIDGE_RPC_TIMEOUT_MS` | `10000` |
//! | `BRIDGE_MAX_IN_FLIGHT` | `64` |
//! | `BRIDGE_IDLE_BACKOFF_MS` | `1` |
//!
//! Logging is configured through `BRIDGE_LOG_LEVEL`, `BRIDGE_JSON_LOGS` and
//! `BRIDGE_SERVICE_NAME`.

use std::sync::Arc;

use anyhow::{Context, Result};
use bridge_runtime::BridgeRuntime;
use bridge_service::InMemoryHost;
use bridge_telemetry::{bridge_span, init_tracing, TelemetryConfig};
use shared_bus::InMemoryMessageBus;
use shared_types::BridgeConfig;
use tracing::{info, Instrument};

async fn serve(config: BridgeConfig) -> Result<()> {
    let runtime = BridgeRuntime::new(
        config,
        Arc::new(InMemoryMessageBus::new()),
        Arc::new(InMemoryHost::new()),
    )
    .context("failed to assemble bridge runtime")?;
    runtime.start()?;

    // Keep the service running
    info!(
        channel = %runtime.config().request_channel,
        "Plugin service is running. Press Ctrl+C to stop."
    );
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(&TelemetryConfig::for_side("service")).context("failed to initialize logging")?;

    let config = BridgeConfig::from_env().context("invalid bridge configuration")?;
    let span = bridge_span!("bridge", side = "service", channel = %config.request_channel);

    serve(config).instrument(span).await
}
