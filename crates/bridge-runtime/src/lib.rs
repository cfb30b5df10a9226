//! # Bridge Runtime
//!
//! Wires the bridge together: one bus, the plugin API registry, a plugin
//! host and the dispatcher serving it. The standalone binary is `main.rs`.
//!
//! ## Lifecycle
//!
//! ```text
//! new ──► start ──► (dispatcher loop running) ──► shutdown
//!                        │
//!                        └── ends early if the host stops it or the bus closes
//! ```

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use bridge_client::PluginClient;
use bridge_service::{DispatchError, Dispatcher, PluginHost};
use parking_lot::Mutex;
use shared_bus::MessageBus;
use shared_types::{plugin_api, BridgeConfig, ConfigError, RegistryError, SchemaRegistry};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Runtime assembly and lifecycle errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Operation registry failed to build: {0}")]
    Registry(#[from] RegistryError),

    #[error("Dispatcher stopped: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Runtime already started")]
    AlreadyStarted,

    #[error("Dispatcher task failed: {0}")]
    Task(String),
}

/// A running bridge service plus the means to reach it.
pub struct BridgeRuntime {
    config: BridgeConfig,
    bus: Arc<dyn MessageBus>,
    registry: Arc<SchemaRegistry>,
    dispatcher: Arc<Dispatcher>,
    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,
    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,
    task: Mutex<Option<JoinHandle<Result<(), DispatchError>>>>,
}

impl BridgeRuntime {
    /// Validate the configuration and build the registry and dispatcher.
    pub fn new(
        config: BridgeConfig,
        bus: Arc<dyn MessageBus>,
        host: Arc<dyn PluginHost>,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;
        let registry = Arc::new(plugin_api()?);
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&bus),
            Arc::clone(&registry),
            host,
            &config,
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            channel = %config.request_channel,
            operations = registry.len(),
            "Bridge runtime created"
        );

        Ok(Self {
            config,
            bus,
            registry,
            dispatcher,
            shutdown_tx,
            shutdown_rx,
            task: Mutex::new(None),
        })
    }

    /// Spawn the dispatcher loop.
    pub fn start(&self) -> Result<(), RuntimeError> {
        let mut task = self.task.lock();
        if task.is_some() {
            return Err(RuntimeError::AlreadyStarted);
        }

        let dispatcher = Arc::clone(&self.dispatcher);
        let mut shutdown = self.shutdown_rx.clone();
        *task = Some(tokio::spawn(async move {
            tokio::select! {
                result = dispatcher.run() => {
                    if let Err(e) = &result {
                        error!(error = %e, "Dispatcher stopped");
                    }
                    result
                }
                _ = shutdown.changed() => {
                    info!("Shutdown signal received");
                    Ok(())
                }
            }
        }));

        info!(epoch = %self.dispatcher.epoch(), "Bridge runtime started");
        Ok(())
    }

    /// Client bound to the same bus, registry and request channel.
    pub fn client(&self) -> PluginClient {
        PluginClient::new(
            Arc::clone(&self.bus),
            Arc::clone(&self.registry),
            &self.config,
        )
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Stop the dispatcher and wait for its loop to end.
    ///
    /// Returns the loop's own error if it had already stopped on one.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        info!("Initiating shutdown...");

        // Signal the dispatcher task to stop
        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }

        let task = self.task.lock().take();
        let result = match task {
            Some(handle) => match handle.await {
                Ok(result) => result.map_err(RuntimeError::from),
                Err(e) => Err(RuntimeError::Task(e.to_string())),
            },
            None => Ok(()),
        };

        info!("Shutdown complete");
        result
    }
}

impl std::fmt::Debug for BridgeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeRuntime")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .field("started", &self.task.lock().is_some())
            .finish()
    }
}
