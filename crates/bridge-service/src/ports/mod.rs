//! Ports layer for the bridge service.
//!
//! Defines the driven port the dispatcher invokes operations through:
//! - `PluginHost`: executes operations and owns host bookkeeping
//! - `HostStream`: a live stream resource created by the host

pub mod host;

pub use host::*;
