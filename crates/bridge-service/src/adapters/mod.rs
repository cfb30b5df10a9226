//! Adapters implementing the service ports.

pub mod memory_host;

pub use memory_host::{InMemoryHost, MemoryStream};
