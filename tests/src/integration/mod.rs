//! Cross-crate scenarios: a `PluginClient` talking to a running
//! `BridgeRuntime` over one `InMemoryMessageBus`.

pub mod flows;
pub mod isolation;
pub mod streams;
