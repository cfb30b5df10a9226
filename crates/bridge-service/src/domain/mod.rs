//! Domain layer for the bridge service.

pub mod completion;
pub mod errors;
pub mod streams;

pub use completion::{Completion, StreamCompletion};
pub use errors::{DispatchError, StreamRegistryError};
pub use streams::StreamRegistry;
