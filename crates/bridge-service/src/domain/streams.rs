//! Live stream registry.
//!
//! Owned by the dispatcher and shared with every dispatch unit. `remove` is
//! the only way a stream leaves the registry, so of two concurrent destroys
//! of the same id exactly one obtains the stream.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::domain::errors::StreamRegistryError;
use crate::ports::HostStream;

/// Concurrent map of live streams keyed by id.
#[derive(Default)]
pub struct StreamRegistry {
    streams: DashMap<String, Arc<dyn HostStream>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stream under its own id.
    pub fn insert(&self, stream: Arc<dyn HostStream>) -> Result<String, StreamRegistryError> {
        let id = stream.id().to_string();
        match self.streams.entry(id.clone()) {
            Entry::Occupied(_) => Err(StreamRegistryError::DuplicateStream(id)),
            Entry::Vacant(slot) => {
                slot.insert(stream);
                debug!(stream_id = %id, "Stream registered");
                Ok(id)
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn HostStream>> {
        self.streams.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Take a stream out of the registry.
    pub fn remove(&self, id: &str) -> Option<Arc<dyn HostStream>> {
        self.streams.remove(id).map(|(_, stream)| stream)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.streams.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Ids of live streams, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.streams.iter().map(|e| e.key().clone()).collect();
        ids.sort_unstable();
        ids
    }
}

impl std::fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("live", &self.streams.len())
            .finish()
    }
}
