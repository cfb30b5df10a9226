//! In-memory plugin host.
//!
//! Keeps uploaded shapes, notifications, opened URLs and streams in process
//! memory. Callback operations are queued and completed on the next `tick`,
//! the way a real host completes them from its own event loop.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use shared_types::{
    ops, ApiValue, ComplexSummary, NotificationKind, PluginData, Shape, ShapeId, StreamType,
};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::completion::{Completion, StreamCompletion};
use crate::ports::{HostError, HostStream, PluginHost};

/// A writing stream that records every frame it receives.
#[derive(Debug)]
pub struct MemoryStream {
    id: String,
    stream_type: StreamType,
    atom_indices: Vec<u32>,
    frames: Mutex<Vec<Vec<f64>>>,
    destroyed: AtomicBool,
}

impl MemoryStream {
    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    pub fn atom_indices(&self) -> &[u32] {
        &self.atom_indices
    }

    /// Frames received so far, oldest first.
    pub fn frames(&self) -> Vec<Vec<f64>> {
        self.frames.lock().clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

impl HostStream for MemoryStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn update(&self, args: Vec<ApiValue>) -> Result<(), HostError> {
        if self.is_destroyed() {
            return Err(HostError::StreamGone(self.id.clone()));
        }
        let frame: Vec<f64> = arg(&args, 0, "data")?;
        self.frames.lock().push(frame);
        Ok(())
    }

    fn destroy(&self) -> Result<(), HostError> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Err(HostError::StreamGone(self.id.clone()));
        }
        debug!(stream_id = %self.id, "Memory stream destroyed");
        Ok(())
    }
}

struct HostState {
    shapes: Vec<Shape>,
    next_shape_id: ShapeId,
    next_stream: u64,
    streams: HashMap<String, Arc<MemoryStream>>,
    notifications: Vec<(NotificationKind, String)>,
    opened_urls: Vec<String>,
    complexes: Vec<ComplexSummary>,
    plugin_data: PluginData,
    failing: HashMap<String, String>,
    queued: Vec<(Completion, Result<ApiValue, HostError>)>,
}

/// Plugin host backed by process memory.
pub struct InMemoryHost {
    state: Mutex<HostState>,
    hold_callbacks: AtomicBool,
    stopped: AtomicBool,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HostState {
                shapes: Vec::new(),
                next_shape_id: 1,
                next_stream: 1,
                streams: HashMap::new(),
                notifications: Vec::new(),
                opened_urls: Vec::new(),
                complexes: Vec::new(),
                plugin_data: PluginData::default(),
                failing: HashMap::new(),
                queued: Vec::new(),
            }),
            hold_callbacks: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn with_plugin_data(self, data: PluginData) -> Self {
        self.state.lock().plugin_data = data;
        self
    }

    pub fn with_complexes(self, complexes: Vec<ComplexSummary>) -> Self {
        self.state.lock().complexes = complexes;
        self
    }

    /// Make every later call of `function` fail with `message`.
    pub fn fail_with(&self, function: &str, message: impl Into<String>) {
        self.state
            .lock()
            .failing
            .insert(function.to_string(), message.into());
    }

    /// While set, queued callback completions are not fired by `tick`.
    pub fn hold_callbacks(&self, hold: bool) {
        self.hold_callbacks.store(hold, Ordering::Release);
    }

    /// Stop the dispatcher on its next iteration.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn shapes(&self) -> Vec<Shape> {
        self.state.lock().shapes.clone()
    }

    pub fn notifications(&self) -> Vec<(NotificationKind, String)> {
        self.state.lock().notifications.clone()
    }

    pub fn opened_urls(&self) -> Vec<String> {
        self.state.lock().opened_urls.clone()
    }

    /// Every stream this host created, destroyed ones included.
    pub fn stream(&self, id: &str) -> Option<Arc<MemoryStream>> {
        self.state.lock().streams.get(id).cloned()
    }

    /// Callback completions waiting for a tick.
    pub fn queued_callbacks(&self) -> usize {
        self.state.lock().queued.len()
    }

    fn check_failing(&self, function: &str) -> Result<(), HostError> {
        match self.state.lock().failing.get(function) {
            Some(message) => Err(HostError::Failed(message.clone())),
            None => Ok(()),
        }
    }

    fn upload_shapes(&self, args: &[ApiValue]) -> Result<ApiValue, HostError> {
        let shapes: Vec<Shape> = arg(args, 0, "shapes")?;
        let mut state = self.state.lock();
        let mut ids = Vec::with_capacity(shapes.len());
        for mut shape in shapes {
            let id = state.next_shape_id;
            state.next_shape_id += 1;
            shape.index = Some(id);
            state.shapes.push(shape);
            ids.push(id);
        }
        info!(count = ids.len(), "Shapes uploaded");
        Ok(ApiValue::from(ids))
    }
}

impl Default for InMemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginHost for InMemoryHost {
    fn invoke(&self, function: &str, args: Vec<ApiValue>) -> Result<ApiValue, HostError> {
        self.check_failing(function)?;
        match function {
            ops::GET_PLUGIN_DATA => Ok(ApiValue::from_typed(&self.state.lock().plugin_data)?),
            ops::SEND_NOTIFICATION => {
                let kind: NotificationKind = arg(&args, 0, "kind")?;
                let message: String = arg(&args, 1, "message")?;
                self.send_notification(kind, &message);
                Ok(ApiValue::Null)
            }
            ops::OPEN_URL => {
                let url: String = arg(&args, 0, "url")?;
                info!(url = %url, "Opening URL");
                self.state.lock().opened_urls.push(url);
                Ok(ApiValue::Null)
            }
            other => Err(HostError::Unsupported(other.to_string())),
        }
    }

    fn invoke_with_callback(&self, function: &str, args: Vec<ApiValue>, completion: Completion) {
        let outcome = self.check_failing(function).and_then(|()| match function {
            ops::UPLOAD_SHAPES => self.upload_shapes(&args),
            ops::REQUEST_COMPLEX_LIST => {
                Ok(ApiValue::from_typed(&self.state.lock().complexes)?)
            }
            other => Err(HostError::Unsupported(other.to_string())),
        });
        self.state.lock().queued.push((completion, outcome));
    }

    fn create_stream(&self, function: &str, args: Vec<ApiValue>, completion: StreamCompletion) {
        let created = self.check_failing(function).and_then(|()| {
            let atom_indices: Vec<u32> = arg(&args, 0, "atom_indices")?;
            let stream_type: StreamType = arg(&args, 1, "stream_type")?;

            let mut state = self.state.lock();
            let id = format!("s{}", state.next_stream);
            state.next_stream += 1;
            let stream = Arc::new(MemoryStream {
                id: id.clone(),
                stream_type,
                atom_indices,
                frames: Mutex::new(Vec::new()),
                destroyed: AtomicBool::new(false),
            });
            state.streams.insert(id, Arc::clone(&stream));
            Ok(stream as Arc<dyn HostStream>)
        });
        completion.complete(created);
    }

    fn send_notification(&self, kind: NotificationKind, message: &str) {
        info!(kind = %kind, message = message, "Notification");
        self.state
            .lock()
            .notifications
            .push((kind, message.to_string()));
    }

    fn tick(&self) -> ControlFlow<()> {
        if self.stopped.load(Ordering::Acquire) {
            return ControlFlow::Break(());
        }
        if !self.hold_callbacks.load(Ordering::Acquire) {
            let ready = std::mem::take(&mut self.state.lock().queued);
            for (completion, outcome) in ready {
                completion.complete(outcome);
            }
        }
        ControlFlow::Continue(())
    }
}

impl std::fmt::Debug for InMemoryHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("InMemoryHost")
            .field("shapes", &state.shapes.len())
            .field("streams", &state.streams.len())
            .field("queued", &state.queued.len())
            .finish()
    }
}

/// Typed view of the argument at `index`.
fn arg<T: DeserializeOwned>(args: &[ApiValue], index: usize, name: &str) -> Result<T, HostError> {
    args.get(index)
        .cloned()
        .ok_or_else(|| HostError::InvalidArgument(format!("missing argument {name}")))?
        .into_typed()
        .map_err(|e| HostError::InvalidArgument(format!("{name}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::Vector3;

    #[test]
    fn test_sync_operations() {
        let host = InMemoryHost::new();

        host.invoke(ops::OPEN_URL, vec![ApiValue::from("https://example.org")])
            .unwrap();
        host.invoke(
            ops::SEND_NOTIFICATION,
            vec![ApiValue::from("warning"), ApiValue::from("careful")],
        )
        .unwrap();

        assert_eq!(host.opened_urls(), vec!["https://example.org"]);
        assert_eq!(
            host.notifications(),
            vec![(NotificationKind::Warning, "careful".to_string())]
        );
    }

    #[test]
    fn test_unsupported_operation() {
        let host = InMemoryHost::new();
        assert_eq!(
            host.invoke("teleport", vec![]),
            Err(HostError::Unsupported("teleport".into()))
        );
    }

    #[test]
    fn test_fail_with() {
        let host = InMemoryHost::new();
        host.fail_with(ops::GET_PLUGIN_DATA, "session lost");
        assert_eq!(
            host.invoke(ops::GET_PLUGIN_DATA, vec![]),
            Err(HostError::Failed("session lost".into()))
        );
    }

    #[test]
    fn test_upload_assigns_sequential_ids() {
        let host = InMemoryHost::new();
        let shapes = ApiValue::from_typed(&vec![
            Shape::sphere(Vector3::new(0.0, 0.0, 0.0), 1.0),
            Shape::sphere(Vector3::new(1.0, 0.0, 0.0), 2.0),
        ])
        .unwrap();

        assert_eq!(
            host.upload_shapes(&[shapes]).unwrap(),
            ApiValue::from(vec![1i64, 2])
        );
        assert_eq!(host.shapes()[1].index, Some(2));
    }

    #[test]
    fn test_memory_stream_lifecycle() {
        let stream = MemoryStream {
            id: "s1".into(),
            stream_type: StreamType::Position,
            atom_indices: vec![0, 1],
            frames: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
        };

        stream.update(vec![ApiValue::from(vec![1.0, 2.0])]).unwrap();
        assert_eq!(stream.frames(), vec![vec![1.0, 2.0]]);

        stream.destroy().unwrap();
        assert!(stream.is_destroyed());
        assert_eq!(stream.destroy(), Err(HostError::StreamGone("s1".into())));
        assert_eq!(
            stream.update(vec![ApiValue::from(vec![3.0])]),
            Err(HostError::StreamGone("s1".into()))
        );
    }

    #[test]
    fn test_stop_breaks_tick() {
        let host = InMemoryHost::new();
        assert_eq!(host.tick(), ControlFlow::Continue(()));
        host.stop();
        assert_eq!(host.tick(), ControlFlow::Break(()));
    }
}
