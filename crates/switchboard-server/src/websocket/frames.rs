//! Set of open frame connections.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::connection::FrameConnection;

/// Open frame connections keyed by connection id.
#[derive(Default)]
pub struct FrameSet {
    frames: RwLock<HashMap<String, Arc<FrameConnection>>>,
}

impl FrameSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection.
    pub fn add(&self, connection: Arc<FrameConnection>) {
        let _ = self
            .frames
            .write()
            .insert(connection.id.clone(), connection);
    }

    /// Remove a connection by id.
    pub fn remove(&self, id: &str) -> Option<Arc<FrameConnection>> {
        self.frames.write().remove(id)
    }

    /// Look up a connection.
    pub fn get(&self, id: &str) -> Option<Arc<FrameConnection>> {
        self.frames.read().get(id).cloned()
    }

    /// Number of open connections.
    pub fn len(&self) -> usize {
        self.frames.read().len()
    }

    /// Whether no connection is open.
    pub fn is_empty(&self) -> bool {
        self.frames.read().is_empty()
    }
}
