//! Fan-out to N viewers with per-consumer isolation.
//!
//! Built on tokio broadcast channels: each consumer gets an independent
//! receiver buffering up to `capacity` frames, so a slow or disconnected
//! viewer never blocks or delays delivery to the others. Frames are
//! pre-encoded `Arc<Vec<u8>>` — one serialization per broadcast, however
//! many viewers are subscribed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::protocol::{Frame, ProtocolError, ViewerInfo};

/// Fan-out statistics.
#[derive(Debug, Clone, Default)]
pub struct GroupStats {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub active_viewers: usize,
}

/// One logical broadcast channel and its subscribed viewers.
pub struct ViewerGroup {
    sender: broadcast::Sender<Arc<Vec<u8>>>,
    viewers: RwLock<HashMap<Uuid, ViewerInfo>>,
    capacity: usize,
    // Atomics so the send path never takes a lock
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
}

impl ViewerGroup {
    /// Create a group; `capacity` is the per-receiver frame buffer before
    /// a lagging consumer starts losing frames.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            viewers: RwLock::new(HashMap::new()),
            capacity,
            frames_sent: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        }
    }

    /// Register a viewer and return its receiver.
    pub async fn add_viewer(&self, info: ViewerInfo) -> broadcast::Receiver<Arc<Vec<u8>>> {
        let mut viewers = self.viewers.write().await;
        viewers.insert(info.viewer_id, info);
        self.sender.subscribe()
    }

    /// Remove a viewer (disconnect or prune).
    pub async fn remove_viewer(&self, viewer_id: &Uuid) -> Option<ViewerInfo> {
        let mut viewers = self.viewers.write().await;
        viewers.remove(viewer_id)
    }

    /// Subscribe without registering (authority-internal consumers).
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Vec<u8>>> {
        self.sender.subscribe()
    }

    /// Send pre-encoded bytes to every receiver. Lock-free.
    ///
    /// Returns the number of receivers the frame reached.
    pub fn send_raw(&self, bytes: Arc<Vec<u8>>) -> usize {
        let count = self.sender.send(bytes).unwrap_or(0);
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    /// Encode and send one frame.
    pub fn send_frame(&self, frame: &Frame) -> Result<usize, ProtocolError> {
        let bytes = frame.encode()?;
        Ok(self.send_raw(Arc::new(bytes)))
    }

    /// Record a frame lost to a lagging consumer (for stats only).
    pub fn note_dropped(&self, n: u64) {
        self.frames_dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub async fn viewer_count(&self) -> usize {
        self.viewers.read().await.len()
    }

    pub async fn has_viewer(&self, viewer_id: &Uuid) -> bool {
        self.viewers.read().await.contains_key(viewer_id)
    }

    pub async fn viewers(&self) -> Vec<ViewerInfo> {
        self.viewers.read().await.values().cloned().collect()
    }

    pub async fn stats(&self) -> GroupStats {
        GroupStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            active_viewers: self.viewers.read().await.len(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
