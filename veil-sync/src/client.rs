//! WebSocket viewer client with lite-frame reassembly.
//!
//! A thin-client surface holds one [`ViewerClient`]. On connect it sends
//! a Hello and then consumes the push stream: the first snapshot frame is
//! always full, subsequent frames may arrive with the image payload or
//! event log elided. The [`FrameCache`] restores elided fields from the
//! last transmitted values, so the application always sees complete
//! snapshots.
//!
//! The client never mutates state; its only upstream traffic is Hello,
//! ephemeral pointer positions, and heartbeats.

use std::sync::Arc;
use futures_util::StreamExt;
use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;

use veil_core::{ImageRef, Snapshot};

use crate::protocol::{
    Frame, FrameType, PointerEvent, ProtocolError, SnapshotFrame, ViewerInfo,
};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the viewer client.
#[derive(Debug, Clone)]
pub enum ViewerEvent {
    /// Connection established
    Connected,
    /// Connection lost
    Disconnected,
    /// A complete snapshot, elided fields already restored
    Snapshot(Snapshot),
    /// A remote peer's pointer position
    Pointer(PointerEvent),
}

/// Restores elided fields of incoming lite frames from the last values
/// this connection transmitted in full.
///
/// Keyed purely by the elision flags: a frame that says `image_elided`
/// gets the cached payload spliced back in, a frame that carries its
/// payload refreshes the cache. No heuristics on emptiness.
///
/// Frames older than one already applied are rejected: the server
/// subscribes the connection before fetching the join snapshot, so a
/// frame broadcast during the handshake is delivered after it and would
/// otherwise transiently roll the view back.
#[derive(Debug, Default)]
pub struct FrameCache {
    image: Option<ImageRef>,
    events: Vec<String>,
    applied_version: u64,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one incoming frame into a complete snapshot.
    ///
    /// Returns `None` for a frame whose version precedes the last one
    /// applied.
    pub fn apply(&mut self, frame: SnapshotFrame) -> Option<Snapshot> {
        let mut snapshot = frame.snapshot;
        if snapshot.version < self.applied_version {
            log::debug!(
                "skipping stale frame v{} (already at v{})",
                snapshot.version,
                self.applied_version
            );
            return None;
        }
        self.applied_version = snapshot.version;

        if frame.image_elided {
            match (snapshot.state.image.as_mut(), self.image.as_ref()) {
                (Some(image), Some(cached)) if image.identity == cached.identity => {
                    image.payload = cached.payload.clone();
                }
                (Some(image), _) => {
                    // Elided but nothing cached under this identity: a
                    // frame from before our join slipped through. Leave
                    // the payload empty; the next full frame heals it.
                    log::warn!(
                        "elided image {} with no cached payload",
                        image.identity
                    );
                }
                (None, _) => {}
            }
        } else {
            self.image = snapshot.state.image.clone();
        }

        if frame.events_elided {
            snapshot.state.events = self.events.clone();
        } else {
            self.events = snapshot.state.events.clone();
        }

        Some(snapshot)
    }

    /// Forget cached values (reconnect).
    pub fn clear(&mut self) {
        self.image = None;
        self.events.clear();
        self.applied_version = 0;
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }
}

/// The viewer client.
///
/// Manages a WebSocket connection to the push server, reassembles lite
/// frames, and surfaces complete snapshots and pointer events to the
/// application through an event channel.
pub struct ViewerClient {
    /// Our viewer identity
    info: ViewerInfo,

    /// Connection state
    state: Arc<RwLock<ConnectionState>>,

    /// Lite-frame reassembly cache, shared with the reader task
    cache: Arc<Mutex<FrameCache>>,

    /// Channel to the WebSocket writer task
    outgoing_tx: Option<mpsc::Sender<Vec<u8>>>,

    /// Event receiver for the application
    event_rx: Option<mpsc::Receiver<ViewerEvent>>,

    /// Event sender (held by the reader task)
    event_tx: mpsc::Sender<ViewerEvent>,

    /// Server URL
    server_url: String,
}

impl ViewerClient {
    pub fn new(info: ViewerInfo, server_url: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            info,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            cache: Arc::new(Mutex::new(FrameCache::new())),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
            server_url: server_url.into(),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<ViewerEvent>> {
        self.event_rx.take()
    }

    /// Connect to the push server.
    ///
    /// Spawns background tasks for reading/writing WebSocket messages.
    /// The first event after [`ViewerEvent::Connected`] is a complete
    /// snapshot.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;
        self.cache.lock().await.clear();

        let ws_result = tokio_tungstenite::connect_async(&self.server_url).await;
        let ws_stream = match ws_result {
            Ok((stream, _)) => stream,
            Err(e) => {
                log::warn!("Failed to connect to {}: {e}", self.server_url);
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ProtocolError::ConnectionClosed);
            }
        };

        let (ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward the outgoing channel to the WebSocket
        let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(256);
        self.outgoing_tx = Some(out_tx);
        let writer = Arc::new(Mutex::new(ws_writer));
        {
            let writer = writer.clone();
            tokio::spawn(async move {
                while let Some(data) = out_rx.recv().await {
                    let mut w = writer.lock().await;
                    use futures_util::SinkExt;
                    if w.send(tokio_tungstenite::tungstenite::Message::Binary(data.into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            });
        }

        // Handshake
        let hello = Frame::hello(&self.info)?.encode()?;
        if let Some(ref tx) = self.outgoing_tx {
            tx.send(hello)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed)?;
        }

        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.send(ViewerEvent::Connected).await;

        // Reader task: decode frames, reassemble, emit events
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        let cache = self.cache.clone();
        let viewer_id = self.info.viewer_id;
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(tokio_tungstenite::tungstenite::Message::Binary(data)) => {
                        let bytes: Vec<u8> = data.into();
                        let frame = match Frame::decode(&bytes) {
                            Ok(f) => f,
                            Err(e) => {
                                log::warn!("Failed to decode frame: {e}");
                                continue;
                            }
                        };

                        let event = match frame.frame_type {
                            FrameType::Snapshot => match frame.snapshot_frame() {
                                Ok(sf) => {
                                    cache.lock().await.apply(sf).map(ViewerEvent::Snapshot)
                                }
                                Err(e) => {
                                    log::warn!("Bad snapshot payload: {e}");
                                    None
                                }
                            },
                            FrameType::Pointer => {
                                if frame.sender == viewer_id {
                                    None
                                } else {
                                    frame.pointer_event().ok().map(ViewerEvent::Pointer)
                                }
                            }
                            FrameType::Pong => None,
                            other => {
                                log::debug!("Unhandled frame type {other:?}");
                                None
                            }
                        };

                        if let Some(evt) = event {
                            let _ = event_tx.send(evt).await;
                        }
                    }
                    Ok(tokio_tungstenite::tungstenite::Message::Close(_)) | Err(_) => {
                        break;
                    }
                    _ => {}
                }
            }

            // Connection lost
            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(ViewerEvent::Disconnected).await;
        });

        Ok(())
    }

    /// Send an ephemeral pointer position. Silently dropped when offline.
    pub async fn send_pointer(&self, event: &PointerEvent) -> Result<(), ProtocolError> {
        if *self.state.read().await != ConnectionState::Connected {
            return Ok(());
        }
        let frame = Frame::pointer(self.info.viewer_id, event)?;
        self.send_bytes(frame.encode()?).await
    }

    /// Send a heartbeat ping.
    pub async fn send_ping(&self) -> Result<(), ProtocolError> {
        let frame = Frame::ping(self.info.viewer_id);
        self.send_bytes(frame.encode()?).await
    }

    async fn send_bytes(&self, bytes: Vec<u8>) -> Result<(), ProtocolError> {
        match self.outgoing_tx {
            Some(ref tx) => tx
                .send(bytes)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }

    /// Get the current connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Get our viewer identity.
    pub fn info(&self) -> &ViewerInfo {
        &self.info
    }

    /// Get the server URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Our viewer id.
    pub fn viewer_id(&self) -> Uuid {
        self.info.viewer_id
    }
}
