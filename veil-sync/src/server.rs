//! WebSocket push server for remote viewer surfaces.
//!
//! Architecture:
//! ```text
//! Viewer A ──┐
//!             ├── PushServer ── AuthorityHandle
//! Viewer B ──┘        │              │
//!                     │         ViewerGroup (lite frames)
//!                     │              │
//!          ┌──────────┼──────────────┘
//!          ▼          ▼
//!       Viewer A   Viewer B
//! ```
//!
//! Join protocol: the viewer's first binary frame is a Hello. The server
//! subscribes the connection to the broadcast channels FIRST and only
//! then fetches and sends the full snapshot, so any update broadcast in
//! between is either already reflected in the fetched state or still
//! buffered in the receiver. Replaying it is harmless — snapshots are
//! absolute, application is idempotent.
//!
//! Each push connection sets TCP_NODELAY: frames are small after the
//! first and latency matters more than throughput here.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::authority::{Authority, AuthorityHandle};
use crate::protocol::{Frame, FrameType, SnapshotFrame, ViewerInfo};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Maximum concurrently connected viewers
    pub max_viewers: usize,
    /// Broadcast channel capacity per consumer
    pub broadcast_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9270".to_string(),
            max_viewers: 32,
            broadcast_capacity: 256,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub frames_in: u64,
    pub frames_out: u64,
    pub bytes_out: u64,
}

struct StatsInner {
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    frames_in: AtomicU64,
    frames_out: AtomicU64,
    bytes_out: AtomicU64,
}

/// The push server.
pub struct PushServer {
    config: ServerConfig,
    authority: AuthorityHandle,
    stats: Arc<StatsInner>,
    /// Bound address, available once `run` has bound the listener
    bound_addr: Arc<RwLock<Option<SocketAddr>>>,
}

impl PushServer {
    /// Attach a server to an already-spawned authority.
    ///
    /// The broadcast channels belong to the authority; `spawn` sizes them
    /// from the config. A mismatched externally-spawned authority is
    /// allowed but logged.
    pub fn new(config: ServerConfig, authority: AuthorityHandle) -> Self {
        let actual = authority.viewer_group().capacity();
        if actual != config.broadcast_capacity {
            log::warn!(
                "configured broadcast capacity {} ignored: authority channels hold {actual}",
                config.broadcast_capacity
            );
        }
        Self {
            config,
            authority,
            stats: Arc::new(StatsInner {
                total_connections: AtomicU64::new(0),
                active_connections: AtomicU64::new(0),
                frames_in: AtomicU64::new(0),
                frames_out: AtomicU64::new(0),
                bytes_out: AtomicU64::new(0),
            }),
            bound_addr: Arc::new(RwLock::new(None)),
        }
    }

    /// Spawn a fresh authority with channels sized by
    /// `config.broadcast_capacity` and attach a server to it.
    pub fn spawn(config: ServerConfig) -> (Self, AuthorityHandle) {
        let authority = Authority::spawn_with_capacity(config.broadcast_capacity);
        (Self::new(config, authority.clone()), authority)
    }

    /// Create with default configuration.
    pub fn with_defaults(authority: AuthorityHandle) -> Self {
        Self::new(ServerConfig::default(), authority)
    }

    /// Start listening for WebSocket connections.
    ///
    /// This runs the accept loop. Call from an async runtime; the future
    /// only resolves on a bind or accept error.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        let local = listener.local_addr()?;
        *self.bound_addr.write().await = Some(local);
        log::info!("Push server listening on {local}");

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            // Frames after the first are small; latency wins
            if let Err(e) = stream.set_nodelay(true) {
                log::warn!("Failed to set TCP_NODELAY for {addr}: {e}");
            }

            let authority = self.authority.clone();
            let stats = self.stats.clone();
            let max_viewers = self.config.max_viewers;

            tokio::spawn(async move {
                if let Err(e) =
                    Self::handle_connection(stream, addr, authority, stats, max_viewers).await
                {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single viewer connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        authority: AuthorityHandle,
        stats: Arc<StatsInner>,
        max_viewers: usize,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        log::info!("WebSocket connection established from {addr}");
        stats.total_connections.fetch_add(1, Ordering::Relaxed);
        stats.active_connections.fetch_add(1, Ordering::Relaxed);

        let result = Self::viewer_session(
            &mut ws_sender,
            &mut ws_receiver,
            addr,
            &authority,
            &stats,
            max_viewers,
        )
        .await;

        stats.active_connections.fetch_sub(1, Ordering::Relaxed);
        let _ = ws_sender.close().await;
        result
    }

    async fn viewer_session(
        ws_sender: &mut futures_util::stream::SplitSink<
            tokio_tungstenite::WebSocketStream<TcpStream>,
            Message,
        >,
        ws_receiver: &mut futures_util::stream::SplitStream<
            tokio_tungstenite::WebSocketStream<TcpStream>,
        >,
        addr: SocketAddr,
        authority: &AuthorityHandle,
        stats: &StatsInner,
        max_viewers: usize,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // Handshake: the first binary frame must be a Hello
        let info = loop {
            match ws_receiver.next().await {
                Some(Ok(Message::Binary(data))) => {
                    let frame = Frame::decode(&data)?;
                    break frame
                        .viewer_info()
                        .unwrap_or_else(|_| ViewerInfo::with_id(frame.sender, "Anonymous"));
                }
                Some(Ok(Message::Ping(data))) => {
                    ws_sender.send(Message::Pong(data)).await?;
                }
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Err(e)) => return Err(e.into()),
                _ => {}
            }
        };

        let viewers = authority.viewer_group();
        if viewers.viewer_count().await >= max_viewers {
            log::warn!("Rejecting viewer {} from {addr}: server full", info.name);
            return Ok(());
        }

        let viewer_id = info.viewer_id;
        let viewer_name = info.name.clone();
        log::info!("Viewer {viewer_name} ({viewer_id}) joined from {addr}");

        // Subscribe first, then fetch: no update can fall in the gap
        let mut snapshot_rx = viewers.add_viewer(info).await;
        let mut pointer_rx = authority.pointer_group().subscribe();

        let snapshot = authority.get_snapshot().await?;
        let full = Frame::snapshot(snapshot.version, &SnapshotFrame::full(snapshot))?;
        let bytes = full.encode()?;
        stats.frames_out.fetch_add(1, Ordering::Relaxed);
        stats.bytes_out.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        ws_sender.send(Message::Binary(bytes.into())).await?;

        let session_result = loop {
            tokio::select! {
                // Inbound from the viewer
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Binary(data))) => {
                            stats.frames_in.fetch_add(1, Ordering::Relaxed);
                            match Frame::decode(&data) {
                                Ok(frame) => match frame.frame_type {
                                    FrameType::Pointer => {
                                        if let Ok(event) = frame.pointer_event() {
                                            let _ = authority
                                                .publish_pointer(frame.sender, &event);
                                        }
                                    }
                                    FrameType::Ping => {
                                        let pong = Frame::pong(Uuid::nil()).encode()?;
                                        ws_sender.send(Message::Binary(pong.into())).await?;
                                    }
                                    other => {
                                        log::debug!("Unhandled frame type {other:?} from {addr}");
                                    }
                                },
                                Err(e) => {
                                    log::warn!("Failed to decode frame from {addr}: {e}");
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Connection closed from {addr}");
                            break Ok(());
                        }
                        Some(Err(e)) => break Err(e.into()),
                        _ => {}
                    }
                }

                // Outbound snapshot frames
                frame = snapshot_rx.recv() => {
                    match frame {
                        Ok(bytes) => {
                            stats.frames_out.fetch_add(1, Ordering::Relaxed);
                            stats.bytes_out.fetch_add(bytes.len() as u64, Ordering::Relaxed);
                            ws_sender.send(Message::Binary(bytes.to_vec().into())).await?;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            // A lite frame stream cannot tolerate gaps: the
                            // viewer may have missed the payload-carrying
                            // frame. Close so the viewer reconnects and
                            // re-pulls the full snapshot.
                            viewers.note_dropped(n);
                            log::warn!(
                                "Viewer {viewer_name} lagged by {n} frames, closing for re-pull"
                            );
                            break Ok(());
                        }
                        Err(_) => break Ok(()),
                    }
                }

                // Outbound pointer frames. Skipping on lag is fine here —
                // only the latest position matters.
                frame = pointer_rx.recv() => {
                    match frame {
                        Ok(bytes) => {
                            // Don't echo the viewer's own pointer
                            if let Ok(f) = Frame::decode(&bytes) {
                                if f.sender == viewer_id {
                                    continue;
                                }
                            }
                            ws_sender.send(Message::Binary(bytes.to_vec().into())).await?;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(_) => break Ok(()),
                    }
                }
            }
        };

        viewers.remove_viewer(&viewer_id).await;
        log::info!("Viewer {viewer_name} ({viewer_id}) left");
        session_result
    }

    /// Get server statistics.
    pub fn stats(&self) -> ServerStats {
        ServerStats {
            total_connections: self.stats.total_connections.load(Ordering::Relaxed),
            active_connections: self.stats.active_connections.load(Ordering::Relaxed),
            frames_in: self.stats.frames_in.load(Ordering::Relaxed),
            frames_out: self.stats.frames_out.load(Ordering::Relaxed),
            bytes_out: self.stats.bytes_out.load(Ordering::Relaxed),
        }
    }

    /// Get the configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// The actual bound address once `run` has started listening.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound_addr.read().await
    }
}
