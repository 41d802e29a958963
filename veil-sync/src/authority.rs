//! The authority actor: single logical mutator of the canonical state.
//!
//! All mutation requests are serialized through one mpsc queue into a task
//! that owns the [`StateStore`] — there is no shared mutable state and no
//! fine-grained locking; correctness rests on single-writer discipline.
//!
//! After every mutation the task builds exactly one snapshot and delivers:
//! - the snapshot verbatim to local full-duplex peers
//!   (`subscribe_local()`), and
//! - a lite frame, reduced through the viewer channel's
//!   [`ChannelCursor`], to the remote push channel.
//!
//! The pointer channel is entirely separate: fire-and-forget frames that
//! never enter the snapshot stream and carry no ordering guarantee
//! against mask state.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use veil_core::{
    CanonicalState, ImageRef, MaskOp, SettingChange, Snapshot, StateStore, Viewport,
};

use crate::broadcast::ViewerGroup;
use crate::protocol::{Frame, PointerEvent, ProtocolError};
use crate::reduce::ChannelCursor;

/// Default capacity for the snapshot and pointer channels.
const DEFAULT_CAPACITY: usize = 256;

enum Command {
    SetImage(ImageRef),
    ApplyOps(Vec<MaskOp>),
    ResetMask,
    UpdateSetting(SettingChange),
    SetViewport(Option<Viewport>),
    SetCombat(String),
    PushEvent(String),
    Replace(CanonicalState),
    GetSnapshot(oneshot::Sender<Snapshot>),
}

/// Handle to the authority task. Cheap to clone; every surface and the
/// push server hold one.
#[derive(Clone)]
pub struct AuthorityHandle {
    tx: mpsc::Sender<Command>,
    local_tx: broadcast::Sender<Snapshot>,
    viewers: Arc<ViewerGroup>,
    pointers: Arc<ViewerGroup>,
}

impl AuthorityHandle {
    /// On-demand full snapshot (the pull entry point). Never lite.
    pub async fn get_snapshot(&self) -> Result<Snapshot, ProtocolError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::GetSnapshot(reply_tx)).await?;
        reply_rx.await.map_err(|_| ProtocolError::AuthorityStopped)
    }

    /// Subscribe as a local full-duplex peer: every snapshot, verbatim.
    ///
    /// Late joiners should `get_snapshot()` first, then subscribe; a state
    /// fetched before subscribing already matches the mutator at subscribe
    /// time, so zero push frames need to have been seen.
    pub fn subscribe_local(&self) -> broadcast::Receiver<Snapshot> {
        self.local_tx.subscribe()
    }

    /// The remote push channel (lite frames, pre-encoded).
    pub fn viewer_group(&self) -> &Arc<ViewerGroup> {
        &self.viewers
    }

    /// The ephemeral pointer channel.
    pub fn pointer_group(&self) -> &Arc<ViewerGroup> {
        &self.pointers
    }

    /// Publish an ephemeral pointer position. Fire-and-forget: bypasses
    /// the authority queue and the snapshot stream entirely.
    pub fn publish_pointer(&self, sender: Uuid, event: &PointerEvent) -> Result<(), ProtocolError> {
        let frame = Frame::pointer(sender, event)?;
        self.pointers.send_frame(&frame)?;
        Ok(())
    }

    pub async fn set_image(&self, image: ImageRef) -> Result<(), ProtocolError> {
        self.send(Command::SetImage(image)).await
    }

    /// Flush one gesture's batch of mask operations.
    pub async fn apply_ops(&self, ops: Vec<MaskOp>) -> Result<(), ProtocolError> {
        self.send(Command::ApplyOps(ops)).await
    }

    pub async fn reset_mask(&self) -> Result<(), ProtocolError> {
        self.send(Command::ResetMask).await
    }

    pub async fn update_setting(&self, change: SettingChange) -> Result<(), ProtocolError> {
        self.send(Command::UpdateSetting(change)).await
    }

    pub async fn set_viewport(&self, viewport: Option<Viewport>) -> Result<(), ProtocolError> {
        self.send(Command::SetViewport(viewport)).await
    }

    pub async fn set_combat(&self, combat: String) -> Result<(), ProtocolError> {
        self.send(Command::SetCombat(combat)).await
    }

    pub async fn push_event(&self, event: String) -> Result<(), ProtocolError> {
        self.send(Command::PushEvent(event)).await
    }

    /// Atomically replace the whole state (full load). Callers validate
    /// the document version first (`StateDocument::check_version`) and may
    /// warn the user; the load itself is never blocked here.
    pub async fn replace(&self, state: CanonicalState) -> Result<(), ProtocolError> {
        self.send(Command::Replace(state)).await
    }

    async fn send(&self, cmd: Command) -> Result<(), ProtocolError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| ProtocolError::AuthorityStopped)
    }
}

/// The authority task state. Construct with [`Authority::spawn`].
pub struct Authority {
    store: StateStore,
    cursor: ChannelCursor,
    local_tx: broadcast::Sender<Snapshot>,
    viewers: Arc<ViewerGroup>,
    rx: mpsc::Receiver<Command>,
}

impl Authority {
    /// Spawn the authority task with default channel capacities.
    pub fn spawn() -> AuthorityHandle {
        Self::spawn_with_capacity(DEFAULT_CAPACITY)
    }

    /// Spawn with an explicit per-consumer frame buffer capacity.
    pub fn spawn_with_capacity(capacity: usize) -> AuthorityHandle {
        let (tx, rx) = mpsc::channel(capacity);
        let (local_tx, _) = broadcast::channel(capacity);
        let viewers = Arc::new(ViewerGroup::new(capacity));
        let pointers = Arc::new(ViewerGroup::new(capacity));

        let task = Authority {
            store: StateStore::new(),
            cursor: ChannelCursor::new(),
            local_tx: local_tx.clone(),
            viewers: viewers.clone(),
            rx,
        };
        tokio::spawn(task.run());

        AuthorityHandle {
            tx,
            local_tx,
            viewers,
            pointers,
        }
    }

    async fn run(mut self) {
        log::info!("authority task started");
        while let Some(cmd) = self.rx.recv().await {
            self.handle(cmd);
        }
        log::info!("authority task stopped (all handles dropped)");
    }

    fn handle(&mut self, cmd: Command) {
        let mutated = match cmd {
            Command::SetImage(image) => {
                self.store.set_image(image);
                true
            }
            Command::ApplyOps(ops) => {
                if ops.is_empty() {
                    false
                } else {
                    self.store.apply_ops(ops);
                    true
                }
            }
            Command::ResetMask => {
                self.store.reset_mask();
                true
            }
            Command::UpdateSetting(change) => {
                self.store.update_setting(change);
                true
            }
            Command::SetViewport(viewport) => {
                self.store.set_viewport(viewport);
                true
            }
            Command::SetCombat(combat) => {
                self.store.set_combat(combat);
                true
            }
            Command::PushEvent(event) => {
                self.store.push_event(event);
                true
            }
            Command::Replace(state) => {
                // The generation bump already defeats identity collisions;
                // resetting the cursor keeps the invariant obvious
                self.cursor.reset();
                self.store.replace(state);
                true
            }
            Command::GetSnapshot(reply) => {
                let _ = reply.send(self.store.snapshot());
                false
            }
        };
        if mutated {
            self.broadcast();
        }
    }

    /// Build exactly one snapshot and deliver the appropriate projection
    /// to each consumer class.
    fn broadcast(&mut self) {
        let snapshot = self.store.snapshot();

        // Local peers: verbatim. No receivers is fine.
        let _ = self.local_tx.send(snapshot.clone());

        // Remote push channel: reduced through the shared cursor.
        let lite = self.cursor.reduce(&snapshot);
        match Frame::snapshot(snapshot.version, &lite) {
            Ok(frame) => match frame.encode() {
                Ok(bytes) => {
                    let reached = self.viewers.send_raw(Arc::new(bytes));
                    log::debug!(
                        "broadcast v{}: {} viewer(s), image_elided={}, events_elided={}",
                        snapshot.version,
                        reached,
                        lite.image_elided,
                        lite.events_elided
                    );
                }
                Err(e) => log::error!("failed to encode snapshot frame: {e}"),
            },
            Err(e) => log::error!("failed to build snapshot frame: {e}"),
        }
    }
}
