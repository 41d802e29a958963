//! The authoritative state store: single writer, named mutation entry
//! points, snapshot broadcast after every mutation.
//!
//! There is exactly one logical mutator; correctness rests on single-writer
//! discipline, not mutex protocols. The store is `Send` but not `Sync` by
//! design — embed it in one task (see `veil-sync`'s authority actor) and
//! serialize mutation requests through a queue.
//!
//! Every mutation entry point applies its change, bumps the version, and
//! immediately notifies every subscribed listener with a fresh [`Snapshot`].
//! No other code path mutates the canonical state.

use crate::ops::MaskOp;
use crate::state::{CanonicalState, ImageRef, Snapshot, Viewport};

/// A named change to one display setting.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingChange {
    MaskOpacity(f32),
    MarkerSize(f32),
    ShowLabels(bool),
}

type SnapshotListener = Box<dyn Fn(&Snapshot) + Send>;

/// Owner of the canonical state.
pub struct StateStore {
    state: CanonicalState,
    version: u64,
    listeners: Vec<SnapshotListener>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    /// Create an empty store (no image, empty log, default settings).
    pub fn new() -> Self {
        Self {
            state: CanonicalState::new(),
            version: 0,
            listeners: Vec::new(),
        }
    }

    /// Subscribe to every broadcast snapshot.
    pub fn subscribe(&mut self, listener: impl Fn(&Snapshot) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Synchronous full copy, for on-demand fetch (initial load or a
    /// pull-style "current state" query).
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: self.version,
            state: self.state.clone(),
        }
    }

    /// Read-only view of the current state (no copy).
    pub fn state(&self) -> &CanonicalState {
        &self.state
    }

    /// Current mutation counter.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Set or replace the map image.
    pub fn set_image(&mut self, image: ImageRef) {
        log::info!(
            "set_image: identity={} {}x{} ({} bytes)",
            image.identity,
            image.width,
            image.height,
            image.payload.len()
        );
        self.state.image = Some(image);
        self.publish();
    }

    /// Append a batch of mask operations (one gesture's worth).
    ///
    /// An empty batch is a no-op and does not broadcast.
    pub fn apply_ops(&mut self, ops: Vec<MaskOp>) {
        if ops.is_empty() {
            return;
        }
        log::debug!("apply_ops: {} operation(s)", ops.len());
        self.state.log.extend(ops);
        self.publish();
    }

    /// Reset the mask to fully opaque, collapsing the log.
    pub fn reset_mask(&mut self) {
        log::info!("reset_mask");
        self.state.log.push(MaskOp::Reset);
        self.publish();
    }

    /// Update one display setting.
    pub fn update_setting(&mut self, change: SettingChange) {
        match change {
            SettingChange::MaskOpacity(v) => self.state.settings.mask_opacity = v,
            SettingChange::MarkerSize(v) => self.state.settings.marker_size = v,
            SettingChange::ShowLabels(v) => self.state.settings.show_labels = v,
        }
        self.publish();
    }

    /// Push (or clear) the viewport shown on read-only surfaces.
    pub fn set_viewport(&mut self, viewport: Option<Viewport>) {
        self.state.viewport = viewport;
        self.publish();
    }

    /// Replace the opaque combat-tracker sub-state (JSON text).
    pub fn set_combat(&mut self, combat: String) {
        self.state.combat = combat;
        self.publish();
    }

    /// Append one entry (JSON text) to the collaborator event log.
    pub fn push_event(&mut self, event: String) {
        self.state.events.push(event);
        self.publish();
    }

    /// Atomically replace the whole state (full load).
    ///
    /// The incoming generation is advanced past both the stored one and the
    /// incoming document's own, so it is strictly greater than any
    /// generation previously broadcast from this process. Downstream
    /// channels key cached image identities on the generation, which is
    /// what resets their "already seen" notion across loads.
    pub fn replace(&mut self, mut incoming: CanonicalState) {
        incoming.generation = self.state.generation.max(incoming.generation) + 1;
        log::info!(
            "replace: generation {} -> {}, {} log op(s)",
            self.state.generation,
            incoming.generation,
            incoming.log.len()
        );
        self.state = incoming;
        self.publish();
    }

    fn publish(&mut self) {
        self.version += 1;
        let snapshot = self.snapshot();
        for listener in &self.listeners {
            listener(&snapshot);
        }
    }
}
