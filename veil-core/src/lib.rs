//! # veil-core — Authoritative reveal-state model
//!
//! The canonical data model for a shared fog-of-war session: a raster map
//! image, an ordered log of mask operations that describes what has been
//! revealed, per-surface display settings, and the single-writer store that
//! owns all of it.
//!
//! ## Architecture
//!
//! ```text
//! editor input ──► StateStore::apply_ops()
//!                       │
//!                       ▼
//!                  CanonicalState
//!                  ├── ImageRef        (identity + payload + dimensions)
//!                  ├── OpLog           (reveal/hide/reset history)
//!                  ├── DisplaySettings
//!                  └── aux sub-state   (combat, event log — opaque JSON)
//!                       │
//!                       ▼
//!                  Snapshot (deep value copy, version-stamped)
//!                       │
//!                       ▼
//!                  listeners / distribution layer (veil-sync)
//! ```
//!
//! ## Modules
//!
//! - [`ops`] — `MaskOp`, the atomic replayable mask instruction
//! - [`oplog`] — append-only operation log with reset compaction
//! - [`state`] — canonical state, image reference, settings, snapshots
//! - [`store`] — single-writer state store with named mutation entry points

pub mod ops;
pub mod oplog;
pub mod state;
pub mod store;

// Re-exports for convenience
pub use ops::MaskOp;
pub use oplog::OpLog;
pub use state::{
    CanonicalState, DisplaySettings, ImageRef, Snapshot, StateDocument,
    VersionMismatch, Viewport, STATE_FORMAT_VERSION,
};
pub use store::{SettingChange, StateStore};
