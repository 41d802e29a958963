//! # veil-sync — State distribution for shared reveal sessions
//!
//! Fans out consistent, incremental views of the authoritative reveal
//! state to every display surface: local full-duplex peers receive each
//! snapshot verbatim, remote push-only viewers receive bandwidth-reduced
//! lite frames over WebSocket.
//!
//! ## Architecture
//!
//! ```text
//! mutation commands ──► Authority (single-writer task)
//!                           │ owns StateStore + ChannelCursor
//!               ┌───────────┼───────────────┐
//!               ▼           ▼               ▼
//!        local peers   ViewerGroup     pointer channel
//!        (Snapshot,    (lite frames,   (fire-and-forget,
//!         verbatim)     bincode)        never ordered
//!               │           │           against snapshots)
//!               │           ▼               │
//!               │      PushServer ◄─────────┘
//!               │           │  WebSocket, TCP_NODELAY
//!               │           ▼
//!               │      ViewerClient  (lite-frame reassembly)
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — binary wire protocol (bincode-encoded frames)
//! - [`reduce`] — per-channel lite-snapshot reduction
//! - [`broadcast`] — fan-out groups with per-consumer isolation
//! - [`authority`] — the single-writer authority actor
//! - [`server`] — WebSocket push server with pull-then-subscribe joins
//! - [`client`] — thin-client viewer with lite-frame reassembly

pub mod authority;
pub mod broadcast;
pub mod client;
pub mod protocol;
pub mod reduce;
pub mod server;

// Re-exports for convenience
pub use authority::{Authority, AuthorityHandle};
pub use broadcast::{GroupStats, ViewerGroup};
pub use client::{ConnectionState, FrameCache, ViewerClient, ViewerEvent};
pub use protocol::{Frame, FrameType, PointerEvent, ProtocolError, SnapshotFrame, ViewerInfo};
pub use reduce::ChannelCursor;
pub use server::{PushServer, ServerConfig, ServerStats};
