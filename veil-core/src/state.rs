//! Canonical application state and its value-copy snapshots.
//!
//! The image payload can be megabytes; `ImageRef::identity` is the stable
//! key the distribution layer uses to decide whether a broadcast needs to
//! carry the payload again. Auxiliary collaborator sub-state (combat
//! tracker, reveal-to-viewers event log) is carried as opaque JSON text and
//! broadcast as-is — the core never interprets it.

use serde::{Deserialize, Serialize};

use crate::oplog::OpLog;

/// A raster map image: stable identity, raw payload, natural dimensions.
///
/// Two snapshots with equal identity carry an equal payload if both specify
/// one; the distribution layer may elide the payload (empty `Vec`) when the
/// receiving channel already holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Opaque stable key (file path or content hash).
    pub identity: String,
    /// Raw encoded image bytes. Empty when elided in a lite snapshot.
    pub payload: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ImageRef {
    pub fn new(identity: impl Into<String>, payload: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            identity: identity.into(),
            payload,
            width,
            height,
        }
    }
}

/// Per-surface display settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplaySettings {
    /// Opacity of the unrevealed mask on read-only surfaces, 0.0–1.0.
    pub mask_opacity: f32,
    /// Cosmetic marker/brush size in image-space pixels.
    pub marker_size: f32,
    /// Whether marker labels are drawn.
    pub show_labels: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            mask_opacity: 0.9,
            marker_size: 24.0,
            show_labels: true,
        }
    }
}

/// A viewport pushed by the editor to read-only surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub scale: f32,
}

/// The one canonical application state, owned by a single writer.
///
/// `generation` is a monotonic session stamp bumped on every whole-state
/// replacement. Distribution cursors key their "already transmitted" image
/// identity on `(generation, identity)`, so an accidental identity collision
/// across session loads can never serve a stale cached payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalState {
    pub image: Option<ImageRef>,
    pub log: OpLog,
    pub settings: DisplaySettings,
    pub viewport: Option<Viewport>,
    /// Opaque combat-tracker sub-state (JSON text), broadcast as-is.
    pub combat: String,
    /// Append-only collaborator event log (JSON text entries);
    /// payload-heavy, broadcast-sensitive.
    pub events: Vec<String>,
    pub generation: u64,
}

impl Default for CanonicalState {
    fn default() -> Self {
        Self {
            image: None,
            log: OpLog::new(),
            settings: DisplaySettings::default(),
            viewport: None,
            combat: String::from("null"),
            events: Vec::new(),
            generation: 0,
        }
    }
}

impl CanonicalState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// An immutable value copy of [`CanonicalState`] taken at broadcast time.
///
/// Safe to hand to any consumer: nothing a later mutation does is
/// observable through it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Store mutation counter at the time the copy was taken.
    pub version: u64,
    pub state: CanonicalState,
}

/// On-disk format version for full-state load documents.
pub const STATE_FORMAT_VERSION: u32 = 1;

/// A versioned full-state document, used for save and load/replace.
///
/// Persisted as JSON; the image payload rides along base64-free as a byte
/// array, which is acceptable for session files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    pub format_version: u32,
    pub state: CanonicalState,
}

impl StateDocument {
    pub fn new(state: CanonicalState) -> Self {
        Self {
            format_version: STATE_FORMAT_VERSION,
            state,
        }
    }

    /// Encode to the persisted JSON form.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode from the persisted JSON form.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Check the document's format version.
    ///
    /// A mismatch is surfaced to the caller so the UI can warn the user;
    /// it does not block the load itself.
    pub fn check_version(&self) -> Result<(), VersionMismatch> {
        if self.format_version == STATE_FORMAT_VERSION {
            Ok(())
        } else {
            Err(VersionMismatch {
                expected: STATE_FORMAT_VERSION,
                got: self.format_version,
            })
        }
    }
}

/// Format-version mismatch on a full-state load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMismatch {
    pub expected: u32,
    pub got: u32,
}

impl std::fmt::Display for VersionMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "state document format version {} (expected {})",
            self.got, self.expected
        )
    }
}

impl std::error::Error for VersionMismatch {}
