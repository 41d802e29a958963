//! Mask operations — the atomic, replayable instructions that mutate a
//! binary reveal mask.
//!
//! All coordinates are image-space (resolution-independent, unaffected by
//! viewer zoom/pan). Operations commute only when their footprints do not
//! overlap; in general replay order matters and must be preserved exactly.

use serde::{Deserialize, Serialize};

/// One atomic mutation of the reveal mask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MaskOp {
    /// Punch a feathered transparent region of radius `r` centered at `(x, y)`.
    RevealCircle { x: f32, y: f32, r: f32 },
    /// Restore opacity in a feathered circular region (inverse of reveal).
    HideCircle { x: f32, y: f32, r: f32 },
    /// Punch a hard-edged transparent region bounded by a closed polygon.
    ///
    /// `points` is a flat `[x0, y0, x1, y1, …]` list. Fewer than 3 vertices
    /// makes the operation invalid; consumers skip it silently.
    RevealPolygon { points: Vec<f32> },
    /// Clear all history; the mask returns to fully opaque.
    Reset,
}

impl MaskOp {
    /// Whether this operation wipes all prior history.
    pub fn is_reset(&self) -> bool {
        matches!(self, MaskOp::Reset)
    }

    /// Whether this operation is well-formed.
    ///
    /// Circles need a positive radius, polygons need at least 3 vertices.
    /// Malformed operations are skipped during compositing, never errors.
    pub fn is_valid(&self) -> bool {
        match self {
            MaskOp::RevealCircle { r, .. } | MaskOp::HideCircle { r, .. } => *r > 0.0,
            MaskOp::RevealPolygon { points } => points.len() >= 6 && points.len() % 2 == 0,
            MaskOp::Reset => true,
        }
    }
}
