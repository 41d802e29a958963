//! The local prediction buffer: live drag-paint input with zero-latency
//! feedback and one batched flush per gesture.
//!
//! While a gesture is active, every pointer sample becomes a circle
//! operation that is applied to the local compositor immediately and
//! accumulated in the buffer. Pointer sampling is too sparse for fast
//! drags, so consecutive stamps are gap-filled: if the new point is more
//! than `radius * 0.4` from the last painted point, evenly interpolated
//! intermediate stamps are synthesized so strokes look continuous at any
//! pointer rate.
//!
//! `finish()` takes the whole batch as one atomic swap — a new gesture can
//! begin while the flushed batch is still in flight without losing or
//! duplicating operations.

use veil_core::MaskOp;

use crate::compositor::MaskCompositor;

/// Maximum gap between consecutive stamps, as a fraction of the radius.
const STEP_FRACTION: f32 = 0.4;

/// What a stroke does to the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrokeKind {
    Reveal,
    Hide,
}

/// Accumulates one gesture's operations.
#[derive(Debug, Default)]
pub struct StrokeBuffer {
    active: Option<ActiveStroke>,
    ops: Vec<MaskOp>,
}

#[derive(Debug)]
struct ActiveStroke {
    kind: StrokeKind,
    radius: f32,
    last_x: f32,
    last_y: f32,
}

impl StrokeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a gesture is currently active.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Number of buffered operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Start a gesture at input-down, stamping the first point.
    pub fn begin(
        &mut self,
        kind: StrokeKind,
        radius: f32,
        x: f32,
        y: f32,
        compositor: &mut MaskCompositor,
    ) {
        self.active = Some(ActiveStroke {
            kind,
            radius,
            last_x: x,
            last_y: y,
        });
        self.stamp(x, y, compositor);
    }

    /// Extend the gesture to a new pointer sample, gap-filling as needed.
    ///
    /// No-op unless a gesture is active.
    pub fn extend(&mut self, x: f32, y: f32, compositor: &mut MaskCompositor) {
        let Some(stroke) = self.active.as_ref() else {
            return;
        };
        let (lx, ly, radius) = (stroke.last_x, stroke.last_y, stroke.radius);
        let step = radius * STEP_FRACTION;
        let dist = ((x - lx).powi(2) + (y - ly).powi(2)).sqrt();

        if step > 0.0 && dist > step {
            let steps = (dist / step).ceil() as usize;
            for i in 1..steps {
                let t = i as f32 / steps as f32;
                self.stamp(lx + (x - lx) * t, ly + (y - ly) * t, compositor);
            }
        }
        self.stamp(x, y, compositor);

        if let Some(stroke) = self.active.as_mut() {
            stroke.last_x = x;
            stroke.last_y = y;
        }
    }

    /// End the gesture at input-up and take the whole buffered batch.
    ///
    /// Snapshot-then-clear: the returned batch is independent of the
    /// buffer, which is immediately ready for the next gesture.
    pub fn finish(&mut self) -> Vec<MaskOp> {
        self.active = None;
        std::mem::take(&mut self.ops)
    }

    fn stamp(&mut self, x: f32, y: f32, compositor: &mut MaskCompositor) {
        let Some(stroke) = self.active.as_ref() else {
            return;
        };
        let op = match stroke.kind {
            StrokeKind::Reveal => MaskOp::RevealCircle { x, y, r: stroke.radius },
            StrokeKind::Hide => MaskOp::HideCircle { x, y, r: stroke.radius },
        };
        compositor.apply_one(&op);
        self.ops.push(op);
    }
}
