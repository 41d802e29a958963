//! The per-surface mask compositing engine.
//!
//! Consumes an operation log and produces a renderable opacity raster,
//! either by full replay (`rebuild`) or by incremental append (`sync`).
//! Tracking the length and epoch of the log last rendered makes
//! steady-state updates O(1) per new operation instead of O(log length).
//!
//! Operations arriving before the image dimensions are known are safe
//! no-ops: the length tracking retries them once the raster exists.

use veil_core::{MaskOp, OpLog};

use crate::raster::{MaskError, MaskRaster, OPAQUE};
use crate::stamp::StampCache;

/// What a display surface is for. Determines raster layering only;
/// the compositing algorithm is identical on every surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceRole {
    /// Full-control edit surface.
    Editor,
    /// Read-only surface (local second window or remote thin client).
    Viewer,
}

/// Raster layering order between the mask and marker/token content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerOrder {
    /// Markers drawn above the mask — always visible to the editor.
    MarkersAboveMask,
    /// Mask drawn above markers — unrevealed regions occlude them.
    MaskAboveMarkers,
}

impl SurfaceRole {
    pub fn layer_order(self) -> LayerOrder {
        match self {
            SurfaceRole::Editor => LayerOrder::MarkersAboveMask,
            SurfaceRole::Viewer => LayerOrder::MaskAboveMarkers,
        }
    }
}

/// Per-surface compositing engine.
pub struct MaskCompositor {
    role: SurfaceRole,
    raster: Option<MaskRaster>,
    stamps: StampCache,
    rendered_len: usize,
    rendered_epoch: u64,
}

impl MaskCompositor {
    pub fn new(role: SurfaceRole) -> Self {
        Self {
            role,
            raster: None,
            stamps: StampCache::new(),
            rendered_len: 0,
            rendered_epoch: 0,
        }
    }

    pub fn role(&self) -> SurfaceRole {
        self.role
    }

    pub fn layer_order(&self) -> LayerOrder {
        self.role.layer_order()
    }

    /// Whether a raster exists to composite onto.
    pub fn is_ready(&self) -> bool {
        self.raster.is_some()
    }

    /// The current raster, if the image dimensions are known.
    pub fn raster(&self) -> Option<&MaskRaster> {
        self.raster.as_ref()
    }

    /// Allocate (or replace) the raster for a new image.
    ///
    /// Dimensions are known before the image payload finishes decoding, so
    /// this runs up front; the next `sync` replays whatever accumulated in
    /// the log meanwhile.
    pub fn set_image_size(&mut self, width: u32, height: u32) -> Result<(), MaskError> {
        self.raster = Some(MaskRaster::new(width, height)?);
        self.rendered_len = 0;
        self.rendered_epoch = 0;
        Ok(())
    }

    /// Drop the raster (image cleared).
    pub fn clear_image(&mut self) {
        self.raster = None;
        self.rendered_len = 0;
        self.rendered_epoch = 0;
    }

    /// Apply a single operation directly onto the current raster, without
    /// clearing. Safe no-op when no raster exists or the operation is
    /// malformed.
    pub fn apply_one(&mut self, op: &MaskOp) {
        let Self { raster, stamps, .. } = self;
        let Some(raster) = raster.as_mut() else {
            return;
        };
        if !op.is_valid() {
            log::debug!("skipping malformed mask operation");
            return;
        }
        match op {
            MaskOp::RevealCircle { x, y, r } => raster.carve_stamp(stamps.get(*r), *x, *y),
            MaskOp::HideCircle { x, y, r } => raster.paint_stamp(stamps.get(*r), *x, *y),
            MaskOp::RevealPolygon { points } => raster.carve_polygon(points),
            MaskOp::Reset => raster.fill(OPAQUE),
        }
    }

    /// Full replay: clear to opaque, then apply everything from the log's
    /// replay start forward, in order.
    pub fn rebuild(&mut self, log: &OpLog) {
        if let Some(raster) = self.raster.as_mut() {
            raster.fill(OPAQUE);
        } else {
            return;
        }
        for op in log.replay_tail() {
            self.apply_one(op);
        }
        self.rendered_len = log.len();
        self.rendered_epoch = log.epoch();
    }

    /// Incremental update against an incoming log.
    ///
    /// Equal length and epoch is an echo of an update already rendered
    /// locally: no-op. A longer log applies only the new tail. A shorter
    /// log, or any epoch change, means history was discarded — always safe
    /// to fully rebuild rather than assert.
    pub fn sync(&mut self, log: &OpLog) {
        if self.raster.is_none() {
            return;
        }
        let len = log.len();
        if log.epoch() != self.rendered_epoch || len < self.rendered_len {
            if log.epoch() == self.rendered_epoch {
                log::warn!(
                    "log truncated outside a reset ({} -> {len}); rebuilding",
                    self.rendered_len
                );
            }
            self.rebuild(log);
            return;
        }
        if len == self.rendered_len {
            return;
        }
        for op in &log.as_slice()[self.rendered_len..len] {
            self.apply_one(op);
        }
        self.rendered_len = len;
    }

    /// Length of the log this surface last rendered.
    pub fn rendered_len(&self) -> usize {
        self.rendered_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reveal(x: f32, y: f32, r: f32) -> MaskOp {
        MaskOp::RevealCircle { x, y, r }
    }

    fn hide(x: f32, y: f32, r: f32) -> MaskOp {
        MaskOp::HideCircle { x, y, r }
    }

    fn ready(role: SurfaceRole) -> MaskCompositor {
        let mut c = MaskCompositor::new(role);
        c.set_image_size(64, 64).unwrap();
        c
    }

    #[test]
    fn test_layer_order_per_role() {
        assert_eq!(
            SurfaceRole::Editor.layer_order(),
            LayerOrder::MarkersAboveMask
        );
        assert_eq!(
            SurfaceRole::Viewer.layer_order(),
            LayerOrder::MaskAboveMarkers
        );
    }

    #[test]
    fn test_ops_before_image_are_deferred_not_dropped() {
        let mut c = MaskCompositor::new(SurfaceRole::Viewer);
        let mut log = OpLog::new();
        log.push(reveal(32.0, 32.0, 10.0));

        // No raster yet: sync is a safe no-op and records nothing
        c.sync(&log);
        assert!(!c.is_ready());
        assert_eq!(c.rendered_len(), 0);

        // Dimensions arrive; the same sync call now replays the log
        c.set_image_size(64, 64).unwrap();
        c.sync(&log);
        assert_eq!(c.rendered_len(), 1);
        assert_eq!(c.raster().unwrap().alpha_at(32, 32), 0);
    }

    #[test]
    fn test_incremental_matches_full_rebuild() {
        let mut log = OpLog::new();
        let ops = vec![
            reveal(10.0, 10.0, 8.0),
            hide(12.0, 10.0, 6.0),
            reveal(40.0, 40.0, 12.0),
            MaskOp::RevealPolygon {
                points: vec![20.0, 20.0, 30.0, 20.0, 30.0, 30.0, 20.0, 30.0],
            },
            reveal(12.0, 12.0, 5.0),
        ];

        // Incremental: sync after every single append
        let mut incremental = ready(SurfaceRole::Viewer);
        for op in &ops {
            log.push(op.clone());
            incremental.sync(&log);
        }

        // Full replay of the final log
        let mut full = ready(SurfaceRole::Viewer);
        full.rebuild(&log);

        assert_eq!(
            incremental.raster().unwrap().as_bytes(),
            full.raster().unwrap().as_bytes()
        );
    }

    #[test]
    fn test_rebuild_starts_after_last_reset() {
        let mut with_prefix = OpLog::new();
        with_prefix.extend(vec![
            reveal(10.0, 10.0, 8.0),
            MaskOp::Reset,
            reveal(40.0, 40.0, 12.0),
        ]);

        let mut tail_only = OpLog::new();
        tail_only.push(reveal(40.0, 40.0, 12.0));

        let mut a = ready(SurfaceRole::Viewer);
        a.rebuild(&with_prefix);
        let mut b = ready(SurfaceRole::Viewer);
        b.rebuild(&tail_only);

        assert_eq!(a.raster().unwrap().as_bytes(), b.raster().unwrap().as_bytes());
    }

    #[test]
    fn test_echo_is_noop() {
        let mut log = OpLog::new();
        log.push(reveal(32.0, 32.0, 10.0));

        let mut c = ready(SurfaceRole::Editor);
        c.sync(&log);
        let before: Vec<u8> = c.raster().unwrap().as_bytes().to_vec();

        // Same log again (broadcast echo of a locally-rendered update)
        c.sync(&log);
        assert_eq!(c.raster().unwrap().as_bytes(), &before[..]);
        assert_eq!(c.rendered_len(), 1);
    }

    #[test]
    fn test_reset_collapse_triggers_rebuild() {
        let mut log = OpLog::new();
        log.push(reveal(32.0, 32.0, 10.0));

        let mut c = ready(SurfaceRole::Viewer);
        c.sync(&log);
        assert_eq!(c.raster().unwrap().alpha_at(32, 32), 0);

        // Reset collapses the log to length 1 — same length, new epoch
        log.push(MaskOp::Reset);
        assert_eq!(log.len(), 1);
        c.sync(&log);
        assert_eq!(c.raster().unwrap().alpha_at(32, 32), OPAQUE);
    }

    #[test]
    fn test_shorter_log_same_epoch_rebuilds() {
        let mut long = OpLog::new();
        long.extend(vec![
            reveal(10.0, 10.0, 8.0),
            reveal(30.0, 30.0, 8.0),
            reveal(50.0, 50.0, 8.0),
        ]);

        // Independently built shorter history, no reset involved
        let mut short = OpLog::new();
        short.push(reveal(10.0, 10.0, 8.0));
        assert_eq!(long.epoch(), short.epoch());

        let mut c = ready(SurfaceRole::Viewer);
        c.sync(&long);
        assert_eq!(c.raster().unwrap().alpha_at(50, 50), 0);

        // Truncation without an epoch change: full rebuild, never a stale
        // raster or a panic
        c.sync(&short);
        let mut fresh = ready(SurfaceRole::Viewer);
        fresh.rebuild(&short);
        assert_eq!(
            c.raster().unwrap().as_bytes(),
            fresh.raster().unwrap().as_bytes()
        );
        assert_eq!(c.rendered_len(), 1);
        assert_eq!(c.raster().unwrap().alpha_at(50, 50), OPAQUE);
    }

    #[test]
    fn test_scenario_reveal_then_reset_fully_opaque() {
        // setImage 50x50, reveal at (25,25,10), reset → fully opaque raster
        let mut c = MaskCompositor::new(SurfaceRole::Viewer);
        c.set_image_size(50, 50).unwrap();

        let mut log = OpLog::new();
        log.push(reveal(25.0, 25.0, 10.0));
        c.sync(&log);
        log.push(MaskOp::Reset);
        c.sync(&log);

        assert_eq!(log.len(), 1);
        assert!(c.raster().unwrap().as_bytes().iter().all(|&a| a == OPAQUE));
    }

    #[test]
    fn test_hide_then_reveal_round_trip_region() {
        // Start from a revealed region; hide then reveal at the same spot
        // returns the affected region to its pre-hide state
        let mut c = ready(SurfaceRole::Viewer);
        let mut log = OpLog::new();
        log.push(MaskOp::RevealPolygon {
            points: vec![0.0, 0.0, 64.0, 0.0, 64.0, 64.0, 0.0, 64.0],
        });
        c.sync(&log);
        let before: Vec<u8> = c.raster().unwrap().as_bytes().to_vec();

        log.push(hide(32.0, 32.0, 10.0));
        log.push(reveal(32.0, 32.0, 10.0));
        c.sync(&log);
        assert_eq!(c.raster().unwrap().as_bytes(), &before[..]);
    }

    #[test]
    fn test_malformed_polygon_skipped_mid_batch() {
        let mut log = OpLog::new();
        log.extend(vec![
            reveal(10.0, 10.0, 8.0),
            MaskOp::RevealPolygon { points: vec![1.0, 1.0] },
            reveal(50.0, 50.0, 8.0),
        ]);

        let mut c = ready(SurfaceRole::Viewer);
        c.sync(&log);
        // Both valid ops applied; the malformed one neither corrupted the
        // raster nor aborted the batch
        assert_eq!(c.raster().unwrap().alpha_at(10, 10), 0);
        assert_eq!(c.raster().unwrap().alpha_at(50, 50), 0);
        assert_eq!(c.rendered_len(), 3);
    }

    #[test]
    fn test_empty_log_and_lone_reset_composite_identically() {
        let empty = OpLog::new();
        let mut reset_only = OpLog::new();
        reset_only.push(MaskOp::Reset);

        let mut a = ready(SurfaceRole::Viewer);
        a.rebuild(&empty);
        let mut b = ready(SurfaceRole::Viewer);
        b.rebuild(&reset_only);

        assert_eq!(a.raster().unwrap().as_bytes(), b.raster().unwrap().as_bytes());
    }
}
