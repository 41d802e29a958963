//! Feathered brush stamps, memoized per radius.
//!
//! A stamp's inner 65% of radius is fully opaque and the outer 35% fades
//! linearly to transparent. Stamps are built lazily on first use of a
//! radius and reused across operations and frames; the cache grows without
//! bound, but in practice is bounded by the number of distinct brush sizes
//! used in a session.

use std::collections::HashMap;

/// Fraction of the radius that is fully opaque before the feather begins.
const SOLID_FRACTION: f32 = 0.65;

/// A precomputed radial opacity gradient.
#[derive(Debug, Clone)]
pub struct Stamp {
    radius: u32,
    size: u32,
    alpha: Vec<u8>,
}

impl Stamp {
    /// Build a feathered stamp for the given radius in pixels.
    ///
    /// A radius of zero is clamped to one; callers filter malformed
    /// operations before reaching this point.
    pub fn build(radius: u32) -> Self {
        let radius = radius.max(1);
        let size = radius * 2 + 1;
        let r = radius as f32;
        let solid = r * SOLID_FRACTION;
        let feather = r - solid;

        let mut alpha = vec![0u8; (size * size) as usize];
        for y in 0..size {
            for x in 0..size {
                let dx = x as f32 - r;
                let dy = y as f32 - r;
                let d = (dx * dx + dy * dy).sqrt();
                let a = if d <= solid {
                    255.0
                } else if d >= r {
                    0.0
                } else {
                    255.0 * (1.0 - (d - solid) / feather)
                };
                alpha[(y * size + x) as usize] = a.round() as u8;
            }
        }
        Self { radius, size, alpha }
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    /// Side length of the square alpha grid (`2 * radius + 1`).
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Stamp opacity at local coordinates.
    pub fn alpha_at(&self, x: u32, y: u32) -> u8 {
        self.alpha[(y * self.size + x) as usize]
    }
}

/// Memoizing map from radius to precomputed stamp.
#[derive(Debug, Default)]
pub struct StampCache {
    stamps: HashMap<u32, Stamp>,
}

impl StampCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the stamp for a radius, building it on first use.
    ///
    /// Radii are keyed at pixel granularity; sub-pixel differences share
    /// one stamp.
    pub fn get(&mut self, radius: f32) -> &Stamp {
        let key = radius.round().max(1.0) as u32;
        self.stamps.entry(key).or_insert_with(|| {
            log::debug!("building feather stamp for radius {key}px");
            Stamp::build(key)
        })
    }

    /// Number of distinct stamps built so far.
    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}
