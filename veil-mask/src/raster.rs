//! The mask raster: one opacity byte per pixel.
//!
//! 255 means fully hidden (opaque fog), 0 means fully revealed. Reveal
//! operations carve: destination alpha is reduced by stamp alpha, saturating
//! at zero, so carved regions correctly show through content layered beneath
//! the mask. Hide operations paint: destination alpha is raised to the
//! stamp's, never lowered.

use thiserror::Error;

use crate::stamp::Stamp;

/// Fully hidden opacity value.
pub const OPAQUE: u8 = 255;

#[derive(Error, Debug)]
pub enum MaskError {
    #[error("mask raster dimensions must be non-zero (got {width}x{height})")]
    EmptyRaster { width: u32, height: u32 },
}

/// A per-surface opacity raster matching the map image's natural dimensions.
#[derive(Debug, Clone)]
pub struct MaskRaster {
    width: u32,
    height: u32,
    alpha: Vec<u8>,
}

impl MaskRaster {
    /// Create a raster initialized fully opaque.
    pub fn new(width: u32, height: u32) -> Result<Self, MaskError> {
        if width == 0 || height == 0 {
            return Err(MaskError::EmptyRaster { width, height });
        }
        Ok(Self {
            width,
            height,
            alpha: vec![OPAQUE; (width as usize) * (height as usize)],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    // Row-major pixel index, widened before the multiply so rasters past
    // 2^32 pixels cannot wrap
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Opacity at a pixel. Out-of-bounds reads as fully opaque.
    pub fn alpha_at(&self, x: u32, y: u32) -> u8 {
        if x >= self.width || y >= self.height {
            return OPAQUE;
        }
        self.alpha[self.index(x, y)]
    }

    /// The raw opacity plane, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        &self.alpha
    }

    /// Set every pixel to the given opacity.
    pub fn fill(&mut self, value: u8) {
        self.alpha.fill(value);
    }

    /// Carve: reduce destination alpha by stamp alpha, clipped at zero.
    pub fn carve_stamp(&mut self, stamp: &Stamp, cx: f32, cy: f32) {
        self.blend_stamp(stamp, cx, cy, u8::saturating_sub);
    }

    /// Paint: raise destination alpha to the stamp's (hide polarity).
    pub fn paint_stamp(&mut self, stamp: &Stamp, cx: f32, cy: f32) {
        self.blend_stamp(stamp, cx, cy, u8::max);
    }

    fn blend_stamp(&mut self, stamp: &Stamp, cx: f32, cy: f32, blend: impl Fn(u8, u8) -> u8) {
        let r = stamp.radius() as i64;
        let left = cx.round() as i64 - r;
        let top = cy.round() as i64 - r;
        let size = stamp.size() as i64;

        // Clip the stamp square against the raster bounds
        let x0 = left.max(0);
        let y0 = top.max(0);
        let x1 = (left + size).min(self.width as i64);
        let y1 = (top + size).min(self.height as i64);

        for y in y0..y1 {
            for x in x0..x1 {
                let sa = stamp.alpha_at((x - left) as u32, (y - top) as u32);
                if sa == 0 {
                    continue;
                }
                let idx = self.index(x as u32, y as u32);
                self.alpha[idx] = blend(self.alpha[idx], sa);
            }
        }
    }

    /// Carve a hard-edged polygon: interior alpha punched to zero.
    ///
    /// `points` is a flat `[x0, y0, x1, y1, …]` vertex loop. Fewer than 3
    /// vertices (or an odd-length list) is silently ignored. Interior is
    /// determined by even-odd scanline filling.
    pub fn carve_polygon(&mut self, points: &[f32]) {
        if points.len() < 6 || points.len() % 2 != 0 {
            log::debug!("skipping malformed polygon ({} coordinates)", points.len());
            return;
        }
        let n = points.len() / 2;

        let mut y_min = f32::INFINITY;
        let mut y_max = f32::NEG_INFINITY;
        for i in 0..n {
            y_min = y_min.min(points[2 * i + 1]);
            y_max = y_max.max(points[2 * i + 1]);
        }

        let y0 = (y_min.floor() as i64).max(0);
        let y1 = (y_max.ceil() as i64).min(self.height as i64);

        let mut xs: Vec<f32> = Vec::new();
        for y in y0..y1 {
            // Sample each row at its pixel center
            let scan = y as f32 + 0.5;
            xs.clear();
            for i in 0..n {
                let (ax, ay) = (points[2 * i], points[2 * i + 1]);
                let j = (i + 1) % n;
                let (bx, by) = (points[2 * j], points[2 * j + 1]);
                if (ay <= scan && by > scan) || (by <= scan && ay > scan) {
                    let t = (scan - ay) / (by - ay);
                    xs.push(ax + t * (bx - ax));
                }
            }
            xs.sort_by(f32::total_cmp);

            for pair in xs.chunks_exact(2) {
                let x_start = (pair[0].round() as i64).max(0);
                let x_end = (pair[1].round() as i64).min(self.width as i64);
                for x in x_start..x_end {
                    let idx = self.index(x as u32, y as u32);
                    self.alpha[idx] = 0;
                }
            }
        }
    }
}
