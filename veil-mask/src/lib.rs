//! # veil-mask — Per-surface mask compositing
//!
//! Reconstructs a pixel-accurate reveal mask from an operation log, either
//! by full replay or by incremental append, and turns live pointer input
//! into batched operations with zero-latency local feedback.
//!
//! ## Architecture
//!
//! ```text
//! pointer samples
//!       │
//!       ▼
//! StrokeBuffer        (gap-fill interpolation, one batch per gesture)
//!       │ apply_one()                     │ finish() → Vec<MaskOp>
//!       ▼                                 ▼
//! MaskCompositor ◄── sync(OpLog) ◄── authoritative broadcast
//!       │
//!       ▼
//! MaskRaster          (one opacity byte per pixel)
//!       ▲
//!       │
//! StampCache          (feathered brush stamps, memoized per radius)
//! ```
//!
//! Every surface owns its own compositor and raster; there is no shared
//! mutable pixel state between surfaces.

pub mod brush;
pub mod compositor;
pub mod raster;
pub mod stamp;

pub use brush::{StrokeBuffer, StrokeKind};
pub use compositor::{LayerOrder, MaskCompositor, SurfaceRole};
pub use raster::{MaskError, MaskRaster};
pub use stamp::{Stamp, StampCache};
