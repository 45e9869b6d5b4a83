//! Coordinate and geometry types shared by the backends and the scene graph.
//!
//! Canonical space:
//! - Device (physical) pixels
//! - Origin bottom-left
//! - +X right, +Y up
//!
//! Backends whose native origin is top-left convert at the boundary with
//! `PixelRect::top_row`.

mod rect;

pub use rect::{PixelRect, Rect};
