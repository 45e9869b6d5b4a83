//! Paint model shared between the scene graph and the backends.
//!
//! Geometry types remain in `coords`.

pub mod color;

pub use color::Color;
