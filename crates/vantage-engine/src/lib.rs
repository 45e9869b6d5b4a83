//! Vantage engine crate.
//!
//! This crate owns the platform + GPU runtime pieces used by higher layers:
//!
//! - `render`: the `Backend` seam with the `wgpu` and CPU implementations
//! - `device` / `window` / `core`: surface management and the winit loop
//! - `input`: platform-agnostic input events and state
//! - `time`: frame and event throttles driven by caller-supplied instants

pub mod core;
pub mod coords;
pub mod device;
pub mod input;
pub mod logging;
pub mod paint;
pub mod render;
pub mod time;
pub mod window;
