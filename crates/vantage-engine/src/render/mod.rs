//! Rendering seam.
//!
//! The scene layer talks to a [`Backend`]: it creates geometries, textures
//! and materials, receives opaque handles, and replays draw calls per frame.
//! Two implementations ship with the engine:
//!
//! - [`WgpuBackend`]: draws into a window surface and an offscreen picking
//!   target through `wgpu`
//! - [`SoftBackend`]: a CPU rasterizer implementing the same reference
//!   program, used by tests and headless tools
//!
//! Convention:
//! - pixel rectangles are device pixels with the origin at the bottom-left
//! - picking pixels carry `encode_pick(object_id, index)`; id 0 is background

mod backend;
mod error;
pub mod gpu;
mod pick_codec;
pub mod soft;
mod spec;
pub mod uniforms;

pub use backend::{Backend, DrawCall, GeometryId, MaterialId, PassKind, TextureId};
pub use error::BackendError;
pub use gpu::WgpuBackend;
pub use pick_codec::{decode_pick, encode_pick, PickSample};
pub use soft::SoftBackend;
pub use spec::{
    AddressMode, AttributeSpec, Filter, GeometrySpec, MaterialSpec, ProgramSource, StepMode,
    TexelType, TextureDimension, TextureSpec, UniformData,
};
