use crate::coords::PixelRect;
use crate::paint::Color;

use super::error::BackendError;
use super::spec::{GeometrySpec, MaterialSpec, TextureSpec, UniformData};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

handle!(
    /// Opaque geometry handle (attribute buffers + optional index buffer).
    GeometryId
);
handle!(
    /// Opaque texture handle.
    TextureId
);
handle!(
    /// Opaque material handle (program + uniforms + texture bindings).
    MaterialId
);

/// Monotonic handle allocator shared by backend implementations.
#[derive(Debug, Default)]
pub(crate) struct HandleAlloc {
    next: u32,
}

impl HandleAlloc {
    pub(crate) fn next(&mut self) -> u32 {
        self.next = self.next.wrapping_add(1);
        self.next
    }
}

/// Which target a frame renders into.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PassKind {
    /// Visual pass into the presentable surface, alpha blending on.
    Screen,
    /// Identity-encoded pass into the offscreen picking target, blending off.
    Picking,
}

/// One draw of a geometry with a material.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DrawCall {
    pub geometry: GeometryId,
    pub material: MaterialId,
    /// Indices to draw for indexed geometry, vertices otherwise.
    pub count: u32,
    /// `Some(n)` draws `n` instances.
    pub instances: Option<u32>,
}

/// Graphics-backend seam.
///
/// The scene graph owns no GPU objects directly; it holds handles issued by
/// a `Backend` and releases them explicitly. Within a frame the call order is
/// `begin_frame`, any number of `set_viewport` / `clear` / `draw`, then
/// `end_frame`. Pixel coordinates are device pixels, origin bottom-left.
pub trait Backend {
    /// Canvas size in device pixels.
    fn canvas_size(&self) -> (u32, u32);

    fn create_geometry(&mut self, spec: &GeometrySpec<'_>) -> Result<GeometryId, BackendError>;

    /// Overwrites the leading `data.len()` floats of one attribute buffer.
    fn write_attribute(
        &mut self,
        geometry: GeometryId,
        name: &str,
        data: &[f32],
    ) -> Result<(), BackendError>;

    fn destroy_geometry(&mut self, geometry: GeometryId);

    fn create_texture(&mut self, spec: &TextureSpec<'_>) -> Result<TextureId, BackendError>;

    /// Replaces all texels; `data` must match the texture's shape.
    fn write_texture(&mut self, texture: TextureId, data: &[f32]) -> Result<(), BackendError>;

    fn destroy_texture(&mut self, texture: TextureId);

    fn create_material(&mut self, spec: &MaterialSpec<'_>) -> Result<MaterialId, BackendError>;

    /// Updates named uniforms. Names not declared at creation are rejected.
    fn write_uniforms(
        &mut self,
        material: MaterialId,
        values: &[(&str, UniformData)],
    ) -> Result<(), BackendError>;

    /// Rebinds a declared texture slot.
    fn bind_texture(
        &mut self,
        material: MaterialId,
        name: &str,
        texture: TextureId,
    ) -> Result<(), BackendError>;

    fn destroy_material(&mut self, material: MaterialId);

    fn begin_frame(&mut self, pass: PassKind) -> Result<(), BackendError>;

    /// Sets viewport and scissor to `rect`.
    fn set_viewport(&mut self, rect: PixelRect);

    /// Clears color and depth inside the current scissor rect.
    fn clear(&mut self, color: Color);

    fn draw(&mut self, call: &DrawCall) -> Result<(), BackendError>;

    fn end_frame(&mut self) -> Result<(), BackendError>;

    /// Reads RGBA8 pixels of the picking target. Rows are returned bottom-up,
    /// `rect.width` pixels each. Parts of `rect` outside the canvas read as
    /// zero.
    fn read_pixels(&mut self, rect: PixelRect) -> Result<Vec<[u8; 4]>, BackendError>;

    /// Drops every resource and any in-flight frame.
    fn reset(&mut self);
}
