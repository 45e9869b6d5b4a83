//! Resource descriptions handed to a `Backend`.
//!
//! These borrow their data: the backend copies what it needs into its own
//! storage, so callers keep ownership of their CPU-side arrays.

use super::TextureId;

/// How an attribute advances during a draw.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StepMode {
    Vertex,
    Instance,
}

/// One float attribute buffer. `data.len()` is the allocated capacity in
/// floats and must be a multiple of `item_size`.
#[derive(Debug, Clone)]
pub struct AttributeSpec<'a> {
    pub name: &'a str,
    pub item_size: u32,
    pub step: StepMode,
    pub data: &'a [f32],
}

#[derive(Debug, Clone, Default)]
pub struct GeometrySpec<'a> {
    pub label: &'a str,
    pub attributes: Vec<AttributeSpec<'a>>,
    /// Triangle-list indices; empty for non-indexed geometry.
    pub indices: &'a [u32],
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureDimension {
    D1,
    D2,
    D3,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TexelType {
    /// Unsigned normalized byte; source values in `[0, 1]`.
    U8,
    F32,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum AddressMode {
    #[default]
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone)]
pub struct TextureSpec<'a> {
    pub label: &'a str,
    pub dimension: TextureDimension,
    /// `[width, height, depth]`; unused trailing extents are 1.
    pub size: [u32; 3],
    /// 1 to 4 components per texel.
    pub channels: u8,
    pub texel: TexelType,
    pub address: AddressMode,
    pub filter: Filter,
    /// Row-major texels, `channels` floats each.
    pub data: &'a [f32],
}

impl TextureSpec<'_> {
    pub fn texel_count(&self) -> usize {
        self.size.iter().map(|&s| s as usize).product()
    }

    pub fn expected_len(&self) -> usize {
        self.texel_count() * self.channels as usize
    }
}

/// A typed uniform value as seen by the backend.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformData {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    /// Column-major.
    Mat4([f32; 16]),
    UInt(u32),
    Bool(bool),
}

/// Host-supplied WGSL with `vs_main`/`fs_main` entry points.
#[derive(Debug, Copy, Clone)]
pub struct ProgramSource<'a> {
    pub vertex: &'a str,
    pub fragment: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct MaterialSpec<'a> {
    pub label: &'a str,
    /// `None` selects the backend's reference program.
    pub program: Option<ProgramSource<'a>>,
    pub uniforms: Vec<(&'a str, UniformData)>,
    pub textures: Vec<(&'a str, TextureId)>,
}
