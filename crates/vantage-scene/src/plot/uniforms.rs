//! Host uniform values to backend uniform data, and camera wiring.

use glam::Mat4;
use vantage_engine::render::{
    AddressMode, Filter, TexelType, TextureDimension, TextureSpec, UniformData,
};
use vantage_proto::{
    ElementType, FilterMode, PickingSpaces, Space, TextureDescriptor, TextureFormat,
    UniformValue, WrapMode,
};

use crate::camera::Camera;

/// Per-plot uniforms the render loop owns.
pub const OBJECT_ID: &str = "object_id";
pub const PICKING: &str = "picking";

/// Backend representation of a numeric uniform; `None` for samplers.
pub fn uniform_data(value: &UniformValue) -> Option<UniformData> {
    Some(match value {
        UniformValue::Scalar(v) => UniformData::Float(*v),
        UniformValue::UInt(v) => UniformData::UInt(*v),
        UniformValue::Bool(v) => UniformData::Bool(*v),
        UniformValue::Vec2(v) => UniformData::Vec2(*v),
        UniformValue::Vec3(v) => UniformData::Vec3(*v),
        UniformValue::Vec4(v) => UniformData::Vec4(*v),
        UniformValue::Mat4(v) => UniformData::Mat4(*v),
        UniformValue::Sampler(_) => return None,
    })
}

pub fn texture_spec<'a>(label: &'a str, desc: &TextureDescriptor, data: &'a [f32]) -> TextureSpec<'a> {
    let dimension = match desc.size.len() {
        1 => TextureDimension::D1,
        2 => TextureDimension::D2,
        _ => TextureDimension::D3,
    };
    let mut size = [1u32; 3];
    for (dst, src) in size.iter_mut().zip(&desc.size) {
        *dst = *src;
    }
    TextureSpec {
        label,
        dimension,
        size,
        channels: desc.format.channels() as u8,
        texel: match desc.element_type {
            ElementType::U8 => TexelType::U8,
            ElementType::F32 => TexelType::F32,
        },
        address: match desc.wrap {
            WrapMode::Clamp => AddressMode::ClampToEdge,
            WrapMode::Repeat => AddressMode::Repeat,
            WrapMode::Mirror => AddressMode::MirrorRepeat,
        },
        filter: match desc.filter {
            FilterMode::Nearest => Filter::Nearest,
            FilterMode::Linear => Filter::Linear,
        },
        data,
    }
}

/// Everything about a texture except its texels. Equal shapes can be
/// rewritten in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureShape {
    size: Vec<u32>,
    format: TextureFormat,
    element: ElementType,
    wrap: WrapMode,
    filter: FilterMode,
}

impl From<&TextureDescriptor> for TextureShape {
    fn from(desc: &TextureDescriptor) -> Self {
        Self {
            size: desc.size.clone(),
            format: desc.format,
            element: desc.element_type,
            wrap: desc.wrap,
            filter: desc.filter,
        }
    }
}

fn mat(m: Mat4) -> UniformData {
    UniformData::Mat4(m.to_cols_array())
}

/// Camera outputs for a plot authored in `space`.
///
/// `view`/`projection` are chosen so that `projection * view` always equals
/// the space's clip transform.
pub fn camera_uniforms(
    space: Space,
    picking: Option<PickingSpaces>,
    camera: &Camera,
) -> Vec<(&'static str, UniformData)> {
    let m = camera.matrices();
    let (view, projection) = match space {
        Space::Data => (m.view, m.projection),
        Space::Pixel => (Mat4::IDENTITY, m.pixel_space),
        Space::Relative => (Mat4::IDENTITY, m.relative_space),
        Space::Clip => (Mat4::IDENTITY, Mat4::IDENTITY),
    };
    let mut out = vec![
        ("view", mat(view)),
        ("projection", mat(projection)),
        ("projectionview", mat(m.space_to_clip(space))),
        ("resolution", UniformData::Vec2(m.resolution.to_array())),
        ("eyeposition", UniformData::Vec3(m.eyeposition.to_array())),
    ];
    if let Some(p) = picking {
        out.push(("preprojection", mat(camera.preprojection(p.space, p.markerspace))));
    }
    out
}
