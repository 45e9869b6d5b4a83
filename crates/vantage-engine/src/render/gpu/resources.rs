use std::collections::BTreeMap;

use wgpu::util::DeviceExt;

use crate::render::uniforms::UniformBlock;
use crate::render::{
    AddressMode, AttributeSpec, BackendError, Filter, GeometryId, StepMode, TexelType,
    TextureDimension, TextureId, TextureSpec,
};

// ── geometry ──────────────────────────────────────────────────────────────

pub(super) struct GpuAttribute {
    pub name: String,
    pub item_size: u32,
    pub step: StepMode,
    pub buffer: wgpu::Buffer,
    /// Allocated floats.
    pub capacity: usize,
}

/// Attribute buffers in shader-location order (vertex attributes by name,
/// then instance attributes by name) plus the optional index buffer.
pub(super) struct GpuGeometry {
    pub slots: Vec<GpuAttribute>,
    pub indices: Option<(wgpu::Buffer, u32)>,
}

/// Layout signature used to key pipelines.
pub(super) type LayoutKey = Vec<(String, u32, StepMode)>;

impl GpuGeometry {
    pub fn create(
        device: &wgpu::Device,
        label: &str,
        attributes: &[AttributeSpec<'_>],
        indices: &[u32],
    ) -> Result<Self, BackendError> {
        let mut sorted: Vec<&AttributeSpec<'_>> = attributes.iter().collect();
        sorted.sort_by_key(|a| (a.step == StepMode::Instance, a.name));

        let mut slots = Vec::with_capacity(sorted.len());
        for a in sorted {
            if !(1..=4).contains(&a.item_size) || a.data.len() % a.item_size as usize != 0 {
                return Err(BackendError::Unsupported(format!(
                    "attribute `{}`: item size {} with {} values",
                    a.name,
                    a.item_size,
                    a.data.len()
                )));
            }
            slots.push(GpuAttribute {
                name: a.name.to_string(),
                item_size: a.item_size,
                step: a.step,
                buffer: float_buffer(device, &format!("{label} {}", a.name), a.data),
                capacity: a.data.len(),
            });
        }

        let indices = (!indices.is_empty()).then(|| {
            let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label} indices")),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });
            (buffer, indices.len() as u32)
        });

        Ok(Self { slots, indices })
    }

    pub fn slot(&self, geometry: GeometryId, name: &str) -> Result<&GpuAttribute, BackendError> {
        self.slots
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| BackendError::UnknownAttribute { geometry, name: name.to_string() })
    }

    pub fn layout_key(&self) -> LayoutKey {
        self.slots.iter().map(|s| (s.name.clone(), s.item_size, s.step)).collect()
    }
}

fn float_buffer(device: &wgpu::Device, label: &str, data: &[f32]) -> wgpu::Buffer {
    // Empty slices cannot be bound; keep one vec4 of storage.
    const EMPTY: [f32; 4] = [0.0; 4];
    let contents = if data.is_empty() { &EMPTY[..] } else { data };
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(contents),
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
    })
}

pub(super) fn vertex_format(item_size: u32) -> wgpu::VertexFormat {
    match item_size {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    }
}

// ── textures ──────────────────────────────────────────────────────────────

/// Texture binding shape, part of a material's bind group layout.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub(super) struct TextureBinding {
    pub dimension: TextureDimension,
    pub filterable: bool,
}

pub(super) struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub binding: TextureBinding,
    pub size: [u32; 3],
    pub channels: u8,
    pub texel: TexelType,
    pub expected_len: usize,
}

impl GpuTexture {
    /// Creates and uploads a texture. Returns `true` as second value when a
    /// linear filter had to be downgraded to nearest.
    pub fn create(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        spec: &TextureSpec<'_>,
    ) -> Result<(Self, bool), BackendError> {
        if !(1..=4).contains(&spec.channels) {
            return Err(BackendError::Unsupported(format!("{} texture channels", spec.channels)));
        }
        let expected_len = spec.expected_len();
        if spec.data.len() != expected_len {
            return Err(BackendError::DataLength {
                what: spec.label.to_string(),
                expected: expected_len,
                got: spec.data.len(),
            });
        }

        let (format, filterable) = match spec.texel {
            TexelType::U8 => (wgpu::TextureFormat::Rgba8Unorm, true),
            // 32-bit float textures are not filterable without an optional feature.
            TexelType::F32 => (wgpu::TextureFormat::Rgba32Float, false),
        };
        let degraded = !filterable && spec.filter == Filter::Linear;
        let filter = if filterable { spec.filter } else { Filter::Nearest };

        let (dimension, view_dimension) = match spec.dimension {
            TextureDimension::D1 => (wgpu::TextureDimension::D1, wgpu::TextureViewDimension::D1),
            TextureDimension::D2 => (wgpu::TextureDimension::D2, wgpu::TextureViewDimension::D2),
            TextureDimension::D3 => (wgpu::TextureDimension::D3, wgpu::TextureViewDimension::D3),
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(spec.label),
            size: extent(spec.size),
            mip_level_count: 1,
            sample_count: 1,
            dimension,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(view_dimension),
            ..Default::default()
        });

        let address = address_mode(spec.address);
        let filter_mode = match filter {
            Filter::Nearest => wgpu::FilterMode::Nearest,
            Filter::Linear => wgpu::FilterMode::Linear,
        };
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(spec.label),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: filter_mode,
            min_filter: filter_mode,
            ..Default::default()
        });

        let tex = Self {
            texture,
            view,
            sampler,
            binding: TextureBinding { dimension: spec.dimension, filterable },
            size: spec.size,
            channels: spec.channels,
            texel: spec.texel,
            expected_len,
        };
        tex.upload(queue, spec.data)?;
        Ok((tex, degraded))
    }

    pub fn upload(&self, queue: &wgpu::Queue, data: &[f32]) -> Result<(), BackendError> {
        if data.len() != self.expected_len {
            return Err(BackendError::DataLength {
                what: "texture".to_string(),
                expected: self.expected_len,
                got: data.len(),
            });
        }
        let (bytes, texel_bytes) = texels_to_rgba(data, self.channels, self.texel);
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.size[0] * texel_bytes),
                rows_per_image: Some(self.size[1]),
            },
            extent(self.size),
        );
        Ok(())
    }
}

fn extent(size: [u32; 3]) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size[0].max(1),
        height: size[1].max(1),
        depth_or_array_layers: size[2].max(1),
    }
}

fn address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

/// Expands `channels`-wide texels to RGBA. Missing color channels are zero,
/// missing alpha is one. Returns the bytes and the size of one texel.
pub(super) fn texels_to_rgba(data: &[f32], channels: u8, texel: TexelType) -> (Vec<u8>, u32) {
    let n = channels as usize;
    let rgba = data.chunks_exact(n).map(|t| {
        let mut out = [0.0, 0.0, 0.0, 1.0];
        out[..n].copy_from_slice(t);
        out
    });
    match texel {
        TexelType::U8 => {
            let bytes = rgba
                .flat_map(|t| t.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
                .collect();
            (bytes, 4)
        }
        TexelType::F32 => {
            let floats: Vec<f32> = rgba.flatten().collect();
            (bytemuck::cast_slice(&floats).to_vec(), 16)
        }
    }
}

// ── materials ─────────────────────────────────────────────────────────────

pub(super) struct GpuMaterial {
    pub label: String,
    /// Host WGSL `(vertex, fragment)`; `None` selects the reference program.
    pub program: Option<(String, String)>,
    pub block: UniformBlock,
    pub buffer: wgpu::Buffer,
    /// Texture slots in binding order.
    pub textures: BTreeMap<String, TextureId>,
    pub layout: wgpu::BindGroupLayout,
    pub bindings: Vec<TextureBinding>,
    pub bind_group: Option<wgpu::BindGroup>,
    /// Bumped whenever `layout` is rebuilt; part of the pipeline key.
    pub revision: u32,
}

impl GpuMaterial {
    pub fn bind_group_layout(
        device: &wgpu::Device,
        label: &str,
        bindings: &[TextureBinding],
    ) -> wgpu::BindGroupLayout {
        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];

        for (k, b) in bindings.iter().enumerate() {
            let view_dimension = match b.dimension {
                TextureDimension::D1 => wgpu::TextureViewDimension::D1,
                TextureDimension::D2 => wgpu::TextureViewDimension::D2,
                TextureDimension::D3 => wgpu::TextureViewDimension::D3,
            };
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 1 + 2 * k as u32,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: b.filterable },
                    view_dimension,
                    multisampled: false,
                },
                count: None,
            });
            let sampler = if b.filterable {
                wgpu::SamplerBindingType::Filtering
            } else {
                wgpu::SamplerBindingType::NonFiltering
            };
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 2 + 2 * k as u32,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Sampler(sampler),
                count: None,
            });
        }

        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &entries,
        })
    }

    pub fn uniform_buffer(device: &wgpu::Device, label: &str, block: &UniformBlock) -> wgpu::Buffer {
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: block.bytes(),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn red_u8_texels_pad_to_opaque_rgba() {
        let (bytes, stride) = texels_to_rgba(&[1.0, 0.5], 1, TexelType::U8);
        assert_eq!(stride, 4);
        assert_eq!(bytes, vec![255, 0, 0, 255, 128, 0, 0, 255]);
    }

    #[test]
    fn f32_texels_are_sixteen_bytes() {
        let (bytes, stride) = texels_to_rgba(&[0.25, 0.75], 2, TexelType::F32);
        assert_eq!(stride, 16);
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes[4..8], 0.75f32.to_le_bytes());
        assert_eq!(bytes[12..16], 1.0f32.to_le_bytes());
    }
}
