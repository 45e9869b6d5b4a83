use crate::render::{BackendError, MaterialId, PassKind, StepMode};

use super::program::{reference_program, uniform_struct};
use super::resources::{vertex_format, GpuMaterial, LayoutKey};

pub(super) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub(super) const PICKING_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Clear colors live in 256-byte slots of one buffer, selected with a
/// dynamic offset.
pub(super) const CLEAR_SLOT: u64 = 256;

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub(super) struct PipelineKey {
    pub material: MaterialId,
    pub revision: u32,
    pub layout: LayoutKey,
    pub pass: PassKind,
}

fn primitive() -> wgpu::PrimitiveState {
    wgpu::PrimitiveState {
        topology: wgpu::PrimitiveTopology::TriangleList,
        strip_index_format: None,
        front_face: wgpu::FrontFace::Ccw,
        cull_mode: None,
        polygon_mode: wgpu::PolygonMode::Fill,
        unclipped_depth: false,
        conservative: false,
    }
}

fn depth_state(compare: wgpu::CompareFunction) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: true,
        depth_compare: compare,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

/// Builds the pipeline for one material drawn with one vertex layout into
/// one pass. Host programs get the generated uniform declaration prepended.
///
/// Validation errors (bad WGSL, mismatched bindings) are captured and
/// returned instead of reaching the device's uncaptured-error handler.
pub(super) fn create_material_pipeline(
    device: &wgpu::Device,
    material: &GpuMaterial,
    layout: &LayoutKey,
    pass: PassKind,
    format: wgpu::TextureFormat,
) -> Result<wgpu::RenderPipeline, BackendError> {
    let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = build_material_pipeline(device, material, layout, pass, format);
    match pollster::block_on(scope.pop()) {
        None => Ok(pipeline),
        Some(err) => Err(BackendError::Program {
            label: material.label.clone(),
            message: err.to_string(),
        }),
    }
}

fn build_material_pipeline(
    device: &wgpu::Device,
    material: &GpuMaterial,
    layout: &LayoutKey,
    pass: PassKind,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let label = format!("{} pipeline ({pass:?})", material.label);

    let (vs_src, fs_src) = match &material.program {
        Some((vertex, fragment)) => {
            let header = uniform_struct(&material.block);
            (format!("{header}\n{vertex}"), format!("{header}\n{fragment}"))
        }
        None => {
            let src = reference_program(&material.block, layout);
            (src.clone(), src)
        }
    };
    let vs = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&format!("{} vs", material.label)),
        source: wgpu::ShaderSource::Wgsl(vs_src.into()),
    });
    let fs = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&format!("{} fs", material.label)),
        source: wgpu::ShaderSource::Wgsl(fs_src.into()),
    });

    // One buffer per attribute, shader location == buffer slot.
    let attributes: Vec<[wgpu::VertexAttribute; 1]> = layout
        .iter()
        .enumerate()
        .map(|(location, (_, item_size, _))| {
            [wgpu::VertexAttribute {
                format: vertex_format(*item_size),
                offset: 0,
                shader_location: location as u32,
            }]
        })
        .collect();
    let buffers: Vec<wgpu::VertexBufferLayout<'_>> = layout
        .iter()
        .zip(&attributes)
        .map(|((_, item_size, step), attrs)| wgpu::VertexBufferLayout {
            array_stride: (*item_size as u64) * std::mem::size_of::<f32>() as u64,
            step_mode: match step {
                StepMode::Vertex => wgpu::VertexStepMode::Vertex,
                StepMode::Instance => wgpu::VertexStepMode::Instance,
            },
            attributes: attrs,
        })
        .collect();

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&label),
        bind_group_layouts: &[&material.layout],
        immediate_size: 0,
    });

    // Identity pixels must not be mixed with what is underneath.
    let blend = match pass {
        PassKind::Screen => Some(wgpu::BlendState::ALPHA_BLENDING),
        PassKind::Picking => None,
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &vs,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &buffers,
        },
        fragment: Some(wgpu::FragmentState {
            module: &fs,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: primitive(),
        depth_stencil: Some(depth_state(wgpu::CompareFunction::LessEqual)),
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}

/// Scissored clear pipeline and its dynamic-offset bind group layout.
pub(super) struct ClearPipeline {
    pub layout: wgpu::BindGroupLayout,
    pub pipeline: wgpu::RenderPipeline,
}

impl ClearPipeline {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("vantage clear shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/clear.wgsl").into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("vantage clear bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(16),
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("vantage clear pipeline layout"),
            bind_group_layouts: &[&layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("vantage clear pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: primitive(),
            // Resets depth to the far plane inside the scissor rect.
            depth_stencil: Some(depth_state(wgpu::CompareFunction::Always)),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        Self { layout, pipeline }
    }
}
