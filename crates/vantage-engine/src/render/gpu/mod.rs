//! `wgpu` implementation of [`Backend`].
//!
//! Draw-side calls between `begin_frame` and `end_frame` are recorded and
//! replayed inside a single render pass at `end_frame`, so no render pass
//! borrow outlives a trait call. Resource writes go through the queue
//! immediately and land before the frame's submission.
//!
//! Binding convention for host programs:
//! - group 0, binding 0: uniform block (`u`), declared by the backend and
//!   prepended to both stages
//! - texture *k* (name order) at binding `1 + 2k`, its sampler at `2 + 2k`
//! - vertex attributes at locations in name order, then instance attributes

mod pipeline;
mod program;
mod resources;

use std::collections::HashMap;

use crate::coords::PixelRect;
use crate::paint::Color;

use super::backend::HandleAlloc;
use super::uniforms::UniformBlock;
use super::{
    Backend, BackendError, DrawCall, GeometryId, GeometrySpec, MaterialId, MaterialSpec, PassKind,
    TextureId, TextureSpec, UniformData,
};
use pipeline::{
    create_material_pipeline, ClearPipeline, PipelineKey, CLEAR_SLOT, DEPTH_FORMAT, PICKING_FORMAT,
};
use resources::{GpuGeometry, GpuMaterial, GpuTexture, TextureBinding};

enum FrameOp {
    Viewport(PixelRect),
    Clear(u32),
    Draw(DrawCall, PipelineKey),
}

struct Frame {
    pass: PassKind,
    ops: Vec<FrameOp>,
    clears: Vec<Color>,
}

struct SizedTexture {
    size: (u32, u32),
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl SizedTexture {
    fn new(
        device: &wgpu::Device,
        label: &str,
        size: (u32, u32),
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.0.max(1),
                height: size.1.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { size, texture, view }
    }
}

/// GPU backend drawing into a window surface, with an offscreen target for
/// the picking pass.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_format: wgpu::TextureFormat,
    size: (u32, u32),

    handles: HandleAlloc,
    geometries: HashMap<GeometryId, GpuGeometry>,
    textures: HashMap<TextureId, GpuTexture>,
    materials: HashMap<MaterialId, GpuMaterial>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    rejected: HashMap<PipelineKey, BackendError>,

    screen_clear: Option<ClearPipeline>,
    picking_clear: Option<ClearPipeline>,
    clear_buffer: Option<(wgpu::Buffer, u64)>,

    screen_view: Option<wgpu::TextureView>,
    picking: Option<SizedTexture>,
    depth: Option<SizedTexture>,

    frame: Option<Frame>,

    warned_float_filter: bool,
}

impl WgpuBackend {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        size: (u32, u32),
    ) -> Self {
        Self {
            device,
            queue,
            surface_format,
            size,
            handles: HandleAlloc::default(),
            geometries: HashMap::new(),
            textures: HashMap::new(),
            materials: HashMap::new(),
            pipelines: HashMap::new(),
            rejected: HashMap::new(),
            screen_clear: None,
            picking_clear: None,
            clear_buffer: None,
            screen_view: None,
            picking: None,
            depth: None,
            frame: None,
            warned_float_filter: false,
        }
    }

    /// Updates the canvas size after a surface resize.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    /// Sets the surface view the next screen frame renders into. Consumed
    /// by `end_frame`.
    pub fn set_screen_view(&mut self, view: wgpu::TextureView) {
        self.screen_view = Some(view);
    }

    fn format_for(&self, pass: PassKind) -> wgpu::TextureFormat {
        match pass {
            PassKind::Screen => self.surface_format,
            PassKind::Picking => PICKING_FORMAT,
        }
    }

    fn ensure_targets(&mut self) {
        let size = self.size;
        if self.depth.as_ref().map(|d| d.size) != Some(size) {
            self.depth = Some(SizedTexture::new(
                &self.device,
                "vantage depth",
                size,
                DEPTH_FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT,
            ));
        }
        if self.picking.as_ref().map(|p| p.size) != Some(size) {
            self.picking = Some(SizedTexture::new(
                &self.device,
                "vantage picking target",
                size,
                PICKING_FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            ));
        }
    }

    fn ensure_clear_pipelines(&mut self) {
        if self.screen_clear.is_none() {
            self.screen_clear = Some(ClearPipeline::new(&self.device, self.surface_format));
        }
        if self.picking_clear.is_none() {
            self.picking_clear = Some(ClearPipeline::new(&self.device, PICKING_FORMAT));
        }
    }

    /// Writes the frame's clear colors into the slot buffer, growing it as
    /// needed, and returns a bind group over it.
    fn upload_clears(&mut self, pass: PassKind, clears: &[Color]) -> Option<wgpu::BindGroup> {
        if clears.is_empty() {
            return None;
        }
        self.ensure_clear_pipelines();

        let needed = clears.len() as u64 * CLEAR_SLOT;
        if self.clear_buffer.as_ref().map_or(true, |(_, cap)| *cap < needed) {
            let cap = needed.next_power_of_two().max(16 * CLEAR_SLOT);
            let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("vantage clear colors"),
                size: cap,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.clear_buffer = Some((buffer, cap));
        }

        let mut bytes = vec![0u8; needed as usize];
        for (i, c) in clears.iter().enumerate() {
            let start = i * CLEAR_SLOT as usize;
            bytes[start..start + 16].copy_from_slice(bytemuck::cast_slice(&c.to_array()));
        }
        let (buffer, _) = self.clear_buffer.as_ref()?;
        self.queue.write_buffer(buffer, 0, &bytes);

        let layout = match pass {
            PassKind::Screen => &self.screen_clear.as_ref()?.layout,
            PassKind::Picking => &self.picking_clear.as_ref()?.layout,
        };
        Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("vantage clear bind group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(16),
                }),
            }],
        }))
    }

    fn ensure_pipeline(&mut self, key: &PipelineKey) -> Result<(), BackendError> {
        if self.pipelines.contains_key(key) {
            return Ok(());
        }
        if let Some(err) = self.rejected.get(key) {
            return Err(err.clone());
        }
        let material = self
            .materials
            .get(&key.material)
            .ok_or(BackendError::UnknownMaterial(key.material))?;
        let format = self.format_for(key.pass);
        match create_material_pipeline(&self.device, material, &key.layout, key.pass, format) {
            Ok(pipeline) => {
                log::debug!("created pipeline for {} ({:?})", material.label, key.pass);
                self.pipelines.insert(key.clone(), pipeline);
                Ok(())
            }
            Err(err) => {
                self.rejected.insert(key.clone(), err.clone());
                Err(err)
            }
        }
    }

    fn ensure_bind_group(&mut self, id: MaterialId) -> Result<(), BackendError> {
        let material = self.materials.get_mut(&id).ok_or(BackendError::UnknownMaterial(id))?;
        if material.bind_group.is_some() {
            return Ok(());
        }

        let mut resolved = Vec::with_capacity(material.textures.len());
        for tex_id in material.textures.values() {
            let tex = self.textures.get(tex_id).ok_or(BackendError::UnknownTexture(*tex_id))?;
            resolved.push(tex);
        }

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: material.buffer.as_entire_binding(),
        }];
        for (k, tex) in resolved.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: 1 + 2 * k as u32,
                resource: wgpu::BindingResource::TextureView(&tex.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: 2 + 2 * k as u32,
                resource: wgpu::BindingResource::Sampler(&tex.sampler),
            });
        }

        material.bind_group = Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&material.label),
            layout: &material.layout,
            entries: &entries,
        }));
        Ok(())
    }

    fn texture_bindings(
        &self,
        textures: &[(&str, TextureId)],
    ) -> Result<Vec<(String, TextureId, TextureBinding)>, BackendError> {
        let mut out: Vec<(String, TextureId, TextureBinding)> = Vec::with_capacity(textures.len());
        for &(name, id) in textures {
            let tex = self.textures.get(&id).ok_or(BackendError::UnknownTexture(id))?;
            out.push((name.to_string(), id, tex.binding));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out.dedup_by(|a, b| a.0 == b.0);
        Ok(out)
    }

    fn replay(&mut self, frame: Frame) -> Result<(), BackendError> {
        self.ensure_targets();
        let clear_group = self.upload_clears(frame.pass, &frame.clears);

        let target_view = match frame.pass {
            PassKind::Screen => self.screen_view.take().ok_or(BackendError::NoTarget)?,
            PassKind::Picking => self
                .picking
                .as_ref()
                .map(|p| p.view.clone())
                .ok_or(BackendError::NoTarget)?,
        };
        let depth = self.depth.as_ref().ok_or(BackendError::NoTarget)?;
        let clear = match frame.pass {
            PassKind::Screen => self.screen_clear.as_ref(),
            PassKind::Picking => self.picking_clear.as_ref(),
        };
        let (width, height) = self.size;

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("vantage frame encoder"),
        });

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("vantage frame pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            // Viewports fully outside the canvas suppress their clears/draws.
            let mut visible = true;
            for op in &frame.ops {
                match op {
                    FrameOp::Viewport(rect) => {
                        let Some(r) = rect.clamp_to((width, height)) else {
                            visible = false;
                            continue;
                        };
                        visible = true;
                        let top = r.top_row(height);
                        rpass.set_viewport(
                            rect.x as f32,
                            height as f32 - rect.top() as f32,
                            rect.width as f32,
                            rect.height as f32,
                            0.0,
                            1.0,
                        );
                        rpass.set_scissor_rect(r.x, top, r.width, r.height);
                    }
                    FrameOp::Clear(slot) => {
                        let (Some(clear), Some(group)) = (clear, clear_group.as_ref()) else {
                            continue;
                        };
                        if !visible {
                            continue;
                        }
                        rpass.set_pipeline(&clear.pipeline);
                        rpass.set_bind_group(0, group, &[*slot * CLEAR_SLOT as u32]);
                        rpass.draw(0..3, 0..1);
                    }
                    FrameOp::Draw(call, key) => {
                        if !visible {
                            continue;
                        }
                        let (Some(pipeline), Some(geom), Some(material)) = (
                            self.pipelines.get(key),
                            self.geometries.get(&call.geometry),
                            self.materials.get(&call.material),
                        ) else {
                            continue;
                        };
                        let Some(group) = material.bind_group.as_ref() else {
                            continue;
                        };
                        rpass.set_pipeline(pipeline);
                        rpass.set_bind_group(0, group, &[]);
                        for (slot, attr) in geom.slots.iter().enumerate() {
                            rpass.set_vertex_buffer(slot as u32, attr.buffer.slice(..));
                        }
                        let instances = call.instances.unwrap_or(1);
                        match &geom.indices {
                            Some((buffer, len)) => {
                                rpass.set_index_buffer(buffer.slice(..), wgpu::IndexFormat::Uint32);
                                rpass.draw_indexed(0..call.count.min(*len), 0, 0..instances);
                            }
                            None => rpass.draw(0..call.count, 0..instances),
                        }
                    }
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

impl Backend for WgpuBackend {
    fn canvas_size(&self) -> (u32, u32) {
        self.size
    }

    fn create_geometry(&mut self, spec: &GeometrySpec<'_>) -> Result<GeometryId, BackendError> {
        let geom = GpuGeometry::create(&self.device, spec.label, &spec.attributes, spec.indices)?;
        let id = GeometryId(self.handles.next());
        self.geometries.insert(id, geom);
        Ok(id)
    }

    fn write_attribute(
        &mut self,
        geometry: GeometryId,
        name: &str,
        data: &[f32],
    ) -> Result<(), BackendError> {
        let geom = self.geometries.get(&geometry).ok_or(BackendError::UnknownGeometry(geometry))?;
        let slot = geom.slot(geometry, name)?;
        if data.len() > slot.capacity {
            return Err(BackendError::DataLength {
                what: name.to_string(),
                expected: slot.capacity,
                got: data.len(),
            });
        }
        if !data.is_empty() {
            self.queue.write_buffer(&slot.buffer, 0, bytemuck::cast_slice(data));
        }
        Ok(())
    }

    fn destroy_geometry(&mut self, geometry: GeometryId) {
        if let Some(geom) = self.geometries.remove(&geometry) {
            for slot in geom.slots {
                slot.buffer.destroy();
            }
        }
    }

    fn create_texture(&mut self, spec: &TextureSpec<'_>) -> Result<TextureId, BackendError> {
        let (tex, degraded) = GpuTexture::create(&self.device, &self.queue, spec)?;
        if degraded && !self.warned_float_filter {
            log::debug!("WgpuBackend: linear filtering of f32 textures is unsupported; using nearest");
            self.warned_float_filter = true;
        }
        let id = TextureId(self.handles.next());
        self.textures.insert(id, tex);
        Ok(id)
    }

    fn write_texture(&mut self, texture: TextureId, data: &[f32]) -> Result<(), BackendError> {
        let tex = self.textures.get(&texture).ok_or(BackendError::UnknownTexture(texture))?;
        tex.upload(&self.queue, data)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some(tex) = self.textures.remove(&texture) {
            tex.texture.destroy();
        }
    }

    fn create_material(&mut self, spec: &MaterialSpec<'_>) -> Result<MaterialId, BackendError> {
        let bound = self.texture_bindings(&spec.textures)?;
        let bindings: Vec<TextureBinding> = bound.iter().map(|(_, _, b)| *b).collect();
        let block = UniformBlock::new(&spec.uniforms);

        let material = GpuMaterial {
            label: spec.label.to_string(),
            program: spec.program.map(|p| (p.vertex.to_string(), p.fragment.to_string())),
            buffer: GpuMaterial::uniform_buffer(&self.device, spec.label, &block),
            block,
            textures: bound.into_iter().map(|(name, id, _)| (name, id)).collect(),
            layout: GpuMaterial::bind_group_layout(&self.device, spec.label, &bindings),
            bindings,
            bind_group: None,
            revision: 0,
        };

        let id = MaterialId(self.handles.next());
        self.materials.insert(id, material);
        Ok(id)
    }

    fn write_uniforms(
        &mut self,
        material: MaterialId,
        values: &[(&str, UniformData)],
    ) -> Result<(), BackendError> {
        let mat = self.materials.get_mut(&material).ok_or(BackendError::UnknownMaterial(material))?;
        for &(name, value) in values {
            mat.block.set(name, value)?;
        }
        self.queue.write_buffer(&mat.buffer, 0, mat.block.bytes());
        Ok(())
    }

    fn bind_texture(
        &mut self,
        material: MaterialId,
        name: &str,
        texture: TextureId,
    ) -> Result<(), BackendError> {
        let binding = self
            .textures
            .get(&texture)
            .map(|t| t.binding)
            .ok_or(BackendError::UnknownTexture(texture))?;
        let mat = self.materials.get_mut(&material).ok_or(BackendError::UnknownMaterial(material))?;
        let Some(k) = mat.textures.keys().position(|n| n == name) else {
            return Err(BackendError::Unsupported(format!(
                "texture slot `{name}` was not declared when the material was created"
            )));
        };
        if let Some(slot) = mat.textures.get_mut(name) {
            *slot = texture;
        }
        mat.bind_group = None;

        if mat.bindings[k] != binding {
            mat.bindings[k] = binding;
            mat.layout = GpuMaterial::bind_group_layout(&self.device, &mat.label, &mat.bindings);
            mat.revision = mat.revision.wrapping_add(1);
            self.pipelines.retain(|key, _| key.material != material);
            self.rejected.retain(|key, _| key.material != material);
        }
        Ok(())
    }

    fn destroy_material(&mut self, material: MaterialId) {
        if let Some(mat) = self.materials.remove(&material) {
            mat.buffer.destroy();
        }
        self.pipelines.retain(|key, _| key.material != material);
        self.rejected.retain(|key, _| key.material != material);
    }

    fn begin_frame(&mut self, pass: PassKind) -> Result<(), BackendError> {
        if pass == PassKind::Screen && self.screen_view.is_none() {
            return Err(BackendError::NoTarget);
        }
        let full = PixelRect::canvas(self.size);
        self.frame = Some(Frame { pass, ops: vec![FrameOp::Viewport(full)], clears: Vec::new() });
        Ok(())
    }

    fn set_viewport(&mut self, rect: PixelRect) {
        if let Some(frame) = self.frame.as_mut() {
            frame.ops.push(FrameOp::Viewport(rect));
        }
    }

    fn clear(&mut self, color: Color) {
        let Some(frame) = self.frame.as_mut() else { return };
        let color = match frame.pass {
            PassKind::Screen => color,
            // Background id.
            PassKind::Picking => Color::TRANSPARENT,
        };
        let slot = frame.clears.len() as u32;
        frame.clears.push(color);
        frame.ops.push(FrameOp::Clear(slot));
    }

    fn draw(&mut self, call: &DrawCall) -> Result<(), BackendError> {
        let pass = self.frame.as_ref().map(|f| f.pass).ok_or(BackendError::NoTarget)?;
        if call.count == 0 || call.instances == Some(0) {
            return Ok(());
        }
        let layout = self
            .geometries
            .get(&call.geometry)
            .ok_or(BackendError::UnknownGeometry(call.geometry))?
            .layout_key();
        let revision = self
            .materials
            .get(&call.material)
            .ok_or(BackendError::UnknownMaterial(call.material))?
            .revision;

        let key = PipelineKey { material: call.material, revision, layout, pass };
        self.ensure_pipeline(&key)?;
        self.ensure_bind_group(call.material)?;

        if let Some(frame) = self.frame.as_mut() {
            frame.ops.push(FrameOp::Draw(*call, key));
        }
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        let frame = self.frame.take().ok_or(BackendError::NoTarget)?;
        self.replay(frame)
    }

    fn read_pixels(&mut self, rect: PixelRect) -> Result<Vec<[u8; 4]>, BackendError> {
        let mut out = vec![[0u8; 4]; rect.area()];
        let (_, height) = self.size;
        let Some(src) = rect.clamp_to(self.size) else {
            return Ok(out);
        };
        let picking = self.picking.as_ref().ok_or(BackendError::NoTarget)?;

        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let bytes_per_row = (src.width * 4).div_ceil(align) * align;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("vantage picking readback"),
            size: bytes_per_row as u64 * src.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("vantage picking readback"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &picking.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: src.x, y: src.top_row(height), z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(src.height),
                },
            },
            wgpu::Extent3d { width: src.width, height: src.height, depth_or_array_layers: 1 },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| BackendError::Readback(e.to_string()))?;
        rx.recv()
            .map_err(|_| BackendError::Readback("map callback dropped".to_string()))?
            .map_err(|e| BackendError::Readback(e.to_string()))?;

        {
            let data = slice.get_mapped_range();
            // Buffer rows run top-down; output rows run bottom-up.
            for r in 0..src.height {
                let y = src.top() - 1 - r;
                let row = &data[(r * bytes_per_row) as usize..];
                for c in 0..src.width {
                    let x = src.x + c;
                    let i = (y - rect.y) as usize * rect.width as usize + (x - rect.x) as usize;
                    let p = c as usize * 4;
                    out[i] = [row[p], row[p + 1], row[p + 2], row[p + 3]];
                }
            }
        }
        buffer.unmap();
        Ok(out)
    }

    fn reset(&mut self) {
        self.frame = None;
        self.screen_view = None;
        for (_, geom) in self.geometries.drain() {
            for slot in geom.slots {
                slot.buffer.destroy();
            }
        }
        for (_, tex) in self.textures.drain() {
            tex.texture.destroy();
        }
        for (_, mat) in self.materials.drain() {
            mat.buffer.destroy();
        }
        self.pipelines.clear();
        self.rejected.clear();
        self.picking = None;
        self.depth = None;
        self.clear_buffer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{AttributeSpec, ProgramSource, StepMode};

    /// Headless backend, or `None` on machines without a usable adapter.
    fn headless() -> Option<WgpuBackend> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default())).ok()?;
        let (device, queue) =
            pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default())).ok()?;
        Some(WgpuBackend::new(device, queue, wgpu::TextureFormat::Rgba8Unorm, (8, 8)))
    }

    #[test]
    fn invalid_host_program_is_reported_as_an_error() {
        let Some(mut backend) = headless() else {
            eprintln!("no GPU adapter; skipping");
            return;
        };
        let geometry = backend
            .create_geometry(&GeometrySpec {
                label: "tri",
                attributes: vec![AttributeSpec {
                    name: "position",
                    item_size: 2,
                    step: StepMode::Vertex,
                    data: &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
                }],
                indices: &[],
            })
            .unwrap();
        let material = backend
            .create_material(&MaterialSpec {
                label: "broken",
                program: Some(ProgramSource {
                    vertex: "@vertex fn vs_main( -> {",
                    fragment: "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }",
                }),
                ..MaterialSpec::default()
            })
            .unwrap();
        let call = DrawCall { geometry, material, count: 3, instances: None };

        backend.begin_frame(PassKind::Picking).unwrap();
        let err = backend.draw(&call).unwrap_err();
        assert!(matches!(&err, BackendError::Program { label, .. } if label == "broken"), "{err:?}");
        // The rejection is remembered for the same key.
        assert_eq!(backend.draw(&call), Err(err));
    }
}
