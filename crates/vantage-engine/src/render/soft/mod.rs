//! CPU reference backend.
//!
//! Implements the reference program that the GPU backend also falls back to
//! when a material carries no WGSL:
//!
//! - vertex stage `clip = projectionview * model * vec4(position + offset, 1)`,
//!   where `projectionview`/`model` are optional `Mat4` uniforms (identity when
//!   absent) and `offset` an optional instance attribute
//! - triangles filled at pixel centres, depth test `<=`, no near-plane clipping
//!   (triangles with a vertex at `w <= 0` are dropped)
//! - screen pass: the `color` uniform (`Vec4`/`Vec3`, white when absent),
//!   straight-alpha blended
//! - picking pass: `encode_pick(object_id, index)` where `index` is the first
//!   vertex of the triangle, or the instance index for instanced draws
//!
//! Used by tests and by headless tools that need pixels without a GPU.

mod raster;

use std::collections::{BTreeMap, HashMap};

use glam::{Mat4, Vec3, Vec4};

use crate::coords::PixelRect;
use crate::paint::Color;

use super::backend::HandleAlloc;
use super::pick_codec::encode_pick;
use super::uniforms::UniformBlock;
use super::{
    Backend, BackendError, DrawCall, GeometryId, GeometrySpec, MaterialId, MaterialSpec, PassKind,
    StepMode, TextureId, TextureSpec, UniformData,
};
use raster::{fill_triangle, Target};

#[derive(Debug)]
struct SoftAttribute {
    item_size: u32,
    step: StepMode,
    data: Vec<f32>,
}

impl SoftAttribute {
    /// Element `i` widened to a `Vec3` (missing components are zero).
    fn vec3(&self, i: usize) -> Vec3 {
        let n = self.item_size as usize;
        let mut out = [0.0; 3];
        for (c, slot) in out.iter_mut().enumerate().take(n) {
            *slot = self.data.get(i * n + c).copied().unwrap_or(0.0);
        }
        Vec3::from_array(out)
    }
}

#[derive(Debug)]
struct SoftGeometry {
    attributes: BTreeMap<String, SoftAttribute>,
    indices: Vec<u32>,
}

#[derive(Debug)]
struct SoftTexture {
    expected_len: usize,
    data: Vec<f32>,
}

#[derive(Debug)]
struct SoftMaterial {
    uniforms: UniformBlock,
    textures: BTreeMap<String, TextureId>,
}

impl SoftMaterial {
    fn mat4(&self, name: &str) -> Mat4 {
        match self.uniforms.get(name) {
            Some(UniformData::Mat4(m)) => Mat4::from_cols_array(&m),
            _ => Mat4::IDENTITY,
        }
    }

    fn color(&self) -> Color {
        match self.uniforms.get("color") {
            Some(UniformData::Vec4(c)) => Color::from_array(c),
            Some(UniformData::Vec3([r, g, b])) => Color::new(r, g, b, 1.0),
            _ => Color::WHITE,
        }
    }

    fn object_id(&self) -> u32 {
        match self.uniforms.get("object_id") {
            Some(UniformData::UInt(id)) => id,
            _ => 0,
        }
    }
}

/// Software rasterizer implementing [`Backend`].
#[derive(Debug)]
pub struct SoftBackend {
    handles: HandleAlloc,
    geometries: HashMap<GeometryId, SoftGeometry>,
    textures: HashMap<TextureId, SoftTexture>,
    materials: HashMap<MaterialId, SoftMaterial>,
    screen: Target,
    picking: Target,
    pass: Option<PassKind>,
    viewport: PixelRect,
    frames: HashMap<PassKind, u64>,
}

impl SoftBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            handles: HandleAlloc::default(),
            geometries: HashMap::new(),
            textures: HashMap::new(),
            materials: HashMap::new(),
            screen: Target::new(width, height),
            picking: Target::new(width, height),
            pass: None,
            viewport: PixelRect::canvas((width, height)),
            frames: HashMap::new(),
        }
    }

    /// Resizes both targets; their content is cleared.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.screen = Target::new(width, height);
        self.picking = Target::new(width, height);
        self.viewport = PixelRect::canvas((width, height));
    }

    /// Screen pixel at `(x, y)`, bottom-left origin.
    pub fn screen_pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.screen.pixel(x, y)
    }

    pub fn picking_pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.picking.pixel(x, y)
    }

    /// Completed frames of one pass kind.
    pub fn frames_completed(&self, pass: PassKind) -> u64 {
        self.frames.get(&pass).copied().unwrap_or(0)
    }

    /// Live `(geometries, textures, materials)`.
    pub fn live_resources(&self) -> (usize, usize, usize) {
        (self.geometries.len(), self.textures.len(), self.materials.len())
    }

    pub fn attribute_data(&self, geometry: GeometryId, name: &str) -> Option<&[f32]> {
        let attr = self.geometries.get(&geometry)?.attributes.get(name)?;
        Some(&attr.data)
    }

    pub fn texture_data(&self, texture: TextureId) -> Option<&[f32]> {
        self.textures.get(&texture).map(|t| t.data.as_slice())
    }

    pub fn uniform(&self, material: MaterialId, name: &str) -> Option<UniformData> {
        self.materials.get(&material)?.uniforms.get(name)
    }

    pub fn bound_texture(&self, material: MaterialId, name: &str) -> Option<TextureId> {
        self.materials.get(&material)?.textures.get(name).copied()
    }

    fn target_mut(&mut self) -> Result<&mut Target, BackendError> {
        match self.pass {
            Some(PassKind::Screen) => Ok(&mut self.screen),
            Some(PassKind::Picking) => Ok(&mut self.picking),
            None => Err(BackendError::NoTarget),
        }
    }
}

impl Backend for SoftBackend {
    fn canvas_size(&self) -> (u32, u32) {
        (self.screen.width, self.screen.height)
    }

    fn create_geometry(&mut self, spec: &GeometrySpec<'_>) -> Result<GeometryId, BackendError> {
        let mut attributes = BTreeMap::new();
        for a in &spec.attributes {
            if a.item_size == 0 || a.data.len() % a.item_size as usize != 0 {
                return Err(BackendError::DataLength {
                    what: a.name.to_string(),
                    expected: a.item_size as usize,
                    got: a.data.len(),
                });
            }
            attributes.insert(
                a.name.to_string(),
                SoftAttribute { item_size: a.item_size, step: a.step, data: a.data.to_vec() },
            );
        }

        let id = GeometryId(self.handles.next());
        self.geometries.insert(id, SoftGeometry { attributes, indices: spec.indices.to_vec() });
        Ok(id)
    }

    fn write_attribute(
        &mut self,
        geometry: GeometryId,
        name: &str,
        data: &[f32],
    ) -> Result<(), BackendError> {
        let geom = self
            .geometries
            .get_mut(&geometry)
            .ok_or(BackendError::UnknownGeometry(geometry))?;
        let attr = geom.attributes.get_mut(name).ok_or_else(|| BackendError::UnknownAttribute {
            geometry,
            name: name.to_string(),
        })?;
        if data.len() > attr.data.len() {
            return Err(BackendError::DataLength {
                what: name.to_string(),
                expected: attr.data.len(),
                got: data.len(),
            });
        }
        attr.data[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn destroy_geometry(&mut self, geometry: GeometryId) {
        self.geometries.remove(&geometry);
    }

    fn create_texture(&mut self, spec: &TextureSpec<'_>) -> Result<TextureId, BackendError> {
        let expected_len = spec.expected_len();
        if spec.data.len() != expected_len {
            return Err(BackendError::DataLength {
                what: spec.label.to_string(),
                expected: expected_len,
                got: spec.data.len(),
            });
        }
        let id = TextureId(self.handles.next());
        self.textures.insert(id, SoftTexture { expected_len, data: spec.data.to_vec() });
        Ok(id)
    }

    fn write_texture(&mut self, texture: TextureId, data: &[f32]) -> Result<(), BackendError> {
        let tex = self.textures.get_mut(&texture).ok_or(BackendError::UnknownTexture(texture))?;
        if data.len() != tex.expected_len {
            return Err(BackendError::DataLength {
                what: format!("{texture:?}"),
                expected: tex.expected_len,
                got: data.len(),
            });
        }
        tex.data.copy_from_slice(data);
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
    }

    fn create_material(&mut self, spec: &MaterialSpec<'_>) -> Result<MaterialId, BackendError> {
        let mut textures = BTreeMap::new();
        for &(name, tex) in &spec.textures {
            if !self.textures.contains_key(&tex) {
                return Err(BackendError::UnknownTexture(tex));
            }
            textures.insert(name.to_string(), tex);
        }
        let id = MaterialId(self.handles.next());
        self.materials.insert(id, SoftMaterial { uniforms: UniformBlock::new(&spec.uniforms), textures });
        Ok(id)
    }

    fn write_uniforms(
        &mut self,
        material: MaterialId,
        values: &[(&str, UniformData)],
    ) -> Result<(), BackendError> {
        let mat = self.materials.get_mut(&material).ok_or(BackendError::UnknownMaterial(material))?;
        for &(name, value) in values {
            mat.uniforms.set(name, value)?;
        }
        Ok(())
    }

    fn bind_texture(
        &mut self,
        material: MaterialId,
        name: &str,
        texture: TextureId,
    ) -> Result<(), BackendError> {
        if !self.textures.contains_key(&texture) {
            return Err(BackendError::UnknownTexture(texture));
        }
        let mat = self.materials.get_mut(&material).ok_or(BackendError::UnknownMaterial(material))?;
        let Some(slot) = mat.textures.get_mut(name) else {
            return Err(BackendError::Unsupported(format!(
                "texture slot `{name}` was not declared when the material was created"
            )));
        };
        *slot = texture;
        Ok(())
    }

    fn destroy_material(&mut self, material: MaterialId) {
        self.materials.remove(&material);
    }

    fn begin_frame(&mut self, pass: PassKind) -> Result<(), BackendError> {
        self.pass = Some(pass);
        self.viewport = PixelRect::canvas(self.canvas_size());
        Ok(())
    }

    fn set_viewport(&mut self, rect: PixelRect) {
        self.viewport = rect;
    }

    fn clear(&mut self, color: Color) {
        let rect = self.viewport;
        let value = match self.pass {
            Some(PassKind::Screen) => color.to_rgba8(),
            // The picking target always clears to the background id.
            Some(PassKind::Picking) => [0; 4],
            None => return,
        };
        if let Ok(target) = self.target_mut() {
            target.fill(rect, value);
        }
    }

    fn draw(&mut self, call: &DrawCall) -> Result<(), BackendError> {
        let pass = self.pass.ok_or(BackendError::NoTarget)?;
        let geom = self
            .geometries
            .get(&call.geometry)
            .ok_or(BackendError::UnknownGeometry(call.geometry))?;
        let mat = self
            .materials
            .get(&call.material)
            .ok_or(BackendError::UnknownMaterial(call.material))?;

        let position = geom.attributes.get("position").ok_or_else(|| BackendError::UnknownAttribute {
            geometry: call.geometry,
            name: "position".to_string(),
        })?;
        let offset = geom.attributes.get("offset").filter(|a| a.step == StepMode::Instance);

        let transform = mat.mat4("projectionview") * mat.mat4("model");
        let color = mat.color();
        let object_id = mat.object_id();

        let vertices: Vec<u32> = if geom.indices.is_empty() {
            (0..call.count).collect()
        } else {
            geom.indices.iter().copied().take(call.count as usize).collect()
        };

        let viewport = self.viewport;
        let instanced = call.instances.is_some();
        let instances = call.instances.unwrap_or(1);

        // Clip -> window coordinates, bottom-left origin.
        let to_window = |clip: Vec4| -> Option<Vec3> {
            if clip.w <= 0.0 {
                return None;
            }
            let ndc = clip.truncate() / clip.w;
            Some(Vec3::new(
                viewport.x as f32 + (ndc.x + 1.0) * 0.5 * viewport.width as f32,
                viewport.y as f32 + (ndc.y + 1.0) * 0.5 * viewport.height as f32,
                ndc.z,
            ))
        };

        let mut triangles = Vec::new();
        for instance in 0..instances {
            let shift = offset.map(|o| o.vec3(instance as usize)).unwrap_or(Vec3::ZERO);
            for tri in vertices.chunks_exact(3) {
                let mut window = [Vec3::ZERO; 3];
                let mut visible = true;
                for (slot, &v) in window.iter_mut().zip(tri) {
                    let p = position.vec3(v as usize) + shift;
                    match to_window(transform * p.extend(1.0)) {
                        Some(w) => *slot = w,
                        None => visible = false,
                    }
                }
                if visible {
                    let index = if instanced { instance } else { tri[0] };
                    triangles.push((window, index));
                }
            }
        }

        let target = self.target_mut()?;
        for (tri, index) in triangles {
            match pass {
                PassKind::Screen => fill_triangle(target, viewport, tri, |dst| {
                    color.over(Color::from_rgba8(dst)).to_rgba8()
                }),
                PassKind::Picking => {
                    let px = encode_pick(object_id, index);
                    fill_triangle(target, viewport, tri, |_| px)
                }
            }
        }
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        let pass = self.pass.take().ok_or(BackendError::NoTarget)?;
        *self.frames.entry(pass).or_default() += 1;
        Ok(())
    }

    fn read_pixels(&mut self, rect: PixelRect) -> Result<Vec<[u8; 4]>, BackendError> {
        Ok(self.picking.read(rect))
    }

    fn reset(&mut self) {
        self.geometries.clear();
        self.textures.clear();
        self.materials.clear();
        self.pass = None;
        let (w, h) = self.canvas_size();
        self.resize(w, h);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{decode_pick, AttributeSpec};

    /// Two triangles covering clip space.
    const QUAD: [f32; 12] = [
        -1.0, -1.0, 1.0, -1.0, 1.0, 1.0, //
        -1.0, -1.0, 1.0, 1.0, -1.0, 1.0,
    ];

    fn quad(b: &mut SoftBackend) -> GeometryId {
        b.create_geometry(&GeometrySpec {
            label: "quad",
            attributes: vec![AttributeSpec {
                name: "position",
                item_size: 2,
                step: StepMode::Vertex,
                data: &QUAD,
            }],
            indices: &[],
        })
        .unwrap()
    }

    fn material(b: &mut SoftBackend, color: [f32; 4], id: u32) -> MaterialId {
        b.create_material(&MaterialSpec {
            label: "flat",
            program: None,
            uniforms: vec![("color", UniformData::Vec4(color)), ("object_id", UniformData::UInt(id))],
            textures: vec![],
        })
        .unwrap()
    }

    // ── screen pass ───────────────────────────────────────────────────────

    #[test]
    fn full_quad_covers_the_viewport_only() {
        let mut b = SoftBackend::new(8, 8);
        let g = quad(&mut b);
        let m = material(&mut b, [1.0, 0.0, 0.0, 1.0], 1);

        b.begin_frame(PassKind::Screen).unwrap();
        b.clear(Color::BLACK);
        b.set_viewport(PixelRect::new(2, 2, 4, 4));
        b.draw(&DrawCall { geometry: g, material: m, count: 6, instances: None }).unwrap();
        b.end_frame().unwrap();

        assert_eq!(b.screen_pixel(3, 3), Some([255, 0, 0, 255]));
        assert_eq!(b.screen_pixel(1, 3), Some([0, 0, 0, 255]));
        assert_eq!(b.screen_pixel(6, 6), Some([0, 0, 0, 255]));
        assert_eq!(b.frames_completed(PassKind::Screen), 1);
    }

    #[test]
    fn clear_is_scissored() {
        let mut b = SoftBackend::new(4, 4);
        b.begin_frame(PassKind::Screen).unwrap();
        b.clear(Color::WHITE);
        b.set_viewport(PixelRect::new(0, 0, 2, 2));
        b.clear(Color::BLACK);
        b.end_frame().unwrap();
        assert_eq!(b.screen_pixel(1, 1), Some([0, 0, 0, 255]));
        assert_eq!(b.screen_pixel(2, 2), Some([255; 4]));
    }

    #[test]
    fn count_limits_drawn_vertices() {
        let mut b = SoftBackend::new(4, 4);
        let g = quad(&mut b);
        let m = material(&mut b, [1.0; 4], 1);
        b.begin_frame(PassKind::Screen).unwrap();
        b.draw(&DrawCall { geometry: g, material: m, count: 3, instances: None }).unwrap();
        b.end_frame().unwrap();
        // Only the lower-right triangle.
        assert_eq!(b.screen_pixel(3, 0), Some([255; 4]));
        assert_eq!(b.screen_pixel(0, 3), Some([0; 4]));
    }

    // ── picking pass ──────────────────────────────────────────────────────

    #[test]
    fn picking_writes_id_and_provoking_vertex() {
        let mut b = SoftBackend::new(4, 4);
        let g = quad(&mut b);
        let m = material(&mut b, [1.0; 4], 7);
        b.begin_frame(PassKind::Picking).unwrap();
        b.clear(Color::WHITE);
        b.draw(&DrawCall { geometry: g, material: m, count: 6, instances: None }).unwrap();
        b.end_frame().unwrap();

        let px = b.read_pixels(PixelRect::new(3, 0, 1, 1)).unwrap();
        let s = decode_pick(px[0]);
        assert_eq!((s.object_id, s.index), (7, 0));
        let px = b.read_pixels(PixelRect::new(0, 3, 1, 1)).unwrap();
        assert_eq!(decode_pick(px[0]).index, 3);
    }

    #[test]
    fn instanced_draw_reports_instance_index() {
        let mut b = SoftBackend::new(4, 2);
        // Left half of clip space, shifted right by one clip unit per instance.
        let left: [f32; 12] = [
            -1.0, -1.0, 0.0, -1.0, 0.0, 1.0, //
            -1.0, -1.0, 0.0, 1.0, -1.0, 1.0,
        ];
        let offsets = [0.0, 0.0, 1.0, 0.0];
        let g = b
            .create_geometry(&GeometrySpec {
                label: "bars",
                attributes: vec![
                    AttributeSpec { name: "position", item_size: 2, step: StepMode::Vertex, data: &left },
                    AttributeSpec { name: "offset", item_size: 2, step: StepMode::Instance, data: &offsets },
                ],
                indices: &[],
            })
            .unwrap();
        let m = material(&mut b, [1.0; 4], 2);
        b.begin_frame(PassKind::Picking).unwrap();
        b.draw(&DrawCall { geometry: g, material: m, count: 6, instances: Some(2) }).unwrap();
        b.end_frame().unwrap();

        let row = b.read_pixels(PixelRect::new(0, 0, 4, 1)).unwrap();
        let idx: Vec<u16> = row.iter().map(|&p| decode_pick(p).index).collect();
        assert_eq!(idx, vec![0, 0, 1, 1]);
    }

    // ── resources ─────────────────────────────────────────────────────────

    #[test]
    fn write_attribute_rejects_growth() {
        let mut b = SoftBackend::new(2, 2);
        let g = quad(&mut b);
        assert!(b.write_attribute(g, "position", &[0.0; 12]).is_ok());
        assert!(matches!(
            b.write_attribute(g, "position", &[0.0; 14]),
            Err(BackendError::DataLength { .. })
        ));
    }

    #[test]
    fn draw_outside_a_frame_fails() {
        let mut b = SoftBackend::new(2, 2);
        let g = quad(&mut b);
        let m = material(&mut b, [1.0; 4], 1);
        let err = b.draw(&DrawCall { geometry: g, material: m, count: 6, instances: None });
        assert_eq!(err, Err(BackendError::NoTarget));
    }

    #[test]
    fn reset_drops_everything() {
        let mut b = SoftBackend::new(2, 2);
        quad(&mut b);
        material(&mut b, [1.0; 4], 1);
        b.reset();
        assert_eq!(b.live_resources(), (0, 0, 0));
    }
}
