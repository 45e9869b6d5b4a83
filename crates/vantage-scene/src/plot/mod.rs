//! Plot synchronizer.
//!
//! A [`Plot`] turns one [`PlotDescription`] into backend resources and keeps
//! them in step with the host. Host updates only touch observables and CPU
//! state; GPU work is deferred to [`Plot::prepare`], which the render loop
//! calls once per pass before drawing.

mod geometry;
mod uniforms;

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use vantage_engine::render::{
    Backend, DrawCall, MaterialId, MaterialSpec, PassKind, ProgramSource, TextureId, UniformData,
};
use vantage_proto::{
    CoordinateSpace, PickingSpaces, PlotDescription, PlotId, ShaderSource, SharedTexture,
    TextureDescriptor, TextureSource, UniformValue,
};

use crate::SceneError;
use crate::camera::Camera;
use crate::observable::{Observable, Subscription};

pub use geometry::{AttributeBuffer, AttributeUpdate, FACES, Geometry, PlotKind};
pub use uniforms::{OBJECT_ID, PICKING, camera_uniforms, texture_spec, uniform_data};
use uniforms::TextureShape;

/// A texture bound to one of the plot's sampler slots.
#[derive(Debug)]
enum BoundTexture {
    /// The session-wide atlas; never destroyed by a plot.
    Shared(TextureId),
    Owned { id: TextureId, shape: TextureShape },
}

impl BoundTexture {
    fn acquire(
        backend: &mut dyn Backend,
        plot: &PlotId,
        name: &str,
        desc: &TextureDescriptor,
        atlas: Option<TextureId>,
    ) -> Result<Self, SceneError> {
        match &desc.data {
            TextureSource::Shared(SharedTexture::Atlas) => atlas
                .map(BoundTexture::Shared)
                .ok_or_else(|| SceneError::MissingAtlas { plot: plot.clone() }),
            TextureSource::Inline(data) => {
                let label = format!("{plot}.{name}");
                let id = backend.create_texture(&texture_spec(&label, desc, data))?;
                Ok(BoundTexture::Owned { id, shape: TextureShape::from(desc) })
            }
        }
    }

    fn id(&self) -> TextureId {
        match self {
            BoundTexture::Shared(id) | BoundTexture::Owned { id, .. } => *id,
        }
    }

    fn release(self, backend: &mut dyn Backend) {
        if let BoundTexture::Owned { id, .. } = self {
            backend.destroy_texture(id);
        }
    }
}

/// Backend objects owned by a plot, besides its geometry.
#[derive(Debug)]
struct PlotGpu {
    material: MaterialId,
    textures: BTreeMap<String, BoundTexture>,
    /// Uniform variant at material creation; a variant change rebuilds.
    tags: BTreeMap<String, &'static str>,
}

impl PlotGpu {
    fn release(self, backend: &mut dyn Backend) {
        backend.destroy_material(self.material);
        for texture in self.textures.into_values() {
            texture.release(backend);
        }
    }

    fn refresh_texture(
        &mut self,
        backend: &mut dyn Backend,
        plot: &PlotId,
        name: &str,
        desc: &TextureDescriptor,
        atlas: Option<TextureId>,
    ) -> Result<(), SceneError> {
        if let (Some(BoundTexture::Owned { id, shape }), Some(data)) =
            (self.textures.get(name), desc.inline_data())
        {
            if *shape == TextureShape::from(desc) {
                backend.write_texture(*id, data)?;
                return Ok(());
            }
        }

        let fresh = BoundTexture::acquire(backend, plot, name, desc, atlas)?;
        backend.bind_texture(self.material, name, fresh.id())?;
        if let BoundTexture::Owned { .. } = fresh {
            log::debug!("plot `{plot}`: reallocated texture `{name}` at {:?}", desc.size);
        }
        if let Some(old) = self.textures.insert(name.to_string(), fresh) {
            old.release(backend);
        }
        Ok(())
    }

    /// Rebinds atlas slots after the session replaced its atlas.
    fn follow_atlas(
        &mut self,
        backend: &mut dyn Backend,
        plot: &PlotId,
        atlas: Option<TextureId>,
    ) -> Result<(), SceneError> {
        for (name, bound) in self.textures.iter_mut() {
            if let BoundTexture::Shared(id) = bound {
                let current = atlas.ok_or_else(|| SceneError::MissingAtlas { plot: plot.clone() })?;
                if *id != current {
                    backend.bind_texture(self.material, name, current)?;
                    *id = current;
                }
            }
        }
        Ok(())
    }
}

/// A drawable object bound to its scene's camera.
pub struct Plot {
    id: PlotId,
    name: String,
    coordinate_space: CoordinateSpace,
    picking_spaces: Option<PickingSpaces>,
    shader: Option<ShaderSource>,
    visible: Observable<bool>,
    shown: Rc<Cell<bool>>,
    uniforms: BTreeMap<String, Observable<UniformValue>>,
    changed: Rc<RefCell<BTreeSet<String>>>,
    camera_changed: Rc<Cell<bool>>,
    geometry: Geometry,
    gpu: Option<PlotGpu>,
    failed: bool,
    _subscriptions: Vec<Subscription>,
}

impl Plot {
    /// Builds the CPU side of a plot. Texture descriptors are validated here;
    /// backend resources are created on the first [`Plot::prepare`].
    pub fn new(desc: PlotDescription, camera: &Camera) -> Result<Self, SceneError> {
        for value in desc.uniforms.values() {
            if let UniformValue::Sampler(texture) = value {
                texture.validate()?;
            }
        }

        let geometry = Geometry::new(
            &desc.id,
            &desc.vertex_arrays,
            &desc.faces,
            desc.instance_attributes.as_ref(),
        )?;

        let mut subscriptions = Vec::new();

        let visible = Observable::new(desc.visible);
        let shown = Rc::new(Cell::new(desc.visible));
        {
            let shown = Rc::clone(&shown);
            subscriptions.push(visible.subscribe(move |v| shown.set(*v)));
        }

        let changed: Rc<RefCell<BTreeSet<String>>> = Rc::default();
        let mut uniforms = BTreeMap::new();
        for (name, value) in desc.uniforms {
            let observable = Observable::new(value);
            let changed = Rc::clone(&changed);
            let key = name.clone();
            subscriptions.push(observable.subscribe(move |_| {
                changed.borrow_mut().insert(key.clone());
            }));
            uniforms.insert(name, observable);
        }

        let camera_changed = Rc::new(Cell::new(false));
        if let CoordinateSpace::Space(_) = desc.coordinate_space {
            let camera_changed = Rc::clone(&camera_changed);
            subscriptions.push(camera.subscribe(move |_| camera_changed.set(true)));
        }

        log::debug!("plot `{}` ({}) built as {:?}", desc.id, desc.name, geometry.kind());

        Ok(Self {
            id: desc.id,
            name: desc.name,
            coordinate_space: desc.coordinate_space,
            picking_spaces: desc.picking_spaces,
            shader: desc.shader,
            visible,
            shown,
            uniforms,
            changed,
            camera_changed,
            geometry,
            gpu: None,
            failed: false,
            _subscriptions: subscriptions,
        })
    }

    pub fn id(&self) -> &PlotId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PlotKind {
        self.geometry.kind()
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn visible(&self) -> &Observable<bool> {
        &self.visible
    }

    pub fn is_visible(&self) -> bool {
        self.shown.get()
    }

    pub fn uniform(&self, name: &str) -> Option<&Observable<UniformValue>> {
        self.uniforms.get(name)
    }

    pub fn material(&self) -> Option<MaterialId> {
        self.gpu.as_ref().map(|g| g.material)
    }

    /// Backend handle bound to sampler `name`, if any.
    pub fn texture(&self, name: &str) -> Option<TextureId> {
        self.gpu.as_ref()?.textures.get(name).map(BoundTexture::id)
    }

    /// Whether the last `prepare` failed. Cleared by the next host update.
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    pub(crate) fn mark_failed(&mut self) {
        self.failed = true;
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.failed = false;
        self.visible.set(visible);
    }

    /// Applies a uniform update: fixed-size numeric values are copied
    /// component-wise, anything else replaces the value.
    pub fn update_uniform(&mut self, name: &str, value: UniformValue) -> Result<(), SceneError> {
        let observable = self.uniforms.get(name).ok_or_else(|| SceneError::UnknownUniform {
            plot: self.id.clone(),
            name: name.to_string(),
        })?;
        if let UniformValue::Sampler(texture) = &value {
            texture.validate()?;
        }
        self.failed = false;
        observable.update(move |current| {
            if !current.copy_components_from(&value) {
                *current = value;
            }
        });
        Ok(())
    }

    pub fn update_attribute(
        &mut self,
        name: &str,
        data: &[f32],
        length: usize,
    ) -> Result<AttributeUpdate, SceneError> {
        self.failed = false;
        self.geometry.update(name, data, length)
    }

    /// Brings backend resources up to date with every change since the
    /// previous call.
    pub fn prepare(
        &mut self,
        backend: &mut dyn Backend,
        camera: &Camera,
        atlas: Option<TextureId>,
    ) -> Result<(), SceneError> {
        let rebuild = match self.gpu.as_ref() {
            None => true,
            Some(gpu) => self.changed.borrow().iter().any(|name| {
                let tag = self.uniforms.get(name).map(|u| u.with(UniformValue::tag));
                tag.is_some() && gpu.tags.get(name).copied() != tag
            }),
        };

        if rebuild {
            if let Some(old) = self.gpu.take() {
                log::debug!("plot `{}`: uniform type changed, rebuilding material", self.id);
                old.release(backend);
            }
            self.changed.borrow_mut().clear();
            self.camera_changed.set(false);
            self.gpu = Some(self.create_gpu(backend, camera, atlas)?);
        } else if let Some(gpu) = self.gpu.as_mut() {
            let changed = std::mem::take(&mut *self.changed.borrow_mut());
            let camera_writes = match self.coordinate_space {
                CoordinateSpace::Space(space) => camera_uniforms(space, self.picking_spaces, camera),
                CoordinateSpace::None => Vec::new(),
            };

            // Numeric values are written before any texture is bound.
            let mut writes: Vec<(&str, UniformData)> = Vec::new();
            let mut samplers = Vec::new();
            for name in &changed {
                let Some(value) = self.uniforms.get(name).map(Observable::get) else {
                    continue;
                };
                match value {
                    UniformValue::Sampler(desc) => samplers.push((name.clone(), desc)),
                    // Camera outputs own these names.
                    _ if camera_writes.iter().any(|(n, _)| *n == name.as_str()) => {}
                    other => writes.extend(uniform_data(&other).map(|d| (name.as_str(), d))),
                }
            }
            let camera_dirty = self.camera_changed.replace(false);
            if camera_dirty {
                for &(name, data) in &camera_writes {
                    writes.push((name, data));
                }
            }
            if !writes.is_empty() {
                if let Err(err) = backend.write_uniforms(gpu.material, &writes) {
                    self.changed.borrow_mut().extend(changed.iter().cloned());
                    self.camera_changed.set(camera_dirty);
                    return Err(err.into());
                }
            }

            for (i, (name, desc)) in samplers.iter().enumerate() {
                if let Err(err) = gpu.refresh_texture(backend, &self.id, name, desc, atlas) {
                    self.changed.borrow_mut().extend(samplers[i..].iter().map(|(n, _)| n.clone()));
                    return Err(err);
                }
            }
            gpu.follow_atlas(backend, &self.id, atlas)?;
        }

        self.geometry.sync(backend)?;
        Ok(())
    }

    fn create_gpu(
        &self,
        backend: &mut dyn Backend,
        camera: &Camera,
        atlas: Option<TextureId>,
    ) -> Result<PlotGpu, SceneError> {
        let mut numeric: BTreeMap<&str, UniformData> = BTreeMap::new();
        let mut tags = BTreeMap::new();
        let mut textures = BTreeMap::new();

        for (name, observable) in &self.uniforms {
            let value = observable.get();
            tags.insert(name.clone(), value.tag());
            match &value {
                UniformValue::Sampler(desc) => {
                    match BoundTexture::acquire(backend, &self.id, name, desc, atlas) {
                        Ok(texture) => {
                            textures.insert(name.clone(), texture);
                        }
                        Err(err) => {
                            for texture in textures.into_values() {
                                texture.release(backend);
                            }
                            return Err(err);
                        }
                    }
                }
                other => {
                    if let Some(data) = uniform_data(other) {
                        numeric.insert(name.as_str(), data);
                    }
                }
            }
        }

        if let CoordinateSpace::Space(space) = self.coordinate_space {
            for (name, data) in camera_uniforms(space, self.picking_spaces, camera) {
                numeric.insert(name, data);
            }
        }
        numeric.insert(OBJECT_ID, UniformData::UInt(0));
        numeric.insert(PICKING, UniformData::Bool(false));

        let label = self.id.to_string();
        let spec = MaterialSpec {
            label: &label,
            program: self
                .shader
                .as_ref()
                .map(|s| ProgramSource { vertex: &s.vertex, fragment: &s.fragment }),
            uniforms: numeric.into_iter().collect(),
            textures: textures.iter().map(|(name, t)| (name.as_str(), t.id())).collect(),
        };

        match backend.create_material(&spec) {
            Ok(material) => Ok(PlotGpu { material, textures, tags }),
            Err(err) => {
                for texture in textures.into_values() {
                    texture.release(backend);
                }
                Err(err.into())
            }
        }
    }

    /// Draws the plot if it is visible and prepared. `object_id` is only
    /// meaningful in the picking pass.
    pub fn draw(
        &self,
        backend: &mut dyn Backend,
        pass: PassKind,
        object_id: u32,
    ) -> Result<(), SceneError> {
        if !self.is_visible() {
            return Ok(());
        }
        let (Some(gpu), Some(geometry)) = (self.gpu.as_ref(), self.geometry.handle()) else {
            return Ok(());
        };
        backend.write_uniforms(
            gpu.material,
            &[
                (OBJECT_ID, UniformData::UInt(object_id)),
                (PICKING, UniformData::Bool(pass == PassKind::Picking)),
            ],
        )?;
        backend.draw(&DrawCall {
            geometry,
            material: gpu.material,
            count: self.geometry.draw_count(),
            instances: self.geometry.instances(),
        })?;
        Ok(())
    }

    /// Releases every backend resource the plot owns.
    pub fn dispose(mut self, backend: &mut dyn Backend) {
        self.geometry.release(backend);
        if let Some(gpu) = self.gpu.take() {
            gpu.release(backend);
        }
        log::debug!("plot `{}` disposed", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage_engine::render::SoftBackend;
    use vantage_proto::{
        AttributeDescription, CameraDescription, ElementType, FilterMode, Space, TextureFormat,
        WrapMode,
    };

    fn texture(size: Vec<u32>, fill: f32) -> TextureDescriptor {
        let len = size.iter().product::<u32>() as usize;
        TextureDescriptor {
            size,
            format: TextureFormat::Red,
            element_type: ElementType::F32,
            wrap: WrapMode::Clamp,
            filter: FilterMode::Nearest,
            data: TextureSource::Inline(vec![fill; len]),
        }
    }

    fn description() -> PlotDescription {
        let mut vertex_arrays = BTreeMap::new();
        vertex_arrays.insert(
            "position".to_string(),
            AttributeDescription { data: vec![-1.0, -1.0, 3.0, -1.0, -1.0, 3.0], item_size: 2 },
        );
        let mut uniforms = BTreeMap::new();
        uniforms.insert("color".to_string(), UniformValue::Vec4([1.0, 0.0, 0.0, 1.0]));
        uniforms.insert("colormap".to_string(), UniformValue::Sampler(texture(vec![4], 0.5)));
        PlotDescription {
            id: PlotId::from("p"),
            name: "mesh".to_string(),
            visible: true,
            coordinate_space: CoordinateSpace::Space(Space::Data),
            picking_spaces: None,
            vertex_arrays,
            faces: Vec::new(),
            instance_attributes: None,
            uniforms,
            shader: None,
        }
    }

    fn prepared() -> (Plot, Camera, SoftBackend) {
        let camera = Camera::new(&CameraDescription::default());
        let mut backend = SoftBackend::new(8, 8);
        let mut plot = Plot::new(description(), &camera).unwrap();
        plot.prepare(&mut backend, &camera, None).unwrap();
        (plot, camera, backend)
    }

    // ── construction ──────────────────────────────────────────────────────

    #[test]
    fn prepare_wires_camera_and_reserved_uniforms() {
        let (plot, _, backend) = prepared();
        let material = plot.material().unwrap();
        assert!(backend.uniform(material, "projectionview").is_some());
        assert!(backend.uniform(material, "eyeposition").is_some());
        assert_eq!(backend.uniform(material, OBJECT_ID), Some(UniformData::UInt(0)));
        assert_eq!(backend.uniform(material, PICKING), Some(UniformData::Bool(false)));
        assert_eq!(backend.live_resources(), (1, 1, 1));
    }

    #[test]
    fn none_space_wires_no_camera_uniforms() {
        let camera = Camera::new(&CameraDescription::default());
        let mut backend = SoftBackend::new(8, 8);
        let mut desc = description();
        desc.coordinate_space = CoordinateSpace::None;
        let mut plot = Plot::new(desc, &camera).unwrap();
        plot.prepare(&mut backend, &camera, None).unwrap();
        assert_eq!(backend.uniform(plot.material().unwrap(), "projectionview"), None);
    }

    #[test]
    fn invalid_texture_fails_construction() {
        let camera = Camera::new(&CameraDescription::default());
        let mut desc = description();
        let mut bad = texture(vec![4], 0.0);
        bad.data = TextureSource::Inline(vec![0.0; 3]);
        desc.uniforms.insert("colormap".to_string(), UniformValue::Sampler(bad));
        assert!(matches!(Plot::new(desc, &camera), Err(SceneError::Proto(_))));
    }

    #[test]
    fn atlas_reference_without_atlas_is_an_error() {
        let camera = Camera::new(&CameraDescription::default());
        let mut backend = SoftBackend::new(8, 8);
        let mut desc = description();
        let mut shared = texture(vec![4], 0.0);
        shared.data = TextureSource::Shared(SharedTexture::Atlas);
        desc.uniforms.insert("glyphs".to_string(), UniformValue::Sampler(shared));
        let mut plot = Plot::new(desc, &camera).unwrap();
        let err = plot.prepare(&mut backend, &camera, None).unwrap_err();
        assert!(matches!(err, SceneError::MissingAtlas { .. }));
        // The inline texture created before the failure was released.
        assert_eq!(backend.live_resources().1, 0);
    }

    // ── uniform updates ───────────────────────────────────────────────────

    #[test]
    fn numeric_update_is_copied_and_flushed() {
        let (mut plot, camera, mut backend) = prepared();
        plot.update_uniform("color", UniformValue::Vec4([0.0, 1.0, 0.0, 1.0])).unwrap();
        assert_eq!(
            plot.uniform("color").unwrap().get(),
            UniformValue::Vec4([0.0, 1.0, 0.0, 1.0])
        );
        let material = plot.material().unwrap();
        plot.prepare(&mut backend, &camera, None).unwrap();
        assert_eq!(plot.material(), Some(material));
        assert_eq!(backend.uniform(material, "color"), Some(UniformData::Vec4([0.0, 1.0, 0.0, 1.0])));
    }

    #[test]
    fn variant_change_rebuilds_the_material() {
        let (mut plot, camera, mut backend) = prepared();
        let before = plot.material().unwrap();
        plot.update_uniform("color", UniformValue::Vec3([0.0, 0.0, 1.0])).unwrap();
        plot.prepare(&mut backend, &camera, None).unwrap();
        let after = plot.material().unwrap();
        assert_ne!(before, after);
        assert_eq!(backend.uniform(after, "color"), Some(UniformData::Vec3([0.0, 0.0, 1.0])));
        assert_eq!(backend.live_resources(), (1, 1, 1));
    }

    #[test]
    fn unknown_uniform_is_rejected() {
        let (mut plot, _, _) = prepared();
        let err = plot.update_uniform("shininess", UniformValue::Scalar(1.0)).unwrap_err();
        assert!(matches!(err, SceneError::UnknownUniform { .. }));
    }

    #[test]
    fn same_shape_texture_is_written_in_place() {
        let (mut plot, camera, mut backend) = prepared();
        let before = plot.texture("colormap").unwrap();
        plot.update_uniform("colormap", UniformValue::Sampler(texture(vec![4], 0.25))).unwrap();
        plot.prepare(&mut backend, &camera, None).unwrap();
        assert_eq!(plot.texture("colormap"), Some(before));
        assert_eq!(backend.texture_data(before), Some(&[0.25; 4][..]));
    }

    #[test]
    fn resized_texture_is_reallocated_and_old_one_released() {
        let (mut plot, camera, mut backend) = prepared();
        let before = plot.texture("colormap").unwrap();
        plot.update_uniform("colormap", UniformValue::Sampler(texture(vec![8], 1.0))).unwrap();
        plot.prepare(&mut backend, &camera, None).unwrap();
        let after = plot.texture("colormap").unwrap();
        assert_ne!(after, before);
        assert_eq!(backend.texture_data(before), None);
        assert_eq!(backend.bound_texture(plot.material().unwrap(), "colormap"), Some(after));
    }

    #[test]
    fn unbindable_texture_does_not_hold_back_other_uniforms() {
        let (mut plot, camera, mut backend) = prepared();
        let material = plot.material().unwrap();
        let green = UniformValue::Vec4([0.0, 1.0, 0.0, 1.0]);
        let mut shared = texture(vec![4], 0.0);
        shared.data = TextureSource::Shared(SharedTexture::Atlas);

        plot.update_uniform("color", green.clone()).unwrap();
        plot.update_uniform("colormap", UniformValue::Sampler(shared)).unwrap();
        let err = plot.prepare(&mut backend, &camera, None).unwrap_err();
        assert!(matches!(err, SceneError::MissingAtlas { .. }));
        assert_eq!(backend.uniform(material, "color"), Some(UniformData::Vec4([0.0, 1.0, 0.0, 1.0])));

        // The texture is retried once an atlas exists.
        let atlas_desc = texture(vec![4], 0.0);
        let atlas = backend
            .create_texture(&texture_spec("atlas", &atlas_desc, &[0.0; 4]))
            .unwrap();
        plot.prepare(&mut backend, &camera, Some(atlas)).unwrap();
        assert_eq!(plot.material(), Some(material));
        assert_eq!(plot.texture("colormap"), Some(atlas));
        assert_eq!(plot.uniform("color").unwrap().get(), green);
    }

    #[test]
    fn host_updates_never_override_camera_uniforms() {
        let camera = Camera::new(&CameraDescription::default());
        let mut backend = SoftBackend::new(8, 8);
        let mut desc = description();
        desc.uniforms.insert("resolution".to_string(), UniformValue::Vec2([5.0, 5.0]));
        let mut plot = Plot::new(desc, &camera).unwrap();
        plot.prepare(&mut backend, &camera, None).unwrap();
        let material = plot.material().unwrap();
        assert_eq!(backend.uniform(material, "resolution"), Some(UniformData::Vec2([1.0, 1.0])));

        plot.update_uniform("resolution", UniformValue::Vec2([9.0, 9.0])).unwrap();
        plot.prepare(&mut backend, &camera, None).unwrap();
        assert_eq!(backend.uniform(material, "resolution"), Some(UniformData::Vec2([1.0, 1.0])));
    }

    // ── camera + visibility ───────────────────────────────────────────────

    #[test]
    fn camera_change_is_flushed_on_prepare() {
        let (mut plot, camera, mut backend) = prepared();
        camera.resolution.set(glam::Vec2::new(32.0, 16.0));
        plot.prepare(&mut backend, &camera, None).unwrap();
        assert_eq!(
            backend.uniform(plot.material().unwrap(), "resolution"),
            Some(UniformData::Vec2([32.0, 16.0]))
        );
    }

    #[test]
    fn hidden_plot_draws_nothing() {
        let (mut plot, _, mut backend) = prepared();
        plot.set_visible(false);
        assert!(!plot.is_visible());
        backend.begin_frame(PassKind::Screen).unwrap();
        plot.draw(&mut backend, PassKind::Screen, 1).unwrap();
        backend.end_frame().unwrap();
        assert_eq!(backend.screen_pixel(4, 4), Some([0, 0, 0, 0]));
    }

    #[test]
    fn dispose_releases_everything() {
        let (plot, _, mut backend) = prepared();
        plot.dispose(&mut backend);
        assert_eq!(backend.live_resources(), (0, 0, 0));
    }
}
