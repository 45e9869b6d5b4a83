//! Scene nodes: a viewport with its own camera, plots and child scenes.

use glam::{Mat4, Vec2, Vec3};
use vantage_engine::coords::{PixelRect, Rect};
use vantage_engine::paint::Color;
use vantage_proto::{PlotId, SceneDescription, SceneId, SceneUpdate};

use crate::camera::Camera;
use crate::observable::Observable;

/// One node of the scene tree. Plots and children are referenced by id and
/// owned by the [`Registry`](crate::Registry).
pub struct Scene {
    id: SceneId,
    parent: Option<SceneId>,
    pub visible: Observable<bool>,
    pub background: Observable<Color>,
    /// Device pixels, origin bottom-left.
    pub viewport: Observable<Rect>,
    clear_on_frame: bool,
    camera: Camera,
    pub(crate) plots: Vec<PlotId>,
    pub(crate) children: Vec<SceneId>,
}

impl Scene {
    /// Builds the node itself; plots and children are attached by the registry.
    pub fn new(desc: &SceneDescription, parent: Option<SceneId>) -> Self {
        Self {
            id: desc.id.clone(),
            parent,
            visible: Observable::new(desc.visible),
            background: Observable::new(Color::from_array(desc.background_color)),
            viewport: Observable::new(Rect::from_xywh(desc.viewport)),
            clear_on_frame: desc.clear_on_frame,
            camera: Camera::new(&desc.camera),
            plots: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> &SceneId {
        &self.id
    }

    pub fn parent(&self) -> Option<&SceneId> {
        self.parent.as_ref()
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn clear_on_frame(&self) -> bool {
        self.clear_on_frame
    }

    /// Plots in insertion order.
    pub fn plots(&self) -> &[PlotId] {
        &self.plots
    }

    /// Child scenes in registration order.
    pub fn children(&self) -> &[SceneId] {
        &self.children
    }

    pub fn is_visible(&self) -> bool {
        self.visible.get()
    }

    /// Viewport snapped to whole device pixels.
    pub fn pixel_viewport(&self) -> PixelRect {
        self.viewport.get().to_pixels()
    }

    /// Sets the observable named by `update`.
    pub fn apply(&self, update: SceneUpdate) {
        match update {
            SceneUpdate::Visible(v) => self.visible.set(v),
            SceneUpdate::Viewport(v) => self.viewport.set(Rect::from_xywh(v)),
            SceneUpdate::BackgroundColor(c) => self.background.set(Color::from_array(c)),
            SceneUpdate::View(m) => self.camera.view.set(Mat4::from_cols_array(&m)),
            SceneUpdate::Projection(m) => self.camera.projection.set(Mat4::from_cols_array(&m)),
            SceneUpdate::Resolution(r) => self.camera.resolution.set(Vec2::from_array(r)),
            SceneUpdate::Eyeposition(e) => self.camera.eyeposition.set(Vec3::from_array(e)),
        }
    }
}
