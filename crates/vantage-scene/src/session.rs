//! Host message routing for one canvas.

use std::time::Instant;

use vantage_engine::coords::PixelRect;
use vantage_engine::render::{Backend, PassKind, TextureId};
use vantage_proto::{
    ClientEvent, HostMessage, PickHit, PickMode, PlotId, ProtoError, TextureDescriptor,
};

use crate::picking::{self, NativePick};
use crate::registry::Registry;
use crate::render_loop::{render_pass, Canvas, ObjectTable, RenderLoop, RenderLoopConfig, Tick};
use crate::plot::texture_spec;
use crate::SceneError;

/// Everything the client keeps for one canvas: the scene registry, the
/// render loop and the shared atlas.
pub struct Session {
    registry: Registry,
    render_loop: RenderLoop,
    atlas: Option<TextureId>,
}

impl Session {
    pub fn new(config: RenderLoopConfig) -> Self {
        Self { registry: Registry::new(), render_loop: RenderLoop::new(config), atlas: None }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn atlas(&self) -> Option<TextureId> {
        self.atlas
    }

    /// Registers the shared atlas, replacing and releasing any previous one.
    /// Plots sampling `"atlas"` are rebound on their next prepare.
    pub fn set_atlas(
        &mut self,
        backend: &mut dyn Backend,
        desc: &TextureDescriptor,
    ) -> Result<TextureId, SceneError> {
        desc.validate()?;
        let data = desc.inline_data().ok_or_else(|| {
            ProtoError::InvalidTexture("the shared atlas needs inline data".to_string())
        })?;
        let id = backend.create_texture(&texture_spec("atlas", desc, data))?;
        if let Some(old) = self.atlas.replace(id) {
            backend.destroy_texture(old);
        }
        log::debug!("shared atlas registered at {:?}", desc.size);
        Ok(id)
    }

    /// Applies one host message. `pick` requests are answered with a
    /// [`ClientEvent::PickResult`].
    pub fn apply(
        &mut self,
        backend: &mut dyn Backend,
        msg: HostMessage,
    ) -> Result<Option<ClientEvent>, SceneError> {
        let result = self.route(backend, msg);
        if let Err(err) = &result {
            if err.is_configuration() {
                log::error!("host message rejected: {err}");
            }
        }
        result
    }

    fn route(
        &mut self,
        backend: &mut dyn Backend,
        msg: HostMessage,
    ) -> Result<Option<ClientEvent>, SceneError> {
        match msg {
            HostMessage::CreateScene { scene } => {
                self.registry.replace_root(scene, backend)?;
            }
            HostMessage::InsertPlots { scene, plots } => {
                self.registry.insert_plots(&scene, plots)?;
            }
            HostMessage::DeletePlots { scene, plots } => {
                self.registry.delete_plots(backend, &scene, &plots);
            }
            HostMessage::DeleteScenes { scenes, plots } => {
                self.registry.delete_scenes(backend, &scenes, &plots);
            }
            HostMessage::UpdateUniform { plot, name, value } => {
                self.plot_mut(&plot)?.update_uniform(&name, value)?;
            }
            HostMessage::UpdateAttribute { plot, name, data, length } => {
                self.plot_mut(&plot)?.update_attribute(&name, &data, length)?;
            }
            HostMessage::SetPlotVisible { plot, visible } => {
                self.plot_mut(&plot)?.set_visible(visible);
            }
            HostMessage::UpdateScene { scene, update } => {
                self.registry
                    .find_scene(&scene)
                    .ok_or(SceneError::UnknownScene(scene))?
                    .apply(update);
            }
            HostMessage::Pick { request, x, y, radius, mode } => {
                let has_root = self.registry.root().is_some();
                let hits = match (has_root, mode) {
                    (false, _) => Vec::new(),
                    (true, PickMode::Closest) => {
                        self.pick_closest(backend, x, y, radius)?.into_iter().collect()
                    }
                    (true, PickMode::Sorted) => self.pick_sorted(backend, x, y, radius)?,
                };
                let hits = hits.into_iter().map(|(plot, index)| PickHit { plot, index }).collect();
                return Ok(Some(ClientEvent::PickResult { request, hits }));
            }
        }
        Ok(None)
    }

    fn plot_mut(&mut self, id: &PlotId) -> Result<&mut crate::Plot, SceneError> {
        self.registry.find_plot_mut(id).ok_or_else(|| SceneError::UnknownPlot(id.clone()))
    }

    fn require_root(&self) -> Result<(), SceneError> {
        self.registry.root().map(|_| ()).ok_or(SceneError::NoRootScene)
    }

    /// One render-loop iteration; see [`RenderLoop::tick`].
    pub fn tick(
        &mut self,
        now: Instant,
        canvas: &dyn Canvas,
        backend: &mut dyn Backend,
    ) -> Result<Tick, SceneError> {
        let tick = self.render_loop.tick(now, canvas, &mut self.registry, backend, self.atlas)?;
        if tick == Tick::Terminated {
            self.atlas = None;
        }
        Ok(tick)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.render_loop.next_deadline()
    }

    pub fn is_terminated(&self) -> bool {
        self.render_loop.is_terminated()
    }

    /// Renders one screen frame immediately, ignoring the frame throttle.
    pub fn render_frame(&mut self, backend: &mut dyn Backend) -> Result<ObjectTable, SceneError> {
        render_pass(&mut self.registry, backend, PassKind::Screen, self.atlas)
    }

    /// Disposes the tree and resets the backend, as on canvas detach.
    pub fn terminate(&mut self, backend: &mut dyn Backend) {
        self.render_loop.terminate(&mut self.registry, backend);
        self.atlas = None;
    }

    pub fn pick_native(
        &mut self,
        backend: &mut dyn Backend,
        rect: PixelRect,
    ) -> Result<NativePick, SceneError> {
        self.require_root()?;
        picking::pick_native(&mut self.registry, backend, self.atlas, rect)
    }

    pub fn pick_closest(
        &mut self,
        backend: &mut dyn Backend,
        x: f32,
        y: f32,
        radius: u32,
    ) -> Result<Option<(PlotId, u32)>, SceneError> {
        self.require_root()?;
        picking::pick_closest(&mut self.registry, backend, self.atlas, x, y, radius)
    }

    pub fn pick_sorted(
        &mut self,
        backend: &mut dyn Backend,
        x: f32,
        y: f32,
        radius: u32,
    ) -> Result<Vec<(PlotId, u32)>, SceneError> {
        self.require_root()?;
        picking::pick_sorted(&mut self.registry, backend, self.atlas, x, y, radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage_engine::render::{SoftBackend, UniformData};
    use vantage_proto::{decode_message, SceneId, UniformValue};

    const CREATE: &str = r#"{
        "msg": "create_scene",
        "scene": {
            "id": "root", "viewport": [0, 0, 16, 16], "backgroundColor": [0, 0, 0, 1],
            "camera": {
                "view": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,0,1],
                "projection": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,0,1],
                "resolution": [16, 16],
                "eyeposition": [0, 0, 1]
            },
            "plots": [{
                "id": "marker",
                "coordinateSpace": "pixel",
                "vertexArrays": {"position": {"data": [8,8, 12,8, 12,12, 12,12, 8,12, 8,8], "itemSize": 2}},
                "uniforms": {"color": {"type": "Vec4", "value": [1, 1, 1, 1]}}
            }],
            "children": [{"id": "inset", "viewport": [0, 0, 4, 4], "clearOnFrame": false}]
        }
    }"#;

    fn started() -> (Session, SoftBackend) {
        let mut backend = SoftBackend::new(16, 16);
        let mut session = Session::new(RenderLoopConfig::default());
        let msg = decode_message(CREATE).unwrap();
        assert_eq!(session.apply(&mut backend, msg).unwrap(), None);
        (session, backend)
    }

    fn send(session: &mut Session, backend: &mut SoftBackend, src: &str) -> Option<ClientEvent> {
        session.apply(backend, decode_message(src).unwrap()).unwrap()
    }

    // ── routing ───────────────────────────────────────────────────────────

    #[test]
    fn pick_request_is_answered() {
        let (mut session, mut backend) = started();
        let reply = send(
            &mut session,
            &mut backend,
            r#"{"msg":"pick","request":7,"x":11,"y":9,"radius":2,"mode":"closest"}"#,
        );
        assert_eq!(
            reply,
            Some(ClientEvent::PickResult {
                request: 7,
                hits: vec![PickHit { plot: PlotId::from("marker"), index: 0 }],
            })
        );
    }

    #[test]
    fn pick_before_any_scene_is_empty() {
        let mut backend = SoftBackend::new(4, 4);
        let mut session = Session::new(RenderLoopConfig::default());
        let reply = send(
            &mut session,
            &mut backend,
            r#"{"msg":"pick","request":1,"x":1,"y":1,"radius":1,"mode":"sorted"}"#,
        );
        assert_eq!(reply, Some(ClientEvent::PickResult { request: 1, hits: vec![] }));
        assert!(matches!(session.pick_closest(&mut backend, 1.0, 1.0, 1), Err(SceneError::NoRootScene)));
    }

    #[test]
    fn uniform_update_reaches_the_backend_on_next_frame() {
        let (mut session, mut backend) = started();
        session.render_frame(&mut backend).unwrap();
        send(
            &mut session,
            &mut backend,
            r#"{"msg":"update_uniform","plot":"marker","name":"color","value":{"type":"Vec4","value":[1,0,0,1]}}"#,
        );
        session.render_frame(&mut backend).unwrap();
        let plot = session.registry().find_plot(&PlotId::from("marker")).unwrap();
        assert_eq!(
            backend.uniform(plot.material().unwrap(), "color"),
            Some(UniformData::Vec4([1.0, 0.0, 0.0, 1.0]))
        );
        assert_eq!(backend.screen_pixel(10, 10), Some([255, 0, 0, 255]));
    }

    #[test]
    fn attribute_growth_applies_after_all_co_attributes() {
        let (mut session, mut backend) = started();
        send(
            &mut session,
            &mut backend,
            r#"{"msg":"update_attribute","plot":"marker","name":"position","data":[0,0, 4,0, 4,4, 4,4, 0,4, 0,0, 0,0, 0,0, 0,0],"length":9}"#,
        );
        session.render_frame(&mut backend).unwrap();
        let plot = session.registry().find_plot(&PlotId::from("marker")).unwrap();
        // Single attribute: it is its own co-attribute set, so growth applies.
        assert_eq!(plot.geometry().attribute("position").unwrap().capacity(), 9);
        assert_eq!(plot.geometry().rebuilds(), 1);
        assert_eq!(backend.screen_pixel(2, 2), Some([255, 255, 255, 255]));
    }

    #[test]
    fn scene_update_moves_the_viewport() {
        let (mut session, mut backend) = started();
        send(
            &mut session,
            &mut backend,
            r#"{"msg":"update_scene","scene":"inset","update":{"field":"viewport","value":[2,2,4,4]}}"#,
        );
        let inset = session.registry().find_scene(&SceneId::from("inset")).unwrap();
        assert_eq!(inset.pixel_viewport(), PixelRect::new(2, 2, 4, 4));
    }

    #[test]
    fn updates_to_unknown_targets_are_errors() {
        let (mut session, mut backend) = started();
        let msg = HostMessage::SetPlotVisible { plot: PlotId::from("ghost"), visible: true };
        assert!(matches!(session.apply(&mut backend, msg), Err(SceneError::UnknownPlot(_))));
        let msg = HostMessage::UpdateUniform {
            plot: PlotId::from("marker"),
            name: "color".into(),
            value: UniformValue::Sampler(TextureDescriptor {
                size: vec![0],
                format: vantage_proto::TextureFormat::Red,
                element_type: vantage_proto::ElementType::U8,
                wrap: Default::default(),
                filter: Default::default(),
                data: vantage_proto::TextureSource::Inline(vec![]),
            }),
        };
        let err = session.apply(&mut backend, msg).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn delete_scenes_message_is_idempotent() {
        let (mut session, mut backend) = started();
        let src = r#"{"msg":"delete_scenes","scenes":["inset"],"plots":["marker"]}"#;
        send(&mut session, &mut backend, src);
        send(&mut session, &mut backend, src);
        assert!(session.registry().find_scene(&SceneId::from("inset")).is_none());
        assert!(session.registry().find_plot(&PlotId::from("marker")).is_none());
    }

    // ── atlas + lifecycle ─────────────────────────────────────────────────

    #[test]
    fn atlas_is_shared_and_never_released_by_plots() {
        let (mut session, mut backend) = started();
        let atlas_desc: TextureDescriptor = serde_json::from_str(
            r#"{"size":[2,2],"format":"red","elementType":"u8","data":[0,1,1,0]}"#,
        )
        .unwrap();
        let atlas = session.set_atlas(&mut backend, &atlas_desc).unwrap();
        send(
            &mut session,
            &mut backend,
            r#"{"msg":"insert_plots","scene":"root","plots":[{
                "id":"text","coordinateSpace":"pixel",
                "vertexArrays":{"position":{"data":[0,0, 1,0, 0,1],"itemSize":2}},
                "uniforms":{"glyphs":{"type":"Sampler","size":[2,2],"format":"red","elementType":"u8","data":"atlas"}}
            }]}"#,
        );
        session.render_frame(&mut backend).unwrap();
        let text = session.registry().find_plot(&PlotId::from("text")).unwrap();
        assert_eq!(backend.bound_texture(text.material().unwrap(), "glyphs"), Some(atlas));

        send(&mut session, &mut backend, r#"{"msg":"delete_plots","scene":"root","plots":["text"]}"#);
        assert!(backend.texture_data(atlas).is_some());

        let replacement = session.set_atlas(&mut backend, &atlas_desc).unwrap();
        assert!(backend.texture_data(atlas).is_none());
        assert_eq!(session.atlas(), Some(replacement));
    }

    #[test]
    fn detach_releases_everything_including_the_atlas() {
        let (mut session, mut backend) = started();
        session.render_frame(&mut backend).unwrap();
        let now = Instant::now();
        assert_eq!(session.tick(now, &false, &mut backend).unwrap(), Tick::Terminated);
        assert_eq!(session.atlas(), None);
        assert_eq!(backend.live_resources(), (0, 0, 0));
        assert!(session.is_terminated());
    }
}
