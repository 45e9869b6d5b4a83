//! Frame-throttled render loop over the scene tree.

use std::time::Instant;

use vantage_engine::render::{Backend, PassKind, TextureId};
use vantage_engine::time::FrameThrottle;
use vantage_proto::PlotId;

use crate::registry::{Registry, Step};
use crate::SceneError;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RenderLoopConfig {
    pub target_fps: f32,
}

impl Default for RenderLoopConfig {
    fn default() -> Self {
        Self { target_fps: 30.0 }
    }
}

/// The surface a loop draws into. Once detached, the loop shuts down.
pub trait Canvas {
    fn is_attached(&self) -> bool;
}

impl Canvas for bool {
    fn is_attached(&self) -> bool {
        *self
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Tick {
    Rendered,
    /// Too early; nothing was drawn.
    Throttled,
    /// The canvas is gone and everything was released. Further ticks are
    /// no-ops.
    Terminated,
}

/// Largest id the picking target can encode.
pub const MAX_OBJECT_ID: u32 = u16::MAX as u32;

/// Object ids handed out by one traversal. Id `0` is the background; plot
/// ids start at 1. Plots past [`MAX_OBJECT_ID`] draw as background in the
/// picking pass and cannot be picked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectTable {
    plots: Vec<PlotId>,
    unpickable: usize,
}

impl ObjectTable {
    fn assign(&mut self, plot: PlotId) -> u32 {
        if self.plots.len() as u32 >= MAX_OBJECT_ID {
            if self.unpickable == 0 {
                log::warn!("more than {MAX_OBJECT_ID} plots; `{plot}` and later plots cannot be picked");
            }
            self.unpickable += 1;
            return 0;
        }
        self.plots.push(plot);
        self.plots.len() as u32
    }

    /// Plots that were drawn without an object id.
    pub fn unpickable(&self) -> usize {
        self.unpickable
    }

    pub fn plot(&self, object_id: u32) -> Option<&PlotId> {
        let index = object_id.checked_sub(1)?;
        self.plots.get(index as usize)
    }

    pub fn object_id(&self, plot: &PlotId) -> Option<u32> {
        self.plots.iter().position(|p| p == plot).map(|i| i as u32 + 1)
    }

    pub fn len(&self) -> usize {
        self.plots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plots.is_empty()
    }
}

/// Renders one pass over the tree rooted at the registry's root.
///
/// Every plot of a visible scene gets an object id in traversal order, drawn
/// or not, so the table is stable while the tree is unchanged. A plot that
/// fails to prepare or draw is logged once and skipped until its next update.
pub fn render_pass(
    registry: &mut Registry,
    backend: &mut dyn Backend,
    pass: PassKind,
    atlas: Option<TextureId>,
) -> Result<ObjectTable, SceneError> {
    let mut table = ObjectTable::default();
    backend.begin_frame(pass)?;

    for step in registry.traversal() {
        match step {
            Step::Scene(id) => {
                let Some(scene) = registry.find_scene(&id) else {
                    continue;
                };
                backend.set_viewport(scene.pixel_viewport());
                if scene.clear_on_frame() {
                    backend.clear(scene.background.get());
                }
            }
            Step::Plot(id) => {
                let object_id = table.assign(id.clone());
                let Some((plot, camera)) = registry.plot_and_camera(&id) else {
                    continue;
                };
                if !plot.is_visible() || plot.has_failed() {
                    continue;
                }
                let drawn = plot
                    .prepare(backend, camera, atlas)
                    .and_then(|()| plot.draw(backend, pass, object_id));
                if let Err(err) = drawn {
                    log::error!("plot `{id}` skipped: {err}");
                    plot.mark_failed();
                }
            }
        }
    }

    backend.end_frame()?;
    Ok(table)
}

/// Drives screen frames at a capped rate until the canvas detaches.
#[derive(Debug)]
pub struct RenderLoop {
    throttle: FrameThrottle,
    terminated: bool,
    frames: u64,
}

impl RenderLoop {
    pub fn new(config: RenderLoopConfig) -> Self {
        Self { throttle: FrameThrottle::from_fps(config.target_fps), terminated: false, frames: 0 }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Screen frames rendered so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Earliest instant the next frame may render.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.terminated { None } else { self.throttle.next_deadline() }
    }

    pub fn tick(
        &mut self,
        now: Instant,
        canvas: &dyn Canvas,
        registry: &mut Registry,
        backend: &mut dyn Backend,
        atlas: Option<TextureId>,
    ) -> Result<Tick, SceneError> {
        if self.terminated {
            return Ok(Tick::Terminated);
        }
        if !canvas.is_attached() {
            self.terminate(registry, backend);
            return Ok(Tick::Terminated);
        }
        if !self.throttle.ready(now) {
            return Ok(Tick::Throttled);
        }
        render_pass(registry, backend, PassKind::Screen, atlas)?;
        self.frames += 1;
        Ok(Tick::Rendered)
    }

    /// Disposes the tree and resets the backend. Idempotent.
    pub fn terminate(&mut self, registry: &mut Registry, backend: &mut dyn Backend) {
        if self.terminated {
            return;
        }
        log::info!("canvas detached after {} frames, stopping render loop", self.frames);
        registry.dispose_all(backend);
        backend.reset();
        self.terminated = true;
    }
}
