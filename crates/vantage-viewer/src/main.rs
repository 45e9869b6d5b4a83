//! Desktop client: shows a scene file and follows a host over stdio.
//!
//! ```text
//! vantage-viewer <scene.json> [--fps N] [--log FILTER]
//! ```
//!
//! Host messages are read from stdin, one JSON object per line. Input
//! events and pick results are written to stdout the same way.

mod host;

use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use vantage_engine::core::{App, AppControl, FrameCtx, WindowCtx};
use vantage_engine::device::GpuInit;
use vantage_engine::input::{InputEvent, InputState};
use vantage_engine::logging::{LoggingConfig, init_logging};
use vantage_engine::render::WgpuBackend;
use vantage_engine::window::{Runtime, RuntimeConfig};
use vantage_proto::{HostMessage, SceneDescription};
use vantage_scene::{
    BridgeConfig, CanvasMetrics, InputBridge, RenderLoopConfig, SceneError, Session, Tick,
};
use winit::dpi::LogicalSize;

use host::{HostLink, Inbound};

const USAGE: &str = "usage: vantage-viewer <scene.json> [--fps N] [--log FILTER]";

#[derive(Debug, Clone, PartialEq)]
struct Options {
    scene: PathBuf,
    fps: f32,
    log: Option<String>,
}

impl Options {
    fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut scene = None;
        let mut fps = RenderLoopConfig::default().target_fps;
        let mut log = None;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--fps" => {
                    let value = args.next().context("--fps needs a value")?;
                    fps = value.parse().with_context(|| format!("invalid --fps `{value}`"))?;
                }
                "--log" => log = Some(args.next().context("--log needs a filter")?),
                "-h" | "--help" => bail!("{USAGE}"),
                flag if flag.starts_with("--") => bail!("unknown option `{flag}`\n{USAGE}"),
                path => {
                    if scene.replace(PathBuf::from(path)).is_some() {
                        bail!("more than one scene file given\n{USAGE}");
                    }
                }
            }
        }

        let scene = scene.with_context(|| format!("missing scene file\n{USAGE}"))?;
        Ok(Self { scene, fps, log })
    }
}

fn load_scene(path: &Path) -> Result<SceneDescription> {
    let src = fs::read_to_string(path)
        .with_context(|| format!("failed to read scene file {}", path.display()))?;
    serde_json::from_str(&src).with_context(|| format!("{} is not a scene description", path.display()))
}

struct Viewer {
    session: Session,
    bridge: InputBridge,
    host: HostLink,
    /// The scene file, installed on the first frame.
    initial: Option<HostMessage>,
    /// Set when the viewer stops because of an error.
    failure: Rc<RefCell<Option<anyhow::Error>>>,
}

impl Viewer {
    fn fail(&mut self, err: anyhow::Error) -> AppControl {
        log::error!("{err:#}");
        *self.failure.borrow_mut() = Some(err);
        AppControl::Exit
    }

    fn deliver(&mut self, backend: &mut WgpuBackend, msg: HostMessage) -> AppControl {
        match self.session.apply(backend, msg) {
            Ok(Some(reply)) => host::emit(&reply),
            Ok(None) => {}
            Err(err) if err.is_configuration() => {
                return self.fail(anyhow::Error::new(err).context("host sent an invalid description"));
            }
            Err(err) => log::warn!("host message not applied: {err}"),
        }
        AppControl::Continue
    }

    /// Applies everything the host sent since the last frame.
    fn drain_host(&mut self, backend: &mut WgpuBackend) -> AppControl {
        if let Some(msg) = self.initial.take() {
            if self.deliver(backend, msg) == AppControl::Exit {
                return AppControl::Exit;
            }
        }
        while let Some(item) = self.host.try_next() {
            match item {
                Inbound::Message(msg) => {
                    if self.deliver(backend, msg) == AppControl::Exit {
                        return AppControl::Exit;
                    }
                }
                Inbound::Malformed(err) => return self.fail(err),
                Inbound::Closed => log::info!("host input closed; showing the last state"),
            }
        }
        AppControl::Continue
    }
}

impl App for Viewer {
    fn on_input(
        &mut self,
        window: &WindowCtx<'_>,
        event: &InputEvent,
        input: &InputState,
    ) -> AppControl {
        let (_, height) = window.physical_size();
        let canvas = CanvasMetrics { scale_factor: f64::from(window.scale_factor()), height };
        if let Some(ev) = self.bridge.handle(Instant::now(), event, input, canvas) {
            host::emit(&ev);
        }
        AppControl::Continue
    }

    fn on_resize(&mut self, _window: &WindowCtx<'_>, width: u32, height: u32) {
        log::debug!("canvas resized to {width}x{height}");
    }

    fn on_backend_unavailable(
        &mut self,
        window: &WindowCtx<'_>,
        error: &anyhow::Error,
    ) -> AppControl {
        window.set_title("vantage: graphics unavailable");
        log::error!("graphics backend unavailable, nothing will be drawn: {error:#}");
        AppControl::Continue
    }

    fn on_close(&mut self, _window: &WindowCtx<'_>, backend: &mut WgpuBackend) {
        self.session.terminate(backend);
    }

    fn next_wake(&self) -> Option<Instant> {
        match (self.session.next_deadline(), self.bridge.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        if self.drain_host(ctx.backend) == AppControl::Exit {
            return AppControl::Exit;
        }
        for ev in self.bridge.poll(ctx.now) {
            host::emit(&ev);
        }

        let now = ctx.now;
        if self.session.next_deadline().is_some_and(|due| due > now) {
            return AppControl::Continue;
        }

        let session = &mut self.session;
        let mut ticked: Result<Tick, SceneError> = Ok(Tick::Throttled);
        let control = ctx.render(|backend| ticked = session.tick(now, &true, backend));
        if let Err(err) = ticked {
            log::warn!("frame failed: {err}");
        }
        control
    }
}

fn main() -> Result<()> {
    let options = Options::parse(std::env::args().skip(1))?;
    init_logging(LoggingConfig { env_filter: options.log.clone(), ..LoggingConfig::default() });

    let scene = load_scene(&options.scene)?;
    log::info!("loaded scene `{}` from {}", scene.id, options.scene.display());

    let failure = Rc::new(RefCell::new(None));
    let viewer = Viewer {
        session: Session::new(RenderLoopConfig { target_fps: options.fps }),
        bridge: InputBridge::new(BridgeConfig::default()),
        host: HostLink::spawn(io::BufReader::new(io::stdin()))?,
        initial: Some(HostMessage::CreateScene { scene }),
        failure: Rc::clone(&failure),
    };

    let config = RuntimeConfig {
        title: format!("vantage: {}", options.scene.display()),
        initial_size: LogicalSize::new(800.0, 600.0),
    };
    Runtime::run(config, GpuInit::default(), viewer)?;

    let failure = failure.borrow_mut().take();
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
