use anyhow::{Context, Result};
use ouroboros::self_referencing;
use std::collections::HashMap;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::core::{App as CoreApp, AppControl, FrameCtx, WindowCtx};
use crate::device::{Gpu, GpuInit};
use crate::input::platform::winit::translate_window_event;
use crate::input::InputState;
use crate::render::WgpuBackend;

/// Window/runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "vantage".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
        }
    }
}

/// Runtime context passed to the application.
///
/// Commands are buffered and applied after the current callback returns.
#[derive(Default)]
pub struct RuntimeCtx {
    commands: Vec<Command>,
}

impl RuntimeCtx {
    pub fn close_window(&mut self, id: WindowId) {
        self.commands.push(Command::CloseWindow(id));
    }

    pub fn exit(&mut self) {
        self.commands.push(Command::Exit);
    }
}

enum Command {
    CloseWindow(WindowId),
    Exit,
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    pub fn run<A>(initial: RuntimeConfig, gpu_init: GpuInit, app: A) -> Result<()>
    where
        A: 'static + CoreApp,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState::new(initial, gpu_init, app);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        Ok(())
    }
}

#[self_referencing]
struct WindowEntry {
    input_state: InputState,

    window: Window,

    #[borrows(window)]
    #[covariant]
    gpu: Gpu<'this>,
}

struct WindowSlot {
    entry: WindowEntry,
    backend: WgpuBackend,
}

struct AppState<A>
where
    A: CoreApp + 'static,
{
    initial: RuntimeConfig,
    gpu_init: GpuInit,
    app: A,

    windows: HashMap<WindowId, WindowSlot>,
    /// Windows whose GPU initialization failed; kept open to show the error.
    unavailable: HashMap<WindowId, Window>,
    exit_requested: bool,
}

impl<A> AppState<A>
where
    A: CoreApp + 'static,
{
    fn new(initial: RuntimeConfig, gpu_init: GpuInit, app: A) -> Self {
        Self {
            initial,
            gpu_init,
            app,
            windows: HashMap::new(),
            unavailable: HashMap::new(),
            exit_requested: false,
        }
    }

    fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    fn create_window_entry(
        &mut self,
        event_loop: &ActiveEventLoop,
        config: RuntimeConfig,
    ) -> Result<WindowId> {
        let attrs = Window::default_attributes()
            .with_title(config.title)
            .with_inner_size(config.initial_size);

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let id = window.id();
        let gpu_init = self.gpu_init.clone();

        let built = WindowEntryTryBuilder {
            input_state: InputState::default(),
            window,
            gpu_builder: |w| pollster::block_on(Gpu::new(w, gpu_init)),
        }
        .try_build_or_recover();

        match built {
            Ok(entry) => {
                let backend = entry.with_gpu(|gpu| {
                    let size = gpu.size();
                    WgpuBackend::new(
                        gpu.device().clone(),
                        gpu.queue().clone(),
                        gpu.surface_format(),
                        (size.width, size.height),
                    )
                });
                self.windows.insert(id, WindowSlot { entry, backend });
            }
            Err((err, heads)) => {
                let window = heads.window;
                let control = self
                    .app
                    .on_backend_unavailable(&WindowCtx { id, window: &window }, &err);
                self.unavailable.insert(id, window);
                if control == AppControl::Exit {
                    self.request_exit();
                }
            }
        }
        Ok(id)
    }

    fn destroy_window_entry(&mut self, id: WindowId) {
        self.windows.remove(&id);
        self.unavailable.remove(&id);
    }

    fn has_windows(&self) -> bool {
        !self.windows.is_empty() || !self.unavailable.is_empty()
    }

    fn apply_commands(&mut self, event_loop: &ActiveEventLoop, mut ctx: RuntimeCtx) {
        for cmd in ctx.commands.drain(..) {
            match cmd {
                Command::CloseWindow(id) => self.destroy_window_entry(id),
                Command::Exit => self.request_exit(),
            }
        }

        if !self.has_windows() {
            self.request_exit();
        }

        if self.exit_requested {
            event_loop.exit();
        }
    }

    fn resize_window(&mut self, window_id: WindowId, new_size: PhysicalSize<u32>) {
        let (app, windows) = (&mut self.app, &mut self.windows);
        let Some(slot) = windows.get_mut(&window_id) else {
            return;
        };
        slot.entry.with_gpu_mut(|gpu| gpu.resize(new_size));
        slot.backend.resize(new_size.width, new_size.height);
        slot.entry.with_window(|w| {
            app.on_resize(&WindowCtx { id: window_id, window: w }, new_size.width, new_size.height);
            w.request_redraw();
        });
    }
}

impl<A> ApplicationHandler for AppState<A>
where
    A: CoreApp + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.has_windows() {
            return;
        }

        if let Err(e) = self.create_window_entry(event_loop, self.initial.clone()) {
            log::error!("failed to create initial window: {e:#}");
            self.request_exit();
        }

        if self.exit_requested {
            event_loop.exit();
            return;
        }

        for slot in self.windows.values() {
            slot.entry.with_window(|w| w.request_redraw());
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        // Redraw continuously unless the app asked to sleep until a deadline.
        match self.app.next_wake() {
            Some(deadline) if deadline > Instant::now() => {
                event_loop.set_control_flow(ControlFlow::WaitUntil(deadline));
            }
            _ => {
                event_loop.set_control_flow(ControlFlow::Wait);
                for slot in self.windows.values() {
                    slot.entry.with_window(|w| w.request_redraw());
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        if self.unavailable.contains_key(&window_id) {
            if matches!(event, WindowEvent::CloseRequested) {
                self.destroy_window_entry(window_id);
                if !self.has_windows() {
                    self.request_exit();
                    event_loop.exit();
                }
            }
            return;
        }

        // Split borrows to avoid `self` capture inside `ouroboros` closures.
        let (app, windows) = (&mut self.app, &mut self.windows);

        let Some(slot) = windows.get_mut(&window_id) else {
            return;
        };

        // Track exit request from callbacks without mutating `self` in the closure.
        let mut exit_from_app_event = false;

        slot.entry.with_mut(|fields| {
            if let Some(ev) = translate_window_event(fields.window, fields.input_state, &event) {
                fields.input_state.apply_event(&ev);
                let window = WindowCtx { id: window_id, window: fields.window };
                if app.on_input(&window, &ev, fields.input_state) == AppControl::Exit {
                    exit_from_app_event = true;
                }
            }

            if app.on_window_event(window_id, &event) == AppControl::Exit {
                exit_from_app_event = true;
            }
        });

        if exit_from_app_event {
            self.request_exit();
            event_loop.exit();
            return;
        }

        // Runtime-managed window lifecycle / resize / redraw handling.
        match &event {
            WindowEvent::CloseRequested => {
                if let Some(slot) = self.windows.get_mut(&window_id) {
                    let (app, backend) = (&mut self.app, &mut slot.backend);
                    slot.entry.with_window(|w| {
                        app.on_close(&WindowCtx { id: window_id, window: w }, backend);
                    });
                }
                self.destroy_window_entry(window_id);
                if !self.has_windows() {
                    self.request_exit();
                    event_loop.exit();
                }
            }

            WindowEvent::Resized(new_size) => self.resize_window(window_id, *new_size),

            WindowEvent::ScaleFactorChanged { .. } => {
                let new_size = self
                    .windows
                    .get(&window_id)
                    .map(|slot| slot.entry.with_window(|w| w.inner_size()));
                if let Some(new_size) = new_size {
                    self.resize_window(window_id, new_size);
                }
            }

            WindowEvent::RedrawRequested => {
                let mut runtime_ctx = RuntimeCtx::default();
                let mut app_control = AppControl::Continue;

                if let Some(slot) = self.windows.get_mut(&window_id) {
                    let backend = &mut slot.backend;
                    slot.entry.with_mut(|fields| {
                        let mut ctx = FrameCtx {
                            window: WindowCtx {
                                id: window_id,
                                window: fields.window,
                            },
                            gpu: fields.gpu,
                            backend,
                            input: fields.input_state,
                            now: Instant::now(),
                            runtime: &mut runtime_ctx,
                        };

                        app_control = self.app.on_frame(&mut ctx);
                    });
                }

                if app_control == AppControl::Exit {
                    runtime_ctx.exit();
                }

                self.apply_commands(event_loop, runtime_ctx);
            }

            _ => {}
        }

        if self.exit_requested {
            event_loop.exit();
        }
    }
}
