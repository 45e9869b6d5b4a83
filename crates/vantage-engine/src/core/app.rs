use std::time::Instant;

use winit::event::WindowEvent;
use winit::window::WindowId;

use crate::input::{InputEvent, InputState};

use crate::render::WgpuBackend;

use super::ctx::{FrameCtx, WindowCtx};

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract implemented by higher layers.
pub trait App {
    /// Called for raw window events, before the runtime handles them.
    fn on_window_event(&mut self, window_id: WindowId, event: &WindowEvent) -> AppControl {
        let _ = (window_id, event);
        AppControl::Continue
    }

    /// Called for every translated input event. `input` already reflects it.
    fn on_input(
        &mut self,
        window: &WindowCtx<'_>,
        event: &InputEvent,
        input: &InputState,
    ) -> AppControl {
        let _ = (window, event, input);
        AppControl::Continue
    }

    /// Called after the surface and backend were resized (physical pixels).
    fn on_resize(&mut self, window: &WindowCtx<'_>, width: u32, height: u32) {
        let _ = (window, width, height);
    }

    /// Called instead of `on_frame` when no GPU device could be created for
    /// the window. The window stays open until closed or `Exit` is returned.
    fn on_backend_unavailable(
        &mut self,
        window: &WindowCtx<'_>,
        error: &anyhow::Error,
    ) -> AppControl {
        let _ = window;
        log::error!("graphics backend unavailable: {error:#}");
        AppControl::Exit
    }

    /// Called when the window is about to close, while its backend is still
    /// alive. The window entry is destroyed right after.
    fn on_close(&mut self, window: &WindowCtx<'_>, backend: &mut WgpuBackend) {
        let _ = (window, backend);
    }

    /// Earliest instant the app needs another `on_frame`. `None` redraws
    /// continuously.
    fn next_wake(&self) -> Option<Instant> {
        None
    }

    /// Called once per redraw per window.
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl;
}
