//! Input bridge: window input to throttled host events.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use vantage_engine::input::{
    InputEvent, InputState, KeyState, MouseButtonState, MouseWheelDelta, PointerButtonEvent,
    PointerMoveEvent,
};
use vantage_engine::time::EventThrottle;
use vantage_proto::ClientEvent;

/// Logical pixels per wheel line.
const LINE_HEIGHT: f32 = 16.0;

/// Throttle window per event kind. Zero sends every event.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub mouse_interval: Duration,
    pub scroll_interval: Duration,
    pub key_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mouse_interval: Duration::from_millis(1000) / 30,
            scroll_interval: Duration::from_millis(1000) / 30,
            key_interval: Duration::ZERO,
        }
    }
}

/// Canvas geometry needed to express positions in device pixels,
/// bottom-left origin.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CanvasMetrics {
    pub scale_factor: f64,
    /// Device pixels.
    pub height: u32,
}

/// Translates one input event. Returns `None` for events the host does not
/// observe (focus, modifiers, pointer leaving).
pub fn translate(event: &InputEvent, state: &InputState, canvas: CanvasMetrics) -> Option<ClientEvent> {
    let scale = canvas.scale_factor as f32;
    let to_device = |x: f32, y: f32| (x * scale, canvas.height as f32 - y * scale);

    match event {
        InputEvent::PointerMoved(PointerMoveEvent { x, y }) => {
            let (x, y) = to_device(*x, *y);
            Some(ClientEvent::MousePosition { x, y })
        }
        InputEvent::PointerButton(PointerButtonEvent { state: pressed, .. }) => {
            let buttons = state.buttons_mask();
            Some(match pressed {
                MouseButtonState::Pressed => ClientEvent::MouseDown { buttons },
                MouseButtonState::Released => ClientEvent::MouseUp { buttons },
            })
        }
        InputEvent::MouseWheel { delta, .. } => {
            let (dx, dy) = match *delta {
                MouseWheelDelta::Line { x, y } => (x * LINE_HEIGHT, y * LINE_HEIGHT),
                MouseWheelDelta::Pixel { x, y } => (x, y),
            };
            // winit reports positive y for scrolling up; DOM deltas are positive down.
            Some(ClientEvent::Scroll { dx: -dx * scale, dy: -dy * scale })
        }
        InputEvent::Key { key, state: KeyState::Pressed, .. } => {
            Some(ClientEvent::KeyDown { key: key.dom_code().to_string() })
        }
        InputEvent::Key { key, state: KeyState::Released, .. } => {
            Some(ClientEvent::KeyUp { key: key.dom_code().to_string() })
        }
        InputEvent::ModifiersChanged(_) | InputEvent::PointerLeft | InputEvent::Focused(_) => None,
    }
}

/// Pending event of one throttle lane, stamped with its push order.
#[derive(Debug)]
struct Lane {
    throttle: EventThrottle<ClientEvent>,
    seq: u64,
}

/// Per-kind throttled stream of [`ClientEvent`]s.
///
/// Button presses and releases share one lane, as do key presses and
/// releases, so the host never sees a release overtake its press. Pending
/// events of different lanes are released in the order they were pushed.
#[derive(Debug)]
pub struct InputBridge {
    config: BridgeConfig,
    lanes: HashMap<&'static str, Lane>,
    pushed: u64,
}

impl InputBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config, lanes: HashMap::new(), pushed: 0 }
    }

    fn lane(kind: &'static str) -> &'static str {
        match kind {
            "mouse_down" | "mouse_up" => "mouse_button",
            "key_down" | "key_up" => "key",
            other => other,
        }
    }

    fn interval(&self, lane: &str) -> Duration {
        match lane {
            "mouse_position" | "mouse_button" => self.config.mouse_interval,
            "scroll" => self.config.scroll_interval,
            "key" => self.config.key_interval,
            _ => Duration::ZERO,
        }
    }

    /// Offers an event; returns it if it may be sent now. Otherwise it
    /// replaces the pending event of its lane.
    pub fn push(&mut self, now: Instant, event: ClientEvent) -> Option<ClientEvent> {
        let lane = Self::lane(event.kind());
        let delay = self.interval(lane);
        self.pushed += 1;
        let seq = self.pushed;
        let lane = self
            .lanes
            .entry(lane)
            .or_insert_with(|| Lane { throttle: EventThrottle::new(delay), seq });
        lane.seq = seq;
        lane.throttle.push(now, event)
    }

    /// Translates and offers one input event.
    pub fn handle(
        &mut self,
        now: Instant,
        event: &InputEvent,
        state: &InputState,
        canvas: CanvasMetrics,
    ) -> Option<ClientEvent> {
        let event = translate(event, state, canvas)?;
        self.push(now, event)
    }

    /// Pending events whose window has elapsed, oldest push first.
    pub fn poll(&mut self, now: Instant) -> Vec<ClientEvent> {
        let mut due: Vec<(u64, ClientEvent)> = self
            .lanes
            .values_mut()
            .filter_map(|lane| lane.throttle.poll(now).map(|ev| (lane.seq, ev)))
            .collect();
        due.sort_by_key(|(seq, _)| *seq);
        due.into_iter().map(|(_, ev)| ev).collect()
    }

    /// Earliest instant a pending event becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.lanes.values().filter_map(|lane| lane.throttle.next_deadline()).min()
    }
}
