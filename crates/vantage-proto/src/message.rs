use serde::{Deserialize, Serialize};

use crate::ProtoError;
use crate::describe::{PlotDescription, PlotId, SceneDescription, SceneId};
use crate::uniform::UniformValue;

/// Update to one of a scene's observed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum SceneUpdate {
    Visible(bool),
    Viewport([f32; 4]),
    BackgroundColor([f32; 4]),
    View([f32; 16]),
    Projection([f32; 16]),
    Resolution([f32; 2]),
    Eyeposition([f32; 3]),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PickMode {
    Closest,
    Sorted,
}

/// Host to client message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum HostMessage {
    /// Installs a scene tree as the canvas root, replacing any previous root.
    CreateScene { scene: SceneDescription },
    InsertPlots { scene: SceneId, plots: Vec<PlotDescription> },
    DeletePlots { scene: SceneId, plots: Vec<PlotId> },
    DeleteScenes { scenes: Vec<SceneId>, plots: Vec<PlotId> },
    UpdateUniform { plot: PlotId, name: String, value: UniformValue },
    /// `data` holds at least `length * item_size` floats.
    UpdateAttribute { plot: PlotId, name: String, data: Vec<f32>, length: usize },
    SetPlotVisible { plot: PlotId, visible: bool },
    UpdateScene { scene: SceneId, update: SceneUpdate },
    /// Pick around `[x, y]` (device pixels, bottom-left origin).
    Pick { request: u64, x: f32, y: f32, radius: u32, mode: PickMode },
}

/// One `(plot, sub-index)` pick hit.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PickHit {
    pub plot: PlotId,
    pub index: u32,
}

/// Client to host message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Device pixels, origin bottom-left.
    MousePosition { x: f32, y: f32 },
    /// DOM-style button mask after the press.
    MouseDown { buttons: u8 },
    /// DOM-style button mask after the release.
    MouseUp { buttons: u8 },
    Scroll { dx: f32, dy: f32 },
    /// DOM `code` string, e.g. `KeyA`.
    KeyDown { key: String },
    KeyUp { key: String },
    PickResult { request: u64, hits: Vec<PickHit> },
}

impl ClientEvent {
    /// Discriminant name, used to key per-kind throttles.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::MousePosition { .. } => "mouse_position",
            ClientEvent::MouseDown { .. } => "mouse_down",
            ClientEvent::MouseUp { .. } => "mouse_up",
            ClientEvent::Scroll { .. } => "scroll",
            ClientEvent::KeyDown { .. } => "key_down",
            ClientEvent::KeyUp { .. } => "key_up",
            ClientEvent::PickResult { .. } => "pick_result",
        }
    }
}

/// Decodes one JSON-encoded host message.
pub fn decode_message(src: &str) -> Result<HostMessage, ProtoError> {
    Ok(serde_json::from_str(src)?)
}

/// Encodes one client event as a single JSON line (no trailing newline).
pub fn encode_event(event: &ClientEvent) -> Result<String, ProtoError> {
    Ok(serde_json::to_string(event)?)
}
