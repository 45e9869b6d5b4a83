use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::space::{CoordinateSpace, PickingSpaces};
use crate::uniform::UniformValue;

/// Host-assigned scene identifier.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(pub String);

/// Host-assigned plot identifier, unique across all scenes.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlotId(pub String);

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SceneId {
    fn from(s: &str) -> Self {
        SceneId(s.to_string())
    }
}

impl From<&str> for PlotId {
    fn from(s: &str) -> Self {
        PlotId(s.to_string())
    }
}

/// One vertex or instance attribute: flat floats, `item_size` per element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDescription {
    pub data: Vec<f32>,
    pub item_size: u32,
}

impl AttributeDescription {
    /// Number of logical elements in `data`.
    pub fn len(&self) -> usize {
        if self.item_size == 0 { 0 } else { self.data.len() / self.item_size as usize }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Raw camera inputs; every derived matrix is computed client-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraDescription {
    /// World to eye, column-major.
    pub view: [f32; 16],
    /// Eye to clip, column-major.
    pub projection: [f32; 16],
    /// Viewport size in device pixels.
    pub resolution: [f32; 2],
    pub eyeposition: [f32; 3],
}

impl Default for CameraDescription {
    fn default() -> Self {
        const IDENTITY: [f32; 16] = [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        Self {
            view: IDENTITY,
            projection: IDENTITY,
            resolution: [1.0, 1.0],
            eyeposition: [0.0, 0.0, 1.0],
        }
    }
}

/// WGSL program for a plot. Entry points are `vs_main` and `fs_main`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderSource {
    pub vertex: String,
    pub fragment: String,
}

fn yes() -> bool {
    true
}

/// A drawable object as described by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotDescription {
    pub id: PlotId,
    #[serde(default)]
    pub name: String,
    #[serde(default = "yes")]
    pub visible: bool,
    #[serde(default)]
    pub coordinate_space: CoordinateSpace,
    #[serde(default)]
    pub picking_spaces: Option<PickingSpaces>,
    pub vertex_arrays: BTreeMap<String, AttributeDescription>,
    #[serde(default)]
    pub faces: Vec<u32>,
    #[serde(default)]
    pub instance_attributes: Option<BTreeMap<String, AttributeDescription>>,
    #[serde(default)]
    pub uniforms: BTreeMap<String, UniformValue>,
    #[serde(default)]
    pub shader: Option<ShaderSource>,
}

/// A node of the scene tree as described by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDescription {
    pub id: SceneId,
    #[serde(default = "yes")]
    pub visible: bool,
    #[serde(default = "yes")]
    pub clear_on_frame: bool,
    /// Straight-alpha RGBA.
    #[serde(default)]
    pub background_color: [f32; 4],
    /// `[x, y, w, h]` in device pixels, origin bottom-left.
    pub viewport: [f32; 4],
    #[serde(default)]
    pub camera: CameraDescription,
    #[serde(default)]
    pub plots: Vec<PlotDescription>,
    #[serde(default)]
    pub children: Vec<SceneDescription>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::Space;

    #[test]
    fn minimal_scene_gets_defaults() {
        let scene: SceneDescription =
            serde_json::from_str(r#"{"id":"root","viewport":[0,0,640,480]}"#).unwrap();
        assert!(scene.visible);
        assert!(scene.clear_on_frame);
        assert_eq!(scene.camera, CameraDescription::default());
        assert!(scene.plots.is_empty() && scene.children.is_empty());
    }

    #[test]
    fn plot_fields_use_camel_case() {
        let plot: PlotDescription = serde_json::from_str(
            r#"{
                "id": "p1",
                "name": "scatter",
                "coordinateSpace": "pixel",
                "pickingSpaces": {"space": "data", "markerspace": "pixel"},
                "vertexArrays": {"position": {"data": [0,0, 1,0, 0,1], "itemSize": 2}},
                "faces": [0, 1, 2],
                "instanceAttributes": {"offset": {"data": [0,0,0, 5,5,0], "itemSize": 3}}
            }"#,
        )
        .unwrap();
        assert_eq!(plot.coordinate_space, CoordinateSpace::Space(Space::Pixel));
        assert_eq!(plot.picking_spaces.unwrap().markerspace, Space::Pixel);
        assert_eq!(plot.vertex_arrays["position"].len(), 3);
        assert_eq!(plot.instance_attributes.unwrap()["offset"].len(), 2);
    }

    #[test]
    fn unknown_plot_space_rejects_the_whole_plot() {
        let err = serde_json::from_str::<PlotDescription>(
            r#"{"id":"p","coordinateSpace":"screen","vertexArrays":{}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown coordinate space `screen`"));
    }
}
