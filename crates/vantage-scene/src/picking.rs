//! GPU picking: render identities, read them back, rank by distance.
//!
//! Every query re-renders the picking pass, so the object table used for
//! decoding always comes from the same traversal that produced the pixels.

use std::collections::BTreeMap;

use vantage_engine::coords::PixelRect;
use vantage_engine::render::{Backend, PassKind, TextureId, decode_pick};
use vantage_proto::PlotId;

use crate::registry::Registry;
use crate::render_loop::render_pass;
use crate::SceneError;

/// One decoded pixel: the plot that drew it (if any) and its sub-index.
pub type PickCell = (Option<PlotId>, u32);

/// Result of [`pick_native`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativePick {
    pub rect: PixelRect,
    /// Row-major from the bottom row, `rect.width` cells per row.
    pub cells: Vec<PickCell>,
    /// Distinct `(plot, index)` pairs in first-seen order.
    pub hits: Vec<(PlotId, u32)>,
}

impl NativePick {
    /// Cell at `(col, row)` relative to the rect's bottom-left corner.
    pub fn at(&self, col: u32, row: u32) -> Option<&PickCell> {
        if col >= self.rect.width || row >= self.rect.height {
            return None;
        }
        self.cells.get((row * self.rect.width + col) as usize)
    }
}

/// Decodes the picking target over `rect` (device pixels, bottom-left
/// origin). Pixels outside the canvas, and ids no plot owns, decode as
/// `(None, 0)`.
pub fn pick_native(
    registry: &mut Registry,
    backend: &mut dyn Backend,
    atlas: Option<TextureId>,
    rect: PixelRect,
) -> Result<NativePick, SceneError> {
    let table = render_pass(registry, backend, PassKind::Picking, atlas)?;
    let pixels = backend.read_pixels(rect)?;

    let mut cells = Vec::with_capacity(pixels.len());
    let mut hits = Vec::new();
    for px in pixels {
        let sample = decode_pick(px);
        let (object_id, index) = (u32::from(sample.object_id), u32::from(sample.index));
        let cell = match table.plot(object_id) {
            Some(plot) => {
                let hit = (plot.clone(), index);
                if !hits.contains(&hit) {
                    hits.push(hit);
                }
                (Some(plot.clone()), index)
            }
            None => (None, 0),
        };
        cells.push(cell);
    }
    Ok(NativePick { rect, cells, hits })
}

/// Window of side `2 * radius` centred on `(x, y)`, clamped to the canvas.
/// `None` when the point lies outside the canvas.
fn window(canvas: (u32, u32), x: f32, y: f32, radius: u32) -> Option<PixelRect> {
    let (w, h) = canvas;
    if !(x >= 0.0 && y >= 0.0 && x < w as f32 && y < h as f32) {
        return None;
    }
    let (cx, cy) = (x.floor() as i64, y.floor() as i64);
    let r = i64::from(radius.max(1));
    let x0 = (cx - r).max(0);
    let y0 = (cy - r).max(0);
    let x1 = (cx + r).min(i64::from(w));
    let y1 = (cy + r).min(i64::from(h));
    Some(PixelRect::new(x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
}

/// Every hit within `radius` of `(x, y)`, nearest first. Distance is the
/// minimum over all pixels a hit covers.
pub fn pick_sorted(
    registry: &mut Registry,
    backend: &mut dyn Backend,
    atlas: Option<TextureId>,
    x: f32,
    y: f32,
    radius: u32,
) -> Result<Vec<(PlotId, u32)>, SceneError> {
    let Some(rect) = window(backend.canvas_size(), x, y, radius) else {
        return Ok(Vec::new());
    };
    let native = pick_native(registry, backend, atlas, rect)?;

    let mut nearest: BTreeMap<(PlotId, u32), f32> = BTreeMap::new();
    for row in 0..rect.height {
        for col in 0..rect.width {
            let Some((Some(plot), index)) = native.at(col, row) else {
                continue;
            };
            let dx = (rect.x + col) as f32 - x.floor();
            let dy = (rect.y + row) as f32 - y.floor();
            let d2 = dx * dx + dy * dy;
            nearest
                .entry((plot.clone(), *index))
                .and_modify(|d| *d = d.min(d2))
                .or_insert(d2);
        }
    }

    let mut ranked: Vec<((PlotId, u32), f32)> = nearest.into_iter().collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    Ok(ranked.into_iter().map(|(hit, _)| hit).collect())
}

/// The single nearest hit within `radius` of `(x, y)`.
pub fn pick_closest(
    registry: &mut Registry,
    backend: &mut dyn Backend,
    atlas: Option<TextureId>,
    x: f32,
    y: f32,
    radius: u32,
) -> Result<Option<(PlotId, u32)>, SceneError> {
    Ok(pick_sorted(registry, backend, atlas, x, y, radius)?.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage_engine::render::SoftBackend;
    use vantage_proto::SceneDescription;

    /// Pixel-space plots: `left` is one quad made of two triangles over
    /// x in [0,8); `dots` is instanced, drawing 2x2 squares at (12,12) and
    /// (14,4).
    fn scene() -> SceneDescription {
        serde_json::from_str(
            r#"{
                "id": "root", "viewport": [0, 0, 16, 16],
                "camera": {
                    "view": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,0,1],
                    "projection": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,0,1],
                    "resolution": [16, 16],
                    "eyeposition": [0, 0, 1]
                },
                "plots": [
                    {
                        "id": "left",
                        "coordinateSpace": "pixel",
                        "vertexArrays": {"position": {"data": [0,0, 8,0, 8,16, 0,16], "itemSize": 2}},
                        "faces": [0, 1, 2, 2, 3, 0]
                    },
                    {
                        "id": "dots",
                        "coordinateSpace": "pixel",
                        "vertexArrays": {"position": {"data": [0,0, 2,0, 2,2, 2,2, 0,2, 0,0], "itemSize": 2}},
                        "instanceAttributes": {"offset": {"data": [12,12,0, 14,4,0], "itemSize": 3}}
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    fn setup() -> (Registry, SoftBackend) {
        let mut backend = SoftBackend::new(16, 16);
        let mut registry = Registry::new();
        registry.replace_root(scene(), &mut backend).unwrap();
        (registry, backend)
    }

    // ── native ────────────────────────────────────────────────────────────

    #[test]
    fn single_pixel_round_trip() {
        let (mut registry, mut backend) = setup();
        let native = pick_native(&mut registry, &mut backend, None, PixelRect::new(12, 12, 1, 1)).unwrap();
        assert_eq!(native.cells, vec![(Some(PlotId::from("dots")), 0)]);
        assert_eq!(native.hits, vec![(PlotId::from("dots"), 0)]);

        let native = pick_native(&mut registry, &mut backend, None, PixelRect::new(14, 4, 1, 1)).unwrap();
        assert_eq!(native.cells, vec![(Some(PlotId::from("dots")), 1)]);
    }

    #[test]
    fn sub_index_above_one_byte_round_trips() {
        // 257 instances, all off-canvas except the last at (4,4).
        let mut offsets = vec![-50.0f32; 257 * 3];
        offsets[256 * 3..].copy_from_slice(&[4.0, 4.0, 0.0]);
        let desc: SceneDescription = serde_json::from_value(serde_json::json!({
            "id": "root", "viewport": [0, 0, 16, 16],
            "camera": {
                "view": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,0,1],
                "projection": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,0,1],
                "resolution": [16, 16],
                "eyeposition": [0, 0, 1]
            },
            "plots": [{
                "id": "many",
                "coordinateSpace": "pixel",
                "vertexArrays": {"position": {"data": [0,0, 2,0, 2,2, 2,2, 0,2, 0,0], "itemSize": 2}},
                "instanceAttributes": {"offset": {"data": offsets, "itemSize": 3}}
            }]
        }))
        .unwrap();
        let mut backend = SoftBackend::new(16, 16);
        let mut registry = Registry::new();
        registry.replace_root(desc, &mut backend).unwrap();

        let native = pick_native(&mut registry, &mut backend, None, PixelRect::new(4, 4, 1, 1)).unwrap();
        assert_eq!(native.cells, vec![(Some(PlotId::from("many")), 256)]);
    }

    #[test]
    fn empty_region_decodes_to_background() {
        let (mut registry, mut backend) = setup();
        let native = pick_native(&mut registry, &mut backend, None, PixelRect::new(10, 8, 1, 1)).unwrap();
        assert_eq!(native.cells, vec![(None, 0)]);
        assert!(native.hits.is_empty());
    }

    #[test]
    fn triangle_index_is_its_first_vertex() {
        let (mut registry, mut backend) = setup();
        let native = pick_native(&mut registry, &mut backend, None, PixelRect::new(0, 0, 8, 16)).unwrap();
        // Lower-right triangle starts at vertex 0, upper-left at vertex 2.
        assert_eq!(native.at(7, 0), Some(&(Some(PlotId::from("left")), 0)));
        assert_eq!(native.at(0, 15), Some(&(Some(PlotId::from("left")), 2)));
        assert_eq!(native.hits.len(), 2);
    }

    #[test]
    fn hidden_plot_keeps_its_id_but_draws_nothing() {
        let (mut registry, mut backend) = setup();
        registry.find_plot_mut(&PlotId::from("left")).unwrap().set_visible(false);
        let native = pick_native(&mut registry, &mut backend, None, PixelRect::new(2, 2, 1, 1)).unwrap();
        assert_eq!(native.cells, vec![(None, 0)]);
        let native = pick_native(&mut registry, &mut backend, None, PixelRect::new(12, 12, 1, 1)).unwrap();
        assert_eq!(native.cells, vec![(Some(PlotId::from("dots")), 0)]);
    }

    // ── ranked ────────────────────────────────────────────────────────────

    #[test]
    fn sorted_orders_by_minimum_distance() {
        let (mut registry, mut backend) = setup();
        let hits = pick_sorted(&mut registry, &mut backend, None, 11.0, 11.0, 4).unwrap();
        assert_eq!(hits.first(), Some(&(PlotId::from("dots"), 0)));
        assert!(hits.contains(&(PlotId::from("left"), 0)));
        let dots = hits.iter().position(|h| h.0 == PlotId::from("dots")).unwrap();
        let left = hits.iter().position(|h| h.0 == PlotId::from("left")).unwrap();
        assert!(dots < left);
    }

    #[test]
    fn closest_prefers_the_pixel_under_the_cursor() {
        let (mut registry, mut backend) = setup();
        let hit = pick_closest(&mut registry, &mut backend, None, 7.0, 3.0, 3).unwrap();
        assert_eq!(hit.map(|h| h.0), Some(PlotId::from("left")));
    }

    #[test]
    fn nothing_in_range_is_empty() {
        let (mut registry, mut backend) = setup();
        assert_eq!(pick_closest(&mut registry, &mut backend, None, 10.0, 8.0, 1).unwrap(), None);
    }

    #[test]
    fn out_of_bounds_points_return_nothing() {
        let (mut registry, mut backend) = setup();
        for (x, y) in [(-1.0, 4.0), (4.0, 16.0), (16.0, 0.0)] {
            assert!(pick_sorted(&mut registry, &mut backend, None, x, y, 2).unwrap().is_empty());
        }
    }

    #[test]
    fn window_is_clamped_to_the_canvas() {
        assert_eq!(window((16, 16), 1.0, 1.0, 3), Some(PixelRect::new(0, 0, 4, 4)));
        assert_eq!(window((16, 16), 8.5, 8.5, 2), Some(PixelRect::new(6, 6, 4, 4)));
        assert_eq!(window((16, 16), 16.0, 1.0, 2), None);
    }
}
