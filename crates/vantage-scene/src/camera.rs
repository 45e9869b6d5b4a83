//! Camera subsystem.
//!
//! Four raw inputs (`view`, `projection`, `resolution`, `eyeposition`) are
//! observed; every derived matrix is recomputed together whenever any of
//! them changes, so no output is ever read next to a stale partner.
//!
//! Convention: column-major `glam::Mat4` acting on column vectors, so a
//! vertex is transformed as `clip = projection * view * p` and
//! `projectionview = projection * view`. Depth maps to `[0, 1]`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use glam::{Mat4, Vec2, Vec3};
use vantage_proto::{CameraDescription, Space};

use crate::observable::{Observable, Subscription};

/// Half-depth of pixel space; pixel geometry is never depth-clipped in practice.
const PIXEL_DEPTH: f32 = 10_000.0;

/// Every matrix a plot may bind, derived from one set of camera inputs.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraMatrices {
    pub view: Mat4,
    pub projection: Mat4,
    pub projectionview: Mat4,
    pub projectionview_inverse: Mat4,
    pub pixel_space: Mat4,
    pub pixel_space_inverse: Mat4,
    pub relative_space: Mat4,
    pub relative_inverse: Mat4,
    pub resolution: Vec2,
    pub eyeposition: Vec3,
}

impl CameraMatrices {
    pub fn derive(view: Mat4, projection: Mat4, resolution: Vec2, eyeposition: Vec3) -> Self {
        let (pixel_space, pixel_space_inverse) = pixel_space(resolution);
        let (relative_space, relative_inverse) = relative_space();
        let projectionview = projection * view;
        Self {
            view,
            projection,
            projectionview,
            projectionview_inverse: projectionview.inverse(),
            pixel_space,
            pixel_space_inverse,
            relative_space,
            relative_inverse,
            resolution,
            eyeposition,
        }
    }

    pub fn space_to_clip(&self, space: Space) -> Mat4 {
        match space {
            Space::Data => self.projectionview,
            Space::Pixel => self.pixel_space,
            Space::Relative => self.relative_space,
            Space::Clip => Mat4::IDENTITY,
        }
    }

    pub fn clip_to_space(&self, space: Space) -> Mat4 {
        match space {
            Space::Data => self.projectionview_inverse,
            Space::Pixel => self.pixel_space_inverse,
            Space::Relative => self.relative_inverse,
            Space::Clip => Mat4::IDENTITY,
        }
    }

    /// Maps geometry authored in `markerspace` into `space`'s clip
    /// coordinates.
    pub fn preprojection(&self, space: Space, markerspace: Space) -> Mat4 {
        self.space_to_clip(space) * self.clip_to_space(markerspace)
    }
}

/// Orthographic `[0, w] x [0, h] -> clip` and its closed-form inverse.
/// Degenerate resolutions are treated as one pixel.
pub fn pixel_space(resolution: Vec2) -> (Mat4, Mat4) {
    let w = if resolution.x > 0.0 { resolution.x } else { 1.0 };
    let h = if resolution.y > 0.0 { resolution.y } else { 1.0 };
    let (near, far) = (-PIXEL_DEPTH, PIXEL_DEPTH);

    let forward = Mat4::orthographic_rh(0.0, w, 0.0, h, near, far);

    // forward: x' = 2x/w - 1, y' = 2y/h - 1, z' = (z + near) / (near - far)
    let scale = Vec3::new(w / 2.0, h / 2.0, near - far);
    let shift = Vec3::new(1.0, 1.0, near / (far - near));
    let inverse = Mat4::from_scale(scale) * Mat4::from_translation(shift);
    (forward, inverse)
}

/// Unit square `[0, 1]^2 -> clip` and its inverse. Independent of the camera.
pub fn relative_space() -> (Mat4, Mat4) {
    let forward = Mat4::from_translation(Vec3::new(-1.0, -1.0, 0.0))
        * Mat4::from_scale(Vec3::new(2.0, 2.0, 1.0));
    let inverse = Mat4::from_scale(Vec3::new(0.5, 0.5, 1.0))
        * Mat4::from_translation(Vec3::new(1.0, 1.0, 0.0));
    (forward, inverse)
}

fn rerun<T: 'static>(recompute: &Rc<dyn Fn()>) -> impl Fn(&T) + 'static {
    let recompute = Rc::clone(recompute);
    move |_| recompute()
}

type PreprojectionCache = Rc<RefCell<BTreeMap<(Space, Space), Mat4>>>;

/// Observed camera state plus its derived outputs.
pub struct Camera {
    pub view: Observable<Mat4>,
    pub projection: Observable<Mat4>,
    pub resolution: Observable<Vec2>,
    pub eyeposition: Observable<Vec3>,
    outputs: Observable<CameraMatrices>,
    preprojections: PreprojectionCache,
    _inputs: Vec<Subscription>,
}

impl Camera {
    pub fn new(desc: &CameraDescription) -> Self {
        let view = Observable::new(Mat4::from_cols_array(&desc.view));
        let projection = Observable::new(Mat4::from_cols_array(&desc.projection));
        let resolution = Observable::new(Vec2::from_array(desc.resolution));
        let eyeposition = Observable::new(Vec3::from_array(desc.eyeposition));

        let outputs = Observable::new(CameraMatrices::derive(
            view.get(),
            projection.get(),
            resolution.get(),
            eyeposition.get(),
        ));
        let preprojections: PreprojectionCache = Rc::default();

        let recompute: Rc<dyn Fn()> = {
            let (view, projection) = (view.clone(), projection.clone());
            let (resolution, eyeposition) = (resolution.clone(), eyeposition.clone());
            let outputs = outputs.clone();
            let preprojections = Rc::clone(&preprojections);
            Rc::new(move || {
                let m = CameraMatrices::derive(
                    view.get(),
                    projection.get(),
                    resolution.get(),
                    eyeposition.get(),
                );
                for ((space, marker), cached) in preprojections.borrow_mut().iter_mut() {
                    *cached = m.preprojection(*space, *marker);
                }
                outputs.set(m);
            })
        };

        let inputs = vec![
            view.subscribe(rerun(&recompute)),
            projection.subscribe(rerun(&recompute)),
            resolution.subscribe(rerun(&recompute)),
            eyeposition.subscribe(rerun(&recompute)),
        ];

        Self {
            view,
            projection,
            resolution,
            eyeposition,
            outputs,
            preprojections,
            _inputs: inputs,
        }
    }

    /// Latest derived matrices.
    pub fn matrices(&self) -> CameraMatrices {
        self.outputs.get()
    }

    /// Memoized `preprojection(space, markerspace)`. Once requested, a pair is
    /// kept up to date on every camera change.
    pub fn preprojection(&self, space: Space, markerspace: Space) -> Mat4 {
        if let Some(m) = self.preprojections.borrow().get(&(space, markerspace)) {
            return *m;
        }
        let m = self.outputs.with(|o| o.preprojection(space, markerspace));
        self.preprojections.borrow_mut().insert((space, markerspace), m);
        m
    }

    /// Number of memoized preprojection pairs.
    pub fn cached_preprojections(&self) -> usize {
        self.preprojections.borrow().len()
    }

    /// Runs `f` after every recompute of the derived matrices.
    pub fn subscribe(&self, f: impl Fn(&CameraMatrices) + 'static) -> Subscription {
        self.outputs.subscribe(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec4;

    fn sample_camera() -> Camera {
        let view = Mat4::look_at_rh(Vec3::new(3.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(0.8, 4.0 / 3.0, 0.1, 100.0);
        Camera::new(&CameraDescription {
            view: view.to_cols_array(),
            projection: projection.to_cols_array(),
            resolution: [640.0, 480.0],
            eyeposition: [3.0, 2.0, 5.0],
        })
    }

    fn assert_mat_eq(a: Mat4, b: Mat4) {
        for (x, y) in a.to_cols_array().iter().zip(b.to_cols_array().iter()) {
            assert_relative_eq!(x, y, epsilon = 1e-4);
        }
    }

    // ── derived matrices ──────────────────────────────────────────────────

    #[test]
    fn projectionview_inverse_is_inverse() {
        let m = sample_camera().matrices();
        assert_mat_eq(m.projectionview * m.projectionview_inverse, Mat4::IDENTITY);
        assert_mat_eq(m.projectionview, m.projection * m.view);
    }

    #[test]
    fn pixel_space_round_trips_viewport_corners() {
        let m = sample_camera().matrices();
        for corner in [[0.0, 0.0], [640.0, 0.0], [0.0, 480.0], [640.0, 480.0]] {
            let p = Vec4::new(corner[0], corner[1], 0.0, 1.0);
            let back = m.pixel_space_inverse * (m.pixel_space * p);
            assert_relative_eq!(back.x, p.x, epsilon = 1e-3);
            assert_relative_eq!(back.y, p.y, epsilon = 1e-3);
            assert_relative_eq!(back.z, p.z, epsilon = 1e-3);
        }
    }

    #[test]
    fn pixel_space_maps_viewport_to_clip_square() {
        let (fwd, _) = pixel_space(Vec2::new(200.0, 100.0));
        let lo = fwd * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let hi = fwd * Vec4::new(200.0, 100.0, 0.0, 1.0);
        assert_relative_eq!(lo.x, -1.0);
        assert_relative_eq!(lo.y, -1.0);
        assert_relative_eq!(hi.x, 1.0);
        assert_relative_eq!(hi.y, 1.0);
        assert!(lo.z > 0.0 && lo.z < 1.0);
    }

    #[test]
    fn relative_space_maps_unit_square() {
        let (fwd, inv) = relative_space();
        let c = fwd * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(c.x, 1.0);
        assert_relative_eq!(c.y, -1.0);
        assert_mat_eq(inv * fwd, Mat4::IDENTITY);
    }

    #[test]
    fn zero_resolution_does_not_produce_infinities() {
        let (fwd, inv) = pixel_space(Vec2::ZERO);
        assert!(fwd.is_finite() && inv.is_finite());
    }

    // ── updates ───────────────────────────────────────────────────────────

    #[test]
    fn input_change_recomputes_all_outputs() {
        let cam = sample_camera();
        cam.resolution.set(Vec2::new(100.0, 50.0));
        let m = cam.matrices();
        assert_eq!(m.resolution, Vec2::new(100.0, 50.0));
        assert_mat_eq(m.pixel_space, pixel_space(Vec2::new(100.0, 50.0)).0);

        let view = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
        cam.view.set(view);
        let m = cam.matrices();
        assert_mat_eq(m.projectionview, m.projection * view);
        assert_mat_eq(m.projectionview * m.projectionview_inverse, Mat4::IDENTITY);
    }

    #[test]
    fn subscribers_see_consistent_outputs() {
        let cam = sample_camera();
        let ok = Rc::new(std::cell::Cell::new(false));
        let flag = Rc::clone(&ok);
        let _sub = cam.subscribe(move |m| {
            let product = m.projectionview * m.projectionview_inverse;
            flag.set(product.abs_diff_eq(Mat4::IDENTITY, 1e-4) && m.view == Mat4::IDENTITY);
        });
        cam.view.set(Mat4::IDENTITY);
        assert!(ok.get());
    }

    // ── preprojection ─────────────────────────────────────────────────────

    #[test]
    fn preprojection_matches_fresh_composition_after_updates() {
        let cam = sample_camera();
        let pairs = [
            (Space::Data, Space::Pixel),
            (Space::Pixel, Space::Data),
            (Space::Relative, Space::Clip),
            (Space::Data, Space::Data),
        ];
        for (s, m) in pairs {
            cam.preprojection(s, m);
        }
        assert_eq!(cam.cached_preprojections(), pairs.len());

        cam.projection.set(Mat4::orthographic_rh(-2.0, 2.0, -1.0, 1.0, 0.1, 10.0));
        cam.resolution.set(Vec2::new(320.0, 240.0));

        let fresh = cam.matrices();
        for (s, m) in pairs {
            assert_mat_eq(cam.preprojection(s, m), fresh.space_to_clip(s) * fresh.clip_to_space(m));
        }
    }

    #[test]
    fn same_space_preprojection_is_identity() {
        let cam = sample_camera();
        assert_mat_eq(cam.preprojection(Space::Pixel, Space::Pixel), Mat4::IDENTITY);
        assert_mat_eq(cam.preprojection(Space::Clip, Space::Clip), Mat4::IDENTITY);
    }
}
