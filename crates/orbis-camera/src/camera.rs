//! Perspective camera with an explicit orthonormal basis.
//!
//! The basis is stored as `right`, `up` and `backward` (the view direction is
//! `-backward`). Every mutator re-orthonormalizes it, and [`Camera::update`] derives
//! the view, projection-view, inverse and normal matrices plus the frustum.

use glam::{DMat3, DMat4, DVec2, DVec3, DVec4};
use orbis_core::EventChannel;
use tracing::trace;

use crate::Frustum;

/// Notifications emitted by cameras.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CameraEvent {
    /// Matrices were recomputed.
    ViewChange,
    /// The pose stopped changing after a period of movement.
    MoveEnd,
    /// A flight started.
    FlyStart,
    /// A flight reached its last frame.
    FlyEnd,
    /// A flight was cancelled before its last frame.
    FlyStop,
}

/// Pose snapshot passed to event listeners and used for move-end detection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraState {
    pub eye: DVec3,
    pub right: DVec3,
    pub up: DVec3,
    pub backward: DVec3,
}

/// Projection and viewport settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraParams {
    /// Vertical field of view in degrees.
    pub view_angle: f64,
    pub near: f64,
    pub far: f64,
    /// Viewport size in pixels.
    pub width: f64,
    pub height: f64,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            view_angle: 47.0,
            near: 1.0,
            far: 1.0e8,
            width: 1280.0,
            height: 720.0,
        }
    }
}

/// Smallest viewport side used when converting angles to pixels.
const MIN_PROJ_SIDE: f64 = 512.0;

const INVERSE_EPSILON: f64 = 1e-300;

/// Free camera: an orthonormal pose, a perspective projection and the matrices and
/// frustum derived from them.
///
/// Pose setters leave the view matrices stale until [`Camera::update`].
pub struct Camera {
    eye: DVec3,
    right: DVec3,
    up: DVec3,
    backward: DVec3,

    params: CameraParams,

    projection: DMat4,
    view: DMat4,
    projection_view: DMat4,
    inverse_projection_view: Option<DMat4>,
    normal_matrix: DMat3,
    frustum: Frustum,
    proj_size_const: f64,

    prev: CameraState,
    is_moved: bool,
    events: EventChannel<CameraEvent, CameraState>,
}

impl Camera {
    /// Creates a camera at the origin looking down `-Z` with `+Y` up.
    pub fn new(params: CameraParams) -> Self {
        let mut camera = Self {
            eye: DVec3::ZERO,
            right: DVec3::X,
            up: DVec3::Y,
            backward: DVec3::Z,
            params,
            projection: DMat4::IDENTITY,
            view: DMat4::IDENTITY,
            projection_view: DMat4::IDENTITY,
            inverse_projection_view: None,
            normal_matrix: DMat3::IDENTITY,
            frustum: Frustum::from_projection_view(&DMat4::IDENTITY),
            proj_size_const: 0.0,
            prev: CameraState {
                eye: DVec3::ZERO,
                right: DVec3::X,
                up: DVec3::Y,
                backward: DVec3::Z,
            },
            is_moved: false,
            events: EventChannel::new(),
        };
        camera.refresh_projection();
        camera.update_view();
        camera.prev = camera.state();
        camera
    }

    /// Places the eye and aims it at `look`.
    ///
    /// `up` only needs to be non-parallel to the view direction; the stored up vector
    /// is rebuilt from the other two axes.
    pub fn set(&mut self, eye: DVec3, look: DVec3, up: DVec3) {
        self.eye = eye;
        self.backward = eye - look;
        self.right = up.cross(self.backward);
        self.backward = self.backward.normalize();
        self.right = self.right.normalize();
        self.up = self.backward.cross(self.right);
    }

    /// Re-aims from the current eye.
    pub fn look(&mut self, look: DVec3, up: DVec3) {
        self.set(self.eye, look, up);
    }

    /// Overwrites eye and basis directly, re-orthonormalizing the basis.
    pub fn set_pose(&mut self, eye: DVec3, right: DVec3, up: DVec3, backward: DVec3) {
        self.eye = eye;
        self.right = right;
        self.up = up;
        self.backward = backward;
        self.orthonormalize();
    }

    pub(crate) fn set_eye(&mut self, eye: DVec3) {
        self.eye = eye;
    }

    fn orthonormalize(&mut self) {
        self.backward = self.backward.normalize();
        self.right = self.up.cross(self.backward).normalize();
        self.up = self.backward.cross(self.right);
    }

    /// Moves the eye along the camera's own axes.
    pub fn slide(&mut self, du: f64, dv: f64, dn: f64) {
        self.eye += self.right * du + self.up * dv + self.backward * dn;
    }

    /// Rotation about the view axis, in degrees.
    pub fn roll(&mut self, angle: f64) {
        let rot = DMat3::from_axis_angle(self.backward, angle.to_radians());
        self.right = rot * self.right;
        self.up = rot * self.up;
        self.orthonormalize();
    }

    /// Rotation about the right axis, in degrees.
    pub fn pitch(&mut self, angle: f64) {
        let rot = DMat3::from_axis_angle(self.right, angle.to_radians());
        self.up = rot * self.up;
        self.backward = rot * self.backward;
        self.orthonormalize();
    }

    /// Rotation about the up axis, in degrees.
    pub fn yaw(&mut self, angle: f64) {
        let rot = DMat3::from_axis_angle(self.up, angle.to_radians());
        self.right = rot * self.right;
        self.backward = rot * self.backward;
        self.orthonormalize();
    }

    /// Orbits the eye and basis around `center` by `angle` radians.
    ///
    /// With `is_arc` the axis is the camera's current up vector, otherwise `up`.
    pub fn rotate_around(&mut self, angle: f64, is_arc: bool, center: DVec3, up: DVec3) {
        let axis = if is_arc { self.up } else { up.normalize() };
        let m = DMat4::from_translation(center)
            * DMat4::from_axis_angle(axis, angle)
            * DMat4::from_translation(-center);
        self.eye = m.transform_point3(self.eye);
        self.right = m.transform_vector3(self.right).normalize();
        self.up = m.transform_vector3(self.up).normalize();
        self.backward = m.transform_vector3(self.backward).normalize();
        self.orthonormalize();
    }

    /// Orbits around `center` about `up`, or about the camera up when `is_arc` is false.
    pub fn rotate_horizontal(&mut self, angle: f64, is_arc: bool, center: DVec3, up: DVec3) {
        self.rotate_around(angle, is_arc, center, up);
    }

    /// Orbits around `center` about the camera's right axis.
    pub fn rotate_vertical(&mut self, angle: f64, center: DVec3) {
        let m = DMat4::from_translation(center)
            * DMat4::from_axis_angle(self.right, angle)
            * DMat4::from_translation(-center);
        self.eye = m.transform_point3(self.eye);
        self.up = m.transform_vector3(self.up).normalize();
        self.backward = m.transform_vector3(self.backward).normalize();
        self.orthonormalize();
    }

    /// Viewport size in pixels.
    pub fn set_viewport(&mut self, width: f64, height: f64) {
        self.params.width = width;
        self.params.height = height;
        self.refresh_projection();
    }

    /// Vertical field of view in degrees.
    pub fn set_view_angle(&mut self, angle: f64) {
        self.params.view_angle = angle;
        self.refresh_projection();
    }

    pub fn set_near_far(&mut self, near: f64, far: f64) {
        self.params.near = near;
        self.params.far = far;
        self.refresh_projection();
    }

    fn refresh_projection(&mut self) {
        let p = &self.params;
        let aspect = if p.height > 0.0 { p.width / p.height } else { 1.0 };
        self.projection =
            DMat4::perspective_rh_gl(p.view_angle.to_radians(), aspect, p.near, p.far);
        self.proj_size_const = p.width.max(MIN_PROJ_SIDE).min(p.height.max(MIN_PROJ_SIDE))
            / p.view_angle.to_radians();
    }

    /// Recomputes view-dependent matrices and the frustum without notifying listeners.
    pub fn update_view(&mut self) {
        let (r, u, b, e) = (self.right, self.up, self.backward, self.eye);
        self.view = DMat4::from_cols(
            DVec4::new(r.x, u.x, b.x, 0.0),
            DVec4::new(r.y, u.y, b.y, 0.0),
            DVec4::new(r.z, u.z, b.z, 0.0),
            DVec4::new(-e.dot(r), -e.dot(u), -e.dot(b), 1.0),
        );
        self.projection_view = self.projection * self.view;
        self.frustum.set_frustum(&self.projection_view);
        self.inverse_projection_view = invert(&self.projection_view);
        self.normal_matrix = DMat3::from_mat4(self.view);
    }

    /// Recomputes matrices and the frustum, then emits [`CameraEvent::ViewChange`].
    pub fn update(&mut self) {
        self.update_view();
        self.emit(CameraEvent::ViewChange);
    }

    pub(crate) fn emit(&mut self, event: CameraEvent) {
        let state = self.state();
        self.events.dispatch(event, &state);
    }

    /// Emits [`CameraEvent::MoveEnd`] once when the pose stops changing.
    ///
    /// Skipped entirely while nobody listens for it.
    pub fn check_move_end(&mut self) {
        if !self.events.has_listeners(CameraEvent::MoveEnd) {
            return;
        }
        let current = self.state();
        if current == self.prev {
            if self.is_moved {
                trace!("camera move end");
                self.emit(CameraEvent::MoveEnd);
            }
            self.is_moved = false;
        } else {
            self.is_moved = true;
        }
        self.prev = current;
    }

    /// Screen position in pixels (origin top-left), or `None` behind the eye.
    pub fn project(&self, p: DVec3) -> Option<DVec2> {
        let clip = self.projection_view * p.extend(1.0);
        if clip.w <= 0.0 {
            return None;
        }
        Some(DVec2::new(
            (1.0 + clip.x / clip.w) * self.params.width * 0.5,
            (1.0 - clip.y / clip.w) * self.params.height * 0.5,
        ))
    }

    /// Unit world-space direction of the ray through screen pixel `(x, y)`.
    ///
    /// `None` when the projection-view matrix is singular.
    pub fn unproject(&self, x: f64, y: f64) -> Option<DVec3> {
        let inverse = self.inverse_projection_view.as_ref()?;
        let w = self.params.width * 0.5;
        let h = self.params.height * 0.5;
        let px = (x - w) / w;
        let py = -(y - h) / h;

        let near = *inverse * DVec4::new(px, py, -1.0, 1.0);
        let mid = *inverse * DVec4::new(px, py, 0.0, 1.0);
        let near = near.truncate() / near.w;
        let mid = mid.truncate() / mid.w;
        (mid - near).try_normalize()
    }

    /// On-screen size in pixels of a sphere of radius `r` at `p`.
    pub fn projected_size(&self, p: DVec3, r: f64) -> f64 {
        (r / self.eye.distance(p)).atan() * self.proj_size_const
    }

    pub fn state(&self) -> CameraState {
        CameraState {
            eye: self.eye,
            right: self.right,
            up: self.up,
            backward: self.backward,
        }
    }

    pub fn eye(&self) -> DVec3 {
        self.eye
    }

    pub fn right(&self) -> DVec3 {
        self.right
    }

    pub fn up(&self) -> DVec3 {
        self.up
    }

    pub fn backward(&self) -> DVec3 {
        self.backward
    }

    /// View direction.
    pub fn forward(&self) -> DVec3 {
        -self.backward
    }

    pub fn params(&self) -> &CameraParams {
        &self.params
    }

    pub fn projection(&self) -> &DMat4 {
        &self.projection
    }

    pub fn view(&self) -> &DMat4 {
        &self.view
    }

    pub fn projection_view(&self) -> &DMat4 {
        &self.projection_view
    }

    /// `None` while the projection-view matrix is singular.
    pub fn inverse_projection_view(&self) -> Option<&DMat4> {
        self.inverse_projection_view.as_ref()
    }

    pub fn normal_matrix(&self) -> &DMat3 {
        &self.normal_matrix
    }

    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    pub fn events(&self) -> &EventChannel<CameraEvent, CameraState> {
        &self.events
    }

    /// Subscribe here for [`CameraEvent`]s.
    pub fn events_mut(&mut self) -> &mut EventChannel<CameraEvent, CameraState> {
        &mut self.events
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(CameraParams::default())
    }
}

fn invert(m: &DMat4) -> Option<DMat4> {
    let det = m.determinant();
    if !det.is_finite() || det.abs() < INVERSE_EPSILON {
        return None;
    }
    Some(m.inverse())
}

/// Shared `update()` entry point for all camera kinds.
///
/// The default recomputes the base camera; specializations override it and call
/// back into [`Camera`] as needed.
pub trait CameraView {
    fn camera(&self) -> &Camera;

    fn camera_mut(&mut self) -> &mut Camera;

    fn update(&mut self) {
        self.camera_mut().update();
    }
}

impl CameraView for Camera {
    fn camera(&self) -> &Camera {
        self
    }

    fn camera_mut(&mut self) -> &mut Camera {
        self
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn assert_orthonormal(c: &Camera) {
        let (r, u, b) = (c.right(), c.up(), c.backward());
        assert!(r.dot(u).abs() < 1e-6, "right·up = {}", r.dot(u));
        assert!(r.dot(b).abs() < 1e-6, "right·backward = {}", r.dot(b));
        assert!(u.dot(b).abs() < 1e-6, "up·backward = {}", u.dot(b));
        for v in [r, u, b] {
            assert!((v.length() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_set_produces_orthonormal_basis() {
        let mut cam = Camera::default();
        let cases = [
            (DVec3::new(0.0, 0.0, 10.0), DVec3::ZERO, DVec3::Y),
            (DVec3::new(5.0, -3.0, 2.0), DVec3::new(1.0, 1.0, 1.0), DVec3::new(0.3, 0.9, 0.2)),
            (DVec3::new(7.0e6, 1.0, 0.0), DVec3::ZERO, DVec3::new(0.2, 0.0, 3.0)),
            (DVec3::new(-1.0, 2.0, 3.0), DVec3::new(4.0, -5.0, 6.0), DVec3::new(10.0, 0.0, 0.0)),
        ];
        for (eye, look, up) in cases {
            cam.set(eye, look, up);
            assert_orthonormal(&cam);
            assert!(cam.forward().dot((look - eye).normalize()) > 1.0 - 1e-9);
        }
    }

    #[test]
    fn test_transforms_keep_basis_orthonormal() {
        let mut cam = Camera::default();
        cam.set(DVec3::new(0.0, 0.0, 10.0), DVec3::ZERO, DVec3::Y);
        for i in 0..200 {
            let a = i as f64 * 0.37;
            cam.roll(a);
            cam.pitch(-a * 0.5);
            cam.yaw(a * 1.3);
            cam.rotate_around(0.01 * a, i % 2 == 0, DVec3::new(1.0, 2.0, 3.0), DVec3::Z);
            cam.slide(0.1, -0.2, 0.3);
        }
        assert_orthonormal(&cam);
    }

    #[test]
    fn test_view_matrix_maps_eye_to_origin() {
        let mut cam = Camera::default();
        cam.set(DVec3::new(3.0, 4.0, 5.0), DVec3::ZERO, DVec3::Y);
        cam.update();
        let p = cam.view().transform_point3(cam.eye());
        assert!(p.length() < 1e-9);
        let ahead = cam.view().transform_point3(cam.eye() + cam.forward() * 2.0);
        assert!((ahead - DVec3::new(0.0, 0.0, -2.0)).length() < 1e-9);
    }

    #[test]
    fn test_project_unproject_round_trip() {
        let mut cam = Camera::new(CameraParams {
            width: 800.0,
            height: 600.0,
            ..CameraParams::default()
        });
        cam.set(DVec3::new(0.0, -20.0, 8.0), DVec3::new(1.0, 2.0, 0.0), DVec3::Z);
        cam.update();
        for &(x, y) in &[(400.0, 300.0), (10.0, 15.0), (790.0, 580.0), (123.0, 456.0)] {
            let dir = cam.unproject(x, y).unwrap();
            for depth in [5.0, 100.0, 10_000.0] {
                let s = cam.project(cam.eye() + dir * depth).unwrap();
                assert!((s.x - x).abs() < 1.0 && (s.y - y).abs() < 1.0, "{s:?} vs ({x}, {y})");
            }
        }
    }

    #[test]
    fn test_screen_center_unprojects_to_forward() {
        let mut cam = Camera::default();
        cam.set(DVec3::new(2.0, 2.0, 2.0), DVec3::ZERO, DVec3::Z);
        cam.update();
        let dir = cam.unproject(640.0, 360.0).unwrap();
        assert!(dir.dot(cam.forward()) > 1.0 - 1e-9);
    }

    #[test]
    fn test_singular_matrix_has_no_inverse() {
        let zero = DMat4::ZERO;
        assert!(invert(&zero).is_none());
        assert!(invert(&DMat4::IDENTITY).is_some());
    }

    #[test]
    fn test_projected_size_decreases_with_distance() {
        let mut cam = Camera::default();
        cam.set(DVec3::ZERO, DVec3::NEG_Z, DVec3::Y);
        let near = cam.projected_size(DVec3::new(0.0, 0.0, -10.0), 1.0);
        let far = cam.projected_size(DVec3::new(0.0, 0.0, -100.0), 1.0);
        assert!(near > far && far > 0.0);
    }

    #[test]
    fn test_update_emits_view_change() {
        let count = Rc::new(RefCell::new(0));
        let mut cam = Camera::default();
        let c = Rc::clone(&count);
        cam.events_mut().on(CameraEvent::ViewChange, move |_| *c.borrow_mut() += 1);
        cam.update();
        CameraView::update(&mut cam);
        assert_eq!(*count.borrow(), 2);
    }

    #[test]
    fn test_move_end_fires_once_after_motion() {
        let ends = Rc::new(RefCell::new(0));
        let mut cam = Camera::default();
        let e = Rc::clone(&ends);
        cam.events_mut().on(CameraEvent::MoveEnd, move |_| *e.borrow_mut() += 1);

        cam.check_move_end();
        assert_eq!(*ends.borrow(), 0);

        cam.slide(1.0, 0.0, 0.0);
        cam.check_move_end();
        cam.slide(1.0, 0.0, 0.0);
        cam.check_move_end();
        assert_eq!(*ends.borrow(), 0);

        cam.check_move_end();
        cam.check_move_end();
        assert_eq!(*ends.borrow(), 1);
    }
}
