//! Precomputed fly-to trajectories.
//!
//! A flight is a fixed list of poses computed up front. The ground track is a
//! normalized linear blend of the start and end ground points, the altitude follows a
//! cubic Bézier whose middle control heights grow with the angular separation of the
//! two points, and the orientation blends the start and end bases.

use glam::DVec3;
use orbis_math::{Ellipsoid, LonLat};

use crate::CameraState;

/// Default up vector for flights and geodetic placements.
pub const NORTH: DVec3 = DVec3::Z;

/// Apex ceiling for long flights, in meters.
const MAX_FLIGHT_HEIGHT: f64 = 6_639_613.0;

/// Arc boost applied to the angular separation term.
const ARC_BOOST: f64 = 2.5;

/// One precomputed pose.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlightFrame {
    pub eye: DVec3,
    pub right: DVec3,
    pub up: DVec3,
    pub backward: DVec3,
}

/// Options for `fly_*` calls.
pub struct FlyParams {
    /// Point the camera looks at on arrival.
    pub look: DVec3,
    /// Up hint on arrival.
    pub up: DVec3,
    /// Scales how high long flights arc.
    pub amplitude: f64,
    /// Skip taking the planet locks for this flight.
    pub prevent_lock: bool,
    pub(crate) on_start: Option<Box<dyn FnOnce()>>,
    pub(crate) on_frame: Option<Box<dyn FnMut(&FlightFrame)>>,
    pub(crate) on_complete: Option<Box<dyn FnOnce()>>,
}

impl FlyParams {
    pub fn new() -> Self {
        Self {
            look: DVec3::ZERO,
            up: NORTH,
            amplitude: 1.0,
            prevent_lock: false,
            on_start: None,
            on_frame: None,
            on_complete: None,
        }
    }

    /// Point the camera faces when the flight ends.
    pub fn look(mut self, look: DVec3) -> Self {
        self.look = look;
        self
    }

    pub fn up(mut self, up: DVec3) -> Self {
        self.up = up;
        self
    }

    /// Scales how far the flight arc climbs above the endpoints.
    pub fn amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Keeps the planet locks free during the flight.
    pub fn prevent_lock(mut self) -> Self {
        self.prevent_lock = true;
        self
    }

    pub fn on_start(mut self, f: impl FnOnce() + 'static) -> Self {
        self.on_start = Some(Box::new(f));
        self
    }

    pub fn on_frame(mut self, f: impl FnMut(&FlightFrame) + 'static) -> Self {
        self.on_frame = Some(Box::new(f));
        self
    }

    /// Runs once when the flight reaches its last frame. Not called on a stop.
    pub fn on_complete(mut self, f: impl FnOnce() + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }
}

impl Default for FlyParams {
    fn default() -> Self {
        Self::new()
    }
}

/// `a·t + b·(1 − t)`.
#[inline]
fn smerp(a: DVec3, b: DVec3, t: f64) -> DVec3 {
    a * t + b * (1.0 - t)
}

/// Ease-in-out weight of the start pose at step `i` of `n`; 1 at the start, 0 at the end.
#[inline]
fn start_weight(i: usize, n: usize) -> f64 {
    let d = 1.0 - i as f64 / n as f64;
    let d = d * d * (3.0 - 2.0 * d);
    d * d
}

/// Right and up axes for a backward axis `n` and an up hint.
fn basis(n: DVec3, up_hint: DVec3) -> (DVec3, DVec3) {
    let u = up_hint
        .cross(n)
        .try_normalize()
        .unwrap_or_else(|| n.any_orthonormal_vector());
    (u, n.cross(u))
}

/// Computes `frames + 1` poses from `start` to `target`.
pub(crate) fn precompute(
    ellipsoid: &Ellipsoid,
    start: &CameraState,
    target: DVec3,
    look: DVec3,
    up: DVec3,
    amplitude: f64,
    frames: usize,
) -> Vec<FlightFrame> {
    let frames = frames.max(1);

    let start_ll = ellipsoid.cartesian_to_lon_lat(start.eye);
    let ground_a = ellipsoid.lon_lat_to_cartesian(&LonLat::new(start_ll.lon, start_ll.lat, 0.0));
    let v_a = start.up;
    let n_a = start.backward;

    let end_ll = ellipsoid.cartesian_to_lon_lat(target);
    let ground_b = ellipsoid.lon_lat_to_cartesian(&LonLat::new(end_ll.lon, end_ll.lat, 0.0));
    let n_b = (target - look).try_normalize().unwrap_or(n_a);
    let (_, v_b) = basis(n_b, up);

    let an = ellipsoid.surface_normal(ground_a);
    let bn = ellipsoid.surface_normal(ground_b);
    // sqrt((1 - cos θ) / 2) == sin(θ / 2), exactly zero for coincident points.
    let angle = an.cross(bn).length().atan2(an.dot(bn));
    let separation = amplitude * (angle * 0.5).sin();

    let (h_a, h_b) = (start_ll.height, end_ll.height);
    let curr_max = h_a.max(h_b);
    let ceiling = MAX_FLIGHT_HEIGHT.max(curr_max);
    let apex = curr_max + ARC_BOOST * separation * (ceiling - curr_max);

    (0..=frames)
        .map(|i| {
            let d = start_weight(i, frames);
            let t = 1.0 - d;

            let g = smerp(ground_a, ground_b, d).try_normalize().unwrap_or(an);
            let ground = ellipsoid
                .hit_ray(DVec3::ZERO, g)
                .unwrap_or(g * ellipsoid.equatorial_radius());
            let height = h_a * d * d * d
                + apex * 3.0 * d * d * t
                + apex * 3.0 * d * t * t
                + h_b * t * t * t;
            let eye = ground + ellipsoid.surface_normal(ground) * height;

            let up_i = smerp(v_a, v_b, d);
            let n = smerp(n_a, n_b, d).try_normalize().unwrap_or(n_b);
            let (right, up) = basis(n, up_i);

            FlightFrame {
                eye,
                right,
                up,
                backward: n,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_at(ellipsoid: &Ellipsoid, ll: LonLat) -> CameraState {
        let eye = ellipsoid.lon_lat_to_cartesian(&ll);
        let backward = eye.normalize();
        let (right, up) = basis(backward, NORTH);
        CameraState {
            eye,
            right,
            up,
            backward,
        }
    }

    #[test]
    fn test_weights_ease_from_one_to_zero() {
        assert_eq!(start_weight(0, 50), 1.0);
        assert_eq!(start_weight(50, 50), 0.0);
        let mut prev = 1.0;
        for i in 1..=50 {
            let w = start_weight(i, 50);
            assert!(w <= prev);
            prev = w;
        }
    }

    #[test]
    fn test_endpoints_match_start_and_target() {
        let e = Ellipsoid::wgs84();
        let start = start_at(&e, LonLat::new(10.0, 20.0, 500_000.0));
        let target = e.lon_lat_to_cartesian(&LonLat::new(-40.0, 5.0, 2_000.0));
        let frames = precompute(&e, &start, target, DVec3::ZERO, NORTH, 1.0, 50);
        assert_eq!(frames.len(), 51);
        assert!(frames[0].eye.distance(start.eye) < 1e-2);
        assert!(frames[50].eye.distance(target) < 1e-2);
    }

    #[test]
    fn test_long_flight_arcs_above_both_ends() {
        let e = Ellipsoid::wgs84();
        let start = start_at(&e, LonLat::new(0.0, 0.0, 1_000.0));
        let target = e.lon_lat_to_cartesian(&LonLat::new(120.0, 30.0, 1_000.0));
        let frames = precompute(&e, &start, target, DVec3::ZERO, NORTH, 1.0, 50);
        let peak = frames
            .iter()
            .map(|f| e.cartesian_to_lon_lat(f.eye).height)
            .fold(f64::MIN, f64::max);
        assert!(peak > 1_000_000.0, "peak {peak}");
    }

    #[test]
    fn test_frames_have_orthonormal_bases() {
        let e = Ellipsoid::wgs84();
        let start = start_at(&e, LonLat::new(-70.0, -10.0, 30_000.0));
        let target = e.lon_lat_to_cartesian(&LonLat::new(30.0, 50.0, 800.0));
        for f in precompute(&e, &start, target, DVec3::ZERO, NORTH, 1.0, 50) {
            assert!(f.right.dot(f.up).abs() < 1e-9);
            assert!(f.right.dot(f.backward).abs() < 1e-9);
            assert!(f.up.dot(f.backward).abs() < 1e-9);
            assert!((f.up.length() - 1.0).abs() < 1e-9);
        }
    }
}
