//! Camera bound to a planet ellipsoid.
//!
//! Adds altitude limits, terrain collision and fly-to animations to [`Camera`]. A
//! flight holds the planet locks for its whole duration so background work (layer
//! loading, elevation requests, normal map generation) pauses while the view races
//! across the globe.

use glam::DVec3;
use orbis_core::{Key, PlanetLocks};
use orbis_math::{Ellipsoid, Extent, LonLat};
use tracing::{debug, trace};

use crate::camera::CameraView;
use crate::flight::{self, FlightFrame, FlyParams, NORTH};
use crate::{Camera, CameraEvent, CameraParams};

/// Terrain under the camera as reported by the tile system.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainHit {
    /// Terrain surface point below the eye.
    pub point: DVec3,
    /// Signed distance from `point` to the eye along the local surface normal.
    pub altitude: f64,
}

/// Source of terrain heights for collision.
pub trait TerrainSurface {
    /// Terrain below `eye`, or `None` when no terrain is loaded there.
    fn terrain_at(&self, eye: DVec3, lon_lat: &LonLat) -> Option<TerrainHit>;
}

/// Limits and flight settings of a [`PlanetCamera`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlanetCameraParams {
    pub camera: CameraParams,
    /// Lowest allowed height above terrain, in meters.
    pub min_altitude: f64,
    /// Highest allowed height above the ellipsoid, in meters.
    pub max_altitude: f64,
    /// Frames per flight.
    pub fly_frames: usize,
    /// Smallest slope vertical rotation may reach.
    pub min_slope: f64,
}

impl Default for PlanetCameraParams {
    fn default() -> Self {
        Self {
            camera: CameraParams::default(),
            min_altitude: 5.0,
            max_altitude: 20_000_000.0,
            fly_frames: 50,
            min_slope: 0.35,
        }
    }
}

struct Flight {
    frames: Vec<FlightFrame>,
    next: usize,
    locked: bool,
    on_frame: Option<Box<dyn FnMut(&FlightFrame)>>,
    on_complete: Option<Box<dyn FnOnce()>>,
}

/// Camera bound to an ellipsoid.
///
/// Tracks its geodetic position, keeps itself between the altitude limits and runs
/// precomputed flights one frame per [`PlanetCamera::check_fly`] call. A flight holds
/// the planet locks unless started with [`FlyParams::prevent_lock`].
pub struct PlanetCamera {
    camera: Camera,
    ellipsoid: Ellipsoid,
    params: PlanetCameraParams,

    lon_lat: LonLat,
    lon_lat_merc: Option<LonLat>,
    eye_norm: DVec3,
    slope: f64,

    terrain_altitude: f64,
    terrain_point: DVec3,
    terrain_collision: bool,

    key: Key,
    locks: PlanetLocks,
    flight: Option<Flight>,
}

impl PlanetCamera {
    /// Creates a camera ten thousand kilometers above lon 0, lat 0, looking at the
    /// planet center.
    pub fn new(ellipsoid: Ellipsoid, locks: PlanetLocks, params: PlanetCameraParams) -> Self {
        let mut pc = Self {
            camera: Camera::new(params.camera),
            ellipsoid,
            params,
            lon_lat: LonLat::default(),
            lon_lat_merc: None,
            eye_norm: DVec3::X,
            slope: 1.0,
            terrain_altitude: 0.0,
            terrain_point: DVec3::ZERO,
            terrain_collision: true,
            key: Key::new(),
            locks,
            flight: None,
        };
        pc.set_lon_lat(LonLat::new(0.0, 0.0, 10_000_000.0), None, None);
        pc
    }

    /// Places the eye at a geodetic position looking at `look` (planet center by default).
    pub fn set_lon_lat(&mut self, lon_lat: LonLat, look: Option<LonLat>, up: Option<DVec3>) {
        let eye = self.ellipsoid.lon_lat_to_cartesian(&lon_lat);
        let look = look.map_or(DVec3::ZERO, |l| self.ellipsoid.lon_lat_to_cartesian(&l));
        let up = up.unwrap_or(NORTH);
        self.set_checked(eye, look, up);
        self.update();
    }

    /// `Camera::set` with a fallback up vector when `up` is parallel to the view.
    fn set_checked(&mut self, eye: DVec3, look: DVec3, up: DVec3) {
        let dir = eye - look;
        let up = if up.cross(dir).length_squared() < 1e-12 {
            dir.any_orthonormal_vector()
        } else {
            up
        };
        self.camera.set(eye, look, up);
    }

    fn refresh_geodetic(&mut self) {
        let eye = self.camera.eye();
        self.lon_lat = self.ellipsoid.cartesian_to_lon_lat(eye);
        self.lon_lat_merc = self
            .lon_lat
            .is_mercator_valid()
            .then(|| self.lon_lat.forward_mercator());
        self.eye_norm = eye.normalize_or_zero();
        self.slope = self.camera.backward().dot(self.eye_norm);
    }

    /// Geodetic eye position as of the last update.
    pub fn lon_lat(&self) -> LonLat {
        self.lon_lat
    }

    /// Mercator position of the eye, `None` near the poles.
    pub fn lon_lat_merc(&self) -> Option<LonLat> {
        self.lon_lat_merc
    }

    /// Height above the ellipsoid.
    pub fn height(&self) -> f64 {
        self.lon_lat.height
    }

    /// Height above terrain as of the last collision check.
    pub fn altitude(&self) -> f64 {
        self.terrain_altitude
    }

    /// Terrain point under the eye found by the last collision check.
    pub fn terrain_point(&self) -> DVec3 {
        self.terrain_point
    }

    /// `backward · eye_normal`; 1 looking straight down, 0 at the horizon.
    pub fn slope(&self) -> f64 {
        self.slope
    }

    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    pub fn locks(&self) -> &PlanetLocks {
        &self.locks
    }

    pub fn min_altitude(&self) -> f64 {
        self.params.min_altitude
    }

    pub fn set_min_altitude(&mut self, altitude: f64) {
        self.params.min_altitude = altitude;
    }

    pub fn max_altitude(&self) -> f64 {
        self.params.max_altitude
    }

    pub fn set_max_altitude(&mut self, altitude: f64) {
        self.params.max_altitude = altitude;
    }

    /// Turns the terrain collision check on or off.
    pub fn set_terrain_collision_activity(&mut self, active: bool) {
        self.terrain_collision = active;
    }

    /// Compass heading of the view in degrees, clockwise from north.
    pub fn heading(&self) -> f64 {
        let u = self.eye_norm;
        let dir = if self.slope >= 0.97 {
            self.camera.up()
        } else {
            self.camera.forward()
        };
        let f = project_to_plane(dir, u).normalize_or_zero();
        let n = project_to_plane(NORTH, u).normalize_or_zero();
        let heading = n.dot(f).clamp(-1.0, 1.0).acos().to_degrees();
        if u.dot(n.cross(f)) > 0.0 {
            360.0 - heading
        } else {
            heading
        }
    }

    /// Turns around the planet axis. `spin` turns around the camera's own up instead.
    pub fn rotate_left(&mut self, angle: f64, spin: bool) {
        self.camera
            .rotate_horizontal(angle.to_radians(), spin, DVec3::ZERO, NORTH);
        self.update();
    }

    pub fn rotate_right(&mut self, angle: f64, spin: bool) {
        self.rotate_left(-angle, spin);
    }

    /// Tilts around the planet center by `angle` degrees.
    pub fn rotate_up(&mut self, angle: f64) {
        self.rotate_vertical(angle.to_radians(), DVec3::ZERO);
        self.update();
    }

    pub fn rotate_down(&mut self, angle: f64) {
        self.rotate_up(-angle);
    }

    /// Vertical orbit around `center` that refuses to tilt below the minimum slope.
    pub fn rotate_vertical(&mut self, angle: f64, center: DVec3) {
        let before = self.camera.state();
        self.camera.rotate_vertical(angle, center);
        let eye_norm = self.camera.eye().normalize_or_zero();
        let slope = self.camera.backward().dot(eye_norm);
        let old_slope = before.backward.dot(before.eye.normalize_or_zero());
        if slope < self.params.min_slope && slope < old_slope {
            self.camera
                .set_pose(before.eye, before.right, before.up, before.backward);
        }
    }

    /// Eye position that frames `extent` (degrees) looking straight down.
    pub fn extent_position(&self, extent: &Extent) -> DVec3 {
        let north = extent.north();
        let south = extent.south();
        let west = extent.west();
        let mut east = extent.east();
        if west > east {
            east += 360.0;
        }

        let e = &self.ellipsoid;
        let north_east = e.lon_lat_to_cartesian(&LonLat::new(east, north, 0.0));
        let south_east = e.lon_lat_to_cartesian(&LonLat::new(east, south, 0.0));
        let south_west = e.lon_lat_to_cartesian(&LonLat::new(west, south, 0.0));
        let north_west = e.lon_lat_to_cartesian(&LonLat::new(west, north, 0.0));

        let mut center = south_west + (north_east - south_west) * 0.5;
        let mag = center.length();
        if mag < 1e-6 {
            center = e.lon_lat_to_cartesian(&LonLat::new(
                (east + west) * 0.5,
                (north + south) * 0.5,
                0.0,
            ));
        }
        let mag = center.length();

        let direction = center.normalize();
        let right = direction
            .cross(NORTH)
            .try_normalize()
            .unwrap_or_else(|| direction.any_orthonormal_vector());
        let up = right.cross(direction).normalize();

        let corners = [north_west, south_east, north_east, south_west].map(|c| c - center);
        let height = corners.iter().map(|c| up.dot(*c).abs()).fold(0.0, f64::max);
        let width = corners.iter().map(|c| right.dot(*c).abs()).fold(0.0, f64::max);

        let p = self.camera.params();
        let tan_phi = (p.view_angle.to_radians() * 0.5).tan();
        let tan_theta = (p.width / p.height.max(1.0)) * tan_phi;
        let d = (width / tan_theta).max(height / tan_phi);

        direction * (mag + d)
    }

    /// Jumps to the position framing `extent`.
    pub fn view_extent(&mut self, extent: &Extent) {
        self.stop_flying();
        let eye = self.extent_position(extent);
        self.set_checked(eye, DVec3::ZERO, NORTH);
        self.update();
    }

    /// Flies to the position framing `extent`, optionally at a fixed height.
    pub fn fly_extent(&mut self, extent: &Extent, height: Option<f64>, params: FlyParams) {
        let mut target = self.extent_position(extent);
        if let Some(h) = height {
            let mut ll = self.ellipsoid.cartesian_to_lon_lat(target);
            ll.height = h;
            target = self.ellipsoid.lon_lat_to_cartesian(&ll);
        }
        self.fly_cartesian(target, params);
    }

    /// Jumps to `distance` above `cartesian` along its surface normal, looking at it.
    pub fn view_distance(&mut self, cartesian: DVec3, distance: f64) {
        self.stop_flying();
        let eye = cartesian + self.ellipsoid.surface_normal(cartesian) * distance;
        self.set_checked(eye, cartesian, NORTH);
        self.update();
    }

    /// Flies to `distance` above `cartesian` and ends looking at it.
    pub fn fly_distance(&mut self, cartesian: DVec3, distance: f64, params: FlyParams) {
        let target = cartesian + self.ellipsoid.surface_normal(cartesian) * distance;
        self.fly_cartesian(target, params.look(cartesian));
    }

    /// Flies to a geodetic position. A zero height keeps the current height.
    pub fn fly_lon_lat(&mut self, lon_lat: LonLat, params: FlyParams) {
        let height = if lon_lat.height != 0.0 {
            lon_lat.height
        } else {
            self.lon_lat.height
        };
        let target = self
            .ellipsoid
            .lon_lat_to_cartesian(&LonLat::new(lon_lat.lon, lon_lat.lat, height));
        self.fly_cartesian(target, params);
    }

    /// Starts a flight to `target`, cancelling any flight in progress.
    pub fn fly_cartesian(&mut self, target: DVec3, params: FlyParams) {
        self.stop_flying();

        let frames = flight::precompute(
            &self.ellipsoid,
            &self.camera.state(),
            target,
            params.look,
            params.up,
            params.amplitude,
            self.params.fly_frames,
        );
        debug!(frames = frames.len(), "flight started");

        let locked = !params.prevent_lock;
        if locked {
            self.locks.lock_all(&self.key);
        }
        if let Some(on_start) = params.on_start {
            on_start();
        }
        self.flight = Some(Flight {
            frames,
            next: 1,
            locked,
            on_frame: params.on_frame,
            on_complete: params.on_complete,
        });
        self.camera.emit(CameraEvent::FlyStart);
    }

    pub fn is_flying(&self) -> bool {
        self.flight.is_some()
    }

    /// Frames still to be applied.
    pub fn flight_frames_left(&self) -> usize {
        self.flight
            .as_ref()
            .map_or(0, |f| f.frames.len().saturating_sub(f.next))
    }

    /// Applies the next flight frame. Call once per render tick.
    pub fn check_fly(&mut self) {
        let Some(flight) = self.flight.as_mut() else {
            return;
        };
        let frame = flight.frames[flight.next];
        flight.next += 1;
        let done = flight.next >= flight.frames.len();

        self.camera
            .set_pose(frame.eye, frame.right, frame.up, frame.backward);
        if let Some(on_frame) = self.flight.as_mut().and_then(|f| f.on_frame.as_mut()) {
            on_frame(&frame);
        }
        self.update();

        if done {
            let on_complete = self.flight.as_mut().and_then(|f| f.on_complete.take());
            self.finish_flight(CameraEvent::FlyEnd);
            if let Some(on_complete) = on_complete {
                on_complete();
            }
        }
    }

    /// Cancels the flight in progress. Safe to call when not flying.
    pub fn stop_flying(&mut self) {
        if self.flight.is_some() {
            self.finish_flight(CameraEvent::FlyStop);
        }
    }

    fn finish_flight(&mut self, event: CameraEvent) {
        if let Some(flight) = self.flight.take() {
            if flight.locked {
                self.locks.free_all(&self.key);
            }
            debug!(?event, "flight finished");
            self.camera.emit(event);
        }
    }

    /// Keeps the eye at least `min_altitude` above the terrain under it.
    ///
    /// Returns `true` when the eye was moved.
    pub fn check_terrain_collision(&mut self, surface: &dyn TerrainSurface) -> bool {
        let eye = self.camera.eye();
        let hit = surface
            .terrain_at(eye, &self.lon_lat)
            .or_else(|| self.ellipsoid_hit(eye));
        let Some(hit) = hit else {
            self.terrain_altitude = self.lon_lat.height;
            return false;
        };

        self.terrain_point = hit.point;
        self.terrain_altitude = hit.altitude;

        if self.terrain_collision && hit.altitude < self.params.min_altitude {
            self.set_altitude(self.params.min_altitude);
            return true;
        }
        false
    }

    fn ellipsoid_hit(&self, eye: DVec3) -> Option<TerrainHit> {
        let point = self.ellipsoid.project_to_surface(eye)?;
        let normal = self.ellipsoid.surface_normal(point);
        Some(TerrainHit {
            point,
            altitude: (eye - point).dot(normal),
        })
    }

    /// Moves the eye to `altitude` above the last terrain point along its surface normal.
    fn set_altitude(&mut self, altitude: f64) {
        let normal = self
            .ellipsoid
            .geodetic_normal(&self.ellipsoid.cartesian_to_lon_lat(self.terrain_point));
        trace!(altitude, "terrain collision");
        self.camera.set_eye(self.terrain_point + normal * altitude);
        self.terrain_altitude = altitude;
        self.camera.update_view();
        self.refresh_geodetic();
    }

    /// Horizon test: false when `point` is hidden behind the planet.
    pub fn is_visible(&self, point: DVec3) -> bool {
        let r = self.ellipsoid.equatorial_radius();
        let eye = self.camera.eye();
        let eye_horizon = (eye.length_squared() - r * r).max(0.0).sqrt();
        let point_horizon = (point.length_squared() - r * r).max(0.0).sqrt();
        eye.distance(point) <= eye_horizon + point_horizon
    }

    /// Arc length along the surface to the horizon, seen from `d` meters above the eye.
    pub fn surface_visible_distance(&self, d: f64) -> f64 {
        let r = self.ellipsoid.equatorial_radius();
        r * (r / (r + self.lon_lat.height + d)).clamp(-1.0, 1.0).acos()
    }
}

impl CameraView for PlanetCamera {
    fn camera(&self) -> &Camera {
        &self.camera
    }

    fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Clamps the eye below the altitude ceiling, refreshes matrices and the geodetic
    /// position, then emits a single [`CameraEvent::ViewChange`].
    fn update(&mut self) {
        let limit = self.params.max_altitude + self.ellipsoid.equatorial_radius();
        let eye = self.camera.eye();
        if eye.length() > limit {
            self.camera.set_eye(eye.normalize() * limit);
        }
        self.camera.update_view();
        self.refresh_geodetic();
        self.camera.emit(CameraEvent::ViewChange);
    }
}

fn project_to_plane(v: DVec3, normal: DVec3) -> DVec3 {
    v - normal * v.dot(normal)
}
