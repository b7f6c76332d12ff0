//! Cameras for the Orbis planet renderer.
//!
//! [`Camera`] owns the eye, an orthonormal basis and the derived matrices and
//! [`Frustum`]. [`PlanetCamera`] layers ellipsoid-relative altitude limits, terrain
//! collision and precomputed fly-to animations on top of it.

mod camera;
mod flight;
mod frustum;
mod planet_camera;

pub use camera::{Camera, CameraEvent, CameraParams, CameraState, CameraView};
pub use flight::{FlightFrame, FlyParams, NORTH};
pub use frustum::Frustum;
pub use planet_camera::{PlanetCamera, PlanetCameraParams, TerrainHit, TerrainSurface};
