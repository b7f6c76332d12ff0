//! Geodesy and geometry primitives for the Orbis planet renderer.
//!
//! Everything works in f64 (`glam::DVec3`/`DMat4`) in an earth-centered frame with the
//! Z axis through the north pole.

mod bounds;
mod ellipsoid;
mod extent;
mod lonlat;
mod ray;
mod tile;

pub use bounds::{BoundingBox, BoundingSphere, Bounds};
pub use ellipsoid::Ellipsoid;
pub use extent::Extent;
pub use lonlat::{LonLat, MAX_LAT, POLE};
pub use ray::{Ray, RayHit};
pub use tile::{Side, TileKey};
