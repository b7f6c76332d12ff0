//! Bounding volumes for tile visibility tests.

use glam::DVec3;

/// Running min/max accumulator over points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: DVec3,
    pub max: DVec3,
}

impl Bounds {
    /// An empty accumulator. Extending it with any point makes it valid.
    pub const EMPTY: Bounds = Bounds {
        min: DVec3::splat(f64::MAX),
        max: DVec3::splat(f64::MIN),
    };

    pub fn extend(&mut self, p: DVec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Bounds of a flat `[x0, y0, z0, x1, ...]` buffer.
    pub fn from_flat(coords: &[f64]) -> Bounds {
        let mut bounds = Bounds::EMPTY;
        for c in coords.chunks_exact(3) {
            bounds.extend(DVec3::new(c[0], c[1], c[2]));
        }
        bounds
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// A bounding sphere in planet-centered coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingSphere {
    pub center: DVec3,
    pub radius: f64,
}

impl BoundingSphere {
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Smallest sphere centered on the box center that encloses the box.
    pub fn from_bounds(bounds: &Bounds) -> Self {
        let center = (bounds.min + bounds.max) * 0.5;
        Self {
            center,
            radius: center.distance(bounds.max),
        }
    }
}

/// The eight corners of an axis-aligned box.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    pub vertices: [DVec3; 8],
}

impl BoundingBox {
    pub fn from_bounds(bounds: &Bounds) -> Self {
        let (lo, hi) = (bounds.min, bounds.max);
        Self {
            vertices: [
                DVec3::new(lo.x, lo.y, lo.z),
                DVec3::new(hi.x, lo.y, lo.z),
                DVec3::new(hi.x, lo.y, hi.z),
                DVec3::new(lo.x, lo.y, hi.z),
                DVec3::new(lo.x, hi.y, lo.z),
                DVec3::new(hi.x, hi.y, lo.z),
                DVec3::new(hi.x, hi.y, hi.z),
                DVec3::new(lo.x, hi.y, hi.z),
            ],
        }
    }
}
