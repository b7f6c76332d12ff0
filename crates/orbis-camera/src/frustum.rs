//! View frustum planes and containment tests used for tile visibility.

use glam::{DMat4, DVec3, DVec4};
use orbis_math::BoundingBox;

const RIGHT: usize = 0;
const LEFT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const BACKWARD: usize = 4;
const FORWARD: usize = 5;

/// Six clip planes with unit `(a, b, c)` normals pointing into the visible volume.
///
/// Plane order: right, left, bottom, top, backward (far), forward (near).
#[derive(Clone, Debug, PartialEq)]
pub struct Frustum {
    planes: [DVec4; 6],
}

impl Frustum {
    /// Builds the six planes of a projection-view matrix.
    pub fn from_projection_view(pv: &DMat4) -> Self {
        let mut frustum = Self {
            planes: [DVec4::ZERO; 6],
        };
        frustum.set_frustum(pv);
        frustum
    }

    /// Re-extracts the planes as `row3 ± row_i` of the projection-view matrix.
    pub fn set_frustum(&mut self, pv: &DMat4) {
        let rows = [pv.row(0), pv.row(1), pv.row(2), pv.row(3)];

        self.planes[RIGHT] = rows[3] - rows[0];
        self.planes[LEFT] = rows[3] + rows[0];
        self.planes[BOTTOM] = rows[3] + rows[1];
        self.planes[TOP] = rows[3] - rows[1];
        self.planes[BACKWARD] = rows[3] - rows[2];
        self.planes[FORWARD] = rows[3] + rows[2];

        for plane in &mut self.planes {
            let len = plane.truncate().length();
            if len > 0.0 {
                *plane /= len;
            }
        }
    }

    /// Normalized planes as `(normal, distance)`, in the order above.
    pub fn planes(&self) -> &[DVec4; 6] {
        &self.planes
    }

    #[inline]
    fn distance(plane: &DVec4, p: DVec3) -> f64 {
        plane.truncate().dot(p) + plane.w
    }

    /// Strictly inside all six planes.
    pub fn contains_point(&self, p: DVec3) -> bool {
        self.planes.iter().all(|plane| Self::distance(plane, p) > 0.0)
    }

    /// Accepts spheres that are at least partially inside.
    pub fn contains_sphere(&self, center: DVec3, radius: f64) -> bool {
        self.planes
            .iter()
            .all(|plane| Self::distance(plane, center) > -radius)
    }

    /// [`Frustum::contains_sphere`] without the bottom plane.
    pub fn contains_sphere_bottom_excluding(&self, center: DVec3, radius: f64) -> bool {
        self.planes
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != BOTTOM)
            .all(|(_, plane)| Self::distance(plane, center) > -radius)
    }

    /// Approximate box test: rejects only when every corner lies outside one plane.
    ///
    /// Boxes straddling a frustum corner may be accepted while fully outside.
    pub fn contains_box(&self, bbox: &BoundingBox) -> bool {
        for plane in &self.planes {
            let mut inside = 0;
            let mut outside = 0;
            for v in &bbox.vertices {
                if Self::distance(plane, *v) < 0.0 {
                    outside += 1;
                } else {
                    inside += 1;
                }
                if inside > 0 && outside > 0 {
                    break;
                }
            }
            if inside == 0 {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbis_math::Bounds;

    fn test_frustum() -> Frustum {
        let proj = DMat4::perspective_rh_gl(60f64.to_radians(), 1.5, 0.5, 1000.0);
        let view = DMat4::look_at_rh(DVec3::new(3.0, 2.0, 10.0), DVec3::ZERO, DVec3::Y);
        Frustum::from_projection_view(&(proj * view))
    }

    #[test]
    fn test_planes_normalized() {
        for plane in test_frustum().planes() {
            assert!((plane.truncate().length() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_contains_target_point() {
        let f = test_frustum();
        assert!(f.contains_point(DVec3::ZERO));
        assert!(!f.contains_point(DVec3::new(3.0, 2.0, 20.0)));
        assert!(!f.contains_point(DVec3::new(-3000.0, 0.0, 0.0)));
    }

    #[test]
    fn test_zero_radius_sphere_matches_point() {
        let matrices = [
            DMat4::perspective_rh_gl(1.0, 1.0, 0.1, 100.0)
                * DMat4::look_at_rh(DVec3::ZERO, DVec3::NEG_Z, DVec3::Y),
            DMat4::perspective_rh_gl(0.4, 2.0, 10.0, 1.0e7)
                * DMat4::look_at_rh(DVec3::new(7.0e6, 0.0, 0.0), DVec3::ZERO, DVec3::Z),
            DMat4::orthographic_rh_gl(-5.0, 5.0, -5.0, 5.0, 0.0, 50.0),
        ];
        for pv in &matrices {
            let f = Frustum::from_projection_view(pv);
            for i in -10..=10 {
                for j in -10..=10 {
                    let p = DVec3::new(i as f64 * 0.7e6, j as f64 * 3.0, (i * j) as f64 * -1.3);
                    assert_eq!(f.contains_point(p), f.contains_sphere(p, 0.0), "{p:?}");
                }
            }
        }
    }

    #[test]
    fn test_sphere_partially_inside() {
        let f = test_frustum();
        let outside = DVec3::new(3.0, 2.0, 11.0);
        assert!(!f.contains_sphere(outside, 0.1));
        assert!(f.contains_sphere(outside, 5.0));
    }

    #[test]
    fn test_bottom_excluding_ignores_bottom_plane() {
        let proj = DMat4::perspective_rh_gl(1.0, 1.0, 0.1, 100.0);
        let view = DMat4::look_at_rh(DVec3::ZERO, DVec3::NEG_Z, DVec3::Y);
        let f = Frustum::from_projection_view(&(proj * view));
        let below = DVec3::new(0.0, -50.0, -10.0);
        assert!(!f.contains_sphere(below, 1.0));
        assert!(f.contains_sphere_bottom_excluding(below, 1.0));
    }

    #[test]
    fn test_contains_box() {
        let f = test_frustum();
        let inside = Bounds {
            min: DVec3::splat(-1.0),
            max: DVec3::splat(1.0),
        };
        assert!(f.contains_box(&BoundingBox::from_bounds(&inside)));
        let behind = Bounds {
            min: DVec3::new(2.0, 1.0, 20.0),
            max: DVec3::new(4.0, 3.0, 30.0),
        };
        assert!(!f.contains_box(&BoundingBox::from_bounds(&behind)));
    }
}
