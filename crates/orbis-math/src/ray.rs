//! Rays and ray/triangle intersection.

use glam::DVec3;

/// Outcome of a ray/triangle test.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RayHit {
    /// The ray crosses the triangle in front of its origin.
    Inside(DVec3),
    /// The supporting line crosses the triangle behind the origin.
    Away(DVec3),
    /// The triangle's plane is hit outside the triangle.
    Outside,
    /// The ray lies in the triangle's plane.
    InPlane,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: DVec3,
    pub direction: DVec3,
}

impl Ray {
    pub fn new(origin: DVec3, direction: DVec3) -> Self {
        Self { origin, direction }
    }

    pub fn at(&self, t: f64) -> DVec3 {
        self.origin + self.direction * t
    }

    pub fn hit_triangle(&self, v0: DVec3, v1: DVec3, v2: DVec3) -> RayHit {
        let u = v1 - v0;
        let v = v2 - v0;
        let n = u.cross(v);
        let w0 = self.origin - v0;
        let a = -n.dot(w0);
        let b = n.dot(self.direction);

        if b.abs() < 1e-10 {
            return if a == 0.0 { RayHit::InPlane } else { RayHit::Outside };
        }

        let r = a / b;
        let point = self.at(r);

        let uu = u.dot(u);
        let uv = u.dot(v);
        let vv = v.dot(v);
        let w = point - v0;
        let wu = w.dot(u);
        let wv = w.dot(v);
        let d = uv * uv - uu * vv;

        let s = (uv * wv - vv * wu) / d;
        if !(0.0..=1.0).contains(&s) {
            return RayHit::Outside;
        }
        let t = (uv * wu - uu * wv) / d;
        if t < 0.0 || s + t > 1.0 {
            return RayHit::Outside;
        }

        if r < 0.0 { RayHit::Away(point) } else { RayHit::Inside(point) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> (DVec3, DVec3, DVec3) {
        (DVec3::ZERO, DVec3::X * 2.0, DVec3::Y * 2.0)
    }

    #[test]
    fn test_hit_inside() {
        let (a, b, c) = triangle();
        let ray = Ray::new(DVec3::new(0.5, 0.5, 3.0), DVec3::NEG_Z);
        assert_eq!(ray.hit_triangle(a, b, c), RayHit::Inside(DVec3::new(0.5, 0.5, 0.0)));
    }

    #[test]
    fn test_hit_behind_origin() {
        let (a, b, c) = triangle();
        let ray = Ray::new(DVec3::new(0.5, 0.5, -3.0), DVec3::NEG_Z);
        assert_eq!(ray.hit_triangle(a, b, c), RayHit::Away(DVec3::new(0.5, 0.5, 0.0)));
    }

    #[test]
    fn test_miss_outside() {
        let (a, b, c) = triangle();
        let ray = Ray::new(DVec3::new(1.5, 1.5, 3.0), DVec3::NEG_Z);
        assert_eq!(ray.hit_triangle(a, b, c), RayHit::Outside);
    }

    #[test]
    fn test_parallel_ray() {
        let (a, b, c) = triangle();
        let ray = Ray::new(DVec3::new(0.5, 0.5, 1.0), DVec3::X);
        assert_eq!(ray.hit_triangle(a, b, c), RayHit::Outside);
        let ray = Ray::new(DVec3::new(0.5, 0.5, 0.0), DVec3::X);
        assert_eq!(ray.hit_triangle(a, b, c), RayHit::InPlane);
    }
}
