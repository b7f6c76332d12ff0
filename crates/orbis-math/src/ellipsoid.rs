//! Reference ellipsoid and geodetic conversions.

use glam::DVec3;

use crate::LonLat;

/// An ellipsoid of revolution around the Z axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ellipsoid {
    equatorial: f64,
    polar: f64,
    e2: f64,
    radii2: DVec3,
    inv_radii: DVec3,
    inv_radii2: DVec3,
}

impl Ellipsoid {
    /// Creates an ellipsoid from its equatorial and polar radii in meters.
    pub fn new(equatorial: f64, polar: f64) -> Self {
        let radii = DVec3::new(equatorial, equatorial, polar);
        let radii2 = radii * radii;
        Self {
            equatorial,
            polar,
            e2: 1.0 - (polar * polar) / (equatorial * equatorial),
            radii2,
            inv_radii: 1.0 / radii,
            inv_radii2: 1.0 / radii2,
        }
    }

    pub fn wgs84() -> Self {
        Self::new(6_378_137.0, 6_356_752.314_245_179)
    }

    pub fn equatorial_radius(&self) -> f64 {
        self.equatorial
    }

    pub fn polar_radius(&self) -> f64 {
        self.polar
    }

    /// Geodetic degrees/meters to earth-centered cartesian.
    pub fn lon_lat_to_cartesian(&self, lonlat: &LonLat) -> DVec3 {
        let lat = lonlat.lat.to_radians();
        let lon = lonlat.lon.to_radians();
        let (slat, clat) = lat.sin_cos();
        let n = self.equatorial / (1.0 - self.e2 * slat * slat).sqrt();
        let nh = (n + lonlat.height) * clat;
        DVec3::new(
            nh * lon.cos(),
            nh * lon.sin(),
            (n * (1.0 - self.e2) + lonlat.height) * slat,
        )
    }

    /// Outward geodetic normal at a geodetic position.
    pub fn geodetic_normal(&self, lonlat: &LonLat) -> DVec3 {
        let lat = lonlat.lat.to_radians();
        let lon = lonlat.lon.to_radians();
        let clat = lat.cos();
        DVec3::new(clat * lon.cos(), clat * lon.sin(), lat.sin())
    }

    /// Outward geodetic normal of the ellipsoid level surface through `p`.
    pub fn surface_normal(&self, p: DVec3) -> DVec3 {
        (p * self.inv_radii2).normalize_or_zero()
    }

    /// Projects `p` onto the ellipsoid surface along its geodetic normal.
    ///
    /// Returns `None` for points too close to the center to have a stable projection.
    pub fn project_to_surface(&self, p: DVec3) -> Option<DVec3> {
        let p2 = p * p * self.inv_radii2;
        let squared_norm = p2.x + p2.y + p2.z;
        let ratio = (1.0 / squared_norm).sqrt();
        let intersection = p * ratio;
        if squared_norm < 0.1 {
            return intersection.is_finite().then_some(intersection);
        }

        let gradient = intersection * self.inv_radii2 * 2.0;
        let mut lambda = (1.0 - ratio) * p.length() / (0.5 * gradient.length());
        let mut correction = 0.0;

        for _ in 0..64 {
            lambda -= correction;
            let m = DVec3::ONE / (DVec3::ONE + lambda * self.inv_radii2);
            let m2 = m * m;
            let m3 = m2 * m;
            let func = (p2 * m2).element_sum() - 1.0;
            if func.abs() < 1e-12 {
                return Some(p * m);
            }
            let derivative = -2.0 * (p2 * m3 * self.inv_radii2).element_sum();
            correction = func / derivative;
        }
        Some(p * (DVec3::ONE / (DVec3::ONE + lambda * self.inv_radii2)))
    }

    /// Earth-centered cartesian to geodetic degrees/meters.
    pub fn cartesian_to_lon_lat(&self, p: DVec3) -> LonLat {
        let Some(surface) = self.project_to_surface(p) else {
            return LonLat::default();
        };
        let n = self.surface_normal(surface);
        let diff = p - surface;
        let sign = if diff.dot(p) < 0.0 { -1.0 } else { 1.0 };
        LonLat::new(
            n.y.atan2(n.x).to_degrees(),
            n.z.clamp(-1.0, 1.0).asin().to_degrees(),
            sign * diff.length(),
        )
    }

    /// First intersection of a ray with the ellipsoid surface.
    pub fn hit_ray(&self, origin: DVec3, direction: DVec3) -> Option<DVec3> {
        let q = self.inv_radii * origin;
        let w = self.inv_radii * direction;
        let q2 = q.length_squared();
        let qw = q.dot(w);
        let w2 = w.length_squared();
        if w2 == 0.0 {
            return None;
        }

        if q2 > 1.0 {
            if qw >= 0.0 {
                return None;
            }
            let difference = q2 - 1.0;
            let product = w2 * difference;
            let qw2 = qw * qw;
            if qw2 < product {
                return None;
            }
            if qw2 > product {
                let temp = -qw + (qw2 - product).sqrt();
                let root0 = temp / w2;
                let root1 = difference / temp;
                return Some(origin + direction * root0.min(root1));
            }
            return Some(origin + direction * (difference / w2).sqrt());
        }

        if q2 < 1.0 {
            let difference = q2 - 1.0;
            let product = w2 * difference;
            let temp = -qw + (qw * qw - product).sqrt();
            return Some(origin + direction * (temp / w2));
        }

        (qw < 0.0).then(|| origin + direction * (-qw / w2))
    }
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Self::wgs84()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equator_prime_meridian() {
        let e = Ellipsoid::wgs84();
        let p = e.lon_lat_to_cartesian(&LonLat::new(0.0, 0.0, 0.0));
        assert!((p - DVec3::new(6_378_137.0, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_north_pole_uses_polar_radius() {
        let e = Ellipsoid::wgs84();
        let p = e.lon_lat_to_cartesian(&LonLat::new(0.0, 90.0, 0.0));
        assert!((p.z - e.polar_radius()).abs() < 1e-6);
        assert!(p.x.abs() < 1e-6);
    }

    #[test]
    fn test_cartesian_round_trip() {
        let e = Ellipsoid::wgs84();
        for &(lon, lat, h) in &[
            (12.5, 41.9, 120.0),
            (-73.9, 40.7, 0.0),
            (151.2, -33.8, 8_000.0),
            (0.0, 0.0, 10_000_000.0),
            (100.0, 60.0, -200.0),
        ] {
            let p = e.lon_lat_to_cartesian(&LonLat::new(lon, lat, h));
            let back = e.cartesian_to_lon_lat(p);
            assert!((back.lon - lon).abs() < 1e-7, "lon {lon} -> {}", back.lon);
            assert!((back.lat - lat).abs() < 1e-7, "lat {lat} -> {}", back.lat);
            assert!((back.height - h).abs() < 1e-3, "height {h} -> {}", back.height);
        }
    }

    #[test]
    fn test_surface_normal_matches_geodetic_normal() {
        let e = Ellipsoid::wgs84();
        let ll = LonLat::new(30.0, 45.0, 0.0);
        let p = e.lon_lat_to_cartesian(&ll);
        let diff = e.surface_normal(p) - e.geodetic_normal(&ll);
        assert!(diff.length() < 1e-9);
    }

    #[test]
    fn test_hit_ray_from_outside() {
        let e = Ellipsoid::wgs84();
        let origin = DVec3::new(10_000_000.0, 0.0, 0.0);
        let hit = e.hit_ray(origin, DVec3::NEG_X).unwrap();
        assert!((hit.x - e.equatorial_radius()).abs() < 1e-6);
    }

    #[test]
    fn test_hit_ray_from_center() {
        let e = Ellipsoid::wgs84();
        let hit = e.hit_ray(DVec3::ZERO, DVec3::Z).unwrap();
        assert!((hit.z - e.polar_radius()).abs() < 1e-6);
    }

    #[test]
    fn test_hit_ray_pointing_away_misses() {
        let e = Ellipsoid::wgs84();
        let origin = DVec3::new(10_000_000.0, 0.0, 0.0);
        assert!(e.hit_ray(origin, DVec3::X).is_none());
        assert!(e.hit_ray(origin, DVec3::Y).is_none());
    }
}
