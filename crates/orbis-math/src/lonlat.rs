//! Geodetic coordinates and the Web-Mercator projection.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Half the Web-Mercator world width in meters.
pub const POLE: f64 = 20_037_508.34;

/// Latitude at which the Web-Mercator square ends.
pub const MAX_LAT: f64 = 85.051_128_779_806_6;

/// Longitude/latitude in degrees plus height in meters.
///
/// The same type carries projected Web-Mercator coordinates (meters) after
/// [`LonLat::forward_mercator`]; which space a value lives in is up to the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
    pub height: f64,
}

impl LonLat {
    pub const fn new(lon: f64, lat: f64, height: f64) -> Self {
        Self { lon, lat, height }
    }

    /// Degrees to Web-Mercator meters. Height passes through unchanged.
    pub fn forward_mercator(&self) -> LonLat {
        let x = self.lon * POLE / 180.0;
        let lat = self.lat.clamp(-MAX_LAT, MAX_LAT);
        let y = ((90.0 + lat) * PI / 360.0).tan().ln() / (PI / 180.0) * POLE / 180.0;
        LonLat::new(x, y, self.height)
    }

    /// Web-Mercator meters back to degrees.
    pub fn inverse_mercator(x: f64, y: f64) -> LonLat {
        let lon = 180.0 * x / POLE;
        let lat = 180.0 / PI * (2.0 * (y / POLE * PI).exp().atan() - PI / 2.0);
        LonLat::new(lon, lat, 0.0)
    }

    /// True when the latitude is inside the Web-Mercator square.
    pub fn is_mercator_valid(&self) -> bool {
        self.lat.abs() <= MAX_LAT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mercator_origin() {
        let m = LonLat::new(0.0, 0.0, 12.0).forward_mercator();
        assert!(m.lon.abs() < 1e-9);
        assert!(m.lat.abs() < 1e-6);
        assert_eq!(m.height, 12.0);
    }

    #[test]
    fn test_mercator_max_lat_maps_to_pole() {
        let m = LonLat::new(180.0, MAX_LAT, 0.0).forward_mercator();
        assert!((m.lon - POLE).abs() < 1e-6);
        assert!((m.lat - POLE).abs() < 1.0);
    }

    #[test]
    fn test_inverse_mercator_recovers_degrees() {
        let original = LonLat::new(37.6, 55.75, 0.0);
        let m = original.forward_mercator();
        let back = LonLat::inverse_mercator(m.lon, m.lat);
        assert!((back.lon - original.lon).abs() < 1e-9);
        assert!((back.lat - original.lat).abs() < 1e-9);
    }
}
