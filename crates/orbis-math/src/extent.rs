//! Rectangular lon/lat (or mercator) extents.

use serde::{Deserialize, Serialize};

use crate::{LonLat, POLE, TileKey};

/// An axis-aligned rectangle given by its south-west and north-east corners.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub south_west: LonLat,
    pub north_east: LonLat,
}

impl Extent {
    pub const fn new(south_west: LonLat, north_east: LonLat) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// Builds an extent from west, south, east, north bounds.
    pub fn from_bounds(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self::new(LonLat::new(west, south, 0.0), LonLat::new(east, north, 0.0))
    }

    /// Mercator extent (meters) of a quad-tree tile.
    pub fn from_tile(key: TileKey) -> Self {
        let size = 2.0 * POLE / key.grid_size() as f64;
        let west = -POLE + key.x as f64 * size;
        let north = POLE - key.y as f64 * size;
        Self::from_bounds(west, north - size, west + size, north)
    }

    /// The whole Web-Mercator square in meters.
    pub fn mercator_world() -> Self {
        Self::from_bounds(-POLE, -POLE, POLE, POLE)
    }

    pub fn west(&self) -> f64 {
        self.south_west.lon
    }

    pub fn east(&self) -> f64 {
        self.north_east.lon
    }

    pub fn south(&self) -> f64 {
        self.south_west.lat
    }

    pub fn north(&self) -> f64 {
        self.north_east.lat
    }

    pub fn width(&self) -> f64 {
        self.north_east.lon - self.south_west.lon
    }

    pub fn height(&self) -> f64 {
        self.north_east.lat - self.south_west.lat
    }

    pub fn center(&self) -> LonLat {
        LonLat::new(
            self.south_west.lon + self.width() * 0.5,
            self.south_west.lat + self.height() * 0.5,
            0.0,
        )
    }

    /// Inclusive point containment.
    pub fn is_inside(&self, p: &LonLat) -> bool {
        p.lon >= self.west() && p.lon <= self.east() && p.lat >= self.south() && p.lat <= self.north()
    }

    /// True when the two extents share any area (touching edges excluded).
    pub fn overlaps(&self, other: &Extent) -> bool {
        self.west() < other.east()
            && self.east() > other.west()
            && self.south() < other.north()
            && self.north() > other.south()
    }

    /// Degrees to mercator meters.
    pub fn forward_mercator(&self) -> Extent {
        Extent::new(
            self.south_west.forward_mercator(),
            self.north_east.forward_mercator(),
        )
    }

    /// Mercator meters to degrees.
    pub fn inverse_mercator(&self) -> Extent {
        Extent::new(
            LonLat::inverse_mercator(self.south_west.lon, self.south_west.lat),
            LonLat::inverse_mercator(self.north_east.lon, self.north_east.lat),
        )
    }

    /// Offset of `inner` inside `self` as `[x, y, width, height]`, all relative to `self`.
    ///
    /// `y` is measured from the north edge, matching texture space where rows run
    /// from north to south.
    pub fn offset_of(&self, inner: &Extent) -> [f32; 4] {
        let sx = self.width();
        let sy = self.height();
        [
            ((inner.west() - self.west()) / sx) as f32,
            ((self.north() - inner.north()) / sy) as f32,
            (inner.width() / sx) as f32,
            (inner.height() / sy) as f32,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_tile_covers_world() {
        let e = Extent::from_tile(TileKey::ROOT);
        assert_eq!(e, Extent::mercator_world());
    }

    #[test]
    fn test_child_tile_extents_partition_parent() {
        let parent = Extent::from_tile(TileKey::new(3, 2, 5));
        let area: f64 = TileKey::new(3, 2, 5)
            .children()
            .iter()
            .map(|c| {
                let e = Extent::from_tile(*c);
                assert!(parent.overlaps(&e));
                e.width() * e.height()
            })
            .sum();
        assert!((area - parent.width() * parent.height()).abs() < 1.0);
    }

    #[test]
    fn test_tile_y_grows_southward() {
        let north = Extent::from_tile(TileKey::new(1, 0, 0));
        let south = Extent::from_tile(TileKey::new(1, 0, 1));
        assert!(north.south() >= south.north() - 1e-6);
    }

    #[test]
    fn test_offset_of_north_east_quadrant() {
        let outer = Extent::from_bounds(0.0, 0.0, 10.0, 10.0);
        let inner = Extent::from_bounds(5.0, 5.0, 10.0, 10.0);
        assert_eq!(outer.offset_of(&inner), [0.5, 0.0, 0.5, 0.5]);
    }

    #[test]
    fn test_touching_extents_do_not_overlap() {
        let a = Extent::from_bounds(0.0, 0.0, 1.0, 1.0);
        let b = Extent::from_bounds(1.0, 0.0, 2.0, 1.0);
        assert!(!a.overlaps(&b));
        assert!(a.is_inside(&LonLat::new(1.0, 0.5, 0.0)));
    }
}
