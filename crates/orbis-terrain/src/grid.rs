//! Tile vertex grids.
//!
//! A grid of `size` cells has `(size + 1)²` nodes stored row-major from the tile's
//! north-west corner: rows run south, columns run east. Nodes are evenly spaced in
//! Web-Mercator meters.

use glam::DVec3;
use orbis_math::{Ellipsoid, Extent, LonLat, TileKey};

/// Mercator position of every grid node.
pub fn grid_mercator(key: TileKey, size: usize) -> impl Iterator<Item = (f64, f64)> {
    let extent = Extent::from_tile(key);
    let dx = extent.width() / size as f64;
    let dy = extent.height() / size as f64;
    let (west, north) = (extent.west(), extent.north());
    (0..=size).flat_map(move |i| {
        (0..=size).map(move |j| (west + j as f64 * dx, north - i as f64 * dy))
    })
}

/// Geodetic position of every grid node, at zero height.
pub fn grid_lon_lat(key: TileKey, size: usize) -> impl Iterator<Item = LonLat> {
    grid_mercator(key, size).map(|(x, y)| LonLat::inverse_mercator(x, y))
}

/// Ellipsoid-surface vertices and geodetic normals of a tile grid, flattened `xyz`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlainGrid {
    pub size: usize,
    pub vertices: Vec<f64>,
    pub normals: Vec<f64>,
}

impl PlainGrid {
    pub fn new(ellipsoid: &Ellipsoid, key: TileKey, size: usize) -> Self {
        let nodes = (size + 1) * (size + 1);
        let mut vertices = Vec::with_capacity(nodes * 3);
        let mut normals = Vec::with_capacity(nodes * 3);
        for ll in grid_lon_lat(key, size) {
            let v = ellipsoid.lon_lat_to_cartesian(&ll);
            let n = ellipsoid.geodetic_normal(&ll);
            vertices.extend_from_slice(&[v.x, v.y, v.z]);
            normals.extend_from_slice(&[n.x, n.y, n.z]);
        }
        Self {
            size,
            vertices,
            normals,
        }
    }

    pub fn vertex(&self, index: usize) -> DVec3 {
        DVec3::from_slice(&self.vertices[index * 3..index * 3 + 3])
    }

    pub fn normal(&self, index: usize) -> DVec3 {
        DVec3::from_slice(&self.normals[index * 3..index * 3 + 3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_corners_match_tile_extent() {
        let key = TileKey::new(3, 4, 2);
        let extent = Extent::from_tile(key);
        let nodes: Vec<_> = grid_mercator(key, 4).collect();
        assert_eq!(nodes.len(), 25);
        assert_eq!(nodes[0], (extent.west(), extent.north()));
        let (x, y) = nodes[24];
        assert!((x - extent.east()).abs() < 1e-6);
        assert!((y - extent.south()).abs() < 1e-6);
    }

    #[test]
    fn test_plain_grid_lies_on_ellipsoid() {
        let e = Ellipsoid::wgs84();
        let grid = PlainGrid::new(&e, TileKey::new(2, 1, 1), 8);
        assert_eq!(grid.vertices.len(), 81 * 3);
        for i in 0..81 {
            let ll = e.cartesian_to_lon_lat(grid.vertex(i));
            assert!(ll.height.abs() < 1e-3);
            assert!((grid.normal(i).length() - 1.0).abs() < 1e-12);
        }
    }
}
