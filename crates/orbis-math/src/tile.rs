//! Quad-tree tile addressing in the Web-Mercator grid.

use serde::{Deserialize, Serialize};

/// Tile edges. Rows grow southward, columns grow eastward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    North,
    East,
    South,
    West,
}

impl Side {
    pub const ALL: [Side; 4] = [Side::North, Side::East, Side::South, Side::West];

    #[must_use]
    pub fn opposite(self) -> Side {
        match self {
            Side::North => Side::South,
            Side::East => Side::West,
            Side::South => Side::North,
            Side::West => Side::East,
        }
    }

    /// Stable index for per-side bookkeeping arrays.
    pub fn index(self) -> usize {
        match self {
            Side::North => 0,
            Side::East => 1,
            Side::South => 2,
            Side::West => 3,
        }
    }

    /// True for the sides whose border runs north-south.
    pub fn is_vertical(self) -> bool {
        matches!(self, Side::East | Side::West)
    }
}

/// Address of one tile: zoom level plus column/row inside a `2^zoom` square grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub const ROOT: TileKey = TileKey { zoom: 0, x: 0, y: 0 };

    pub const fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Number of tiles along one axis at this zoom.
    pub fn grid_size(&self) -> u32 {
        1u32 << self.zoom
    }

    #[must_use]
    pub fn parent(&self) -> Option<TileKey> {
        if self.zoom == 0 {
            return None;
        }
        Some(TileKey::new(self.zoom - 1, self.x / 2, self.y / 2))
    }

    /// Ancestor at a coarser zoom, or `self` when `zoom` is not coarser.
    #[must_use]
    pub fn ancestor(&self, zoom: u8) -> TileKey {
        if zoom >= self.zoom {
            return *self;
        }
        let shift = self.zoom - zoom;
        TileKey::new(zoom, self.x >> shift, self.y >> shift)
    }

    pub fn is_ancestor_of(&self, other: &TileKey) -> bool {
        self.zoom < other.zoom && other.ancestor(self.zoom) == *self
    }

    /// Children in north-west, north-east, south-west, south-east order.
    pub fn children(&self) -> [TileKey; 4] {
        let z = self.zoom + 1;
        let (x, y) = (self.x * 2, self.y * 2);
        [
            TileKey::new(z, x, y),
            TileKey::new(z, x + 1, y),
            TileKey::new(z, x, y + 1),
            TileKey::new(z, x + 1, y + 1),
        ]
    }

    /// Position among the parent's children, in [`TileKey::children`] order.
    pub fn part_index(&self) -> usize {
        ((self.y & 1) * 2 + (self.x & 1)) as usize
    }

    /// Same-zoom neighbor. Columns wrap around the antimeridian; rows do not wrap.
    pub fn neighbor(&self, side: Side) -> Option<TileKey> {
        let size = self.grid_size();
        match side {
            Side::North => (self.y > 0).then(|| TileKey::new(self.zoom, self.x, self.y - 1)),
            Side::South => {
                (self.y + 1 < size).then(|| TileKey::new(self.zoom, self.x, self.y + 1))
            }
            // A single column wraps onto itself.
            Side::West | Side::East if size == 1 => None,
            Side::West => Some(TileKey::new(self.zoom, (self.x + size - 1) % size, self.y)),
            Side::East => Some(TileKey::new(self.zoom, (self.x + 1) % size, self.y)),
        }
    }

    /// The two children of `self` that touch the given side.
    pub fn children_on_side(&self, side: Side) -> [TileKey; 2] {
        let [nw, ne, sw, se] = self.children();
        match side {
            Side::North => [nw, ne],
            Side::South => [sw, se],
            Side::West => [nw, sw],
            Side::East => [ne, se],
        }
    }
}

impl std::fmt::Display for TileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}
