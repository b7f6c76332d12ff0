//! Tile arena.
//!
//! Nodes live in a map keyed by [`TileKey`]. Parent, child and neighbor links are
//! resolved through the map, never stored as references.

use orbis_math::{Extent, LonLat, Side, TileKey};
use rustc_hash::FxHashMap;

use crate::handler::GpuHandler;
use crate::segment::Segment;

/// How a tile's neighbor across one side is represented in the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Neighbor {
    /// A tile at the same zoom with no children.
    Same(TileKey),
    /// The nearest existing ancestor of the same-zoom neighbor.
    Coarser(TileKey),
    /// The same-zoom neighbor is split; these are its two children touching the side.
    Finer([TileKey; 2]),
}

/// A tile and its four children, if split.
pub struct QuadNode {
    pub segment: Segment,
    children: Option<[TileKey; 4]>,
    /// Frame index of the last traversal that drew this node.
    pub(crate) rendered_frame: u64,
}

impl QuadNode {
    pub fn children(&self) -> Option<[TileKey; 4]> {
        self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub fn rendered_frame(&self) -> u64 {
        self.rendered_frame
    }
}

/// Tiles keyed by [`TileKey`], grown by splitting leaves and shrunk by merging.
#[derive(Default)]
pub struct QuadTree {
    nodes: FxHashMap<TileKey, QuadNode>,
}

impl QuadTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node without children, replacing any previous node for the key.
    pub fn insert(&mut self, segment: Segment) {
        self.nodes.insert(
            segment.key(),
            QuadNode {
                segment,
                children: None,
                rendered_frame: 0,
            },
        );
    }

    pub fn get(&self, key: &TileKey) -> Option<&QuadNode> {
        self.nodes.get(key)
    }

    pub fn get_mut(&mut self, key: &TileKey) -> Option<&mut QuadNode> {
        self.nodes.get_mut(key)
    }

    pub fn segment(&self, key: &TileKey) -> Option<&Segment> {
        self.nodes.get(key).map(|n| &n.segment)
    }

    pub fn segment_mut(&mut self, key: &TileKey) -> Option<&mut Segment> {
        self.nodes.get_mut(key).map(|n| &mut n.segment)
    }

    /// Two distinct segments at once.
    pub fn segment_pair_mut(&mut self, a: &TileKey, b: &TileKey) -> Option<(&mut Segment, &mut Segment)> {
        if a == b {
            return None;
        }
        match self.nodes.get_disjoint_mut([a, b]) {
            [Some(na), Some(nb)] => Some((&mut na.segment, &mut nb.segment)),
            _ => None,
        }
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_leaf(&self, key: &TileKey) -> bool {
        self.nodes.get(key).is_some_and(QuadNode::is_leaf)
    }

    pub fn keys(&self) -> impl Iterator<Item = &TileKey> {
        self.nodes.keys()
    }

    /// Keys of every node without children.
    pub fn leaves(&self) -> Vec<TileKey> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.is_leaf())
            .map(|(k, _)| *k)
            .collect()
    }

    /// Creates the four children of a leaf. Returns false when `key` is missing or
    /// already split.
    pub fn split(&mut self, key: &TileKey, mut make: impl FnMut(TileKey) -> Segment) -> bool {
        let Some(node) = self.nodes.get_mut(key) else {
            return false;
        };
        if node.children.is_some() {
            return false;
        }
        let children = key.children();
        node.children = Some(children);
        for child in children {
            self.insert(make(child));
        }
        true
    }

    /// Destroys every descendant of `key`, leaving it a leaf. Returns the removed keys.
    pub fn merge(&mut self, key: &TileKey, handler: &mut dyn GpuHandler) -> Vec<TileKey> {
        let Some(children) = self.nodes.get_mut(key).and_then(|n| n.children.take()) else {
            return Vec::new();
        };
        let mut removed = Vec::new();
        let mut stack = children.to_vec();
        while let Some(k) = stack.pop() {
            if let Some(mut node) = self.nodes.remove(&k) {
                if let Some(grandchildren) = node.children {
                    stack.extend(grandchildren);
                }
                node.segment.destroy(handler);
                removed.push(k);
            }
        }
        removed
    }

    /// Resolves the neighbor of `key` across `side`.
    pub fn neighbor(&self, key: &TileKey, side: Side) -> Option<Neighbor> {
        let same = key.neighbor(side)?;
        if let Some(node) = self.nodes.get(&same) {
            return Some(if node.is_leaf() {
                Neighbor::Same(same)
            } else {
                Neighbor::Finer(same.children_on_side(side.opposite()))
            });
        }
        let mut ancestor = same.parent();
        while let Some(a) = ancestor {
            if self.nodes.contains_key(&a) {
                return Some(Neighbor::Coarser(a));
            }
            ancestor = a.parent();
        }
        None
    }

    /// Deepest node whose extent contains a mercator point.
    pub fn find_leaf_containing(&self, merc: &LonLat) -> Option<TileKey> {
        let mut key = TileKey::ROOT;
        if !self.nodes.contains_key(&key) || !Extent::from_tile(key).is_inside(merc) {
            return None;
        }
        loop {
            let node = self.nodes.get(&key)?;
            let Some(children) = node.children else {
                return Some(key);
            };
            let Some(next) = children
                .into_iter()
                .find(|c| Extent::from_tile(*c).is_inside(merc))
            else {
                return Some(key);
            };
            key = next;
        }
    }

    /// Destroys all segments and empties the tree.
    pub fn clear(&mut self, handler: &mut dyn GpuHandler) {
        for node in self.nodes.values_mut() {
            node.segment.destroy(handler);
        }
        self.nodes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::MemoryHandler;
    use orbis_math::Ellipsoid;

    fn make(key: TileKey) -> Segment {
        Segment::new(&Ellipsoid::wgs84(), key, 4, 4)
    }

    fn tree_with_root() -> QuadTree {
        let mut tree = QuadTree::new();
        tree.insert(make(TileKey::ROOT));
        tree
    }

    #[test]
    fn test_split_creates_four_leaves() {
        let mut tree = tree_with_root();
        assert!(tree.split(&TileKey::ROOT, make));
        assert!(!tree.split(&TileKey::ROOT, make));
        assert_eq!(tree.len(), 5);
        assert!(!tree.is_leaf(&TileKey::ROOT));
        let mut leaves = tree.leaves();
        leaves.sort();
        let mut expected = TileKey::ROOT.children().to_vec();
        expected.sort();
        assert_eq!(leaves, expected);
    }

    #[test]
    fn test_merge_destroys_subtree() {
        let mut tree = tree_with_root();
        let mut handler = MemoryHandler::new();
        tree.split(&TileKey::ROOT, make);
        let nw = TileKey::new(1, 0, 0);
        tree.split(&nw, make);
        for key in tree.keys().copied().collect::<Vec<_>>() {
            tree.segment_mut(&key).unwrap().upload(&mut handler).unwrap();
        }
        assert_eq!(handler.buffer_count(), 9 * 2);

        let removed = tree.merge(&TileKey::ROOT, &mut handler);
        assert_eq!(removed.len(), 8);
        assert_eq!(tree.len(), 1);
        assert!(tree.is_leaf(&TileKey::ROOT));
        assert_eq!(handler.buffer_count(), 2);
        assert!(tree.merge(&TileKey::ROOT, &mut handler).is_empty());
    }

    #[test]
    fn test_neighbor_resolution() {
        let mut tree = tree_with_root();
        tree.split(&TileKey::ROOT, make);
        let nw = TileKey::new(1, 0, 0);
        let ne = TileKey::new(1, 1, 0);
        let sw = TileKey::new(1, 0, 1);
        tree.split(&nw, make);

        assert_eq!(tree.neighbor(&ne, Side::South), Some(Neighbor::Same(TileKey::new(1, 1, 1))));
        assert_eq!(
            tree.neighbor(&sw, Side::North),
            Some(Neighbor::Finer([TileKey::new(2, 0, 1), TileKey::new(2, 1, 1)]))
        );
        // East of the north-west quarter's north-east child is the undivided NE tile.
        assert_eq!(
            tree.neighbor(&TileKey::new(2, 1, 0), Side::East),
            Some(Neighbor::Coarser(ne))
        );
        assert_eq!(tree.neighbor(&nw, Side::North), None);
    }

    #[test]
    fn test_find_leaf_containing() {
        let mut tree = tree_with_root();
        tree.split(&TileKey::ROOT, make);
        tree.split(&TileKey::new(1, 1, 0), make);
        let p = LonLat::new(100.0, 100.0, 0.0);
        assert_eq!(tree.find_leaf_containing(&p), Some(TileKey::new(2, 2, 1)));
        let q = LonLat::new(-100.0, -100.0, 0.0);
        assert_eq!(tree.find_leaf_containing(&q), Some(TileKey::new(1, 0, 1)));
        assert_eq!(tree.find_leaf_containing(&LonLat::new(0.0, 3.0e7, 0.0)), None);
    }

    #[test]
    fn test_segment_pair_rejects_same_key() {
        let mut tree = tree_with_root();
        assert!(tree.segment_pair_mut(&TileKey::ROOT, &TileKey::ROOT).is_none());
        tree.split(&TileKey::ROOT, make);
        let (a, b) = tree
            .segment_pair_mut(&TileKey::new(1, 0, 0), &TileKey::new(1, 1, 0))
            .unwrap();
        assert_ne!(a.key(), b.key());
    }
}
