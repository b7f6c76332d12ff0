//! Unique RGB picking colors.
//!
//! Every pickable object gets an RGB triple with each channel in `1..=255`. A triple
//! with any zero channel is reserved (the background clears to zero), so a pixel read
//! back from the picking pass maps to at most one object.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashMap;
use tracing::trace;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PickingColor(pub [u8; 3]);

impl PickingColor {
    /// False for any triple containing a zero channel.
    pub fn is_valid(&self) -> bool {
        self.0.iter().all(|&c| c != 0)
    }

    /// Normalized `[0, 1]` channels for shader uniforms.
    pub fn to_unit(&self) -> [f32; 3] {
        self.0.map(|c| c as f32 / 255.0)
    }
}

/// Color to object map with collision-free assignment.
pub struct PickingRegistry<T> {
    objects: FxHashMap<PickingColor, T>,
    rng: ChaCha8Rng,
}

impl<T> PickingRegistry<T> {
    pub fn new() -> Self {
        Self::with_rng(ChaCha8Rng::from_os_rng())
    }

    /// Deterministic assignment order for reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(rng: ChaCha8Rng) -> Self {
        Self {
            objects: FxHashMap::default(),
            rng,
        }
    }

    /// Assigns a fresh color to `object`, retrying until it is unused.
    ///
    /// # Panics
    ///
    /// Panics if all 255³ colors are taken.
    pub fn assign(&mut self, object: T) -> PickingColor {
        assert!(self.objects.len() < 255 * 255 * 255, "picking colors exhausted");
        loop {
            let color = PickingColor([
                self.rng.random_range(1..=255),
                self.rng.random_range(1..=255),
                self.rng.random_range(1..=255),
            ]);
            if !self.objects.contains_key(&color) {
                trace!(color = ?color.0, "assigned picking color");
                self.objects.insert(color, object);
                return color;
            }
        }
    }

    pub fn get(&self, color: PickingColor) -> Option<&T> {
        if !color.is_valid() {
            return None;
        }
        self.objects.get(&color)
    }

    pub fn release(&mut self, color: PickingColor) -> Option<T> {
        self.objects.remove(&color)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl<T> Default for PickingRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_assigned_colors_are_valid_and_unique() {
        let mut registry = PickingRegistry::with_seed(7);
        let mut seen = HashSet::new();
        for i in 0..5_000 {
            let color = registry.assign(i);
            assert!(color.is_valid());
            assert!(seen.insert(color), "duplicate color {:?}", color);
        }
        assert_eq!(registry.len(), 5_000);
    }

    #[test]
    fn test_lookup_returns_object() {
        let mut registry = PickingRegistry::with_seed(1);
        let a = registry.assign("a");
        let b = registry.assign("b");
        assert_eq!(registry.get(a), Some(&"a"));
        assert_eq!(registry.get(b), Some(&"b"));
    }

    #[test]
    fn test_zero_channel_is_reserved() {
        let registry: PickingRegistry<u32> = PickingRegistry::with_seed(1);
        assert!(!PickingColor([0, 10, 10]).is_valid());
        assert_eq!(registry.get(PickingColor([0, 0, 0])), None);
    }

    #[test]
    fn test_release_frees_color() {
        let mut registry = PickingRegistry::with_seed(3);
        let c = registry.assign(5u32);
        assert_eq!(registry.release(c), Some(5));
        assert_eq!(registry.get(c), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_to_unit() {
        assert_eq!(PickingColor([255, 51, 255]).to_unit(), [1.0, 0.2, 1.0]);
    }
}
