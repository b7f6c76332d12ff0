//! Cooperative, non-blocking subsystem locks.
//!
//! A [`Lock`] never blocks anybody. Holders register their [`Key`] to say "I am busy
//! with this subsystem", and other code asks [`Lock::is_free`] to decide whether to
//! skip optional work this frame.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// Opaque holder identity.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Key {
    id: u64,
}

impl Key {
    pub fn new() -> Self {
        Self {
            id: NEXT_KEY.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Default for Key {
    fn default() -> Self {
        Self::new()
    }
}

/// Reference count of outstanding claims, per key.
///
/// Cloning a `Lock` yields another handle to the same counts.
#[derive(Clone, Debug, Default)]
pub struct Lock {
    holders: Arc<DashMap<u64, usize>>,
}

impl Lock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one claim for `key`.
    pub fn lock(&self, key: &Key) {
        *self.holders.entry(key.id).or_insert(0) += 1;
    }

    /// Releases one claim for `key`. Unknown or already released keys are ignored.
    pub fn free(&self, key: &Key) {
        let emptied = match self.holders.get_mut(&key.id) {
            Some(mut count) => {
                *count = count.saturating_sub(1);
                *count == 0
            }
            None => false,
        };
        if emptied {
            self.holders.remove_if(&key.id, |_, count| *count == 0);
        }
    }

    pub fn is_free(&self) -> bool {
        self.holders.is_empty()
    }

    pub fn is_locked(&self) -> bool {
        !self.is_free()
    }

    /// Number of distinct keys currently holding the lock.
    pub fn holders(&self) -> usize {
        self.holders.len()
    }

    /// True when `key` holds at least one claim.
    pub fn is_held_by(&self, key: &Key) -> bool {
        self.holders.contains_key(&key.id)
    }
}

/// The three subsystems a flight or drag gesture pauses.
#[derive(Clone, Debug, Default)]
pub struct PlanetLocks {
    /// Imagery layer loading.
    pub layers: Lock,
    /// Elevation requests.
    pub terrain: Lock,
    /// Normal map generation.
    pub normal_map: Lock,
}

impl PlanetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_all(&self, key: &Key) {
        self.layers.lock(key);
        self.terrain.lock(key);
        self.normal_map.lock(key);
    }

    pub fn free_all(&self, key: &Key) {
        self.layers.free(key);
        self.terrain.free(key);
        self.normal_map.free(key);
    }

    pub fn all_free(&self) -> bool {
        self.layers.is_free() && self.terrain.is_free() && self.normal_map.is_free()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_unique() {
        let a = Key::new();
        let b = Key::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_lock_and_free() {
        let lock = Lock::new();
        let key = Key::new();
        assert!(lock.is_free());
        lock.lock(&key);
        assert!(lock.is_locked());
        assert!(lock.is_held_by(&key));
        lock.free(&key);
        assert!(lock.is_free());
    }

    #[test]
    fn test_counts_per_key() {
        let lock = Lock::new();
        let key = Key::new();
        lock.lock(&key);
        lock.lock(&key);
        lock.free(&key);
        assert!(lock.is_locked());
        lock.free(&key);
        assert!(lock.is_free());
    }

    #[test]
    fn test_locked_while_any_holder_remains() {
        let lock = Lock::new();
        let a = Key::new();
        let b = Key::new();
        lock.lock(&a);
        lock.lock(&b);
        assert_eq!(lock.holders(), 2);
        lock.free(&a);
        assert!(lock.is_locked());
        lock.free(&b);
        assert!(lock.is_free());
    }

    #[test]
    fn test_free_unknown_key_is_noop() {
        let lock = Lock::new();
        let holder = Key::new();
        let stranger = Key::new();
        lock.free(&stranger);
        assert!(lock.is_free());
        lock.lock(&holder);
        lock.free(&stranger);
        lock.free(&stranger);
        assert!(lock.is_locked());
    }

    #[test]
    fn test_clones_share_state() {
        let locks = PlanetLocks::new();
        let view = locks.clone();
        let key = Key::new();
        locks.lock_all(&key);
        assert!(view.terrain.is_locked());
        assert!(!view.all_free());
        view.free_all(&key);
        assert!(locks.all_free());
    }
}
