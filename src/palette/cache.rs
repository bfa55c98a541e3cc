//! Bounded palette memoization with insertion-order eviction.

use std::collections::{HashMap, VecDeque};

use super::{ExtractionParams, ImageRef, Palette};

/// Default maximum number of cached palettes.
pub const DEFAULT_CAPACITY: usize = 50;

/// Composite key: image identity plus the three extraction thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    #[must_use]
    pub fn new(image: &ImageRef, params: &ExtractionParams) -> Self {
        Self(format!(
            "{}|{:.4}|{:.4}|{:.4}",
            image.path().display(),
            params.min_lightness,
            params.muddy_threshold,
            params.accent_threshold,
        ))
    }
}

/// FIFO-bounded map from cache key to finished palette. Eviction is by
/// insertion order; reads do not refresh an entry's position.
#[derive(Debug)]
pub struct PaletteCache {
    capacity: usize,
    order: VecDeque<CacheKey>,
    entries: HashMap<CacheKey, Palette>,
}

impl PaletteCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<&Palette> {
        self.entries.get(key)
    }

    /// Insert a palette, evicting the oldest-inserted entry once at capacity.
    /// Re-inserting an existing key replaces the value without consuming a slot.
    pub fn set(&mut self, key: CacheKey, palette: Palette) {
        if self.entries.contains_key(&key) {
            self.entries.insert(key, palette);
            return;
        }
        if self.entries.len() >= self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.entries.remove(&oldest);
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, palette);
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PaletteCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
