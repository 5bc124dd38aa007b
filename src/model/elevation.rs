//! Named elevation requests for a single rendering.
//!
//! Several subsystems may want a rendering to sit above its siblings at the
//! same time (a drag in progress, an expanded rendering, a nested treemap
//! node). Each one registers a named elevation; the effective z-index is the
//! highest active request plus a fixed offset.

use std::collections::HashMap;

/// Elevation requested while a rendering is being dragged.
pub const DRAGGING: &str = "__dragging__";
/// Elevation requested while a rendering is expanded.
pub const EXPANDED: &str = "__expanded__";
/// Elevation requested by nested treemap nodes.
pub const TREEMAP: &str = "__treemap__";

/// Max-heap of named elevation requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElevationMap {
    offset: i32,
    elevations: HashMap<String, i32>,
}

impl ElevationMap {
    /// Default z-index baseline for model renderings.
    pub const DEFAULT_OFFSET: i32 = 50;

    pub fn new(offset: i32) -> Self {
        Self {
            offset,
            elevations: HashMap::new(),
        }
    }

    /// Registers (or replaces) a named elevation.
    ///
    /// Requests that are not strictly positive are ignored. Returns whether the
    /// effective elevation changed.
    pub fn add(&mut self, key: &str, elevation: i32) -> bool {
        if elevation <= 0 {
            return false;
        }
        let before = self.top();
        self.elevations.insert(key.to_owned(), elevation);
        before != self.top()
    }

    /// Removes a named elevation. Returns whether the effective elevation changed.
    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.top();
        self.elevations.remove(key);
        before != self.top()
    }

    /// The effective z-index: offset plus the highest active request.
    pub fn top(&self) -> i32 {
        self.offset + self.elevations.values().copied().max().unwrap_or(0)
    }

    pub fn get(&self, key: &str) -> Option<i32> {
        self.elevations.get(key).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.elevations.is_empty()
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }
}

impl Default for ElevationMap {
    fn default() -> Self {
        Self::new(Self::DEFAULT_OFFSET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_remove_top_falls_back_to_next() {
        let mut map = ElevationMap::new(10);
        map.add("a", 5);
        map.add("b", 3);
        assert_eq!(map.top(), 15);

        assert!(map.remove("a"));
        assert_eq!(map.top(), 13);

        assert!(map.remove("b"));
        assert_eq!(map.top(), 10);
        assert!(map.is_empty());
    }

    #[test]
    fn test_non_positive_elevations_ignored() {
        let mut map = ElevationMap::new(10);
        map.add("a", 2);
        assert!(!map.add("zero", 0));
        assert!(!map.add("neg", -4));
        assert_eq!(map.top(), 12);
        assert_eq!(map.get("zero"), None);
    }

    #[test]
    fn test_remove_missing_key_is_noop() {
        let mut map = ElevationMap::default();
        assert!(!map.remove(DRAGGING));
        assert_eq!(map.top(), ElevationMap::DEFAULT_OFFSET);
    }

    proptest! {
        #[test]
        fn prop_top_is_max_of_positive_requests(
            requests in proptest::collection::vec((0usize..6, -10i32..20), 0..30)
        ) {
            let mut map = ElevationMap::new(7);
            let mut expected: HashMap<String, i32> = HashMap::new();
            for (k, v) in requests {
                let key = format!("k{k}");
                map.add(&key, v);
                if v > 0 {
                    expected.insert(key, v);
                }
            }
            let max = expected.values().copied().max().unwrap_or(0);
            prop_assert_eq!(map.top(), 7 + max);
        }
    }
}
