//! Spatial indexing for O(log n) hit testing over laid-out renderings.

mod rtree;

pub use rtree::{RectEntry, SpatialIndex};
