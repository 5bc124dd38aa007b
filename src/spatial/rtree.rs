//! R-tree index over rendering rectangles, backed by the rstar crate.
//!
//! Supports the two queries the host needs after a layout pass:
//! - rubber-band selection (all renderings intersecting a rectangle)
//! - point hits (the renderings under the cursor)

use rstar::{AABB, Envelope, PointDistance, RTree, RTreeObject};

use crate::model::{ModelId, Rect};

/// A rendering rectangle in the spatial index.
#[derive(Debug, Clone, PartialEq)]
pub struct RectEntry {
    pub id: ModelId,
    pub rect: Rect,
    /// Stacking order; point hits prefer the highest.
    pub z: i32,
}

impl RectEntry {
    pub fn new(id: ModelId, rect: Rect, z: i32) -> Self {
        Self { id, rect, z }
    }

    fn aabb(&self) -> AABB<[f64; 2]> {
        AABB::from_corners(
            [self.rect.left, self.rect.top],
            [self.rect.right(), self.rect.bottom()],
        )
    }
}

impl RTreeObject for RectEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.aabb()
    }
}

impl PointDistance for RectEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        self.aabb().distance_2(point)
    }

    fn contains_point(&self, point: &[f64; 2]) -> bool {
        self.aabb().contains_point(point)
    }
}

/// Spatial index for laid-out renderings.
pub struct SpatialIndex {
    tree: RTree<RectEntry>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    /// Rebuild the index from scratch. Bulk loading beats incremental
    /// inserts since every layout pass moves most renderings.
    pub fn rebuild(&mut self, entries: Vec<RectEntry>) {
        self.tree = RTree::bulk_load(entries);
    }

    /// All renderings intersecting the given rectangle.
    pub fn in_rect(&self, rect: &Rect) -> Vec<ModelId> {
        let envelope =
            AABB::from_corners([rect.left, rect.top], [rect.right(), rect.bottom()]);
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.id.clone())
            .collect()
    }

    /// The topmost rendering covering a point, if any.
    pub fn at_point(&self, left: f64, top: f64) -> Option<ModelId> {
        self.tree
            .locate_all_at_point(&[left, top])
            .max_by(|a, b| a.z.cmp(&b.z).then_with(|| b.id.cmp(&a.id)))
            .map(|entry| entry.id.clone())
    }

    /// The rendering closest to a point.
    pub fn nearest(&self, left: f64, top: f64) -> Option<ModelId> {
        self.tree
            .nearest_neighbor(&[left, top])
            .map(|entry| entry.id.clone())
    }

    pub fn clear(&mut self) {
        self.tree = RTree::new();
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}
