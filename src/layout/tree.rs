//! Tree layout: hierarchies drawn along a growing and an opposite direction.
//!
//! The painter works in orientation-agnostic coordinates:
//!
//! - `gd`, the growing direction, along which siblings are appended;
//! - `od`, the opposite direction, along which children hang off a parent.
//!
//! A vertical tree grows downward (`gd` is top/height, `od` is left/width) and
//! is drawn *packed*: each parent sits level with its topmost child. A
//! horizontal tree grows rightward and is drawn *even*: each parent is
//! centered over the span covered by its children.

use petgraph::stable_graph::NodeIndex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{error, info};

use super::tree_builder::{Forest, TreeBuilder};
use super::{LayoutEngine, LayoutPass, parse_state, state_value};
use crate::config::TreeConfig;
use crate::error::{LayoutError, LayoutResult};
use crate::meta::Metamodel;
use crate::model::{Dimensions, ModelGraph, ModelId, Position, Rect};
use crate::render::{Artifact, RenderingPipeline};

/// Orientation and hierarchy settings of the tree layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TreeState {
    /// Grow downward instead of rightward.
    pub vertical: bool,
    /// Attribute holding the parent id. Defaults to the first parent-capable
    /// attribute, or the first attribute if none is flagged.
    pub parent_key: Option<String>,
}

/// A point or extent in growing/opposite direction coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Extent {
    pub gd: f64,
    pub od: f64,
}

impl Extent {
    pub fn new(gd: f64, od: f64) -> Self {
        Self { gd, od }
    }
}

/// Computes bounding rectangles and draws one orientation of a tree.
pub struct TreePainter<'c> {
    config: &'c TreeConfig,
    vertical: bool,
    bounds: HashMap<NodeIndex, Extent>,
}

impl<'c> TreePainter<'c> {
    pub fn new(config: &'c TreeConfig, vertical: bool) -> Self {
        Self {
            config,
            vertical,
            bounds: HashMap::new(),
        }
    }

    // =========================================================================
    // Coordinate transforms
    // =========================================================================

    fn gd(&self, dims: Dimensions) -> f64 {
        if self.vertical { dims.height } else { dims.width }
    }

    fn od(&self, dims: Dimensions) -> f64 {
        if self.vertical { dims.width } else { dims.height }
    }

    /// Physical size of a bounding extent.
    pub fn to_absolute(&self, extent: Extent) -> Dimensions {
        if self.vertical {
            Dimensions::new(extent.od, extent.gd)
        } else {
            Dimensions::new(extent.gd, extent.od)
        }
    }

    /// Relative coordinates of a physical offset.
    pub fn to_relative(&self, offset: Position) -> Extent {
        if self.vertical {
            Extent::new(offset.top, offset.left)
        } else {
            Extent::new(offset.left, offset.top)
        }
    }

    fn to_physical_rect(&self, origin: Extent, size: Extent) -> Rect {
        if self.vertical {
            Rect::new(origin.gd, origin.od, size.od, size.gd)
        } else {
            Rect::new(origin.od, origin.gd, size.gd, size.od)
        }
    }

    fn packed_center(&self, offset: Extent, dims: Dimensions) -> Extent {
        Extent::new(
            offset.gd + self.config.padding + self.gd(dims) / 2.0,
            offset.od + self.od(dims) / 2.0,
        )
    }

    fn even_center(&self, offset: Extent, dims: Dimensions, bounds: Extent) -> Extent {
        Extent::new(
            offset.gd + bounds.gd / 2.0,
            offset.od + self.config.padding + self.od(dims) / 2.0,
        )
    }

    // =========================================================================
    // Bounding rectangles
    // =========================================================================

    /// Computes (and caches) the bounding extent of the subtree at `node`.
    pub fn bounding_rect(&mut self, forest: &Forest, models: &ModelGraph, node: NodeIndex) -> Extent {
        let padding = self.config.padding;
        let mut children = Extent::default();
        for child in forest.children(node) {
            let rect = self.bounding_rect(forest, models, child);
            children.gd += rect.gd + padding;
            children.od = children.od.max(rect.od);
        }

        let dims = dims_of(forest, models, node);
        let rect = Extent::new(
            self.gd(dims).max(children.gd) + padding,
            self.od(dims) + children.od + self.config.bounding_extra,
        );
        self.bounds.insert(node, rect);
        rect
    }

    fn bounds_of(&self, node: NodeIndex) -> Extent {
        self.bounds.get(&node).copied().unwrap_or_default()
    }

    // =========================================================================
    // Drawing
    // =========================================================================

    /// Queues moves and connectors for the subtree at `node`, drawn from
    /// `offset`. Bounding rectangles must have been computed first.
    pub fn draw(
        &self,
        pipeline: &mut RenderingPipeline,
        forest: &Forest,
        models: &ModelGraph,
        node: NodeIndex,
        offset: Extent,
        parent: Option<(NodeIndex, Extent)>,
    ) {
        let dims = dims_of(forest, models, node);
        let bounds = self.bounds_of(node);
        let padding = self.config.padding;

        if let Some(id) = forest.model_id(node) {
            if self.vertical {
                pipeline.move_to(id, offset.gd + padding, offset.od);
            } else {
                pipeline.move_to(
                    id,
                    offset.od + padding,
                    offset.gd + (bounds.gd - self.gd(dims)) / 2.0,
                );
            }
        }

        if let Some((parent_node, parent_offset)) = parent {
            let parent_dims = dims_of(forest, models, parent_node);
            let (center, parent_center) = if self.vertical {
                (
                    self.packed_center(offset, dims),
                    self.packed_center(parent_offset, parent_dims),
                )
            } else {
                (
                    self.even_center(offset, dims, bounds),
                    self.even_center(parent_offset, parent_dims, self.bounds_of(parent_node)),
                )
            };
            self.connector(pipeline, center, parent_center);
        }

        let mut progressive_gd = offset.gd;
        for child in forest.children(node) {
            let child_offset = Extent::new(
                progressive_gd,
                offset.od + self.od(dims) + self.config.child_indent,
            );
            self.draw(pipeline, forest, models, child, child_offset, Some((node, offset)));
            progressive_gd += self.bounds_of(child).gd + padding;
        }
    }

    /// Two segments joining a node center to its parent center: one along
    /// the growing direction, one along the opposite direction.
    fn connector(&self, pipeline: &mut RenderingPipeline, center: Extent, parent: Extent) {
        let thickness = self.config.connector_thickness;
        let gd_segment = self.to_physical_rect(
            Extent::new(center.gd.min(parent.gd), parent.od),
            Extent::new((parent.gd - center.gd).abs(), thickness),
        );
        let od_segment = self.to_physical_rect(
            Extent::new(center.gd, parent.od),
            Extent::new(thickness, (parent.od - center.od).abs()),
        );
        pipeline
            .artifact(Artifact::Connector { rect: gd_segment })
            .artifact(Artifact::Connector { rect: od_segment });
    }
}

fn dims_of(forest: &Forest, models: &ModelGraph, node: NodeIndex) -> Dimensions {
    forest
        .model_id(node)
        .and_then(|id| models.get(id))
        .map(|m| m.rendering().dims())
        .unwrap_or_default()
}

/// Arranges models in trees following a parent attribute.
///
/// Each top-level tree is packed left to right, wrapping to a new row when it
/// would overflow the container. A cycle anywhere in the visible hierarchy
/// aborts the whole pass before anything is queued.
pub struct TreeLayout {
    config: TreeConfig,
    state: TreeState,
    /// Descendants of every model in the last successful pass.
    dependents: HashMap<ModelId, Vec<ModelId>>,
}

impl TreeLayout {
    pub fn new(config: TreeConfig) -> Self {
        Self {
            config,
            state: TreeState::default(),
            dependents: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(TreeConfig::default())
    }

    fn parent_key<'m>(&'m self, meta: &'m Metamodel) -> Option<&'m str> {
        self.state
            .parent_key
            .as_deref()
            .or_else(|| meta.parent_keys().first().copied())
            .or_else(|| meta.keys().next())
    }
}

impl LayoutEngine for TreeLayout {
    fn name(&self) -> &'static str {
        "tree"
    }

    fn verify_metamodel(&self, meta: &Metamodel) -> bool {
        meta.keys().next().is_some()
    }

    fn layout(&mut self, pass: &mut LayoutPass<'_>) -> LayoutResult<bool> {
        let meta = pass.meta;
        let Some(key) = self.parent_key(meta).map(str::to_owned) else {
            return Err(LayoutError::UnknownAttribute(String::new()));
        };
        if !meta.contains(&key) {
            error!(%key, "parent attribute does not match any metamodel property");
            return Err(LayoutError::UnknownAttribute(key));
        }
        info!(parent_key = %key, vertical = self.state.vertical, "creating tree");

        self.dependents.clear();
        let forest = TreeBuilder::new(&key).build(pass.visible, pass.models)?;
        self.dependents = forest.dependents_index();

        let mut painter = TreePainter::new(&self.config, self.state.vertical);
        let mut offset = Position::new(0.0, 0.0);
        let mut max_height: f64 = 0.0;
        for root in forest.roots() {
            let bounds = painter.bounding_rect(&forest, pass.models, root);
            let size = painter.to_absolute(bounds);

            if offset.left + size.width > pass.container.width {
                offset.left = 0.0;
                offset.top += max_height;
                if max_height > 0.0 {
                    offset.top += self.config.padding;
                }
            }

            let relative = painter.to_relative(offset);
            painter.draw(pass.pipeline, &forest, pass.models, root, relative, None);

            offset.left += size.width;
            max_height = max_height.max(size.height);
        }
        Ok(false)
    }

    fn state(&self) -> Value {
        state_value(&self.state)
    }

    fn set_state(&mut self, state: Option<&Value>, meta: &Metamodel) -> bool {
        let Some(next) = parse_state::<TreeState>(state) else {
            return false;
        };
        if next.parent_key.as_deref().is_some_and(|key| !meta.contains(key)) {
            return false;
        }
        self.state = next;
        true
    }

    fn dependent_models(&self, id: &ModelId) -> Vec<ModelId> {
        self.dependents.get(id).cloned().unwrap_or_default()
    }
}
