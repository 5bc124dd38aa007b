//! Treemap layout.
//!
//! Based on the "Squarified Treemaps" algorithm by Bruls, Huizing and van
//! Wijk. Each model gets a rectangle whose area is proportional to a numeric
//! attribute. When a parent attribute is chosen, children are nested inside
//! the rectangle of their parent, whose own area becomes the sum of its
//! visible descendants.
//!
//! # Slices
//!
//! Nodes are sorted by descending area and accumulated into slices: strips
//! spanning one side of the remaining space. A node joins the current slice
//! as long as doing so does not worsen the slice's aspect ratio; otherwise a
//! new slice starts, perpendicular to the previous one, in what remains of
//! the bounding rectangle.
//!
//! # Reversibility
//!
//! Every resize, recolor and elevation change goes through the rendering
//! pipeline, which backs up the original values. Models leaving the treemap
//! are restored at the start of the next pass; nodes too small to display are
//! hidden under the `__treemap__` filter until the next cleanup.

use petgraph::stable_graph::NodeIndex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info};

use super::tree_builder::{Forest, TreeBuilder};
use super::{LayoutEngine, LayoutPass, parse_state, state_value};
use crate::config::TreeMapConfig;
use crate::error::{LayoutError, LayoutResult};
use crate::meta::Metamodel;
use crate::model::elevation::TREEMAP;
use crate::model::{Dimensions, ModelGraph, ModelId, Position};
use crate::render::RenderingPipeline;

/// Attribute selection of the treemap layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TreeMapState {
    /// Numeric attribute mapped to areas. Defaults to the first numeric one.
    pub area: Option<String>,
    /// Numeric attribute mapped to colors. No coloring when unset.
    pub color: Option<String>,
    /// Attribute holding the parent id. Flat treemap when unset.
    pub parent_key: Option<String>,
}

/// Growing axis of a slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SliceDirection {
    /// Spans the width; nodes are appended left to right.
    Horizontal,
    /// Spans the height; nodes are appended top to bottom.
    Vertical,
}

#[derive(Debug, Clone)]
struct TreeMapNode {
    node: NodeIndex,
    id: ModelId,
    /// Pixel area.
    area: f64,
    hidden: bool,
    top: f64,
    left: f64,
    width: f64,
    height: f64,
}

impl TreeMapNode {
    fn new(node: NodeIndex, id: ModelId, area: f64) -> Self {
        Self {
            node,
            id,
            area: if area.is_finite() && area > 0.0 { area } else { 0.0 },
            hidden: false,
            top: 0.0,
            left: 0.0,
            width: 0.0,
            height: 0.0,
        }
    }

    fn hide(&mut self, models: &mut ModelGraph) {
        self.hidden = true;
        if let Some(model) = models.get_mut(&self.id) {
            model.filter(TREEMAP);
        }
    }

    /// Room left inside this node for its children. Empty when the node is
    /// hidden or too small, which in turn hides every child.
    fn nested_bounds(&self, config: &TreeMapConfig) -> Dimensions {
        let horizontal = 2.0 * config.nested_padding;
        let vertical = horizontal + config.header_height;
        if self.hidden
            || self.width < horizontal + config.min_nested_extent
            || self.height < vertical + config.min_nested_extent
        {
            return Dimensions::default();
        }
        Dimensions::new(self.width - horizontal, self.height - vertical)
    }

    fn nested_anchor(&self, config: &TreeMapConfig) -> Position {
        Position::new(
            self.top + config.nested_padding + config.header_height,
            self.left + config.nested_padding,
        )
    }
}

#[derive(Debug)]
struct TreeMapSlice {
    length: f64,
    direction: SliceDirection,
    anchor: Position,
    nodes: Vec<TreeMapNode>,
    slice_area: f64,
    min_area: f64,
}

impl TreeMapSlice {
    fn new(length: f64, direction: SliceDirection, anchor: Position) -> Self {
        Self {
            length,
            direction,
            anchor,
            nodes: Vec::new(),
            slice_area: 0.0,
            min_area: f64::MAX,
        }
    }

    fn add(&mut self, node: TreeMapNode) {
        self.slice_area += node.area;
        self.min_area = self.min_area.min(node.area);
        self.nodes.push(node);
    }

    /// Thickness of the slice, optionally as if a node of `extra` area were
    /// added to it.
    fn span(&self, extra: Option<f64>) -> f64 {
        (self.slice_area + extra.unwrap_or(0.0)) / self.length
    }

    /// Worst aspect ratio among the slice nodes, always `>= 1`.
    fn aspect_ratio(&self, extra: Option<f64>) -> f64 {
        let span = self.span(extra);
        let min_area = match extra {
            Some(area) => self.min_area.min(area),
            None => self.min_area,
        };
        let ratio = min_area / (span * span);
        if ratio < 1.0 { 1.0 / ratio } else { ratio }
    }

    /// Queues resizes and moves for the slice nodes. Returns how many nodes
    /// ended up hidden.
    fn draw(
        &mut self,
        pipeline: &mut RenderingPipeline,
        models: &mut ModelGraph,
        delta: Position,
        deepness: i32,
    ) -> usize {
        let mut hidden = 0;
        let mut top = self.anchor.top + delta.top;
        let mut left = self.anchor.left + delta.left;
        let exact_span = self.span(None);
        let span = exact_span.round();
        let direction = self.direction;

        for node in &mut self.nodes {
            if node.hidden {
                hidden += 1;
                continue;
            }
            let length = node.area / exact_span;
            if length.round() == 0.0 || span == 0.0 {
                node.hide(models);
                hidden += 1;
            } else {
                let (width, height) = match direction {
                    SliceDirection::Horizontal => (length.round(), span),
                    SliceDirection::Vertical => (span, length.round()),
                };
                if pipeline.resize(&node.id, width, height) {
                    node.top = top.round();
                    node.left = left.round();
                    node.width = width;
                    node.height = height;
                    pipeline.move_elevated(&node.id, node.top, node.left, TREEMAP, deepness);
                } else {
                    node.hide(models);
                    hidden += 1;
                }
            }
            match direction {
                SliceDirection::Horizontal => left += length,
                SliceDirection::Vertical => top += length,
            }
        }
        hidden
    }
}

/// Area and color bounds sampled from the visible nodes.
#[derive(Debug, Clone, Copy)]
struct ColorRange {
    min: f64,
    max: f64,
}

/// Squarified, optionally nested, treemap.
pub struct TreeMapLayout {
    config: TreeMapConfig,
    state: TreeMapState,
    /// Color attribute of the previous pass, to detect color coding being
    /// switched off.
    prev_color: Option<String>,
    /// Models hidden by the last pass.
    num_hidden: usize,
    dependents: HashMap<ModelId, Vec<ModelId>>,
}

impl TreeMapLayout {
    pub fn new(config: TreeMapConfig) -> Self {
        Self {
            config,
            state: TreeMapState::default(),
            prev_color: None,
            num_hidden: 0,
            dependents: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(TreeMapConfig::default())
    }

    fn area_key<'m>(&'m self, meta: &'m Metamodel) -> Option<&'m str> {
        self.state
            .area
            .as_deref()
            .or_else(|| meta.numeric_keys().first().copied())
    }

    // =========================================================================
    // Areas
    // =========================================================================

    /// Leaves take their area from the model; inner nodes sum their children.
    fn compute_nested_areas(
        forest: &mut Forest,
        models: &ModelGraph,
        node: NodeIndex,
        key: &str,
    ) -> f64 {
        let children = forest.children(node);
        let area = if children.is_empty() {
            forest
                .model_id(node)
                .and_then(|id| models.get(id))
                .and_then(|m| m.numeric_attr(key))
                .filter(|a| a.is_finite() && *a >= 0.0)
                .unwrap_or(0.0)
        } else {
            children
                .into_iter()
                .map(|child| Self::compute_nested_areas(forest, models, child, key))
                .sum()
        };
        forest.node_mut(node).area = area;
        area
    }

    // =========================================================================
    // Slicing
    // =========================================================================

    /// Arranges the children of `parent` into slices covering `bounds`.
    fn layout_flat(
        forest: &Forest,
        models: &mut ModelGraph,
        mut bounds: Dimensions,
        parent: NodeIndex,
    ) -> Vec<TreeMapSlice> {
        let mut children = forest.children(parent);
        if children.is_empty() {
            return Vec::new();
        }

        let total: f64 = children.iter().map(|&c| forest.node(c).area).sum();
        let ratio = if total > 0.0 { bounds.area() / total } else { 0.0 };

        children.sort_by(|&a, &b| {
            forest
                .node(b)
                .area
                .partial_cmp(&forest.node(a).area)
                .unwrap_or(Ordering::Equal)
                .then_with(|| forest.model_id(a).cmp(&forest.model_id(b)))
        });

        let mut current = if bounds.width < bounds.height {
            TreeMapSlice::new(bounds.width, SliceDirection::Horizontal, Position::default())
        } else {
            TreeMapSlice::new(bounds.height, SliceDirection::Vertical, Position::default())
        };
        let mut slices = Vec::new();

        for (i, child) in children.into_iter().enumerate() {
            let Some(id) = forest.model_id(child) else {
                continue;
            };
            let mut node = TreeMapNode::new(child, id.clone(), forest.node(child).area * ratio);
            if node.area <= 0.0 {
                node.hide(models);
                current.add(node);
                continue;
            }

            if i > 0 && current.aspect_ratio(Some(node.area)) > current.aspect_ratio(None) {
                let span = current.span(None);
                let anchor = current.anchor;
                let next = match current.direction {
                    SliceDirection::Horizontal => {
                        bounds.height -= span;
                        TreeMapSlice::new(
                            bounds.height,
                            SliceDirection::Vertical,
                            Position::new(anchor.top + span, anchor.left),
                        )
                    }
                    SliceDirection::Vertical => {
                        bounds.width -= span;
                        TreeMapSlice::new(
                            bounds.width,
                            SliceDirection::Horizontal,
                            Position::new(anchor.top, anchor.left + span),
                        )
                    }
                };
                slices.push(std::mem::replace(&mut current, next));
            }
            current.add(node);
        }
        slices.push(current);
        slices
    }

    /// Lays out one level and recurses into every node. Returns how many
    /// models were hidden.
    fn layout_nested(
        &self,
        pipeline: &mut RenderingPipeline,
        models: &mut ModelGraph,
        forest: &Forest,
        bounds: Dimensions,
        parent: NodeIndex,
        delta: Position,
        deepness: i32,
    ) -> usize {
        if forest.is_leaf(parent) {
            return 0;
        }
        let mut hidden = 0;
        for mut slice in Self::layout_flat(forest, models, bounds, parent) {
            hidden += slice.draw(pipeline, models, delta, deepness);
            for node in &slice.nodes {
                hidden += self.layout_nested(
                    pipeline,
                    models,
                    forest,
                    node.nested_bounds(&self.config),
                    node.node,
                    node.nested_anchor(&self.config),
                    deepness + 1,
                );
            }
        }
        hidden
    }

    // =========================================================================
    // Coloring
    // =========================================================================

    fn is_hidden(forest: &Forest, models: &ModelGraph, node: NodeIndex) -> bool {
        forest
            .model_id(node)
            .and_then(|id| models.get(id))
            .is_some_and(|m| m.is_filtered(Some(TREEMAP)))
    }

    fn color_value(forest: &Forest, models: &ModelGraph, node: NodeIndex, key: &str) -> Option<f64> {
        forest
            .model_id(node)
            .and_then(|id| models.get(id))
            .and_then(|m| m.numeric_attr(key))
            .filter(|v| v.is_finite())
    }

    /// Samples visible leaves, and visible nodes whose children are all
    /// hidden. Returns whether `node` is visible.
    fn sample_colors(
        forest: &Forest,
        models: &ModelGraph,
        node: NodeIndex,
        key: &str,
        range: &mut ColorRange,
    ) -> bool {
        if node != forest.root() && Self::is_hidden(forest, models, node) {
            return false;
        }
        let mut visible_children = false;
        for child in forest.children(node) {
            visible_children |= Self::sample_colors(forest, models, child, key, range);
        }
        if !visible_children {
            if let Some(value) = Self::color_value(forest, models, node, key) {
                range.min = range.min.min(value);
                range.max = range.max.max(value);
            }
        }
        true
    }

    fn color_tree(
        &self,
        pipeline: &mut RenderingPipeline,
        forest: &Forest,
        models: &ModelGraph,
        node: NodeIndex,
        key: &str,
        range: ColorRange,
    ) -> bool {
        if node != forest.root() && Self::is_hidden(forest, models, node) {
            return false;
        }
        let mut visible_children = false;
        for child in forest.children(node) {
            visible_children |= self.color_tree(pipeline, forest, models, child, key, range);
        }
        if let Some(id) = forest.model_id(node) {
            if visible_children {
                pipeline.style(id, Some(self.config.group_color.to_css()));
            } else if let Some(value) = Self::color_value(forest, models, node, key) {
                let ratio = (value - range.min) / (range.max - range.min);
                let color = self.config.color_min.lerp(&self.config.color_max, ratio);
                pipeline.style(id, Some(color.to_css()));
            }
        }
        true
    }
}

impl LayoutEngine for TreeMapLayout {
    fn name(&self) -> &'static str {
        "treemap"
    }

    fn verify_metamodel(&self, meta: &Metamodel) -> bool {
        !meta.numeric_keys().is_empty()
    }

    fn layout(&mut self, pass: &mut LayoutPass<'_>) -> LayoutResult<bool> {
        let meta = pass.meta;
        let Some(area_key) = self.area_key(meta).map(str::to_owned) else {
            error!("no numeric attribute available for treemap areas");
            return Err(LayoutError::UnknownAttribute(String::new()));
        };
        let color_key = self.state.color.clone();
        let parent_key = self.state.parent_key.clone();

        // models that left the treemap get their original rendering back
        let survivors: HashSet<ModelId> = pass.visible.iter().cloned().collect();
        let style_reset = self.prev_color.is_some() && color_key.is_none();
        pass.pipeline
            .backups_mut()
            .restore(pass.models, &survivors, style_reset);
        self.prev_color = color_key.clone();

        if pass.pipeline.renderer().caps().expandable {
            for id in pass.visible {
                if let Some(model) = pass.models.get_mut(id) {
                    if model.rendering().is_expanded() {
                        model.rendering_mut().set_expanded(false);
                    }
                }
            }
        }

        self.dependents.clear();
        let mut forest = match parent_key.as_deref() {
            Some(key) => {
                let forest = TreeBuilder::new(key).build(pass.visible, pass.models)?;
                self.dependents = forest.dependents_index();
                forest
            }
            None => Forest::flat(pass.visible),
        };
        info!(
            area = %area_key,
            color = color_key.as_deref().unwrap_or("-"),
            nested = parent_key.is_some(),
            "laying out treemap"
        );

        let root = forest.root();
        Self::compute_nested_areas(&mut forest, pass.models, root, &area_key);

        let bounds = Dimensions::new(pass.container.width, pass.container.height);
        self.num_hidden = self.layout_nested(
            pass.pipeline,
            pass.models,
            &forest,
            bounds,
            root,
            Position::default(),
            0,
        );

        if let Some(key) = color_key.as_deref() {
            let mut range = ColorRange {
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
            };
            Self::sample_colors(&forest, pass.models, root, key, &mut range);
            self.color_tree(pass.pipeline, &forest, pass.models, root, key, range);
        }

        debug!(hidden = self.num_hidden, "treemap pass complete");
        Ok(self.num_hidden > 0)
    }

    fn cleanup(&mut self, _same_engine: bool, models: &mut ModelGraph) -> bool {
        if self.num_hidden == 0 {
            return false;
        }
        models.reset_all_filter(TREEMAP);
        self.num_hidden = 0;
        true
    }

    fn state(&self) -> Value {
        state_value(&self.state)
    }

    fn set_state(&mut self, state: Option<&Value>, meta: &Metamodel) -> bool {
        let Some(next) = parse_state::<TreeMapState>(state) else {
            return false;
        };
        let numeric = |key: &str| meta.get(key).is_some_and(|attr| attr.kind.is_numeric());
        if next.area.as_deref().is_some_and(|key| !numeric(key))
            || next.color.as_deref().is_some_and(|key| !numeric(key))
            || next.parent_key.as_deref().is_some_and(|key| !meta.contains(key))
        {
            return false;
        }
        self.state = next;
        true
    }

    fn dependent_models(&self, id: &ModelId) -> Vec<ModelId> {
        self.dependents.get(id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::layout::{LayoutBox, LayoutOptions};
    use crate::meta::{AttributeMeta, Kind};
    use crate::model::Rect;
    use crate::render::{RendererCaps, StaticRenderer};
    use proptest::prelude::*;
    use serde_json::json;
    use std::rc::Rc;

    fn meta() -> Metamodel {
        Metamodel::new()
            .with("area", AttributeMeta::new("Area", Kind::Number))
            .with("heat", AttributeMeta::new("Heat", Kind::Number))
            .with("parent", AttributeMeta::new("Parent", Kind::String).parent())
    }

    fn models(records: Vec<Value>) -> ModelGraph {
        ModelGraph::from_values(records, Dimensions::new(30.0, 30.0)).unwrap()
    }

    fn pipeline() -> RenderingPipeline {
        RenderingPipeline::new(PipelineConfig::default(), Rc::new(StaticRenderer::default()))
    }

    /// Runs a pass over the unfiltered models and applies it.
    fn run(
        layout: &mut TreeMapLayout,
        pipeline: &mut RenderingPipeline,
        models: &mut ModelGraph,
        visible: &[ModelId],
        container: LayoutBox,
    ) -> bool {
        let meta = meta();
        let options = LayoutOptions::default();
        let mut pass = LayoutPass {
            pipeline: &mut *pipeline,
            container,
            visible,
            models: &mut *models,
            meta: &meta,
            options: &options,
        };
        let dirty = layout.layout(&mut pass).unwrap();
        pipeline.apply(models);
        dirty
    }

    fn rect(models: &ModelGraph, id: &str) -> Rect {
        models.get(&id.into()).unwrap().rendering().rect()
    }

    #[test]
    fn test_two_equal_areas() {
        let mut layout = TreeMapLayout::with_defaults();
        let mut pipeline = pipeline();
        let mut models = models(vec![json!({"id": 1, "area": 50}), json!({"id": 2, "area": 50})]);
        let visible = models.visible_ids();
        let dirty = run(&mut layout, &mut pipeline, &mut models, &visible, LayoutBox::new(100.0, 50.0));

        assert!(!dirty);
        assert_eq!(rect(&models, "1"), Rect::new(0.0, 0.0, 50.0, 50.0));
        assert_eq!(rect(&models, "2"), Rect::new(0.0, 50.0, 50.0, 50.0));
        assert!(models.iter().all(|m| !m.is_filtered(Some(TREEMAP))));
    }

    #[test]
    fn test_nested_children_inside_parent() {
        let mut layout = TreeMapLayout::with_defaults();
        assert!(layout.set_state(Some(&json!({"area": "area", "parentKey": "parent"})), &meta()));
        let mut pipeline = pipeline();
        let mut models = models(vec![
            json!({"id": "P"}),
            json!({"id": "Q", "area": 40}),
            json!({"id": "c1", "parent": "P", "area": 30}),
            json!({"id": "c2", "parent": "P", "area": 10}),
        ]);
        let visible = models.visible_ids();
        run(&mut layout, &mut pipeline, &mut models, &visible, LayoutBox::new(200.0, 100.0));

        assert_eq!(rect(&models, "P"), Rect::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(rect(&models, "Q"), Rect::new(0.0, 100.0, 100.0, 100.0));
        // P's interior starts 2px in and 15px below its header
        assert_eq!(rect(&models, "c1"), Rect::new(17.0, 2.0, 72.0, 81.0));
        assert_eq!(rect(&models, "c2"), Rect::new(17.0, 74.0, 24.0, 81.0));

        let c1 = models.get(&"c1".into()).unwrap().rendering();
        let p = models.get(&"P".into()).unwrap().rendering();
        assert!(c1.elevation().top() > p.elevation().top());

        let mut deps = layout.dependent_models(&"P".into());
        deps.sort();
        assert_eq!(deps, vec![ModelId::from("c1"), ModelId::from("c2")]);
    }

    #[test]
    fn test_tiny_nodes_hidden_until_cleanup() {
        let mut layout = TreeMapLayout::with_defaults();
        let mut pipeline = pipeline();
        let mut models = models(vec![
            json!({"id": "big", "area": 100000}),
            json!({"id": "tiny", "area": 0.001}),
            json!({"id": "none", "area": "n/a"}),
        ]);
        let visible = models.visible_ids();
        let dirty = run(&mut layout, &mut pipeline, &mut models, &visible, LayoutBox::new(100.0, 50.0));

        assert!(dirty);
        assert!(models.get(&"tiny".into()).unwrap().is_filtered(Some(TREEMAP)));
        assert!(models.get(&"none".into()).unwrap().is_filtered(Some(TREEMAP)));
        assert!(!pipeline.backups().has_backup(&"tiny".into()));

        assert!(layout.cleanup(true, &mut models));
        assert!(models.iter().all(|m| !m.is_filtered(None)));
        assert!(!layout.cleanup(true, &mut models));
    }

    #[test]
    fn test_coloring_and_style_reset() {
        let mut layout = TreeMapLayout::with_defaults();
        assert!(layout.set_state(Some(&json!({"area": "area", "color": "heat"})), &meta()));
        let mut pipeline = pipeline();
        let mut models = models(vec![
            json!({"id": "cold", "area": 10, "heat": 0}),
            json!({"id": "hot", "area": 10, "heat": 10}),
        ]);
        let visible = models.visible_ids();
        let container = LayoutBox::new(100.0, 50.0);
        run(&mut layout, &mut pipeline, &mut models, &visible, container);

        let background = |models: &ModelGraph, id: &str| {
            models
                .get(&id.into())
                .unwrap()
                .rendering()
                .background()
                .map(str::to_owned)
        };
        assert_eq!(background(&models, "cold").as_deref(), Some("rgb(237,76,95)"));
        assert_eq!(background(&models, "hot").as_deref(), Some("rgb(122,255,115)"));

        assert!(layout.set_state(Some(&json!({"area": "area"})), &meta()));
        pipeline.cleanup();
        run(&mut layout, &mut pipeline, &mut models, &visible, container);
        assert_eq!(background(&models, "cold"), None);
        // sizes stay treemapped
        assert_eq!(rect(&models, "cold").height, 50.0);
    }

    #[test]
    fn test_models_leaving_treemap_are_restored() {
        let mut layout = TreeMapLayout::with_defaults();
        let mut pipeline = pipeline();
        let mut models = models(vec![json!({"id": "a", "area": 1}), json!({"id": "b", "area": 1})]);
        let visible = models.visible_ids();
        let container = LayoutBox::new(100.0, 50.0);
        run(&mut layout, &mut pipeline, &mut models, &visible, container);
        assert_eq!(rect(&models, "b").width, 50.0);

        pipeline.cleanup();
        run(&mut layout, &mut pipeline, &mut models, &visible[..1], container);
        let b = models.get(&"b".into()).unwrap().rendering();
        assert_eq!(b.dims(), Dimensions::new(30.0, 30.0));
        assert!(!pipeline.backups().has_backup(&"b".into()));
        assert_eq!(rect(&models, "a"), Rect::new(0.0, 0.0, 100.0, 50.0));
    }

    #[test]
    fn test_expanded_models_reverted() {
        let mut layout = TreeMapLayout::with_defaults();
        let caps = RendererCaps {
            expandable: true,
            ..Default::default()
        };
        let mut pipeline =
            RenderingPipeline::new(PipelineConfig::default(), Rc::new(StaticRenderer::new(caps)));
        let mut models = models(vec![json!({"id": "a", "area": 1})]);
        models.get_mut(&"a".into()).unwrap().rendering_mut().set_expanded(true);
        let visible = models.visible_ids();
        run(&mut layout, &mut pipeline, &mut models, &visible, LayoutBox::new(100.0, 50.0));
        assert!(!models.get(&"a".into()).unwrap().rendering().is_expanded());
    }

    #[test]
    fn test_state_validation() {
        let mut layout = TreeMapLayout::with_defaults();
        assert!(!layout.set_state(Some(&json!({"area": "parent"})), &meta()));
        assert!(!layout.set_state(Some(&json!({"color": "missing"})), &meta()));
        assert!(layout.verify_metamodel(&meta()));
        assert!(!layout.verify_metamodel(
            &Metamodel::new().with("name", AttributeMeta::new("Name", Kind::String))
        ));
    }

    proptest! {
        #[test]
        fn prop_area_conservation(
            areas in proptest::collection::vec(0.0f64..1000.0, 1..25),
            width in 50.0f64..600.0,
            height in 50.0f64..600.0,
        ) {
            let (width, height) = (width.round(), height.round());
            let records = areas
                .iter()
                .enumerate()
                .map(|(i, a)| json!({"id": i, "area": a}))
                .collect();
            let mut models = models(records);
            let visible = models.visible_ids();
            let mut layout = TreeMapLayout::with_defaults();
            let mut pipeline = pipeline();
            run(&mut layout, &mut pipeline, &mut models, &visible, LayoutBox::new(width, height));

            let total: f64 = areas.iter().sum();
            let ratio = if total > 0.0 { width * height / total } else { 0.0 };
            let mut drawn = 0.0;
            let mut slack = 0.0;
            for (i, area) in areas.iter().enumerate() {
                let model = models.get(&ModelId::from(i.to_string())).unwrap();
                if model.is_filtered(Some(TREEMAP)) {
                    continue;
                }
                let r = model.rendering().rect();
                let pixels = r.width * r.height;
                // each extent is rounded by at most half a pixel
                let tolerance = 0.5 * (r.width + r.height) + 0.75;
                prop_assert!(
                    (pixels - area * ratio).abs() <= tolerance,
                    "node {} covers {} px, expected {}", i, pixels, area * ratio
                );
                drawn += pixels;
                slack += tolerance;
            }
            prop_assert!(drawn <= width * height + slack);
        }
    }
}
