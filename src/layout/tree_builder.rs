//! Builds a forest out of parent references.
//!
//! Models reference their parent through an attribute holding the parent's id.
//! [`TreeBuilder`] turns the visible models into a forest hanging off a
//! synthetic root, skipping over filtered ancestors: the effective parent of a
//! model is its nearest unfiltered ancestor.
//!
//! Cycles are detected while walking upward and abort the build. A cycle that
//! runs only through filtered models is reported separately as a hidden cycle.
//! A model whose parent attribute references itself is a root.

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::{LayoutError, LayoutResult};
use crate::model::{ModelGraph, ModelId};

/// A node of the forest. Built fresh on every layout pass.
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// The wrapped model; absent only for the synthetic root.
    pub model: Option<ModelId>,
    /// Position in the visible sequence, used to order siblings.
    order: usize,
    traversed: bool,
    /// Area cached by the treemap layout.
    pub area: f64,
}

impl TreeNode {
    fn new(model: Option<ModelId>, order: usize) -> Self {
        Self {
            model,
            order,
            traversed: false,
            area: 0.0,
        }
    }
}

/// The output of [`TreeBuilder::build`].
pub struct Forest {
    graph: StableDiGraph<TreeNode, ()>,
    root: NodeIndex,
    index: HashMap<ModelId, NodeIndex>,
}

impl Forest {
    /// A forest with no hierarchy: every model is a top-level root.
    pub fn flat(visible: &[ModelId]) -> Self {
        let mut graph = StableDiGraph::with_capacity(visible.len() + 1, visible.len());
        let root = graph.add_node(TreeNode::new(None, usize::MAX));
        let mut index = HashMap::with_capacity(visible.len());
        for (order, id) in visible.iter().enumerate() {
            if index.contains_key(id) {
                continue;
            }
            let node = graph.add_node(TreeNode::new(Some(id.clone()), order));
            graph.add_edge(root, node, ());
            index.insert(id.clone(), node);
        }
        Self { graph, root, index }
    }

    /// The synthetic root. Its children are the top-level roots.
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// Top-level roots, in visible order.
    pub fn roots(&self) -> Vec<NodeIndex> {
        self.children(self.root)
    }

    /// Children of a node, in visible order.
    pub fn children(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(node, Direction::Outgoing)
            .collect();
        children.sort_by_key(|&child| self.graph[child].order);
        children
    }

    pub fn is_leaf(&self, node: NodeIndex) -> bool {
        self.graph
            .neighbors_directed(node, Direction::Outgoing)
            .next()
            .is_none()
    }

    pub fn node(&self, node: NodeIndex) -> &TreeNode {
        &self.graph[node]
    }

    pub fn node_mut(&mut self, node: NodeIndex) -> &mut TreeNode {
        &mut self.graph[node]
    }

    /// The model wrapped by a node. The synthetic root has none.
    pub fn model_id(&self, node: NodeIndex) -> Option<&ModelId> {
        self.graph[node].model.as_ref()
    }

    pub fn index_of(&self, id: &ModelId) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    /// Number of model nodes (the synthetic root excluded).
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Every model in the subtree below a node, the node itself excluded.
    pub fn descendants(&self, node: NodeIndex) -> Vec<ModelId> {
        let mut out = Vec::new();
        let mut stack = self.children(node);
        stack.reverse();
        while let Some(next) = stack.pop() {
            if let Some(id) = self.model_id(next) {
                out.push(id.clone());
            }
            let mut children = self.children(next);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Id to descendants map for every model in the forest.
    pub fn dependents_index(&self) -> HashMap<ModelId, Vec<ModelId>> {
        self.index
            .iter()
            .map(|(id, &node)| (id.clone(), self.descendants(node)))
            .collect()
    }
}

/// Converts a flat list of models into a [`Forest`].
pub struct TreeBuilder<'a> {
    parent_key: &'a str,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(parent_key: &'a str) -> Self {
        Self { parent_key }
    }

    /// Builds the forest of the `visible` models. `models` is the full model
    /// graph, used to walk through filtered ancestors.
    pub fn build(&self, visible: &[ModelId], models: &ModelGraph) -> LayoutResult<Forest> {
        let mut graph = StableDiGraph::with_capacity(visible.len() + 1, visible.len());
        let root = graph.add_node(TreeNode::new(None, usize::MAX));
        let mut index = HashMap::with_capacity(visible.len());
        for (order, id) in visible.iter().enumerate() {
            if !index.contains_key(id) {
                let node = graph.add_node(TreeNode::new(Some(id.clone()), order));
                index.insert(id.clone(), node);
            }
        }

        for id in visible {
            if graph[index[id]].traversed {
                continue;
            }
            let mut seen: HashSet<&ModelId> = HashSet::new();
            let mut current = id;
            loop {
                if !seen.insert(current) {
                    return Err(LayoutError::Cycle { hidden: false });
                }
                let current_node = index[current];
                graph[current_node].traversed = true;

                match self.first_visible_parent(current, models, &index)? {
                    Some(parent) => {
                        let parent_node = index[parent];
                        // an ancestor chain finished by an earlier walk is
                        // already known to be acyclic
                        let known = graph[parent_node].traversed && !seen.contains(parent);
                        graph.update_edge(parent_node, current_node, ());
                        if known {
                            break;
                        }
                        current = parent;
                    }
                    None => {
                        graph.update_edge(root, current_node, ());
                        break;
                    }
                }
            }
        }

        debug!(
            nodes = index.len(),
            roots = graph.neighbors_directed(root, Direction::Outgoing).count(),
            parent_key = self.parent_key,
            "built tree"
        );
        Ok(Forest { graph, root, index })
    }

    fn parent_of(&self, id: &ModelId, models: &ModelGraph) -> Option<ModelId> {
        let parent = models
            .get(id)?
            .attr(self.parent_key)
            .and_then(ModelId::from_value)?;
        (parent != *id).then_some(parent)
    }

    /// Walks up from `child` to the nearest ancestor that takes part in the
    /// layout.
    fn first_visible_parent<'i>(
        &self,
        child: &ModelId,
        models: &ModelGraph,
        index: &'i HashMap<ModelId, NodeIndex>,
    ) -> LayoutResult<Option<&'i ModelId>> {
        let Some(mut candidate) = self.parent_of(child, models) else {
            return Ok(None);
        };
        let mut seen: HashSet<ModelId> = HashSet::new();
        loop {
            if let Some((id, _)) = index.get_key_value(&candidate) {
                return Ok(Some(id));
            }
            if !models.contains(&candidate) {
                return Ok(None);
            }
            let Some(next) = self.parent_of(&candidate, models) else {
                return Ok(None);
            };
            if !seen.insert(candidate) {
                return Err(LayoutError::Cycle { hidden: true });
            }
            candidate = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Dimensions;
    use proptest::prelude::*;
    use serde_json::{Value, json};

    fn graph(records: Vec<Value>) -> ModelGraph {
        ModelGraph::from_values(records, Dimensions::new(10.0, 10.0)).unwrap()
    }

    fn ids(raw: &[&str]) -> Vec<ModelId> {
        raw.iter().map(|&s| ModelId::from(s)).collect()
    }

    #[test]
    fn test_simple_forest() {
        let models = graph(vec![
            json!({"id": "a", "parent": null}),
            json!({"id": "b", "parent": "a"}),
            json!({"id": "c", "parent": "a"}),
            json!({"id": "d", "parent": "c"}),
            json!({"id": "e"}),
        ]);
        let visible = models.visible_ids();
        let forest = TreeBuilder::new("parent").build(&visible, &models).unwrap();

        let roots: Vec<_> = forest
            .roots()
            .into_iter()
            .filter_map(|n| forest.model_id(n).cloned())
            .collect();
        assert_eq!(roots, ids(&["a", "e"]));

        let a = forest.index_of(&"a".into()).unwrap();
        assert_eq!(forest.descendants(a), ids(&["b", "c", "d"]));
        assert!(forest.is_leaf(forest.index_of(&"d".into()).unwrap()));
        assert_eq!(forest.len(), 5);
    }

    #[test]
    fn test_visible_cycle() {
        let models = graph(vec![
            json!({"id": "a", "parent": "c"}),
            json!({"id": "b", "parent": "a"}),
            json!({"id": "c", "parent": "b"}),
        ]);
        let err = TreeBuilder::new("parent")
            .build(&models.visible_ids(), &models)
            .err()
            .unwrap();
        assert_eq!(err, LayoutError::Cycle { hidden: false });
    }

    #[test]
    fn test_hidden_cycle() {
        let mut models = graph(vec![
            json!({"id": "v", "parent": "h1"}),
            json!({"id": "h1", "parent": "h2"}),
            json!({"id": "h2", "parent": "h1"}),
        ]);
        models.get_mut(&"h1".into()).unwrap().filter("f");
        models.get_mut(&"h2".into()).unwrap().filter("f");
        let err = TreeBuilder::new("parent")
            .build(&models.visible_ids(), &models)
            .err()
            .unwrap();
        assert_eq!(err, LayoutError::Cycle { hidden: true });
    }

    #[test]
    fn test_filtered_ancestors_are_skipped() {
        let mut models = graph(vec![
            json!({"id": "a"}),
            json!({"id": "b", "parent": "a"}),
            json!({"id": "c", "parent": "b"}),
        ]);
        models.get_mut(&"b".into()).unwrap().filter("f");
        let forest = TreeBuilder::new("parent")
            .build(&models.visible_ids(), &models)
            .unwrap();
        let a = forest.index_of(&"a".into()).unwrap();
        assert_eq!(forest.descendants(a), ids(&["c"]));
    }

    #[test]
    fn test_self_parent_is_root() {
        let models = graph(vec![json!({"id": "a", "parent": "a"}), json!({"id": "b", "parent": "a"})]);
        let forest = TreeBuilder::new("parent")
            .build(&models.visible_ids(), &models)
            .unwrap();
        assert_eq!(forest.roots().len(), 1);
        let a = forest.index_of(&"a".into()).unwrap();
        assert_eq!(forest.descendants(a), ids(&["b"]));
    }

    #[test]
    fn test_dangling_parent_is_root() {
        let models = graph(vec![json!({"id": "a", "parent": "missing"})]);
        let forest = TreeBuilder::new("parent")
            .build(&models.visible_ids(), &models)
            .unwrap();
        assert_eq!(forest.roots().len(), 1);
    }

    /// Reference check: does the upward chain of any visible model loop?
    fn has_cycle(parents: &[Option<usize>], visible: &[usize]) -> bool {
        visible.iter().any(|&start| {
            let mut seen = HashSet::new();
            let mut cur = start;
            loop {
                if !seen.insert(cur) {
                    return true;
                }
                match parents[cur] {
                    Some(p) if p != cur => cur = p,
                    _ => return false,
                }
            }
        })
    }

    proptest! {
        #[test]
        fn prop_cycles_always_detected(
            parents in proptest::collection::vec(proptest::option::of(0usize..8), 1..8),
            hidden_mask in proptest::collection::vec(any::<bool>(), 8),
        ) {
            let n = parents.len();
            let parents: Vec<Option<usize>> =
                parents.into_iter().map(|p| p.filter(|&p| p < n)).collect();
            let records = parents
                .iter()
                .enumerate()
                .map(|(i, p)| json!({"id": i.to_string(), "parent": p.map(|p| p.to_string())}))
                .collect();
            let mut models = graph(records);
            for i in 0..n {
                if hidden_mask[i] {
                    models.get_mut(&ModelId::from(i.to_string())).unwrap().filter("f");
                }
            }
            let visible_idx: Vec<usize> = (0..n).filter(|&i| !hidden_mask[i]).collect();
            let result = TreeBuilder::new("parent").build(&models.visible_ids(), &models);

            prop_assert_eq!(result.is_err(), has_cycle(&parents, &visible_idx));
            if let Ok(forest) = result {
                // every visible model appears exactly once below the root
                let mut all = forest.descendants(forest.root());
                all.sort();
                all.dedup();
                prop_assert_eq!(all.len(), visible_idx.len());
            }
        }
    }
}
