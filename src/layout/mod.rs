//! Layout engines.
//!
//! A layout engine computes positions (and, for the treemap, sizes and
//! colors) for the visible models. Engines never mutate renderings directly:
//! they queue operations on the shared [`RenderingPipeline`], which the
//! [`LayoutManager`] applies once the pass completes.
//!
//! # Engines
//!
//! | name       | engine            | hierarchy |
//! |------------|-------------------|-----------|
//! | `flow`     | [`FlowLayout`]    | no        |
//! | `scramble` | [`ScrambleLayout`]| no        |
//! | `bucket`   | [`BucketLayout`]  | no        |
//! | `tree`     | [`TreeLayout`]    | yes       |
//! | `treemap`  | [`TreeMapLayout`] | optional  |

pub mod bucket;
pub mod flow;
pub mod manager;
pub mod scramble;
pub mod tree;
pub mod tree_builder;
pub mod treemap;

pub use bucket::BucketLayout;
pub use flow::FlowLayout;
pub use manager::{LayoutManager, LayoutRequest, ManualPosition};
pub use scramble::ScrambleLayout;
pub use tree::TreeLayout;
pub use tree_builder::{Forest, TreeBuilder, TreeNode};
pub use treemap::TreeMapLayout;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LayoutResult;
use crate::meta::Metamodel;
use crate::model::{ModelGraph, ModelId};
use crate::render::RenderingPipeline;

/// The container available to a layout pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutBox {
    pub width: f64,
    pub height: f64,
}

impl LayoutBox {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Per-request flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutOptions {
    /// The pass was triggered by a filter change.
    pub filter: bool,
    /// Align rendering visibility with filters even if the pass was clean.
    #[serde(alias = "forcealign")]
    pub force_align: bool,
}

/// Everything a single layout pass operates on.
pub struct LayoutPass<'a> {
    pub pipeline: &'a mut RenderingPipeline,
    pub container: LayoutBox,
    /// Models available for layout, in load order.
    pub visible: &'a [ModelId],
    pub models: &'a mut ModelGraph,
    pub meta: &'a Metamodel,
    pub options: &'a LayoutOptions,
}

/// A layout algorithm.
pub trait LayoutEngine {
    /// Registry name, e.g. `flow`.
    fn name(&self) -> &'static str;

    /// Whether the engine can work with the given metamodel. Engines that
    /// cannot are not registered.
    fn verify_metamodel(&self, _meta: &Metamodel) -> bool {
        true
    }

    /// Runs one pass. Returns whether model filter state was changed and
    /// rendering visibility must be realigned.
    fn layout(&mut self, pass: &mut LayoutPass<'_>) -> LayoutResult<bool>;

    /// Undoes engine-specific effects before the next pass. `same_engine` is
    /// set when the next pass uses this same engine. Returns whether
    /// visibility must be realigned.
    fn cleanup(&mut self, _same_engine: bool, _models: &mut ModelGraph) -> bool {
        false
    }

    /// Serializable engine state.
    fn state(&self) -> Value {
        Value::Null
    }

    /// Replaces the engine state. `None` restores the default. Returns
    /// `false`, leaving the current state untouched, if the state is invalid.
    fn set_state(&mut self, _state: Option<&Value>, _meta: &Metamodel) -> bool {
        true
    }

    /// Models that depend on the given one (e.g. its tree descendants).
    fn dependent_models(&self, _id: &ModelId) -> Vec<ModelId> {
        Vec::new()
    }
}

/// Deserializes an engine state, treating `None` as the default state.
pub(crate) fn parse_state<T>(state: Option<&Value>) -> Option<T>
where
    T: Default + for<'de> Deserialize<'de>,
{
    match state {
        None | Some(Value::Null) => Some(T::default()),
        Some(value) => serde_json::from_value(value.clone()).ok(),
    }
}

/// Serializes an engine state, falling back to `null`.
pub(crate) fn state_value<T: Serialize>(state: &T) -> Value {
    serde_json::to_value(state).unwrap_or(Value::Null)
}
