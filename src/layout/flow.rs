//! Flow layout: left-to-right rows.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::{LayoutEngine, LayoutPass, parse_state, state_value};
use crate::config::FlowConfig;
use crate::error::LayoutResult;
use crate::meta::{Metamodel, sort_by};
use crate::model::{ModelGraph, ModelId};
use crate::render::RenderingPipeline;

/// Sort settings of the flow layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowState {
    /// Attribute to sort by. Unsorted (load order) when unset.
    pub order: Option<String>,
    pub reverse: bool,
}

/// Packs renderings in rows, wrapping when the container width is exceeded.
///
/// The cursor persists across calls so that the bucket layout can run several
/// flows one below the other; [`FlowLayout::reset`] moves it back to the
/// initial offset.
pub struct FlowLayout {
    config: FlowConfig,
    state: FlowState,
    pub(crate) top: f64,
    pub(crate) left: f64,
}

impl FlowLayout {
    pub fn new(config: FlowConfig) -> Self {
        let (top, left) = (config.offset, config.offset);
        Self {
            config,
            state: FlowState::default(),
            top,
            left,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(FlowConfig::default())
    }

    /// Moves the cursor back to the initial offset.
    pub fn reset(&mut self) {
        self.top = self.config.offset;
        self.left = self.config.offset;
    }

    /// Moves the cursor to the start of a new row, `gap` below the last one.
    pub(crate) fn new_row(&mut self, gap: f64) {
        self.top += gap;
        self.left = self.config.offset;
    }

    pub(crate) fn offset(&self) -> f64 {
        self.config.offset
    }

    /// Sorts `ids` in place on an attribute. Unknown attributes leave the
    /// order untouched.
    pub(crate) fn sort(
        ids: &mut [ModelId],
        models: &ModelGraph,
        meta: &Metamodel,
        key: &str,
        reverse: bool,
    ) {
        let Some(attr) = meta.get(key) else {
            warn!(key, "sort attribute does not match any metamodel property");
            return;
        };
        ids.sort_by(|a, b| match (models.get(a), models.get(b)) {
            (Some(a), Some(b)) => sort_by(key, &attr.kind, a, b, reverse),
            _ => std::cmp::Ordering::Equal,
        });
    }

    /// Queues moves for `ids`, in order, starting at the current cursor.
    pub(crate) fn flow(
        &mut self,
        pipeline: &mut RenderingPipeline,
        ids: &[ModelId],
        models: &ModelGraph,
        max_width: f64,
    ) {
        let spacing = self.config.spacing;
        let mut line_height: f64 = 0.0;
        for id in ids {
            let Some(model) = models.get(id) else {
                continue;
            };
            let dims = model.rendering().dims();
            line_height = line_height.max(dims.height);

            if self.left + dims.width > max_width {
                self.left = self.config.offset;
                self.top += line_height + spacing;
                line_height = dims.height;
            }

            pipeline.move_to(id, self.top, self.left);
            self.left += dims.width + spacing;
        }
        self.top += line_height;
    }
}

impl LayoutEngine for FlowLayout {
    fn name(&self) -> &'static str {
        "flow"
    }

    fn layout(&mut self, pass: &mut LayoutPass<'_>) -> LayoutResult<bool> {
        let mut ids = pass.visible.to_vec();
        if let Some(order) = self.state.order.as_deref() {
            info!(order, reverse = self.state.reverse, "sorting flow layout");
            Self::sort(&mut ids, pass.models, pass.meta, order, self.state.reverse);
        }
        self.flow(pass.pipeline, &ids, pass.models, pass.container.width);
        Ok(false)
    }

    fn cleanup(&mut self, _same_engine: bool, _models: &mut ModelGraph) -> bool {
        self.reset();
        false
    }

    fn state(&self) -> Value {
        state_value(&self.state)
    }

    fn set_state(&mut self, state: Option<&Value>, meta: &Metamodel) -> bool {
        let Some(next) = parse_state::<FlowState>(state) else {
            return false;
        };
        if next.order.as_deref().is_some_and(|key| !meta.contains(key)) {
            return false;
        }
        self.state = next;
        true
    }
}
