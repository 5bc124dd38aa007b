//! Engine registry and layout pass driver.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::rc::Rc;
use tracing::{debug, error, info, warn};

use super::{
    BucketLayout, FlowLayout, LayoutBox, LayoutEngine, LayoutOptions, LayoutPass,
    ScrambleLayout, TreeLayout, TreeMapLayout,
};
use crate::config::Options;
use crate::error::{LayoutError, LayoutResult};
use crate::meta::Metamodel;
use crate::model::{ModelGraph, ModelId};
use crate::render::{RenderBatch, Renderer, RenderingPipeline};

/// An explicit position for one model, overriding the computed layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualPosition {
    pub id: ModelId,
    pub top: f64,
    pub left: f64,
}

/// A layout request.
///
/// `engine` and `state` distinguish absence from an explicit `null`: an
/// absent engine keeps the current one and `null` selects the default one; an
/// absent state keeps the engine's current state and `null` resets it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutRequest {
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub engine: Option<Option<String>>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    pub options: LayoutOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positions: Option<Vec<ManualPosition>>,
}

impl LayoutRequest {
    pub fn engine(name: impl Into<String>) -> Self {
        Self {
            engine: Some(Some(name.into())),
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_options(mut self, options: LayoutOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_positions(mut self, positions: Vec<ManualPosition>) -> Self {
        self.positions = Some(positions);
        self
    }

    /// The engine name, once resolved by [`LayoutManager::prepare`].
    pub fn engine_name(&self) -> Option<&str> {
        self.engine.as_ref().and_then(|e| e.as_deref())
    }
}

/// Marks a field as present, so that an explicit `null` survives as
/// `Some(null)` while a missing field stays `None` through `default`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Owns the layout engines and the rendering pipeline they share.
pub struct LayoutManager {
    engines: Vec<Box<dyn LayoutEngine>>,
    default_engine: String,
    current: Option<usize>,
    pipeline: RenderingPipeline,
    container: LayoutBox,
}

impl LayoutManager {
    /// Creates a manager with every stock engine the metamodel supports.
    pub fn new(options: &Options, renderer: Rc<dyn Renderer>, meta: &Metamodel) -> Self {
        let mut manager = Self::empty(options, renderer);
        manager.register(Box::new(FlowLayout::new(options.flow.clone())), meta);
        manager.register(Box::new(ScrambleLayout::new(options.scramble.clone())), meta);
        manager.register(Box::new(BucketLayout::new(options.bucket.clone())), meta);
        manager.register(Box::new(TreeLayout::new(options.tree.clone())), meta);
        manager.register(Box::new(TreeMapLayout::new(options.treemap.clone())), meta);
        manager
    }

    /// Creates a manager with no engines.
    pub fn empty(options: &Options, renderer: Rc<dyn Renderer>) -> Self {
        Self {
            engines: Vec::new(),
            default_engine: options.layout.clone(),
            current: None,
            pipeline: RenderingPipeline::new(options.pipeline.clone(), renderer),
            container: LayoutBox::default(),
        }
    }

    /// Registers an engine, unless it cannot work with the metamodel. A
    /// previously registered engine with the same name is replaced.
    pub fn register(&mut self, engine: Box<dyn LayoutEngine>, meta: &Metamodel) -> bool {
        if !engine.verify_metamodel(meta) {
            debug!(engine = engine.name(), "engine does not support the metamodel");
            return false;
        }
        match self.index_of(engine.name()) {
            Some(i) => self.engines[i] = engine,
            None => self.engines.push(engine),
        }
        true
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.engines.iter().position(|e| e.name() == name)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Registered engine names, in registration order.
    pub fn engine_names(&self) -> Vec<&'static str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    pub fn current_engine(&self) -> Option<&'static str> {
        self.current.map(|i| self.engines[i].name())
    }

    pub fn engine_state(&self, name: &str) -> Option<Value> {
        self.index_of(name).map(|i| self.engines[i].state())
    }

    pub fn container(&self) -> LayoutBox {
        self.container
    }

    pub fn set_container(&mut self, container: LayoutBox) {
        self.container = container;
    }

    pub fn pipeline(&self) -> &RenderingPipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut RenderingPipeline {
        &mut self.pipeline
    }

    // =========================================================================
    // Layout
    // =========================================================================

    /// Validates a request and resolves its engine and state in place.
    ///
    /// On success the request names its engine and carries the engine's
    /// effective state, which is what gets recorded in history.
    pub fn prepare(&mut self, request: &mut LayoutRequest, meta: &Metamodel) -> LayoutResult<()> {
        let current = self.current_engine().map(str::to_owned);
        let name = match request.engine.take() {
            None => current,
            Some(explicit) => explicit,
        }
        .unwrap_or_else(|| self.default_engine.clone());

        let Some(index) = self.index_of(&name) else {
            return Err(LayoutError::UnknownEngine(name));
        };
        let engine = &mut self.engines[index];
        let state = request.state.take().unwrap_or_else(|| engine.state());
        if !engine.set_state(Some(&state), meta) {
            return Err(LayoutError::InvalidState(name));
        }
        request.state = Some(engine.state());
        request.engine = Some(Some(name));
        Ok(())
    }

    /// Runs a layout pass for a prepared request.
    ///
    /// A failing engine is logged and its pass discarded; the returned batch
    /// then only carries what the cleanup of the previous pass changed.
    pub fn layout(
        &mut self,
        request: &LayoutRequest,
        models: &mut ModelGraph,
        meta: &Metamodel,
    ) -> RenderBatch {
        let name = request.engine_name().unwrap_or(&self.default_engine);
        let Some(index) = self.index_of(name) else {
            error!(engine = name, "layout requested for an unregistered engine");
            return RenderBatch::collect(models, Vec::new(), None);
        };
        let options = &request.options;

        let last = self.current.replace(index);
        let mut dirty = false;
        if let Some(last) = last {
            dirty |= self.engines[last].cleanup(last == index, models);
        }

        self.pipeline.cleanup();
        if last != Some(index) {
            self.pipeline.backups_mut().restore_all(models);
        }

        let visible = models.visible_ids();
        debug!(available = visible.len(), "models available for layout");

        let engine = &mut self.engines[index];
        let mut pass = LayoutPass {
            pipeline: &mut self.pipeline,
            container: self.container,
            visible: &visible,
            models: &mut *models,
            meta,
            options,
        };
        let bounds = match engine.layout(&mut pass) {
            Ok(engine_dirty) => {
                dirty |= engine_dirty;
                self.pipeline.apply(models)
            }
            Err(err) => {
                error!(engine = engine.name(), %err, "layout pass aborted");
                self.pipeline.cleanup();
                None
            }
        };

        if dirty || options.force_align {
            debug!(dirty, force_align = options.force_align, "aligning visibility");
            models.align_visibility();
        }
        if let Some(positions) = &request.positions {
            Self::move_models(positions, models);
        }
        models.rebuild_spatial_index();

        info!(engine = engine.name(), "layout complete");
        RenderBatch::collect(models, self.pipeline.artifacts().to_vec(), bounds)
    }

    /// Re-runs the current engine, realigning visibility. `positions` are the
    /// custom positions still in effect for it.
    pub fn force_layout(
        &mut self,
        options: LayoutOptions,
        positions: Option<Vec<ManualPosition>>,
        models: &mut ModelGraph,
        meta: &Metamodel,
    ) -> LayoutResult<RenderBatch> {
        let mut request = LayoutRequest {
            options: LayoutOptions {
                force_align: true,
                ..options
            },
            positions,
            ..Default::default()
        };
        self.prepare(&mut request, meta)?;
        Ok(self.layout(&request, models, meta))
    }

    fn move_models(positions: &[ManualPosition], models: &mut ModelGraph) {
        for position in positions {
            match models.get_mut(&position.id) {
                Some(model) => model.rendering_mut().move_to(position.top, position.left),
                None => warn!(id = %position.id, "ignoring position of unknown model"),
            }
        }
    }

    /// The model plus every model depending on it in the current layout.
    pub fn extend_selection(&self, id: &ModelId) -> Vec<ModelId> {
        let mut ids = self
            .current
            .map(|i| self.engines[i].dependent_models(id))
            .unwrap_or_default();
        ids.push(id.clone());
        ids
    }
}
