//! A single visualization: models, metamodel, filters and layouts.
//!
//! The project is the target of state transitions. Host operations return the
//! facet value to record; transitions arriving from other binders are applied
//! through [`StateTarget`] and their render batches accumulate until the host
//! takes them.

use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::mem;
use std::rc::Rc;
use tracing::{debug, info, warn};

use crate::config::Options;
use crate::error::{LayoutError, LayoutResult, LoadError};
use crate::layout::{LayoutBox, LayoutManager, LayoutOptions, LayoutRequest, state_value};
use crate::meta::{Filterable, Metamodel};
use crate::model::{Dimensions, ModelGraph, ModelId};
use crate::render::{RenderBatch, Renderer};
use crate::state::{Facet, LayoutFacet, StateTarget};

/// Filter key hiding the models left out of a selection focus.
pub const SELECTION_FILTER: &str = "__selection__";

/// Outcome of a host-requested layout.
#[derive(Debug, Clone)]
pub struct LayoutChange {
    /// Value of the layout facet to record.
    pub facet_state: Value,
    /// The engine changed, so earlier custom positions no longer apply.
    pub replace: bool,
    pub batch: RenderBatch,
}

pub struct Project {
    uuid: String,
    models: ModelGraph,
    meta: Metamodel,
    manager: LayoutManager,
    /// Active attribute filters.
    filters: BTreeMap<String, Value>,
    /// The layout in effect, with the custom positions accumulated for its
    /// engine.
    current: Option<LayoutFacet>,
    /// Changes applied from state transitions, not yet shipped to the host.
    pending: RenderBatch,
}

impl Project {
    pub fn new(
        uuid: impl Into<String>,
        models: ModelGraph,
        meta: Metamodel,
        options: &Options,
        renderer: Rc<dyn Renderer>,
    ) -> Self {
        let manager = LayoutManager::new(options, renderer, &meta);
        let uuid = uuid.into();
        info!(%uuid, models = models.len(), engines = ?manager.engine_names(), "project created");
        Self {
            uuid,
            models,
            meta,
            manager,
            filters: BTreeMap::new(),
            current: None,
            pending: RenderBatch::default(),
        }
    }

    /// Loads raw model records, sized per the options.
    pub fn load(
        uuid: impl Into<String>,
        records: Vec<Value>,
        meta: Metamodel,
        options: &Options,
        renderer: Rc<dyn Renderer>,
    ) -> Result<Self, LoadError> {
        let dims = Dimensions::new(options.model_width, options.model_height);
        let models = ModelGraph::from_values(records, dims)?;
        Ok(Self::new(uuid, models, meta, options, renderer))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn models(&self) -> &ModelGraph {
        &self.models
    }

    pub fn models_mut(&mut self) -> &mut ModelGraph {
        &mut self.models
    }

    pub fn meta(&self) -> &Metamodel {
        &self.meta
    }

    pub fn layout_manager(&self) -> &LayoutManager {
        &self.manager
    }

    pub fn filters(&self) -> &BTreeMap<String, Value> {
        &self.filters
    }

    pub fn set_container(&mut self, container: LayoutBox) {
        self.manager.set_container(container);
    }

    /// Drains the changes applied from state transitions.
    pub fn take_batch(&mut self) -> RenderBatch {
        mem::take(&mut self.pending)
    }

    /// The model plus its dependents in the current layout.
    pub fn extend_selection(&self, id: &ModelId) -> Vec<ModelId> {
        self.manager.extend_selection(id)
    }

    // =========================================================================
    // Host operations
    // =========================================================================

    /// Lays the models out as requested.
    ///
    /// Custom positions given for the engine already in place add to the ones
    /// it has; switching engine drops them.
    pub fn layout(&mut self, request: LayoutRequest) -> LayoutResult<LayoutChange> {
        self.apply_layout(request, true)
    }

    /// Filters models on one attribute. A `null` value removes the filter.
    ///
    /// Models are laid out again only if some model changed filter status.
    pub fn filter(&mut self, key: &str, value: &Value) -> LayoutResult<RenderBatch> {
        if self.apply_filter(key, value)? {
            self.relayout()
        } else {
            Ok(RenderBatch::default())
        }
    }

    /// Hides the given models, showing every other. `None` shows all.
    pub fn select_filter(&mut self, hidden: Option<&[ModelId]>) -> LayoutResult<RenderBatch> {
        if self.apply_selection(hidden) {
            self.relayout()
        } else {
            Ok(RenderBatch::default())
        }
    }

    /// The models a focus on `ids` hides.
    pub fn unfocused(&self, ids: &[ModelId]) -> Vec<ModelId> {
        let focused: HashSet<&ModelId> = ids.iter().collect();
        self.models
            .iter()
            .map(|m| m.id())
            .filter(|id| !focused.contains(id))
            .cloned()
            .collect()
    }

    /// Models currently hidden by the selection filter.
    pub fn selection_filter(&self) -> Vec<ModelId> {
        self.models
            .iter()
            .filter(|m| m.is_filtered(Some(SELECTION_FILTER)))
            .map(|m| m.id().clone())
            .collect()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// With `inherit` unset, the request's positions are the complete set, as
    /// when replaying a recorded facet.
    fn apply_layout(
        &mut self,
        mut request: LayoutRequest,
        inherit: bool,
    ) -> LayoutResult<LayoutChange> {
        let previous = self.manager.current_engine();
        self.manager.prepare(&mut request, &self.meta)?;
        let engine = request.engine_name().unwrap_or_default().to_owned();
        let replace = previous.is_some_and(|p| p != engine);

        let mut facet = LayoutFacet {
            engine,
            state: request.state.clone().unwrap_or(Value::Null),
            positions: request.positions.take(),
        };
        if inherit && !replace {
            if let Some(current) = &self.current {
                facet.inherit_positions(current);
            }
        }
        request.positions = facet.positions.clone();

        let batch = self.manager.layout(&request, &mut self.models, &self.meta);
        let facet_state = state_value(&facet);
        self.current = Some(facet);
        Ok(LayoutChange {
            facet_state,
            replace,
            batch,
        })
    }

    fn relayout(&mut self) -> LayoutResult<RenderBatch> {
        let options = LayoutOptions {
            filter: true,
            ..Default::default()
        };
        let positions = self.current.as_ref().and_then(|c| c.positions.clone());
        self.manager
            .force_layout(options, positions, &mut self.models, &self.meta)
    }

    fn apply_filter(&mut self, key: &str, value: &Value) -> LayoutResult<bool> {
        let Some(attr) = self.meta.get(key) else {
            return Err(LayoutError::UnknownAttribute(key.to_owned()));
        };
        if value.is_null() {
            self.filters.remove(key);
            return Ok(self.models.reset_all_filter(key) > 0);
        }

        self.filters.insert(key.to_owned(), value.clone());
        let mut changed = 0;
        for model in self.models.iter_mut() {
            let survives = attr
                .kind
                .survives_filter(value, model.attr(key).unwrap_or(&Value::Null));
            let flipped = if survives {
                model.reset_filter(key)
            } else {
                model.filter(key)
            };
            changed += usize::from(flipped);
        }
        debug!(%key, changed, "filter applied");
        Ok(changed > 0)
    }

    fn apply_selection(&mut self, hidden: Option<&[ModelId]>) -> bool {
        let hidden: HashSet<&ModelId> = hidden.unwrap_or_default().iter().collect();
        for id in &hidden {
            if !self.models.contains(id) {
                warn!(%id, "selection filter names an unknown model");
            }
        }
        let mut changed = false;
        for model in self.models.iter_mut() {
            changed |= if hidden.contains(model.id()) {
                model.filter(SELECTION_FILTER)
            } else {
                model.reset_filter(SELECTION_FILTER)
            };
        }
        changed
    }

    fn apply_selection_facet(&mut self, facet_state: &Value) -> LayoutResult<bool> {
        let hidden: Option<Vec<ModelId>> = serde_json::from_value(facet_state.clone())
            .map_err(|_| LayoutError::InvalidState(Facet::SelectionFilter.to_string()))?;
        Ok(self.apply_selection(hidden.as_deref()))
    }

    fn clear_filters(&mut self) {
        for key in mem::take(&mut self.filters).into_keys() {
            self.models.reset_all_filter(&key);
        }
        self.apply_selection(None);
    }
}

/// The request reproducing a recorded layout facet. `null` selects the default
/// engine in its default state.
fn layout_request(facet_state: &Value) -> LayoutResult<LayoutRequest> {
    if facet_state.is_null() {
        return Ok(LayoutRequest {
            engine: Some(None),
            state: Some(Value::Null),
            ..Default::default()
        });
    }
    let facet: LayoutFacet = serde_json::from_value(facet_state.clone())
        .map_err(|_| LayoutError::InvalidState(Facet::Layout.to_string()))?;
    Ok(LayoutRequest {
        engine: Some(Some(facet.engine)),
        state: Some(facet.state),
        positions: facet.positions,
        ..Default::default()
    })
}

impl StateTarget for Project {
    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn state_changed(&mut self, facet: &Facet, facet_state: &Value) {
        let outcome = match facet {
            Facet::Layout => layout_request(facet_state)
                .and_then(|request| self.apply_layout(request, false))
                .map(|change| change.batch),
            Facet::SelectionFilter => match self.apply_selection_facet(facet_state) {
                Ok(true) => self.relayout(),
                Ok(false) => Ok(RenderBatch::default()),
                Err(err) => Err(err),
            },
            Facet::Filter(key) if !self.meta.contains(key) => {
                // Historical states may reference attributes this session lacks.
                warn!(uuid = %self.uuid, %key, "ignoring filter on unknown attribute");
                return;
            }
            Facet::Filter(key) => self.filter(key, facet_state),
        };
        match outcome {
            Ok(batch) => self.pending.merge(batch),
            Err(err) => warn!(uuid = %self.uuid, %facet, %err, "state change not applied"),
        }
    }

    fn set_state(&mut self, facets: Option<&BTreeMap<Facet, Value>>) {
        self.clear_filters();
        let empty = BTreeMap::new();
        let facets = facets.unwrap_or(&empty);

        for (facet, facet_state) in facets {
            let applied = match facet {
                Facet::Layout => continue,
                Facet::SelectionFilter => self.apply_selection_facet(facet_state).map(|_| ()),
                Facet::Filter(key) => self.apply_filter(key, facet_state).map(|_| ()),
            };
            if let Err(err) = applied {
                warn!(uuid = %self.uuid, %facet, %err, "ignoring facet of restored state");
            }
        }

        let layout = facets.get(&Facet::Layout).unwrap_or(&Value::Null);
        let outcome = layout_request(layout).and_then(|mut request| {
            request.options.force_align = true;
            self.apply_layout(request, false)
        });
        match outcome {
            Ok(change) => self.pending.merge(change.batch),
            Err(err) => warn!(uuid = %self.uuid, %err, "restored layout not applied"),
        }
    }
}
