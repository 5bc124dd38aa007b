//! Rhizo Layout - WASM Module
//!
//! This module provides the layout engines, rendering pipeline and state
//! synchronization for Rhizo visualizations. It is compiled to WebAssembly
//! and exposes a JavaScript-friendly API via wasm-bindgen.
//!
//! # Architecture
//!
//! - `model`: Models, their renderings and the model graph
//! - `meta`: Attribute kinds and the metamodel
//! - `layout`: Layout engines (flow, scramble, bucket, tree, treemap) and their manager
//! - `render`: Rendering pipeline, backups and render batches
//! - `spatial`: R-tree spatial indexing for hit testing
//! - `state`: Visualization state, deltas and history sync
//! - `project`: A single visualization tying all of the above together

use js_sys::{Function, Reflect};
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::rc::Rc;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

pub mod config;
pub mod error;
pub mod layout;
pub mod meta;
pub mod model;
pub mod project;
pub mod render;
pub mod spatial;
pub mod state;

use config::Options;
use layout::{LayoutBox, LayoutRequest};
use meta::Metamodel;
use model::{ModelId, Rect};
use project::Project;
use render::{RenderBatch, Renderer, RendererCaps};
use state::{BinderKey, Facet, HistoryHelper, MasterOverlord};

/// Initialize the WASM module.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Logs an error to the browser console and converts it for JS.
fn js_error(err: impl Display) -> JsValue {
    let message = JsValue::from_str(&err.to_string());
    web_sys::console::error_1(&message);
    message
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(js_error)
}

fn from_js<T: serde::de::DeserializeOwned>(value: JsValue) -> Result<T, JsValue> {
    serde_wasm_bindgen::from_value(value).map_err(js_error)
}

/// A host renderer object, probed once for its optional capabilities.
struct JsRenderer {
    caps: RendererCaps,
    this: JsValue,
    can_rescale_to: Option<Function>,
}

impl JsRenderer {
    fn probe(this: JsValue) -> Self {
        let property = |name: &str| Reflect::get(&this, &JsValue::from_str(name)).ok();
        let method = |name: &str| property(name).and_then(|v| v.dyn_into::<Function>().ok());

        // `expandable` is either a flag or a predicate.
        let expandable = match property("expandable") {
            Some(flag) if flag.as_bool().is_some() => flag.as_bool().unwrap_or_default(),
            Some(f) => f
                .dyn_into::<Function>()
                .ok()
                .and_then(|f| f.call0(&this).ok())
                .is_some_and(|v| v.is_truthy()),
            None => false,
        };
        let caps = RendererCaps {
            rescale: method("rescale").is_some(),
            change_style: method("changeStyle").is_some(),
            expandable,
            cache_dimensions: property("cacheDimensions").is_some_and(|v| v.is_truthy()),
        };
        let can_rescale_to = method("canRescaleTo");
        Self {
            caps,
            this,
            can_rescale_to,
        }
    }
}

impl Renderer for JsRenderer {
    fn caps(&self) -> RendererCaps {
        self.caps
    }

    fn can_rescale_to(&self, id: &ModelId, width: f64, height: f64) -> bool {
        let Some(f) = &self.can_rescale_to else {
            return true;
        };
        f.call3(
            &self.this,
            &JsValue::from_str(id.as_str()),
            &JsValue::from_f64(width),
            &JsValue::from_f64(height),
        )
        .is_ok_and(|v| v.is_truthy())
    }
}

/// Main entry point for Rhizo visualizations.
///
/// One instance serves a whole document: it owns the canonical state shared by
/// every visualization loaded into it.
#[wasm_bindgen]
pub struct RhizoWasm {
    options: Options,
    master: MasterOverlord,
    projects: BTreeMap<String, Rc<RefCell<Project>>>,
}

#[wasm_bindgen]
impl RhizoWasm {
    /// Create a new instance.
    ///
    /// # Arguments
    ///
    /// * `options` - Host options, `undefined` for defaults
    /// * `history` - Track state changes in browser history
    #[wasm_bindgen(constructor)]
    pub fn new(options: JsValue, history: bool) -> Result<RhizoWasm, JsValue> {
        let options: Options = if options.is_undefined() || options.is_null() {
            Options::default()
        } else {
            from_js(options)?
        };
        let mut master = MasterOverlord::new();
        if history {
            match browser_history() {
                Some(helper) => master = master.with_history(helper),
                None => tracing::warn!("browser history unavailable"),
            }
        }
        Ok(Self {
            options,
            master,
            projects: BTreeMap::new(),
        })
    }

    // =========================================================================
    // Projects
    // =========================================================================

    /// Load a visualization.
    ///
    /// Returns whether a known state was restored into it, in which case the
    /// restored layout is available from `takeBatches`. When `false`, the host
    /// should request its default layout.
    ///
    /// # Arguments
    ///
    /// * `uuid` - Unique id of the visualization
    /// * `width`, `height` - Size of the area models are laid out in
    /// * `metamodel` - Attribute key to `{label, kind, isParent?}`
    /// * `models` - Array of `{id, ...attributes}`
    /// * `renderer` - Host renderer object
    /// * `bindings` - Extra state binders, e.g. `["history"]`
    #[wasm_bindgen(js_name = loadProject)]
    pub fn load_project(
        &mut self,
        uuid: String,
        width: f64,
        height: f64,
        metamodel: JsValue,
        models: JsValue,
        renderer: JsValue,
        bindings: JsValue,
    ) -> Result<bool, JsValue> {
        let meta: Metamodel = from_js(metamodel)?;
        let records: Vec<Value> = from_js(models)?;
        let bindings: Vec<BinderKey> = if bindings.is_undefined() || bindings.is_null() {
            Vec::new()
        } else {
            from_js(bindings)?
        };
        let renderer: Rc<dyn Renderer> = Rc::new(JsRenderer::probe(renderer));

        let mut project = Project::load(uuid.clone(), records, meta, &self.options, renderer)
            .map_err(js_error)?;
        project.set_container(LayoutBox::new(width, height));
        let project = Rc::new(RefCell::new(project));
        self.projects.insert(uuid, project.clone());
        self.master
            .attach_project(&project, &bindings)
            .map_err(js_error)
    }

    /// Drop a visualization.
    #[wasm_bindgen(js_name = unloadProject)]
    pub fn unload_project(&mut self, uuid: &str) -> bool {
        self.master.detach_project(uuid);
        self.projects.remove(uuid).is_some()
    }

    /// Set the size of the area models are laid out in.
    #[wasm_bindgen(js_name = setContainer)]
    pub fn set_container(&mut self, uuid: &str, width: f64, height: f64) -> Result<(), JsValue> {
        self.project(uuid)?
            .borrow_mut()
            .set_container(LayoutBox::new(width, height));
        Ok(())
    }

    /// Set the natural size of a rendering, as measured by the host.
    #[wasm_bindgen(js_name = setModelDimensions)]
    pub fn set_model_dimensions(
        &mut self,
        uuid: &str,
        id: &str,
        width: f64,
        height: f64,
    ) -> Result<bool, JsValue> {
        let project = self.project(uuid)?;
        let mut project = project.borrow_mut();
        Ok(project
            .models_mut()
            .set_natural_dims(&ModelId::from(id), model::Dimensions::new(width, height)))
    }

    // =========================================================================
    // Layout
    // =========================================================================

    /// Lay models out and record the change.
    ///
    /// `request` is `{engine?, state?, options?, positions?}`. Returns the
    /// render batch to apply.
    pub fn layout(&mut self, uuid: &str, request: JsValue) -> Result<JsValue, JsValue> {
        let request: LayoutRequest = if request.is_undefined() || request.is_null() {
            LayoutRequest::default()
        } else {
            from_js(request)?
        };
        let change = self.project(uuid)?.borrow_mut().layout(request).map_err(js_error)?;
        self.master
            .push_change(uuid, BinderKey::Project, Facet::Layout, change.facet_state, change.replace)
            .map_err(js_error)?;
        to_js(&change.batch)
    }

    /// Registered engine names.
    #[wasm_bindgen(js_name = engineNames)]
    pub fn engine_names(&self, uuid: &str) -> Result<Vec<String>, JsValue> {
        let project = self.project(uuid)?;
        let names = project
            .borrow()
            .layout_manager()
            .engine_names()
            .into_iter()
            .map(str::to_owned)
            .collect();
        Ok(names)
    }

    #[wasm_bindgen(js_name = currentEngine)]
    pub fn current_engine(&self, uuid: &str) -> Result<Option<String>, JsValue> {
        let project = self.project(uuid)?;
        let current = project.borrow().layout_manager().current_engine().map(str::to_owned);
        Ok(current)
    }

    /// Current state of an engine, `undefined` if unknown.
    #[wasm_bindgen(js_name = engineState)]
    pub fn engine_state(&self, uuid: &str, engine: &str) -> Result<JsValue, JsValue> {
        let project = self.project(uuid)?;
        let state = project.borrow().layout_manager().engine_state(engine);
        match state {
            Some(state) => to_js(&state),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    // =========================================================================
    // Filters and selection
    // =========================================================================

    /// Filter models on one attribute. `null` removes the filter.
    pub fn filter(&mut self, uuid: &str, key: &str, value: JsValue) -> Result<JsValue, JsValue> {
        let value: Value = if value.is_undefined() {
            Value::Null
        } else {
            from_js(value)?
        };
        let batch = self
            .project(uuid)?
            .borrow_mut()
            .filter(key, &value)
            .map_err(js_error)?;
        self.master
            .push_change(uuid, BinderKey::Project, Facet::Filter(key.to_owned()), value, false)
            .map_err(js_error)?;
        to_js(&batch)
    }

    /// Hide every model but the given ones.
    pub fn focus(&mut self, uuid: &str, ids: Vec<String>) -> Result<JsValue, JsValue> {
        let project = self.project(uuid)?;
        let ids: Vec<ModelId> = ids.into_iter().map(ModelId::from).collect();
        let hidden = project.borrow().unfocused(&ids);
        let batch = project
            .borrow_mut()
            .select_filter(Some(&hidden))
            .map_err(js_error)?;
        if !batch.is_empty() {
            self.push_selection(uuid, layout::state_value(&hidden))?;
        }
        to_js(&batch)
    }

    /// Show every model hidden by a focus.
    #[wasm_bindgen(js_name = resetFocus)]
    pub fn reset_focus(&mut self, uuid: &str) -> Result<JsValue, JsValue> {
        let batch = self
            .project(uuid)?
            .borrow_mut()
            .select_filter(None)
            .map_err(js_error)?;
        if !batch.is_empty() {
            self.push_selection(uuid, Value::Null)?;
        }
        to_js(&batch)
    }

    /// The model plus every model depending on it in the current layout.
    #[wasm_bindgen(js_name = extendSelection)]
    pub fn extend_selection(&self, uuid: &str, id: &str) -> Result<Vec<String>, JsValue> {
        let project = self.project(uuid)?;
        let ids = project.borrow().extend_selection(&ModelId::from(id));
        Ok(ids.into_iter().map(|id| id.0).collect())
    }

    // =========================================================================
    // Spatial queries
    // =========================================================================

    /// The topmost model at a point, if any.
    #[wasm_bindgen(js_name = modelAt)]
    pub fn model_at(&self, uuid: &str, left: f64, top: f64) -> Result<Option<String>, JsValue> {
        let project = self.project(uuid)?;
        let id = project.borrow().models().model_at(left, top);
        Ok(id.map(|id| id.0))
    }

    /// Models whose renderings intersect a rectangle (rubber-band selection).
    #[wasm_bindgen(js_name = modelsInRect)]
    pub fn models_in_rect(
        &self,
        uuid: &str,
        top: f64,
        left: f64,
        width: f64,
        height: f64,
    ) -> Result<Vec<String>, JsValue> {
        let project = self.project(uuid)?;
        let ids = project
            .borrow()
            .models()
            .models_in_rect(&Rect::new(top, left, width, height));
        Ok(ids.into_iter().map(|id| id.0).collect())
    }

    // =========================================================================
    // State
    // =========================================================================

    /// The canonical state document.
    pub fn state(&self) -> Result<JsValue, JsValue> {
        to_js(self.master.state())
    }

    /// Handle a `popstate` event. `state` is the event state.
    ///
    /// Returns the render batches of the visualizations that changed, keyed
    /// by uuid.
    #[wasm_bindgen(js_name = popState)]
    pub fn pop_state(&mut self, state: JsValue) -> Result<JsValue, JsValue> {
        let target: Option<Value> = if state.is_undefined() || state.is_null() {
            None
        } else {
            Some(from_js(state)?)
        };
        self.master.pop_state(target).map_err(js_error)?;
        to_js(&self.take_batches())
    }

    /// Render batches accumulated by state transitions, keyed by uuid.
    #[wasm_bindgen(js_name = takeBatches)]
    pub fn take_batches_js(&mut self) -> Result<JsValue, JsValue> {
        to_js(&self.take_batches())
    }
}

impl RhizoWasm {
    fn project(&self, uuid: &str) -> Result<Rc<RefCell<Project>>, JsValue> {
        self.projects
            .get(uuid)
            .cloned()
            .ok_or_else(|| js_error(error::StateError::UnknownProject(uuid.to_owned())))
    }

    fn push_selection(&mut self, uuid: &str, hidden: Value) -> Result<(), JsValue> {
        self.master
            .push_change(uuid, BinderKey::Project, Facet::SelectionFilter, hidden, false)
            .map(|_| ())
            .map_err(js_error)
    }

    fn take_batches(&mut self) -> BTreeMap<String, RenderBatch> {
        self.projects
            .iter()
            .filter_map(|(uuid, project)| {
                let batch = project.borrow_mut().take_batch();
                (!batch.is_empty()).then(|| (uuid.clone(), batch))
            })
            .collect()
    }
}

#[cfg(target_arch = "wasm32")]
fn browser_history() -> Option<HistoryHelper> {
    let backend = state::BrowserHistory::new()?;
    Some(HistoryHelper::new(Box::new(backend)))
}

#[cfg(not(target_arch = "wasm32"))]
fn browser_history() -> Option<HistoryHelper> {
    None
}
