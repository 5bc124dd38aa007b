//! ModelGraph - the set of models in a visualization.
//!
//! Stores models in load order alongside an id index, and keeps an R-tree over
//! the visible renderings for hit testing. The spatial index is rebuilt lazily:
//! mutations only flip a dirty flag, and callers rebuild after a batch of
//! layout changes has been applied.

use serde_json::Value;
use std::cell::Cell;
use std::collections::HashMap;
use tracing::debug;

use super::id::ModelId;
use super::record::Model;
use super::rendering::{Dimensions, Rect};
use crate::error::LoadError;
use crate::spatial::{RectEntry, SpatialIndex};

/// Attribute holding each record's unique id.
pub const ID_ATTRIBUTE: &str = "id";

/// All models of a visualization, indexed by id.
pub struct ModelGraph {
    models: Vec<Model>,
    index: HashMap<ModelId, usize>,
    spatial: SpatialIndex,
    spatial_dirty: Cell<bool>,
}

impl ModelGraph {
    pub fn new() -> Self {
        Self {
            models: Vec::new(),
            index: HashMap::new(),
            spatial: SpatialIndex::new(),
            spatial_dirty: Cell::new(false),
        }
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Load models from a JSON array of records.
    pub fn from_json(json: &str, dims: Dimensions) -> Result<Self, LoadError> {
        let records: Vec<Value> = serde_json::from_str(json)?;
        Self::from_values(records, dims)
    }

    /// Load models from raw records, giving each rendering the same natural
    /// dimensions.
    ///
    /// Every record must be an object with a non-empty `id`, and ids must be
    /// unique. Any violation aborts the whole load.
    pub fn from_values(records: Vec<Value>, dims: Dimensions) -> Result<Self, LoadError> {
        let mut models = Vec::with_capacity(records.len());
        for (position, record) in records.into_iter().enumerate() {
            let Value::Object(payload) = record else {
                return Err(LoadError::NotAnObject(position));
            };
            let id = payload
                .get(ID_ATTRIBUTE)
                .and_then(ModelId::from_value)
                .ok_or(LoadError::MissingId(position))?;
            models.push(Model::new(id, payload).with_dims(dims.width, dims.height));
        }
        Self::from_models(models)
    }

    /// Build a graph from already wrapped models, validating id uniqueness.
    pub fn from_models(models: Vec<Model>) -> Result<Self, LoadError> {
        let mut index = HashMap::with_capacity(models.len());
        for (slot, model) in models.iter().enumerate() {
            if index.insert(model.id().clone(), slot).is_some() {
                return Err(LoadError::DuplicateId(model.id().clone()));
            }
        }
        debug!(models = models.len(), "loaded model graph");
        Ok(Self {
            models,
            index,
            spatial: SpatialIndex::new(),
            spatial_dirty: Cell::new(true),
        })
    }

    // =========================================================================
    // Access
    // =========================================================================

    pub fn get(&self, id: &ModelId) -> Option<&Model> {
        self.index.get(id).map(|&slot| &self.models[slot])
    }

    pub fn get_mut(&mut self, id: &ModelId) -> Option<&mut Model> {
        let slot = *self.index.get(id)?;
        self.spatial_dirty.set(true);
        Some(&mut self.models[slot])
    }

    pub fn contains(&self, id: &ModelId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Models in load order.
    pub fn iter(&self) -> impl Iterator<Item = &Model> {
        self.models.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Model> {
        self.spatial_dirty.set(true);
        self.models.iter_mut()
    }

    /// Ids of every model not hidden by any filter, in load order.
    pub fn visible_ids(&self) -> Vec<ModelId> {
        self.models
            .iter()
            .filter(|m| !m.is_filtered(None))
            .map(|m| m.id().clone())
            .collect()
    }

    /// Override the natural dimensions reported for a model's rendering.
    pub fn set_natural_dims(&mut self, id: &ModelId, dims: Dimensions) -> bool {
        match self.get_mut(id) {
            Some(model) => {
                model.rendering_mut().set_dims(dims);
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Filters
    // =========================================================================

    /// Clears a filter key on every model. Returns how many models changed.
    pub fn reset_all_filter(&mut self, key: &str) -> usize {
        self.models
            .iter_mut()
            .filter_map(|m| m.reset_filter(key).then_some(()))
            .count()
    }

    /// Shows the renderings of unfiltered models and hides the others.
    /// Returns how many renderings changed visibility.
    pub fn align_visibility(&mut self) -> usize {
        let changed = self
            .models
            .iter_mut()
            .filter_map(|m| {
                let visible = !m.is_filtered(None);
                m.rendering_mut().set_visible(visible).then_some(())
            })
            .count();
        if changed > 0 {
            self.spatial_dirty.set(true);
        }
        changed
    }

    // =========================================================================
    // Spatial queries
    // =========================================================================

    /// Rebuild the spatial index from the visible renderings.
    pub fn rebuild_spatial_index(&mut self) {
        let entries: Vec<RectEntry> = self
            .models
            .iter()
            .filter(|m| m.rendering().is_visible())
            .map(|m| {
                let rendering = m.rendering();
                RectEntry::new(m.id().clone(), rendering.rect(), rendering.elevation().top())
            })
            .collect();
        self.spatial.rebuild(entries);
        self.spatial_dirty.set(false);
    }

    pub fn is_spatial_dirty(&self) -> bool {
        self.spatial_dirty.get()
    }

    /// Visible models whose rendering intersects the rectangle.
    pub fn models_in_rect(&self, rect: &Rect) -> Vec<ModelId> {
        self.warn_if_stale();
        self.spatial.in_rect(rect)
    }

    /// The topmost visible model under a point.
    pub fn model_at(&self, left: f64, top: f64) -> Option<ModelId> {
        self.warn_if_stale();
        self.spatial.at_point(left, top)
    }

    fn warn_if_stale(&self) {
        if self.spatial_dirty.get() {
            debug!("spatial query on a stale index; call rebuild_spatial_index first");
        }
    }
}

impl Default for ModelGraph {
    fn default() -> Self {
        Self::new()
    }
}
