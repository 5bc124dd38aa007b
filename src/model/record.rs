//! A wrapped data record.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

use super::id::ModelId;
use super::rendering::{Dimensions, Rendering};

/// A data record plus its filter state and rendering.
///
/// The raw payload is immutable once loaded. Filters are tracked as a set of
/// keys: a key being present means "hidden by this filter".
#[derive(Debug, Clone)]
pub struct Model {
    id: ModelId,
    payload: Map<String, Value>,
    filters: BTreeSet<String>,
    selected: bool,
    rendering: Rendering,
}

impl Model {
    pub fn new(id: ModelId, payload: Map<String, Value>) -> Self {
        Self {
            id,
            payload,
            filters: BTreeSet::new(),
            selected: false,
            rendering: Rendering::default(),
        }
    }

    /// Builder-style setter for the natural rendering dimensions.
    pub fn with_dims(mut self, width: f64, height: f64) -> Self {
        self.rendering = Rendering::new(Dimensions::new(width, height));
        self
    }

    pub fn id(&self) -> &ModelId {
        &self.id
    }

    /// The raw payload, as supplied by the model source.
    pub fn unwrap(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.payload.get(key).filter(|v| !v.is_null())
    }

    /// Numeric attribute value. Strings holding a number are accepted.
    pub fn numeric_attr(&self, key: &str) -> Option<f64> {
        match self.attr(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    // =========================================================================
    // Filters
    // =========================================================================

    /// With no key, whether any filter hides this model. Otherwise, whether
    /// the specific filter is active.
    pub fn is_filtered(&self, key: Option<&str>) -> bool {
        match key {
            Some(key) => self.filters.contains(key),
            None => !self.filters.is_empty(),
        }
    }

    /// Activates a filter. Returns whether the filter state changed.
    pub fn filter(&mut self, key: &str) -> bool {
        self.filters.insert(key.to_owned())
    }

    /// Clears a filter. Returns whether the filter state changed.
    pub fn reset_filter(&mut self, key: &str) -> bool {
        self.filters.remove(key)
    }

    // =========================================================================
    // Selection and rendering
    // =========================================================================

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    pub fn rendering(&self) -> &Rendering {
        &self.rendering
    }

    pub fn rendering_mut(&mut self) -> &mut Rendering {
        &mut self.rendering
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model() -> Model {
        let payload = json!({"id": "a", "size": "12", "name": "Alpha", "parent": null});
        let Value::Object(map) = payload else {
            unreachable!()
        };
        Model::new(ModelId::from("a"), map)
    }

    #[test]
    fn test_filter_reports_changes() {
        let mut m = model();
        assert!(!m.is_filtered(None));

        assert!(m.filter("name"));
        assert!(!m.filter("name"), "second activation is not a change");
        assert!(m.is_filtered(None));
        assert!(m.is_filtered(Some("name")));
        assert!(!m.is_filtered(Some("size")));

        assert!(m.reset_filter("name"));
        assert!(!m.reset_filter("name"));
        assert!(!m.is_filtered(None));
    }

    #[test]
    fn test_attributes() {
        let m = model();
        assert_eq!(m.numeric_attr("size"), Some(12.0));
        assert_eq!(m.numeric_attr("name"), None);
        assert_eq!(m.attr("parent"), None, "null attributes read as absent");
        assert_eq!(m.unwrap().len(), 4);
    }
}
