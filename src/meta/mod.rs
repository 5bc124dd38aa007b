//! Metamodel: the declared attributes of a visualization's models.
//!
//! Each attribute has a label and a [`Kind`] which drives comparison,
//! clustering and filtering. Layouts consult the metamodel to pick sort keys,
//! bucket keys, parent references and numeric area/color attributes.

mod kind;

pub use kind::{
    Cluster, Clusterable, Comparable, DateGranularity, Filterable, Kind, RangeScale,
    ScaleConvertible, order_of_magnitude, to_human_label,
};
pub(crate) use kind::{as_number, as_string};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::model::Model;

/// Host-supplied clustering override for a single attribute.
pub type ClusterFn = Rc<dyn Fn(&Value) -> Cluster>;

/// Metadata for one attribute.
#[derive(Clone, Serialize, Deserialize)]
pub struct AttributeMeta {
    pub label: String,
    pub kind: Kind,
    /// Whether the attribute holds a reference to a parent model id.
    #[serde(default, rename = "isParent")]
    pub is_parent: bool,
    #[serde(skip)]
    pub cluster: Option<ClusterFn>,
}

impl AttributeMeta {
    pub fn new(label: impl Into<String>, kind: Kind) -> Self {
        Self {
            label: label.into(),
            kind,
            is_parent: false,
            cluster: None,
        }
    }

    pub fn parent(mut self) -> Self {
        self.is_parent = true;
        self
    }

    pub fn with_cluster(mut self, cluster: ClusterFn) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Clusters a value, preferring the attribute override to the kind.
    pub fn cluster(&self, value: &Value) -> Cluster {
        match &self.cluster {
            Some(f) => f(value),
            None => self.kind.cluster(value),
        }
    }
}

impl fmt::Debug for AttributeMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeMeta")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("is_parent", &self.is_parent)
            .field("cluster", &self.cluster.is_some())
            .finish()
    }
}

/// Attribute key to metadata, ordered by key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metamodel {
    attributes: BTreeMap<String, AttributeMeta>,
}

impl Metamodel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with(mut self, key: impl Into<String>, meta: AttributeMeta) -> Self {
        self.insert(key, meta);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, meta: AttributeMeta) {
        self.attributes.insert(key.into(), meta);
    }

    pub fn get(&self, key: &str) -> Option<&AttributeMeta> {
        self.attributes.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeMeta)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Attribute keys flagged as parent references.
    pub fn parent_keys(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, m)| m.is_parent)
            .map(|(k, _)| k)
            .collect()
    }

    /// Attribute keys whose kind is numeric.
    pub fn numeric_keys(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, m)| m.kind.is_numeric())
            .map(|(k, _)| k)
            .collect()
    }
}

// =============================================================================
// Sorting
// =============================================================================

/// Native ordering over JSON values: numbers numerically, strings
/// lexicographically, booleans false-first, null before everything.
pub fn native_compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (x, y) => {
            let (nx, ny) = (as_number(x), as_number(y));
            if nx.is_nan() || ny.is_nan() {
                as_string(x).cmp(&as_string(y))
            } else {
                nx.partial_cmp(&ny).unwrap_or(Ordering::Equal)
            }
        }
    }
}

/// Compares two values with the kind's comparator if it has one, falling back
/// to native ordering, and inverts the result when `reverse` is set.
pub fn sort_by_kind(kind: &Kind, a: &Value, b: &Value, reverse: bool) -> Ordering {
    let ordering = kind
        .compare(a, b)
        .unwrap_or_else(|| native_compare(a, b));
    if reverse { ordering.reverse() } else { ordering }
}

/// Compares two models on one attribute.
pub fn sort_by(key: &str, kind: &Kind, a: &Model, b: &Model, reverse: bool) -> Ordering {
    let null = Value::Null;
    sort_by_kind(
        kind,
        a.attr(key).unwrap_or(&null),
        b.attr(key).unwrap_or(&null),
        reverse,
    )
}
