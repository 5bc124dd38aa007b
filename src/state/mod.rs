//! Visualization state synchronization.
//!
//! Every change to a visualization is a [`Delta`] on one [`Facet`] of one
//! visualization. The [`MasterOverlord`] folds deltas into the canonical
//! [`VisualizationState`] and broadcasts them to the [`StateBinder`]s of the
//! affected visualization, skipping the binder the change came from.
//!
//! # State document
//!
//! The canonical state is the only document exchanged with the outside world
//! (history entries). It holds plain JSON values only:
//!
//! ```json
//! {
//!   "type": "__rhizo_state__",
//!   "uuids": { "<viz uuid>": { "layout": {...}, "filter:size": 3 } },
//!   "delta": { "ts": 1700000000000, "uuid": "...", "facet": "layout", "facetState": {...} }
//! }
//! ```

mod binder;
mod history;
mod overlord;

pub use binder::{HistoryStateBinder, ProjectStateBinder, StateBinder, StateTarget};
pub use history::{HistoryBackend, HistoryHelper, MemoryHistory, PopOutcome, diff};
#[cfg(target_arch = "wasm32")]
pub use history::BrowserHistory;
pub use overlord::{MasterOverlord, ProjectOverlord};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

use crate::layout::ManualPosition;

/// Watermark identifying state documents written by this crate.
pub const STATE_TYPE: &str = "__rhizo_state__";

const FILTER_PREFIX: &str = "filter:";

/// One independently tracked dimension of a visualization's state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Facet {
    Layout,
    SelectionFilter,
    /// The filter on one metamodel attribute.
    Filter(String),
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Facet::Layout => f.write_str("layout"),
            Facet::SelectionFilter => f.write_str("selection"),
            Facet::Filter(key) => write!(f, "{FILTER_PREFIX}{key}"),
        }
    }
}

impl From<Facet> for String {
    fn from(facet: Facet) -> Self {
        facet.to_string()
    }
}

impl TryFrom<String> for Facet {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_str() {
            "layout" => Ok(Facet::Layout),
            "selection" => Ok(Facet::SelectionFilter),
            _ => match s.strip_prefix(FILTER_PREFIX) {
                Some(key) if !key.is_empty() => Ok(Facet::Filter(key.to_owned())),
                _ => Err(format!("unknown facet: {s}")),
            },
        }
    }
}

/// Components that can track the state of a visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinderKey {
    /// The visualization itself.
    Project,
    /// Browser history.
    History,
}

impl fmt::Display for BinderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinderKey::Project => f.write_str("project"),
            BinderKey::History => f.write_str("history"),
        }
    }
}

/// A single-facet change of a single visualization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Milliseconds since the epoch. Older than the current delta when rolling
    /// back through history.
    pub ts: u64,
    pub uuid: String,
    pub facet: Facet,
    /// The facet value after the change. `null` reverts the facet to default.
    #[serde(rename = "facetState")]
    pub facet_state: Value,
}

impl Delta {
    pub fn new(uuid: impl Into<String>, facet: Facet, facet_state: Value) -> Self {
        Self {
            ts: timestamp(),
            uuid: uuid.into(),
            facet,
            facet_state,
        }
    }
}

/// Facet value recorded for layout changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutFacet {
    pub engine: String,
    #[serde(default)]
    pub state: Value,
    /// Custom positions overriding the computed layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positions: Option<Vec<ManualPosition>>,
}

impl LayoutFacet {
    /// Merges custom positions from an earlier layout facet. Positions in
    /// `self` win; earlier positions for other models are kept.
    pub fn inherit_positions(&mut self, earlier: &LayoutFacet) {
        let Some(earlier) = &earlier.positions else {
            return;
        };
        let mut merged: Vec<ManualPosition> = earlier
            .iter()
            .filter(|p| {
                self.positions
                    .as_ref()
                    .is_none_or(|own| own.iter().all(|o| o.id != p.id))
            })
            .cloned()
            .collect();
        merged.extend(self.positions.take().unwrap_or_default());
        self.positions = Some(merged);
    }
}

/// The canonical, document-wide state of every visualization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationState {
    #[serde(rename = "type")]
    pub kind: String,
    /// Per-visualization facet values. Absent facets are in their default state.
    #[serde(default)]
    pub uuids: BTreeMap<String, BTreeMap<Facet, Value>>,
    /// The last change applied.
    #[serde(default)]
    pub delta: Option<Delta>,
}

impl Default for VisualizationState {
    fn default() -> Self {
        Self::new()
    }
}

impl VisualizationState {
    pub fn new() -> Self {
        Self {
            kind: STATE_TYPE.to_owned(),
            uuids: BTreeMap::new(),
            delta: None,
        }
    }

    /// Whether a raw history value is a state document written by us.
    pub fn is_rhizo_state(value: &Value) -> bool {
        value.get("type").and_then(Value::as_str) == Some(STATE_TYPE)
    }

    pub fn facet_state(&self, uuid: &str, facet: &Facet) -> Option<&Value> {
        self.uuids.get(uuid).and_then(|facets| facets.get(facet))
    }

    /// Folds a delta into the state and records it as the last change.
    ///
    /// Layout deltas inherit the custom positions of the previous layout value
    /// unless `replace` is set. Returns the delta as recorded.
    pub fn push_delta(&mut self, mut delta: Delta, replace: bool) -> Delta {
        let facets = self.uuids.entry(delta.uuid.clone()).or_default();
        if delta.facet == Facet::Layout && !replace {
            merge_layout_positions(&mut delta.facet_state, facets.get(&Facet::Layout));
        }
        if delta.facet_state.is_null() {
            facets.remove(&delta.facet);
        } else {
            facets.insert(delta.facet.clone(), delta.facet_state.clone());
        }
        self.delta = Some(delta.clone());
        delta
    }
}

fn merge_layout_positions(next: &mut Value, earlier: Option<&Value>) {
    let Some(earlier) = earlier else {
        return;
    };
    let (Ok(mut facet), Ok(earlier)) = (
        serde_json::from_value::<LayoutFacet>(next.clone()),
        serde_json::from_value::<LayoutFacet>(earlier.clone()),
    ) else {
        return;
    };
    facet.inherit_positions(&earlier);
    match serde_json::to_value(&facet) {
        Ok(merged) => *next = merged,
        Err(err) => warn!(%err, "cannot merge layout positions"),
    }
}

thread_local! {
    static LAST_TIMESTAMP: Cell<u64> = const { Cell::new(0) };
}

/// Milliseconds since the epoch, strictly increasing across calls so that
/// consecutive deltas always order correctly.
pub fn timestamp() -> u64 {
    let now = now_millis();
    LAST_TIMESTAMP.with(|last| {
        let ts = now.max(last.get() + 1);
        last.set(ts);
        ts
    })
}

#[cfg(target_arch = "wasm32")]
fn now_millis() -> u64 {
    js_sys::Date::now() as u64
}

#[cfg(not(target_arch = "wasm32"))]
fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
