//! Browser history integration.
//!
//! Every canonical state change is pushed as a new history entry. Navigating
//! back or forward pops an entry, which is turned into a delta against the
//! current canonical state:
//!
//! - a target recorded later than the current state is a forward move and its
//!   own delta applies verbatim;
//! - anything else is a backward move, which rolls back the facet changed last
//!   to the value the target recorded for it, or to its default when the
//!   target has none.

use serde_json::Value;
use tracing::{debug, warn};

use super::{Delta, VisualizationState, timestamp};

/// Where history entries go.
pub trait HistoryBackend {
    fn push_state(&mut self, state: &VisualizationState);
}

/// An in-memory history, for hosts without browser history and for tests.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    entries: Vec<Value>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Value] {
        &self.entries
    }
}

impl HistoryBackend for MemoryHistory {
    fn push_state(&mut self, state: &VisualizationState) {
        match serde_json::to_value(state) {
            Ok(value) => self.entries.push(value),
            Err(err) => warn!(%err, "cannot record history entry"),
        }
    }
}

/// HTML5 history of the current window.
#[cfg(target_arch = "wasm32")]
pub struct BrowserHistory {
    history: web_sys::History,
}

#[cfg(target_arch = "wasm32")]
impl BrowserHistory {
    /// `None` outside a browser window.
    pub fn new() -> Option<Self> {
        let history = web_sys::window()?.history().ok()?;
        Some(Self { history })
    }
}

#[cfg(target_arch = "wasm32")]
impl HistoryBackend for BrowserHistory {
    fn push_state(&mut self, state: &VisualizationState) {
        use serde::Serialize;

        let serializer = serde_wasm_bindgen::Serializer::json_compatible();
        let pushed = state
            .serialize(&serializer)
            .map_err(wasm_bindgen::JsValue::from)
            .and_then(|value| self.history.push_state(&value, ""));
        if let Err(err) = pushed {
            warn!(?err, "cannot push history state");
        }
    }
}

/// What a popped history entry means for the canonical state.
#[derive(Debug, Clone, PartialEq)]
pub enum PopOutcome {
    /// Not ours, or nothing to do.
    Ignored,
    /// The state the page was loaded with.
    Initial(VisualizationState),
    /// A move through history. `target` replaces the canonical state when
    /// present; otherwise `delta` is folded into it.
    Transition {
        delta: Delta,
        target: Option<VisualizationState>,
    },
}

/// Pushes canonical states to a history backend and interprets popped ones.
pub struct HistoryHelper {
    backend: Box<dyn HistoryBackend>,
    initial_received: bool,
}

impl HistoryHelper {
    pub fn new(backend: Box<dyn HistoryBackend>) -> Self {
        Self {
            backend,
            initial_received: false,
        }
    }

    /// Records a new history entry.
    ///
    /// Once anything was pushed, later pops are never treated as the initial
    /// state, even if the browser did not fire one on load.
    pub fn sync(&mut self, state: &VisualizationState) {
        self.initial_received = true;
        self.backend.push_state(state);
    }

    /// Interprets a popped history entry. `target` is the raw entry, `None`
    /// for the entry of a page that was landed on directly.
    pub fn history_change(
        &mut self,
        target: Option<Value>,
        current: &VisualizationState,
    ) -> PopOutcome {
        if !self.initial_received {
            self.initial_received = true;
            return match target.and_then(parse_state) {
                Some(state) => PopOutcome::Initial(state),
                None => PopOutcome::Ignored,
            };
        }

        let Some(target) = target else {
            // Back to the landing page: revert whatever changed last.
            return match &current.delta {
                Some(last) => PopOutcome::Transition {
                    delta: Delta {
                        ts: timestamp(),
                        uuid: last.uuid.clone(),
                        facet: last.facet.clone(),
                        facet_state: Value::Null,
                    },
                    target: None,
                },
                None => PopOutcome::Ignored,
            };
        };

        let Some(target) = parse_state(target) else {
            return PopOutcome::Ignored;
        };
        match diff(current, &target) {
            Some(delta) => PopOutcome::Transition {
                delta,
                target: Some(target),
            },
            None => PopOutcome::Ignored,
        }
    }
}

fn parse_state(value: Value) -> Option<VisualizationState> {
    if !VisualizationState::is_rhizo_state(&value) {
        debug!("ignoring foreign history state");
        return None;
    }
    serde_json::from_value(value)
        .map_err(|err| warn!(%err, "malformed history state"))
        .ok()
}

/// The delta leading from `current` to `target`.
///
/// Returns `None` when neither state records a change.
pub fn diff(current: &VisualizationState, target: &VisualizationState) -> Option<Delta> {
    let current_ts = current.delta.as_ref().map_or(0, |d| d.ts);
    if let Some(forward) = target.delta.as_ref().filter(|d| d.ts > current_ts) {
        return Some(forward.clone());
    }

    let rollback = current.delta.as_ref()?;
    Some(Delta {
        ts: target.delta.as_ref().map_or(0, |d| d.ts),
        uuid: rollback.uuid.clone(),
        facet: rollback.facet.clone(),
        facet_state: target
            .facet_state(&rollback.uuid, &rollback.facet)
            .cloned()
            .unwrap_or(Value::Null),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Facet;
    use serde_json::json;

    fn state_after(deltas: &[(Facet, Value)]) -> VisualizationState {
        let mut state = VisualizationState::new();
        for (facet, value) in deltas {
            state.push_delta(Delta::new("viz", facet.clone(), value.clone()), false);
        }
        state
    }

    fn helper() -> HistoryHelper {
        let mut helper = HistoryHelper::new(Box::new(MemoryHistory::new()));
        helper.sync(&VisualizationState::new());
        helper
    }

    #[test]
    fn test_forward_then_back_restores_prior_value() {
        let size = Facet::Filter("size".into());
        let before = state_after(&[(size.clone(), json!(3))]);
        let mut after = before.clone();
        after.push_delta(Delta::new("viz", size.clone(), json!(7)), false);

        let forward = diff(&before, &after).unwrap();
        assert_eq!(forward.facet_state, json!(7));

        let back = diff(&after, &before).unwrap();
        assert_eq!(back.facet, size);
        assert_eq!(&back.facet_state, before.facet_state("viz", &size).unwrap());
    }

    #[test]
    fn test_back_to_default_is_null() {
        let layout = Facet::Layout;
        let before = state_after(&[(Facet::SelectionFilter, json!(["a"]))]);
        let mut after = before.clone();
        after.push_delta(Delta::new("viz", layout.clone(), json!({"engine": "tree"})), false);

        let back = diff(&after, &before).unwrap();
        assert_eq!(back.facet, layout);
        assert_eq!(back.facet_state, Value::Null);

        // Applying the rollback reproduces the prior facet map.
        let mut replayed = after.clone();
        replayed.push_delta(back, false);
        assert_eq!(replayed.uuids, before.uuids);
    }

    #[test]
    fn test_first_pop_is_initial_state() {
        let mut helper = HistoryHelper::new(Box::new(MemoryHistory::new()));
        let initial = state_after(&[(Facet::Layout, json!({"engine": "bucket"}))]);
        let raw = serde_json::to_value(&initial).unwrap();
        assert_eq!(
            helper.history_change(Some(raw.clone()), &VisualizationState::new()),
            PopOutcome::Initial(initial)
        );
        // Only the first pop counts as initial.
        assert!(matches!(
            helper.history_change(Some(raw), &VisualizationState::new()),
            PopOutcome::Transition { .. }
        ));
    }

    #[test]
    fn test_landing_pop_without_state() {
        let mut helper = HistoryHelper::new(Box::new(MemoryHistory::new()));
        assert_eq!(
            helper.history_change(None, &VisualizationState::new()),
            PopOutcome::Ignored
        );
    }

    #[test]
    fn test_null_pop_reverts_last_facet() {
        let mut helper = helper();
        let current = state_after(&[(Facet::Filter("size".into()), json!(3))]);
        match helper.history_change(None, &current) {
            PopOutcome::Transition { delta, target } => {
                assert_eq!(delta.facet, Facet::Filter("size".into()));
                assert_eq!(delta.facet_state, Value::Null);
                assert!(target.is_none());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(
            helper.history_change(None, &VisualizationState::new()),
            PopOutcome::Ignored
        );
    }

    #[test]
    fn test_foreign_states_ignored() {
        let mut helper = helper();
        let current = state_after(&[(Facet::Layout, json!({"engine": "flow"}))]);
        assert_eq!(
            helper.history_change(Some(json!({"page": 4})), &current),
            PopOutcome::Ignored
        );
    }

    #[test]
    fn test_sync_records_entries() {
        struct Shared(std::rc::Rc<std::cell::RefCell<MemoryHistory>>);
        impl HistoryBackend for Shared {
            fn push_state(&mut self, state: &VisualizationState) {
                self.0.borrow_mut().push_state(state);
            }
        }

        let memory = std::rc::Rc::new(std::cell::RefCell::new(MemoryHistory::new()));
        let mut helper = HistoryHelper::new(Box::new(Shared(memory.clone())));
        helper.sync(&state_after(&[(Facet::Layout, json!({"engine": "flow"}))]));
        assert_eq!(memory.borrow().entries().len(), 1);
        assert_eq!(memory.borrow().entries()[0]["type"], json!("__rhizo_state__"));
    }
}
