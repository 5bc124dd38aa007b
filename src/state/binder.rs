//! Endpoints receiving state transitions.

use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use tracing::warn;

use super::{BinderKey, Delta, Facet, HistoryHelper, VisualizationState};

/// Receives the transitions of one visualization.
pub trait StateBinder {
    fn key(&self) -> BinderKey;

    /// Called after a transition that originated elsewhere. `delta` is `None`
    /// when no single change leads to `state` (initial state replay), in which
    /// case the binder rebuilds from the full state.
    fn on_transition(&mut self, delta: Option<&Delta>, state: &VisualizationState);
}

/// A visualization whose state can be driven from outside.
pub trait StateTarget {
    fn uuid(&self) -> &str;

    /// Applies a single facet change. Unknown facets are tolerated.
    fn state_changed(&mut self, facet: &Facet, facet_state: &Value);

    /// Rebuilds the visualization from a full facet map. `None` resets every
    /// facet to its default.
    fn set_state(&mut self, facets: Option<&BTreeMap<Facet, Value>>);
}

/// Binds the state to the visualization itself.
pub struct ProjectStateBinder<P> {
    uuid: String,
    project: Weak<RefCell<P>>,
}

impl<P: StateTarget> ProjectStateBinder<P> {
    pub fn new(project: &Rc<RefCell<P>>) -> Self {
        Self {
            uuid: project.borrow().uuid().to_owned(),
            project: Rc::downgrade(project),
        }
    }
}

impl<P: StateTarget> StateBinder for ProjectStateBinder<P> {
    fn key(&self) -> BinderKey {
        BinderKey::Project
    }

    fn on_transition(&mut self, delta: Option<&Delta>, state: &VisualizationState) {
        let Some(project) = self.project.upgrade() else {
            warn!(uuid = %self.uuid, "transition for a dropped project");
            return;
        };
        let Ok(mut project) = project.try_borrow_mut() else {
            warn!(uuid = %self.uuid, "project busy, transition not applied");
            return;
        };
        match delta {
            Some(delta) => project.state_changed(&delta.facet, &delta.facet_state),
            None => project.set_state(state.uuids.get(&self.uuid)),
        }
    }
}

/// Binds the state to browser history.
pub struct HistoryStateBinder {
    helper: Rc<RefCell<HistoryHelper>>,
}

impl HistoryStateBinder {
    pub fn new(helper: Rc<RefCell<HistoryHelper>>) -> Self {
        Self { helper }
    }
}

impl StateBinder for HistoryStateBinder {
    fn key(&self) -> BinderKey {
        BinderKey::History
    }

    fn on_transition(&mut self, _delta: Option<&Delta>, state: &VisualizationState) {
        match self.helper.try_borrow_mut() {
            Ok(mut helper) => helper.sync(state),
            Err(_) => warn!("history helper busy, state not pushed"),
        }
    }
}
