//! Canonical state owner and per-visualization broadcasters.

use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::rc::Rc;
use tracing::{debug, info};

use super::{
    BinderKey, Delta, Facet, HistoryHelper, HistoryStateBinder, PopOutcome, ProjectStateBinder,
    StateBinder, StateTarget, VisualizationState,
};
use crate::error::StateError;

/// Keeps the binders of one visualization in sync.
pub struct ProjectOverlord {
    uuid: String,
    binders: Vec<Box<dyn StateBinder>>,
}

impl ProjectOverlord {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            binders: Vec::new(),
        }
    }

    /// Adds a binder, replacing any binder with the same key.
    pub fn bind(&mut self, binder: Box<dyn StateBinder>) {
        self.binders.retain(|b| b.key() != binder.key());
        self.binders.push(binder);
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn binder_keys(&self) -> Vec<BinderKey> {
        self.binders.iter().map(|b| b.key()).collect()
    }

    /// Notifies every binder except the one the change came from.
    pub fn broadcast(&mut self, source: BinderKey, delta: Option<&Delta>, state: &VisualizationState) {
        for binder in self.binders.iter_mut().filter(|b| b.key() != source) {
            binder.on_transition(delta, state);
        }
    }
}

/// Owns the canonical state of every visualization in the document.
///
/// There is one per document; components receive it explicitly rather than
/// reaching for a global.
pub struct MasterOverlord {
    state: VisualizationState,
    projects: BTreeMap<String, ProjectOverlord>,
    initial_owner: Option<BinderKey>,
    history: Option<Rc<RefCell<HistoryHelper>>>,
}

impl Default for MasterOverlord {
    fn default() -> Self {
        Self::new()
    }
}

impl MasterOverlord {
    pub fn new() -> Self {
        Self {
            state: VisualizationState::new(),
            projects: BTreeMap::new(),
            initial_owner: None,
            history: None,
        }
    }

    /// Enables history tracking for projects attached from now on.
    pub fn with_history(mut self, helper: HistoryHelper) -> Self {
        self.history = Some(Rc::new(RefCell::new(helper)));
        self
    }

    pub fn has_history(&self) -> bool {
        self.history.is_some()
    }

    // =========================================================================
    // Projects
    // =========================================================================

    /// Enables state tracking for a project.
    ///
    /// The project binder is always bound. The history binder is bound when
    /// requested and history is available. If the state already knows this
    /// project, it is replayed to every binder but the one that set it, and
    /// `true` is returned; otherwise the project keeps its defaults.
    pub fn attach_project<P: StateTarget + 'static>(
        &mut self,
        project: &Rc<RefCell<P>>,
        bindings: &[BinderKey],
    ) -> Result<bool, StateError> {
        let mut overlord = ProjectOverlord::new(project.borrow().uuid());
        overlord.bind(Box::new(ProjectStateBinder::new(project)));
        if bindings.contains(&BinderKey::History) {
            if let Some(helper) = &self.history {
                overlord.bind(Box::new(HistoryStateBinder::new(helper.clone())));
            }
        }
        let uuid = overlord.uuid().to_owned();
        info!(%uuid, binders = ?overlord.binder_keys(), "project attached");

        let known = self.state.uuids.contains_key(&uuid);
        let overlord = match self.projects.entry(uuid.clone()) {
            Entry::Occupied(mut entry) => {
                entry.insert(overlord);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(overlord),
        };
        if !known {
            return Ok(false);
        }
        let owner = self
            .initial_owner
            .ok_or_else(|| StateError::MissingInitialOwner(uuid.clone()))?;
        overlord.broadcast(owner, None, &self.state);
        Ok(true)
    }

    pub fn detach_project(&mut self, uuid: &str) -> bool {
        self.projects.remove(uuid).is_some()
    }

    pub fn is_attached(&self, uuid: &str) -> bool {
        self.projects.contains_key(uuid)
    }

    // =========================================================================
    // State
    // =========================================================================

    pub fn state(&self) -> &VisualizationState {
        &self.state
    }

    /// Replaces the state without notifying anyone.
    pub fn set_state(&mut self, state: VisualizationState) {
        self.state = state;
    }

    /// Installs the state the document was loaded with and replays it to the
    /// projects already attached.
    ///
    /// Fails once any visualization has recorded a change.
    pub fn set_initial_state(
        &mut self,
        owner: BinderKey,
        state: VisualizationState,
    ) -> Result<(), StateError> {
        if !self.state.uuids.is_empty() {
            return Err(StateError::InitialStateConflict(owner.to_string()));
        }
        self.initial_owner = Some(owner);
        self.state = state;

        let Self { state, projects, .. } = self;
        for uuid in state.uuids.keys() {
            if let Some(overlord) = projects.get_mut(uuid) {
                overlord.broadcast(owner, None, state);
            }
        }
        Ok(())
    }

    /// Folds a delta into the state without notifying anyone.
    pub fn push_delta(&mut self, delta: Delta, replace: bool) -> Delta {
        self.state.push_delta(delta, replace)
    }

    /// Applies a transition and broadcasts it to the affected visualization.
    ///
    /// A `target` state replaces the canonical state outright (history
    /// jumps); otherwise the delta is folded in, merging layout positions
    /// unless `replace` is set. Returns the delta as broadcast.
    pub fn transition(
        &mut self,
        source: BinderKey,
        delta: Delta,
        target: Option<VisualizationState>,
        replace: bool,
    ) -> Result<Delta, StateError> {
        if !self.projects.contains_key(&delta.uuid) {
            return Err(StateError::UnknownProject(delta.uuid));
        }
        let delta = match target {
            Some(target) => {
                self.state = target;
                delta
            }
            None => self.state.push_delta(delta, replace),
        };
        debug!(uuid = %delta.uuid, facet = %delta.facet, %source, "state transition");

        let Self { state, projects, .. } = self;
        if let Some(overlord) = projects.get_mut(&delta.uuid) {
            overlord.broadcast(source, Some(&delta), state);
        }
        Ok(delta)
    }

    /// Records a change that originated in a binder.
    pub fn push_change(
        &mut self,
        uuid: &str,
        source: BinderKey,
        facet: Facet,
        facet_state: Value,
        replace: bool,
    ) -> Result<Delta, StateError> {
        self.transition(source, Delta::new(uuid, facet, facet_state), None, replace)
    }

    /// Handles a history navigation. `target` is the popped entry.
    pub fn pop_state(&mut self, target: Option<Value>) -> Result<(), StateError> {
        let Some(helper) = self.history.clone() else {
            return Ok(());
        };
        let outcome = helper.borrow_mut().history_change(target, &self.state);
        match outcome {
            PopOutcome::Ignored => Ok(()),
            PopOutcome::Initial(state) => self.set_initial_state(BinderKey::History, state),
            PopOutcome::Transition { delta, target } => self
                .transition(BinderKey::History, delta, target, false)
                .map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{HistoryBackend, MemoryHistory};
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        uuid: String,
        changes: Vec<(Facet, Value)>,
        rebuilds: Vec<Option<BTreeMap<Facet, Value>>>,
    }

    impl Recorder {
        fn attached(uuid: &str) -> Rc<RefCell<Self>> {
            Rc::new(RefCell::new(Self {
                uuid: uuid.to_owned(),
                ..Default::default()
            }))
        }
    }

    impl StateTarget for Recorder {
        fn uuid(&self) -> &str {
            &self.uuid
        }

        fn state_changed(&mut self, facet: &Facet, facet_state: &Value) {
            self.changes.push((facet.clone(), facet_state.clone()));
        }

        fn set_state(&mut self, facets: Option<&BTreeMap<Facet, Value>>) {
            self.rebuilds.push(facets.cloned());
        }
    }

    struct Shared(Rc<RefCell<MemoryHistory>>);

    impl HistoryBackend for Shared {
        fn push_state(&mut self, state: &VisualizationState) {
            self.0.borrow_mut().push_state(state);
        }
    }

    fn with_history() -> (MasterOverlord, Rc<RefCell<MemoryHistory>>) {
        let memory = Rc::new(RefCell::new(MemoryHistory::new()));
        let master =
            MasterOverlord::new().with_history(HistoryHelper::new(Box::new(Shared(memory.clone()))));
        (master, memory)
    }

    #[test]
    fn test_source_binder_not_notified() {
        let (mut master, memory) = with_history();
        let project = Recorder::attached("viz");
        assert!(!master.attach_project(&project, &[BinderKey::History]).unwrap());

        master
            .push_change("viz", BinderKey::Project, Facet::Layout, json!({"engine": "tree"}), false)
            .unwrap();
        assert!(project.borrow().changes.is_empty());
        assert_eq!(memory.borrow().entries().len(), 1);
        assert_eq!(
            master.state().facet_state("viz", &Facet::Layout),
            Some(&json!({"engine": "tree"}))
        );
    }

    #[test]
    fn test_unknown_project_rejected() {
        let mut master = MasterOverlord::new();
        let err = master
            .push_change("nope", BinderKey::Project, Facet::Layout, Value::Null, false)
            .unwrap_err();
        assert!(matches!(err, StateError::UnknownProject(uuid) if uuid == "nope"));
    }

    #[test]
    fn test_history_binder_requires_helper() {
        let mut master = MasterOverlord::new();
        let project = Recorder::attached("viz");
        master.attach_project(&project, &[BinderKey::History]).unwrap();
        assert_eq!(master.projects["viz"].binder_keys(), vec![BinderKey::Project]);
    }

    #[test]
    fn test_initial_state_replayed_to_attached_projects() {
        let (mut master, _) = with_history();
        let early = Recorder::attached("viz");
        master.attach_project(&early, &[BinderKey::History]).unwrap();

        let mut initial = VisualizationState::new();
        initial.push_delta(Delta::new("viz", Facet::SelectionFilter, json!(["a"])), false);
        let raw = serde_json::to_value(&initial).unwrap();
        master.pop_state(Some(raw)).unwrap();

        let rebuilds = &early.borrow().rebuilds;
        assert_eq!(rebuilds.len(), 1);
        assert_eq!(
            rebuilds[0].as_ref().unwrap()[&Facet::SelectionFilter],
            json!(["a"])
        );

        // A project attached later replays the known state too.
        let mut other = initial.clone();
        other.push_delta(Delta::new("late", Facet::Layout, json!({"engine": "flow"})), false);
        master.set_state(other);
        let late = Recorder::attached("late");
        assert!(master.attach_project(&late, &[]).unwrap());
        assert_eq!(late.borrow().rebuilds.len(), 1);
    }

    #[test]
    fn test_initial_state_after_change_conflicts() {
        let mut master = MasterOverlord::new();
        let project = Recorder::attached("viz");
        master.attach_project(&project, &[]).unwrap();
        master
            .push_change("viz", BinderKey::Project, Facet::Layout, json!({"engine": "flow"}), false)
            .unwrap();
        let err = master
            .set_initial_state(BinderKey::History, VisualizationState::new())
            .unwrap_err();
        assert!(matches!(err, StateError::InitialStateConflict(owner) if owner == "history"));
    }

    #[test]
    fn test_missing_initial_owner() {
        let mut master = MasterOverlord::new();
        let mut state = VisualizationState::new();
        state.push_delta(Delta::new("viz", Facet::Layout, json!({"engine": "flow"})), false);
        master.set_state(state);

        let project = Recorder::attached("viz");
        let err = master.attach_project(&project, &[]).unwrap_err();
        assert!(matches!(err, StateError::MissingInitialOwner(_)));
    }

    #[test]
    fn test_history_round_trip() {
        let (mut master, memory) = with_history();
        let project = Recorder::attached("viz");
        master.attach_project(&project, &[BinderKey::History]).unwrap();
        // No initial pop fired: the first push disables initial detection.
        let size = Facet::Filter("size".into());

        master
            .push_change("viz", BinderKey::Project, size.clone(), json!(3), false)
            .unwrap();
        master
            .push_change("viz", BinderKey::Project, size.clone(), json!(7), false)
            .unwrap();
        let entries = memory.borrow().entries().to_vec();
        assert_eq!(entries.len(), 2);

        // Back: the previous entry restores 3.
        master.pop_state(Some(entries[0].clone())).unwrap();
        assert_eq!(project.borrow().changes.last(), Some(&(size.clone(), json!(3))));
        assert_eq!(master.state().facet_state("viz", &size), Some(&json!(3)));

        // Forward: the later entry applies 7 again.
        master.pop_state(Some(entries[1].clone())).unwrap();
        assert_eq!(project.borrow().changes.last(), Some(&(size.clone(), json!(7))));

        // Back to the landing page: the facet reverts to default.
        master.pop_state(Some(entries[0].clone())).unwrap();
        master.pop_state(None).unwrap();
        assert_eq!(project.borrow().changes.last(), Some(&(size.clone(), Value::Null)));
        assert_eq!(master.state().facet_state("viz", &size), None);

        // History-originated transitions are not pushed back to history.
        assert_eq!(memory.borrow().entries().len(), 2);
    }
}
