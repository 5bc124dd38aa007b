//! Backups of rendering state mutated by layouts.
//!
//! Layouts like the treemap resize, recolor and restack renderings. Before the
//! first such mutation a snapshot of the rendering's size, elevation and
//! background is taken, so that switching layouts (or dropping a model from
//! the current one) can put the rendering back exactly as it was.
//!
//! Each aspect is restored independently. An entry disappears once all three
//! have been restored.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::model::{Dimensions, ElevationMap, ModelGraph, ModelId, Rendering};

/// Snapshot of one rendering. An aspect set to `None` has been restored.
#[derive(Debug, Clone, PartialEq)]
struct RenderingBackup {
    dims: Option<Dimensions>,
    elevation: Option<ElevationMap>,
    background: Option<Option<String>>,
}

impl RenderingBackup {
    fn capture(rendering: &Rendering) -> Self {
        Self {
            dims: Some(rendering.dims()),
            elevation: Some(rendering.elevation().clone()),
            background: Some(rendering.background().map(str::to_owned)),
        }
    }

    /// Captures aspects that were previously restored, leaving live ones
    /// untouched.
    fn refill(&mut self, rendering: &Rendering) {
        self.dims.get_or_insert_with(|| rendering.dims());
        self.elevation
            .get_or_insert_with(|| rendering.elevation().clone());
        self.background
            .get_or_insert_with(|| rendering.background().map(str::to_owned));
    }

    fn restore_size_and_elevation(&mut self, rendering: &mut Rendering) {
        if let Some(dims) = self.dims.take() {
            rendering.set_dims(dims);
        }
        if let Some(elevation) = self.elevation.take() {
            rendering.set_elevation(elevation);
        }
    }

    fn restore_style(&mut self, rendering: &mut Rendering) {
        if let Some(background) = self.background.take() {
            rendering.set_background(background);
        }
    }

    fn is_spent(&self) -> bool {
        self.dims.is_none() && self.elevation.is_none() && self.background.is_none()
    }
}

/// Tracks backups for every rendering a layout has mutated.
#[derive(Debug, Default)]
pub struct RenderingBackupManager {
    backups: HashMap<ModelId, RenderingBackup>,
}

impl RenderingBackupManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backs up a rendering. Returns whether a new backup entry was created;
    /// an existing entry keeps its originally captured values.
    pub fn backup(&mut self, id: &ModelId, rendering: &Rendering) -> bool {
        match self.backups.get_mut(id) {
            Some(existing) => {
                existing.refill(rendering);
                false
            }
            None => {
                self.backups
                    .insert(id.clone(), RenderingBackup::capture(rendering));
                true
            }
        }
    }

    /// Forgets a backup without restoring anything.
    pub fn remove_backup(&mut self, id: &ModelId) -> bool {
        self.backups.remove(id).is_some()
    }

    /// Partial restore.
    ///
    /// Renderings not in `survivors` are fully restored. When `style_reset` is
    /// set, every backed up rendering also gets its original background back.
    pub fn restore(
        &mut self,
        models: &mut ModelGraph,
        survivors: &HashSet<ModelId>,
        style_reset: bool,
    ) {
        let mut restored = 0;
        self.backups.retain(|id, backup| {
            let Some(model) = models.get_mut(id) else {
                return false;
            };
            let rendering = model.rendering_mut();
            if !survivors.contains(id) {
                backup.restore_size_and_elevation(rendering);
                backup.restore_style(rendering);
            } else if style_reset {
                backup.restore_style(rendering);
            }
            if backup.is_spent() {
                restored += 1;
                false
            } else {
                true
            }
        });
        debug!(restored, remaining = self.backups.len(), "partial backup restore");
    }

    /// Restores every backed up rendering and empties the manager.
    pub fn restore_all(&mut self, models: &mut ModelGraph) {
        let count = self.backups.len();
        for (id, mut backup) in self.backups.drain() {
            if let Some(model) = models.get_mut(&id) {
                let rendering = model.rendering_mut();
                backup.restore_size_and_elevation(rendering);
                backup.restore_style(rendering);
            }
        }
        if count > 0 {
            debug!(restored = count, "restored all backups");
        }
    }

    pub fn has_backup(&self, id: &ModelId) -> bool {
        self.backups.contains_key(id)
    }

    pub fn num_backups(&self) -> usize {
        self.backups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph() -> ModelGraph {
        ModelGraph::from_values(
            vec![json!({"id": "a"}), json!({"id": "b"})],
            Dimensions::new(100.0, 40.0),
        )
        .unwrap()
    }

    fn mutate(graph: &mut ModelGraph, id: &str) {
        let r = graph.get_mut(&id.into()).unwrap().rendering_mut();
        r.rescale(10.0, 10.0);
        r.set_background(Some("rgb(1,2,3)".into()));
        r.push_elevation("__treemap__", 3);
    }

    #[test]
    fn test_second_backup_keeps_original_values() {
        let mut graph = graph();
        let mut manager = RenderingBackupManager::new();
        let id = ModelId::from("a");

        assert!(manager.backup(&id, graph.get(&id).unwrap().rendering()));
        mutate(&mut graph, "a");
        assert!(!manager.backup(&id, graph.get(&id).unwrap().rendering()));

        manager.restore_all(&mut graph);
        let r = graph.get(&id).unwrap().rendering();
        assert_eq!(r.dims(), Dimensions::new(100.0, 40.0));
        assert_eq!(r.background(), None);
        assert_eq!(r.elevation().top(), ElevationMap::DEFAULT_OFFSET);
        assert_eq!(manager.num_backups(), 0);
    }

    #[test]
    fn test_partial_restore_only_touches_non_survivors() {
        let mut graph = graph();
        let mut manager = RenderingBackupManager::new();
        for id in ["a", "b"] {
            manager.backup(&id.into(), graph.get(&id.into()).unwrap().rendering());
            mutate(&mut graph, id);
        }

        let survivors: HashSet<ModelId> = [ModelId::from("b")].into_iter().collect();
        manager.restore(&mut graph, &survivors, false);

        assert_eq!(manager.num_backups(), 1);
        assert!(!manager.has_backup(&"a".into()));
        assert_eq!(
            graph.get(&"a".into()).unwrap().rendering().dims(),
            Dimensions::new(100.0, 40.0)
        );
        assert_eq!(
            graph.get(&"b".into()).unwrap().rendering().dims(),
            Dimensions::new(10.0, 10.0)
        );
    }

    #[test]
    fn test_style_reset_keeps_size_backup() {
        let mut graph = graph();
        let mut manager = RenderingBackupManager::new();
        let id = ModelId::from("a");
        manager.backup(&id, graph.get(&id).unwrap().rendering());
        mutate(&mut graph, "a");

        let survivors: HashSet<ModelId> = [id.clone()].into_iter().collect();
        manager.restore(&mut graph, &survivors, true);

        let r = graph.get(&id).unwrap().rendering();
        assert_eq!(r.background(), None);
        assert_eq!(r.dims(), Dimensions::new(10.0, 10.0));
        assert!(manager.has_backup(&id), "size and elevation are still pending");

        // recoloring after a style reset captures the original style again
        assert!(!manager.backup(&id, graph.get(&id).unwrap().rendering()));
        graph
            .get_mut(&id)
            .unwrap()
            .rendering_mut()
            .set_background(Some("red".into()));
        manager.restore_all(&mut graph);
        let r = graph.get(&id).unwrap().rendering();
        assert_eq!(r.background(), None);
        assert_eq!(r.dims(), Dimensions::new(100.0, 40.0));
    }

    #[test]
    fn test_remove_backup() {
        let graph = graph();
        let mut manager = RenderingBackupManager::new();
        let id = ModelId::from("a");
        manager.backup(&id, graph.get(&id).unwrap().rendering());
        assert!(manager.remove_backup(&id));
        assert!(!manager.remove_backup(&id));
        assert_eq!(manager.num_backups(), 0);
    }
}
