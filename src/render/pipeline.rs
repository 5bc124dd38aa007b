//! The rendering pipeline.
//!
//! Layouts queue `move`, `resize` and `style` operations plus free-floating
//! artifacts, then [`RenderingPipeline::apply`] executes everything in one
//! pass. Mutations that a later layout switch must be able to revert are
//! backed up immediately before they are applied.

use std::rc::Rc;
use tracing::debug;

use super::backup::RenderingBackupManager;
use super::batch::Artifact;
use super::renderer::{Renderer, can_rescale};
use crate::config::PipelineConfig;
use crate::model::{ModelGraph, ModelId, Rect};

#[derive(Debug, Clone, PartialEq)]
enum Operation {
    Move {
        id: ModelId,
        top: f64,
        left: f64,
        elevation: Option<(String, i32)>,
    },
    Resize {
        id: ModelId,
        width: f64,
        height: f64,
    },
    Style {
        id: ModelId,
        background: Option<String>,
    },
}

impl Operation {
    fn id(&self) -> &ModelId {
        match self {
            Operation::Move { id, .. } | Operation::Resize { id, .. } | Operation::Style { id, .. } => id,
        }
    }

    /// Whether the operation changes something a backup must protect.
    fn needs_backup(&self) -> bool {
        !matches!(self, Operation::Move { elevation: None, .. })
    }
}

/// Batches rendering mutations and applies them in one pass.
pub struct RenderingPipeline {
    config: PipelineConfig,
    renderer: Rc<dyn Renderer>,
    backups: RenderingBackupManager,
    queue: Vec<Operation>,
    pending_artifacts: Vec<Artifact>,
    artifacts: Vec<Artifact>,
}

impl RenderingPipeline {
    pub fn new(config: PipelineConfig, renderer: Rc<dyn Renderer>) -> Self {
        Self {
            config,
            renderer,
            backups: RenderingBackupManager::new(),
            queue: Vec::new(),
            pending_artifacts: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn renderer(&self) -> &dyn Renderer {
        self.renderer.as_ref()
    }

    pub fn backups(&self) -> &RenderingBackupManager {
        &self.backups
    }

    pub fn backups_mut(&mut self) -> &mut RenderingBackupManager {
        &mut self.backups
    }

    // =========================================================================
    // Queueing
    // =========================================================================

    /// Queues a move to an absolute position.
    pub fn move_to(&mut self, id: &ModelId, top: f64, left: f64) -> &mut Self {
        self.queue.push(Operation::Move {
            id: id.clone(),
            top,
            left,
            elevation: None,
        });
        self
    }

    /// Queues a move that also raises the rendering with a named elevation.
    pub fn move_elevated(
        &mut self,
        id: &ModelId,
        top: f64,
        left: f64,
        key: &str,
        elevation: i32,
    ) -> &mut Self {
        self.queue.push(Operation::Move {
            id: id.clone(),
            top,
            left,
            elevation: Some((key.to_owned(), elevation)),
        });
        self
    }

    /// Queues a resize. Returns `false`, queueing nothing, when the rendering
    /// cannot be shrunk to the requested extent.
    pub fn resize(&mut self, id: &ModelId, width: f64, height: f64) -> bool {
        if !can_rescale(self.renderer.as_ref(), id, width, height) {
            return false;
        }
        self.queue.push(Operation::Resize {
            id: id.clone(),
            width,
            height,
        });
        true
    }

    /// Queues a background change. `None` restores the default background.
    pub fn style(&mut self, id: &ModelId, background: Option<String>) -> &mut Self {
        self.queue.push(Operation::Style {
            id: id.clone(),
            background,
        });
        self
    }

    /// Adds an artifact. It stays hidden until the pipeline is applied.
    pub fn artifact(&mut self, artifact: Artifact) -> &mut Self {
        self.pending_artifacts.push(artifact);
        self
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Executes every queued operation. Returns the bounding rectangle of all
    /// affected renderings, or `None` if nothing was queued.
    pub fn apply(&mut self, models: &mut ModelGraph) -> Option<Rect> {
        let mut bounds: Option<Rect> = None;
        let count = self.queue.len();
        for op in self.queue.drain(..) {
            let Some(model) = models.get_mut(op.id()) else {
                continue;
            };
            if self.config.backups && op.needs_backup() {
                self.backups.backup(model.id(), model.rendering());
            }
            let rendering = model.rendering_mut();
            match op {
                Operation::Move {
                    top,
                    left,
                    elevation,
                    ..
                } => {
                    rendering.move_to(top, left);
                    if let Some((key, value)) = elevation {
                        rendering.push_elevation(&key, value);
                    }
                }
                Operation::Resize { width, height, .. } => {
                    rendering.rescale(width, height);
                }
                Operation::Style { background, .. } => {
                    rendering.set_background(background);
                }
            }
            let rect = rendering.rect();
            bounds = Some(match bounds {
                Some(b) => b.union(&rect),
                None => rect,
            });
        }
        self.artifacts.append(&mut self.pending_artifacts);
        debug!(
            operations = count,
            artifacts = self.artifacts.len(),
            backups = self.backups.num_backups(),
            "applied rendering pipeline"
        );
        bounds
    }

    /// The live artifact layer, revealed by the last `apply`.
    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    /// Drops queued operations and clears the artifact layer.
    pub fn cleanup(&mut self) {
        self.queue.clear();
        self.pending_artifacts.clear();
        self.artifacts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::model::{Dimensions, ElevationMap};
    use crate::render::StaticRenderer;
    use serde_json::json;

    fn setup(backups: bool) -> (RenderingPipeline, ModelGraph) {
        let pipeline =
            RenderingPipeline::new(PipelineConfig { backups }, Rc::new(StaticRenderer::default()));
        let graph = ModelGraph::from_values(
            vec![json!({"id": "a"}), json!({"id": "b"})],
            Dimensions::new(50.0, 20.0),
        )
        .unwrap();
        (pipeline, graph)
    }

    #[test]
    fn test_apply_returns_bounds() {
        let (mut pipeline, mut graph) = setup(true);
        pipeline.move_to(&"a".into(), 10.0, 10.0);
        pipeline.move_to(&"b".into(), 100.0, 200.0);
        let bounds = pipeline.apply(&mut graph).unwrap();
        assert_eq!(bounds, Rect::new(10.0, 10.0, 240.0, 110.0));
        assert_eq!(pipeline.pending(), 0);
    }

    #[test]
    fn test_plain_moves_are_not_backed_up() {
        let (mut pipeline, mut graph) = setup(true);
        pipeline.move_to(&"a".into(), 10.0, 10.0);
        pipeline.apply(&mut graph);
        assert_eq!(pipeline.backups().num_backups(), 0);

        pipeline.move_elevated(&"a".into(), 10.0, 10.0, "__treemap__", 2);
        pipeline.apply(&mut graph);
        assert_eq!(pipeline.backups().num_backups(), 1);
    }

    #[test]
    fn test_backup_captured_before_mutation() {
        let (mut pipeline, mut graph) = setup(true);
        let id = ModelId::from("a");
        assert!(pipeline.resize(&id, 30.0, 30.0));
        pipeline.style(&id, Some("rgb(0,0,0)".into()));
        pipeline.apply(&mut graph);
        assert_eq!(
            graph.get(&id).unwrap().rendering().dims(),
            Dimensions::new(30.0, 30.0)
        );

        pipeline.backups_mut().restore_all(&mut graph);
        let r = graph.get(&id).unwrap().rendering();
        assert_eq!(r.dims(), Dimensions::new(50.0, 20.0));
        assert_eq!(r.background(), None);
        assert_eq!(r.elevation().top(), ElevationMap::DEFAULT_OFFSET);
        assert_eq!(pipeline.backups().num_backups(), 0);
    }

    #[test]
    fn test_backups_disabled() {
        let (mut pipeline, mut graph) = setup(false);
        pipeline.resize(&"a".into(), 30.0, 30.0);
        pipeline.apply(&mut graph);
        assert_eq!(pipeline.backups().num_backups(), 0);
    }

    #[test]
    fn test_resize_rejects_tiny_extents() {
        let (mut pipeline, _) = setup(true);
        assert!(!pipeline.resize(&"a".into(), 1.0, 30.0));
        assert_eq!(pipeline.pending(), 0);
    }

    #[test]
    fn test_artifacts_revealed_on_apply() {
        let (mut pipeline, mut graph) = setup(true);
        pipeline.artifact(Artifact::Connector {
            rect: Rect::new(0.0, 0.0, 2.0, 10.0),
        });
        assert!(pipeline.artifacts().is_empty());
        pipeline.apply(&mut graph);
        assert_eq!(pipeline.artifacts().len(), 1);
        pipeline.cleanup();
        assert!(pipeline.artifacts().is_empty());
    }
}
