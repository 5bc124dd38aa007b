//! Render batches shipped to the host after a layout pass.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{ModelGraph, ModelId, Rect, Rendering};

/// The full visual state of one rendering, as the host should display it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderCommand {
    pub id: ModelId,
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
    pub background: Option<String>,
    pub z_index: i32,
    pub visible: bool,
    pub expanded: bool,
}

impl RenderCommand {
    pub fn from_rendering(id: &ModelId, rendering: &Rendering) -> Self {
        let rect = rendering.rect();
        Self {
            id: id.clone(),
            top: rect.top,
            left: rect.left,
            width: rect.width,
            height: rect.height,
            background: rendering.background().map(str::to_owned),
            z_index: rendering.elevation().top(),
            visible: rendering.is_visible(),
            expanded: rendering.is_expanded(),
        }
    }
}

/// Free-floating decorations drawn alongside the renderings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Artifact {
    /// A bucket label. Clicking it toggles selection of all its members.
    BucketHeader {
        key: Value,
        label: String,
        top: f64,
        left: f64,
        members: Vec<ModelId>,
    },
    /// A straight line segment linking a tree node to its parent.
    Connector { rect: Rect },
}

/// Everything the host needs to bring the display in sync after a pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderBatch {
    /// Renderings whose visual state changed.
    pub commands: Vec<RenderCommand>,
    /// The complete artifact layer. Replaces any previous layer.
    pub artifacts: Vec<Artifact>,
    /// Bounding box of every rendering touched by the pipeline.
    pub bounds: Option<Rect>,
}

impl RenderBatch {
    /// Drains the dirty flag of every rendering into commands.
    pub fn collect(models: &mut ModelGraph, artifacts: Vec<Artifact>, bounds: Option<Rect>) -> Self {
        let commands = models
            .iter_mut()
            .filter_map(|model| {
                let id = model.id().clone();
                let rendering = model.rendering_mut();
                rendering
                    .take_dirty()
                    .then(|| RenderCommand::from_rendering(&id, rendering))
            })
            .collect();
        Self {
            commands,
            artifacts,
            bounds,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.artifacts.is_empty()
    }

    /// Folds a later batch into this one. Later commands for the same id win.
    pub fn merge(&mut self, later: RenderBatch) {
        for command in later.commands {
            match self.commands.iter_mut().find(|c| c.id == command.id) {
                Some(existing) => *existing = command,
                None => self.commands.push(command),
            }
        }
        self.artifacts = later.artifacts;
        self.bounds = match (self.bounds, later.bounds) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, b) => b.or(a),
        };
    }
}
