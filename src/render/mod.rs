//! Rendering pipeline, backups and the batches shipped to the host.

mod backup;
mod batch;
mod pipeline;
mod renderer;

pub use backup::RenderingBackupManager;
pub use batch::{Artifact, RenderBatch, RenderCommand};
pub use pipeline::RenderingPipeline;
pub use renderer::{Renderer, RendererCaps, StaticRenderer, can_rescale};
