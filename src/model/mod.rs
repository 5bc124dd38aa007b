//! Data model: wrapped records, their renderings and the model graph.

pub mod elevation;
mod graph;
mod id;
mod record;
mod rendering;

pub use elevation::ElevationMap;
pub use graph::{ID_ATTRIBUTE, ModelGraph};
pub use id::ModelId;
pub use record::Model;
pub use rendering::{Dimensions, MIN_RESCALE_EXTENT, Position, Rect, Rendering};
