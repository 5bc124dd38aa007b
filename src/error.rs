//! Error types shared by the layout, loading and state subsystems.
//!
//! Layout errors never cross the `LayoutManager` boundary: they are logged and
//! the failed pass is discarded. Load errors abort model loading entirely.

use thiserror::Error;

use crate::model::ModelId;

/// Errors raised while computing a layout pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// The parent-reference hierarchy contains a cycle.
    ///
    /// `hidden` is set when the cycle runs only through filtered models.
    #[error("tree is invalid: {} detected", if *hidden { "hidden cycle" } else { "cycle" })]
    Cycle { hidden: bool },

    #[error("invalid layout engine: {0}")]
    UnknownEngine(String),

    #[error("received invalid layout state for engine: {0}")]
    InvalidState(String),

    #[error("attribute `{0}` does not match any metamodel property")]
    UnknownAttribute(String),
}

/// Errors raised while loading models into a [`ModelGraph`](crate::model::ModelGraph).
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("duplicate model id: {0}")]
    DuplicateId(ModelId),

    #[error("model at position {0} has no id")]
    MissingId(usize),

    #[error("model payload is not an object at position {0}")]
    NotAnObject(usize),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by the state synchronization engine.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("no project attached with uuid: {0}")]
    UnknownProject(String),

    #[error("initial state received by {0} after a state change was already issued")]
    InitialStateConflict(String),

    #[error("initial state owner is unknown, even though an initial state exists for: {0}")]
    MissingInitialOwner(String),

    #[error("state serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type LayoutResult<T> = std::result::Result<T, LayoutError>;
