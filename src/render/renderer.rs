//! Host renderer capabilities.
//!
//! The host renderer produces the actual markup for a model. The core never
//! calls into it to draw; it only needs to know which optional capabilities
//! the renderer offers, checked once when the renderer is installed.

use crate::model::{ModelId, Rendering};

/// Optional capabilities of a host renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RendererCaps {
    /// The renderer redraws itself when resized.
    pub rescale: bool,
    /// The renderer applies background changes itself.
    pub change_style: bool,
    /// Renderings can switch to an expanded form.
    pub expandable: bool,
    /// Rendering dimensions are stable and may be cached.
    pub cache_dimensions: bool,
}

/// A host renderer as seen by the layout core.
pub trait Renderer {
    fn caps(&self) -> RendererCaps;

    /// Whether a rendering may be resized to the given extent. The geometric
    /// minimum applies regardless of what the renderer answers.
    fn can_rescale_to(&self, _id: &ModelId, _width: f64, _height: f64) -> bool {
        true
    }
}

/// Checks both the geometric minimum and the renderer's own veto.
pub fn can_rescale(renderer: &dyn Renderer, id: &ModelId, width: f64, height: f64) -> bool {
    Rendering::can_rescale_to(width, height) && renderer.can_rescale_to(id, width, height)
}

/// A renderer with fixed capabilities, for hosts without a renderer object and
/// for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticRenderer {
    caps: RendererCaps,
}

impl StaticRenderer {
    pub fn new(caps: RendererCaps) -> Self {
        Self { caps }
    }
}

impl Renderer for StaticRenderer {
    fn caps(&self) -> RendererCaps {
        self.caps
    }
}
