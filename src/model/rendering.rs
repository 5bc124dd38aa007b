//! Per-model visual state.
//!
//! A [`Rendering`] holds the geometry and style the host should display for a
//! model. Layout engines never touch it directly: they queue operations on a
//! [`RenderingPipeline`](crate::render::RenderingPipeline), which mutates the
//! rendering and marks it dirty so the change is shipped to the host on the
//! next batch.

use serde::{Deserialize, Serialize};

use super::elevation::ElevationMap;

/// Minimum extent (exclusive) a rendering can be rescaled to, per axis.
pub const MIN_RESCALE_EXTENT: f64 = 2.0;

/// Pixel dimensions of a rendering.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

impl Dimensions {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Top-left pixel position of a rendering inside the universe.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub top: f64,
    pub left: f64,
}

impl Position {
    pub fn new(top: f64, left: f64) -> Self {
        Self { top, left }
    }
}

/// Axis-aligned rectangle in universe coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    /// Smallest rectangle containing both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        let top = self.top.min(other.top);
        let left = self.left.min(other.left);
        Rect {
            top,
            left,
            width: self.right().max(other.right()) - left,
            height: self.bottom().max(other.bottom()) - top,
        }
    }
}

/// Visual state of a single model.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendering {
    position: Position,
    dims: Dimensions,
    background: Option<String>,
    elevation: ElevationMap,
    visible: bool,
    expanded: bool,
    dirty: bool,
}

impl Rendering {
    /// Create a rendering with the natural dimensions reported by the host.
    pub fn new(dims: Dimensions) -> Self {
        Self {
            position: Position::default(),
            dims,
            background: None,
            elevation: ElevationMap::default(),
            visible: true,
            expanded: false,
            dirty: true,
        }
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    pub fn rect(&self) -> Rect {
        Rect::new(
            self.position.top,
            self.position.left,
            self.dims.width,
            self.dims.height,
        )
    }

    pub fn move_to(&mut self, top: f64, left: f64) {
        let next = Position::new(top, left);
        if next != self.position {
            self.position = next;
            self.dirty = true;
        }
    }

    /// Whether the rendering can be resized to the given extent.
    pub fn can_rescale_to(width: f64, height: f64) -> bool {
        width > MIN_RESCALE_EXTENT && height > MIN_RESCALE_EXTENT
    }

    /// Resizes the rendering. Fails (leaving it untouched) when either extent
    /// is too small to display anything meaningful.
    pub fn rescale(&mut self, width: f64, height: f64) -> bool {
        if !Self::can_rescale_to(width, height) {
            return false;
        }
        self.set_dims(Dimensions::new(width, height));
        true
    }

    /// Unconditionally sets the dimensions. Used when restoring backups.
    pub fn set_dims(&mut self, dims: Dimensions) {
        if dims != self.dims {
            self.dims = dims;
            self.dirty = true;
        }
    }

    // =========================================================================
    // Style
    // =========================================================================

    pub fn background(&self) -> Option<&str> {
        self.background.as_deref()
    }

    pub fn set_background(&mut self, background: Option<String>) {
        if background != self.background {
            self.background = background;
            self.dirty = true;
        }
    }

    // =========================================================================
    // Elevation
    // =========================================================================

    pub fn elevation(&self) -> &ElevationMap {
        &self.elevation
    }

    pub fn push_elevation(&mut self, key: &str, value: i32) {
        if self.elevation.add(key, value) {
            self.dirty = true;
        }
    }

    pub fn pop_elevation(&mut self, key: &str) {
        if self.elevation.remove(key) {
            self.dirty = true;
        }
    }

    pub fn set_elevation(&mut self, elevation: ElevationMap) {
        if elevation.top() != self.elevation.top() {
            self.dirty = true;
        }
        self.elevation = elevation;
    }

    // =========================================================================
    // Visibility and expansion
    // =========================================================================

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) -> bool {
        if visible == self.visible {
            return false;
        }
        self.visible = visible;
        self.dirty = true;
        true
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub fn set_expanded(&mut self, expanded: bool) {
        if expanded == self.expanded {
            return;
        }
        self.expanded = expanded;
        if expanded {
            self.push_elevation(super::elevation::EXPANDED, 1);
        } else {
            self.pop_elevation(super::elevation::EXPANDED);
        }
        self.dirty = true;
    }

    /// Returns and clears the dirty flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl Default for Rendering {
    fn default() -> Self {
        Self::new(Dimensions::default())
    }
}
