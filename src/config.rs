//! Configuration for layouts, the rendering pipeline and the host facade.
//!
//! Every struct has a `Default` carrying the stock visual constants, and
//! deserializes from partial JS objects (missing fields keep their default).

use serde::{Deserialize, Serialize};

/// An RGB color triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Linear interpolation between two colors, `ratio` in `[0, 1]`.
    pub fn lerp(&self, other: &Rgb, ratio: f64) -> Rgb {
        let ratio = if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 0.0 };
        let channel = |a: u8, b: u8| {
            (f64::from(a) + (f64::from(b) - f64::from(a)) * ratio).round() as u8
        };
        Rgb::new(
            channel(self.r, other.r),
            channel(self.g, other.g),
            channel(self.b, other.b),
        )
    }

    /// CSS representation, e.g. `rgb(237,76,95)`.
    pub fn to_css(&self) -> String {
        format!("rgb({},{},{})", self.r, self.g, self.b)
    }
}

/// Row packing parameters for the flow layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FlowConfig {
    /// Initial top/left offset of the cursor.
    pub offset: f64,
    /// Gap between renderings, both within and between rows.
    pub spacing: f64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            offset: 5.0,
            spacing: 5.0,
        }
    }
}

/// Parameters for the bucket layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BucketConfig {
    /// Vertical gap left after each bucket.
    pub bucket_gap: f64,
    /// Height reserved for a bucket header.
    pub header_height: f64,
    pub flow: FlowConfig,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            bucket_gap: 10.0,
            header_height: 20.0,
            flow: FlowConfig::default(),
        }
    }
}

/// Bounds of the random region used by the scramble layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScrambleConfig {
    /// Half-extent of the region, as a fraction of the container.
    pub spread: f64,
    /// Center of the region, as a fraction of the container.
    pub center: f64,
    /// Fixed RNG seed. When unset, a clock-derived seed is used.
    pub seed: Option<u64>,
}

impl Default for ScrambleConfig {
    fn default() -> Self {
        Self {
            spread: 0.3,
            center: 1.0 / 3.0,
            seed: None,
        }
    }
}

/// Spacing for the tree layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TreeConfig {
    /// Padding around every node along both axes.
    pub padding: f64,
    /// Opposite-direction indent of children relative to their parent.
    pub child_indent: f64,
    /// Extra opposite-direction room reserved in each bounding rect.
    pub bounding_extra: f64,
    /// Thickness of connector segments.
    pub connector_thickness: f64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            padding: 5.0,
            child_indent: 20.0,
            bounding_extra: 25.0,
            connector_thickness: 2.0,
        }
    }
}

/// Nesting and coloring parameters for the treemap layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TreeMapConfig {
    /// Inset applied on every side of a nested bounding rect.
    pub nested_padding: f64,
    /// Extra room left at the top of a nested rect for the parent header.
    pub header_height: f64,
    /// Smallest interior extent, per axis, worth nesting children into.
    pub min_nested_extent: f64,
    /// Color of the lowest color-attribute value.
    pub color_min: Rgb,
    /// Color of the highest color-attribute value.
    pub color_max: Rgb,
    /// Color of non-leaf nodes with visible children.
    pub group_color: Rgb,
}

impl Default for TreeMapConfig {
    fn default() -> Self {
        Self {
            nested_padding: 2.0,
            header_height: 15.0,
            min_nested_extent: 20.0,
            color_min: Rgb::new(237, 76, 95),
            color_max: Rgb::new(122, 255, 115),
            group_color: Rgb::new(204, 204, 204),
        }
    }
}

/// Rendering pipeline behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Whether mutations are backed up so they can be reverted.
    pub backups: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { backups: true }
    }
}

/// Host-level options for a visualization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// Engine used when a layout request names none.
    pub layout: String,
    /// Natural rendering size assumed for every model.
    pub model_width: f64,
    pub model_height: f64,
    pub flow: FlowConfig,
    pub bucket: BucketConfig,
    pub scramble: ScrambleConfig,
    pub tree: TreeConfig,
    pub treemap: TreeMapConfig,
    pub pipeline: PipelineConfig,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            layout: "flow".to_owned(),
            model_width: 100.0,
            model_height: 40.0,
            flow: FlowConfig::default(),
            bucket: BucketConfig::default(),
            scramble: ScrambleConfig::default(),
            tree: TreeConfig::default(),
            treemap: TreeMapConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}
