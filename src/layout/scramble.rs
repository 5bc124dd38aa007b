//! Scramble layout: random placement in a central region.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::{LayoutEngine, LayoutPass};
use crate::config::ScrambleConfig;
use crate::error::LayoutResult;

/// Scatters renderings around a point at one third of the container.
///
/// Positions fall within `spread` of the container on each side of the center,
/// so the renderings cluster instead of covering the whole area. Passes
/// triggered by filter changes are ignored, since re-scrambling on every
/// filter tweak would be disorienting.
pub struct ScrambleLayout {
    config: ScrambleConfig,
    rng: SmallRng,
}

impl ScrambleLayout {
    pub fn new(config: ScrambleConfig) -> Self {
        let seed = config.seed.unwrap_or_else(clock_seed);
        Self {
            config,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ScrambleConfig::default())
    }

    fn scatter(&mut self, extent: f64) -> f64 {
        let max = (extent * self.config.spread).round();
        let r: f64 = self.rng.random();
        (extent * self.config.center + r * max * 2.0 - max).round()
    }
}

#[cfg(target_arch = "wasm32")]
fn clock_seed() -> u64 {
    js_sys::Date::now() as u64
}

#[cfg(not(target_arch = "wasm32"))]
fn clock_seed() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

impl LayoutEngine for ScrambleLayout {
    fn name(&self) -> &'static str {
        "scramble"
    }

    fn layout(&mut self, pass: &mut LayoutPass<'_>) -> LayoutResult<bool> {
        if pass.options.filter {
            debug!("filter-triggered pass, keeping scrambled positions");
            return Ok(false);
        }
        let container = pass.container;
        for id in pass.visible {
            let top = self.scatter(container.height);
            let left = self.scatter(container.width);
            pass.pipeline.move_to(id, top, left);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::layout::{LayoutBox, LayoutOptions};
    use crate::meta::Metamodel;
    use crate::model::{Dimensions, ModelGraph};
    use crate::render::{RenderingPipeline, StaticRenderer};
    use serde_json::json;
    use std::rc::Rc;

    fn run(layout: &mut ScrambleLayout, options: LayoutOptions) -> (ModelGraph, usize) {
        let records = (0..50).map(|i| json!({"id": i})).collect();
        let mut models = ModelGraph::from_values(records, Dimensions::new(10.0, 10.0)).unwrap();
        let meta = Metamodel::new();
        let mut pipeline =
            RenderingPipeline::new(PipelineConfig::default(), Rc::new(StaticRenderer::default()));
        let visible = models.visible_ids();
        let mut pass = LayoutPass {
            pipeline: &mut pipeline,
            container: LayoutBox::new(900.0, 600.0),
            visible: &visible,
            models: &mut models,
            meta: &meta,
            options: &options,
        };
        layout.layout(&mut pass).unwrap();
        let queued = pipeline.pending();
        pipeline.apply(&mut models);
        (models, queued)
    }

    #[test]
    fn test_positions_within_central_region() {
        let mut layout = ScrambleLayout::new(ScrambleConfig {
            seed: Some(42),
            ..Default::default()
        });
        let (models, queued) = run(&mut layout, LayoutOptions::default());
        assert_eq!(queued, 50);
        for model in models.iter() {
            let p = model.rendering().position();
            // height 600: center 200, spread 180; width 900: center 300, spread 270
            assert!((20.0..=380.0).contains(&p.top), "top {}", p.top);
            assert!((30.0..=570.0).contains(&p.left), "left {}", p.left);
        }
    }

    #[test]
    fn test_filter_pass_is_noop() {
        let mut layout = ScrambleLayout::new(ScrambleConfig {
            seed: Some(1),
            ..Default::default()
        });
        let (_, queued) = run(
            &mut layout,
            LayoutOptions {
                filter: true,
                ..Default::default()
            },
        );
        assert_eq!(queued, 0);
    }

    #[test]
    fn test_same_seed_same_layout() {
        let config = ScrambleConfig {
            seed: Some(7),
            ..Default::default()
        };
        let (a, _) = run(&mut ScrambleLayout::new(config.clone()), LayoutOptions::default());
        let (b, _) = run(&mut ScrambleLayout::new(config), LayoutOptions::default());
        let pa: Vec<_> = a.iter().map(|m| m.rendering().position()).collect();
        let pb: Vec<_> = b.iter().map(|m| m.rendering().position()).collect();
        assert_eq!(pa, pb);
    }
}
