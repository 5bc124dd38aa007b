//! Bucket layout: models grouped under headers, one flow per group.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{error, info};

use super::flow::FlowLayout;
use super::{LayoutEngine, LayoutPass, parse_state, state_value};
use crate::config::BucketConfig;
use crate::error::{LayoutError, LayoutResult};
use crate::meta::{Cluster, Metamodel, sort_by_kind};
use crate::model::{ModelGraph, ModelId};
use crate::render::Artifact;

/// Grouping settings of the bucket layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BucketState {
    /// Attribute to group by. Defaults to the first metamodel attribute.
    pub bucket_by: Option<String>,
    pub reverse: bool,
}

struct Bucket {
    cluster: Cluster,
    members: Vec<ModelId>,
}

/// Groups models by the clustered value of an attribute.
///
/// Buckets are ordered by the attribute kind's comparator applied to the
/// cluster keys; each bucket gets a header artifact followed by an internal
/// flow of its members, sorted on the same attribute.
pub struct BucketLayout {
    config: BucketConfig,
    state: BucketState,
    flow: FlowLayout,
}

impl BucketLayout {
    pub fn new(config: BucketConfig) -> Self {
        let flow = FlowLayout::new(config.flow.clone());
        Self {
            config,
            state: BucketState::default(),
            flow,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(BucketConfig::default())
    }

    fn bucket_key<'m>(&'m self, meta: &'m Metamodel) -> Option<&'m str> {
        self.state
            .bucket_by
            .as_deref()
            .or_else(|| meta.keys().next())
    }
}

impl LayoutEngine for BucketLayout {
    fn name(&self) -> &'static str {
        "bucket"
    }

    fn layout(&mut self, pass: &mut LayoutPass<'_>) -> LayoutResult<bool> {
        let reverse = self.state.reverse;
        let meta = pass.meta;
        let key = match self.bucket_key(meta) {
            Some(key) => key.to_owned(),
            None => return Err(LayoutError::UnknownAttribute(String::new())),
        };
        let Some(attr) = meta.get(&key) else {
            error!(%key, "bucketing attribute does not match any metamodel property");
            return Err(LayoutError::UnknownAttribute(key));
        };
        info!(bucket_by = %key, reverse, "bucketing models");

        let mut buckets: Vec<Bucket> = Vec::new();
        let mut slots: HashMap<String, usize> = HashMap::new();
        for id in pass.visible {
            let Some(model) = pass.models.get(id) else {
                continue;
            };
            let cluster = attr.cluster(model.attr(&key).unwrap_or(&Value::Null));
            let slot_key = cluster.key.to_string();
            let slot = *slots.entry(slot_key).or_insert_with(|| {
                buckets.push(Bucket {
                    cluster,
                    members: Vec::new(),
                });
                buckets.len() - 1
            });
            buckets[slot].members.push(id.clone());
        }

        buckets.sort_by(|a, b| sort_by_kind(&attr.kind, &a.cluster.key, &b.cluster.key, reverse));

        let offset = self.flow.offset();
        for mut bucket in buckets {
            pass.pipeline.artifact(Artifact::BucketHeader {
                key: bucket.cluster.key,
                label: bucket.cluster.label,
                top: self.flow.top,
                left: offset,
                members: bucket.members.clone(),
            });
            self.flow.top += self.config.header_height + self.config.flow.spacing;

            FlowLayout::sort(&mut bucket.members, pass.models, meta, &key, reverse);
            self.flow
                .flow(pass.pipeline, &bucket.members, pass.models, pass.container.width);
            self.flow.new_row(self.config.bucket_gap);
        }
        Ok(false)
    }

    fn cleanup(&mut self, _same_engine: bool, _models: &mut ModelGraph) -> bool {
        self.flow.reset();
        false
    }

    fn state(&self) -> Value {
        state_value(&self.state)
    }

    fn set_state(&mut self, state: Option<&Value>, meta: &Metamodel) -> bool {
        let Some(next) = parse_state::<BucketState>(state) else {
            return false;
        };
        if next.bucket_by.as_deref().is_some_and(|key| !meta.contains(key)) {
            return false;
        }
        self.state = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::layout::{LayoutBox, LayoutOptions};
    use crate::meta::{AttributeMeta, Kind};
    use crate::model::Dimensions;
    use crate::render::{RenderingPipeline, StaticRenderer};
    use serde_json::json;
    use std::rc::Rc;

    fn headers(reverse: bool) -> (Vec<String>, ModelGraph) {
        let meta = Metamodel::new().with("x", AttributeMeta::new("X", Kind::Number));
        let mut layout = BucketLayout::with_defaults();
        assert!(layout.set_state(Some(&json!({"bucketBy": "x", "reverse": reverse})), &meta));

        let mut models = ModelGraph::from_values(
            vec![
                json!({"id": "m12", "x": 12}),
                json!({"id": "m1", "x": 1}),
                json!({"id": "m5", "x": 5}),
            ],
            Dimensions::new(40.0, 20.0),
        )
        .unwrap();
        let mut pipeline =
            RenderingPipeline::new(PipelineConfig::default(), Rc::new(StaticRenderer::default()));
        let visible = models.visible_ids();
        let options = LayoutOptions::default();
        let mut pass = LayoutPass {
            pipeline: &mut pipeline,
            container: LayoutBox::new(400.0, 400.0),
            visible: &visible,
            models: &mut models,
            meta: &meta,
            options: &options,
        };
        layout.layout(&mut pass).unwrap();
        pipeline.apply(&mut models);

        let labels = pipeline
            .artifacts()
            .iter()
            .filter_map(|a| match a {
                Artifact::BucketHeader { label, .. } => Some(label.clone()),
                _ => None,
            })
            .collect();
        (labels, models)
    }

    #[test]
    fn test_buckets_ascending() {
        let (labels, models) = headers(false);
        assert_eq!(labels, vec!["1", "5", "10 - 20"]);

        // header at 5, models start 20 + 5 below it
        let first = models.get(&"m1".into()).unwrap().rendering().position();
        assert_eq!((first.top, first.left), (30.0, 5.0));
        // 30 + 20 (row) + 10 (gap) + 25 (header)
        let second = models.get(&"m5".into()).unwrap().rendering().position();
        assert_eq!(second.top, 85.0);
    }

    #[test]
    fn test_buckets_reversed() {
        let (labels, _) = headers(true);
        assert_eq!(labels, vec!["10 - 20", "5", "1"]);
    }

    #[test]
    fn test_unknown_bucket_attribute() {
        let meta = Metamodel::new();
        let mut layout = BucketLayout::with_defaults();
        assert!(!layout.set_state(Some(&json!({"bucketBy": "x"})), &meta));
    }
}
