//! Aggregation tree
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Node 0 is the
//! implicit root, i.e. the `aggs` object of the search body. Serializing the
//! tree yields the nested `{"<id>": {"<type>": {...}, "aggs": {...}}}` shape.

use crate::dsl::search::Filter;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Epoch-millisecond date format understood by the engine
pub const DATE_FORMAT_EPOCH_MS: &str = "epoch_millis";

/// Path used to reference the implicit document count of a bucket
pub const COUNT_BUCKET_PATH: &str = "_count";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtendedBounds {
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateHistogramAgg {
    pub field: String,
    pub fixed_interval: String,
    pub min_doc_count: i64,
    pub extended_bounds: ExtendedBounds,
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramAgg {
    pub field: String,
    pub interval: i64,
    pub min_doc_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermsAgg {
    pub field: String,
    pub size: i64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub order: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_doc_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiltersAgg {
    pub filters: BTreeMap<String, Filter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeohashGridAgg {
    pub field: String,
    pub precision: i64,
}

/// A metric sub-aggregation: `field` plus the metric's settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricAggregation {
    #[serde(skip)]
    pub metric_type: String,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl MetricAggregation {
    /// Settings override `field` when both are given
    pub fn new(metric_type: &str, field: Option<&str>, settings: Map<String, Value>) -> Self {
        let mut params = Map::new();
        if let Some(field) = field.filter(|f| !f.is_empty()) {
            params.insert("field".to_string(), Value::String(field.to_string()));
        }
        params.extend(settings.into_iter().filter(|(k, v)| !k.is_empty() && !v.is_null()));

        Self {
            metric_type: metric_type.to_string(),
            params,
        }
    }
}

/// Reference(s) from a pipeline aggregation to the values it consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BucketPath {
    Single(String),
    Named(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineAggregation {
    #[serde(skip)]
    pub pipeline_type: String,
    pub buckets_path: BucketPath,
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl PipelineAggregation {
    pub fn new(pipeline_type: &str, buckets_path: BucketPath, settings: Map<String, Value>) -> Self {
        let settings = settings
            .into_iter()
            .filter(|(k, v)| !k.is_empty() && k != "buckets_path" && !v.is_null())
            .collect();

        Self {
            pipeline_type: pipeline_type.to_string(),
            buckets_path,
            settings,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    DateHistogram(DateHistogramAgg),
    Histogram(HistogramAgg),
    Terms(TermsAgg),
    Filters(FiltersAgg),
    GeohashGrid(GeohashGridAgg),
    Metric(MetricAggregation),
    Pipeline(PipelineAggregation),
}

impl Aggregation {
    pub fn type_name(&self) -> &str {
        match self {
            Self::DateHistogram(_) => "date_histogram",
            Self::Histogram(_) => "histogram",
            Self::Terms(_) => "terms",
            Self::Filters(_) => "filters",
            Self::GeohashGrid(_) => "geohash_grid",
            Self::Metric(m) => &m.metric_type,
            Self::Pipeline(p) => &p.pipeline_type,
        }
    }

    pub fn is_bucket(&self) -> bool {
        !matches!(self, Self::Metric(_) | Self::Pipeline(_))
    }
}

#[derive(Debug, Clone)]
struct AggNode {
    key: String,
    agg: Option<Aggregation>,
    children: Vec<NodeId>,
}

/// Arena of aggregation nodes
#[derive(Debug, Clone)]
pub struct AggTree {
    nodes: Vec<AggNode>,
}

impl Default for AggTree {
    fn default() -> Self {
        Self::new()
    }
}

impl AggTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![AggNode {
                key: String::new(),
                agg: None,
                children: vec![],
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Add `agg` under `parent` keyed by `key`, returning the new node
    ///
    /// Keys are unique per parent: adding an existing key replaces that
    /// node's aggregation and keeps its children.
    pub fn add(&mut self, parent: NodeId, key: impl Into<String>, agg: Aggregation) -> NodeId {
        let key = key.into();

        if let Some(existing) = self.child(parent, &key) {
            self.nodes[existing.0].agg = Some(agg);
            return existing;
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(AggNode {
            key,
            agg: Some(agg),
            children: vec![],
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn child(&self, parent: NodeId, key: &str) -> Option<NodeId> {
        self.nodes[parent.0]
            .children
            .iter()
            .copied()
            .find(|c| self.nodes[c.0].key == key)
    }

    pub fn children(&self, parent: NodeId) -> &[NodeId] {
        &self.nodes[parent.0].children
    }

    pub fn get(&self, id: NodeId) -> Option<&Aggregation> {
        self.nodes.get(id.0).and_then(|n| n.agg.as_ref())
    }

    pub fn key(&self, id: NodeId) -> &str {
        &self.nodes[id.0].key
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    /// Number of nested bucket levels below the root
    pub fn bucket_depth(&self) -> usize {
        self.bucket_depth_from(self.root())
    }

    fn bucket_depth_from(&self, id: NodeId) -> usize {
        self.children(id)
            .iter()
            .filter(|c| self.get(**c).is_some_and(Aggregation::is_bucket))
            .map(|c| 1 + self.bucket_depth_from(*c))
            .max()
            .unwrap_or(0)
    }
}

struct Children<'a> {
    tree: &'a AggTree,
    parent: NodeId,
}

struct Node<'a> {
    tree: &'a AggTree,
    id: NodeId,
}

impl Serialize for AggTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Children {
            tree: self,
            parent: self.root(),
        }
        .serialize(serializer)
    }
}

impl Serialize for Children<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let children = self.tree.children(self.parent);
        let mut map = serializer.serialize_map(Some(children.len()))?;
        for id in children {
            map.serialize_entry(self.tree.key(*id), &Node { tree: self.tree, id: *id })?;
        }
        map.end()
    }
}

impl Serialize for Node<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(agg) = self.tree.get(self.id) {
            let name = agg.type_name();
            match agg {
                Aggregation::DateHistogram(a) => map.serialize_entry(name, a)?,
                Aggregation::Histogram(a) => map.serialize_entry(name, a)?,
                Aggregation::Terms(a) => map.serialize_entry(name, a)?,
                Aggregation::Filters(a) => map.serialize_entry(name, a)?,
                Aggregation::GeohashGrid(a) => map.serialize_entry(name, a)?,
                Aggregation::Metric(a) => map.serialize_entry(name, a)?,
                Aggregation::Pipeline(a) => map.serialize_entry(name, a)?,
            }
        }
        if !self.tree.children(self.id).is_empty() {
            map.serialize_entry(
                "aggs",
                &Children {
                    tree: self.tree,
                    parent: self.id,
                },
            )?;
        }
        map.end()
    }
}
