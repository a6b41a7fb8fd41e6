//! Panel query model and its parser
//!
//! A panel sends its query as a loosely-typed JSON document. [`parse_queries`]
//! turns each document into a typed [`Query`]: bucket aggregations carry a
//! per-type settings struct, metrics carry their [`MetricType`] and an open
//! settings map that is forwarded to the engine.

use crate::error::{Error, Result};
use crate::settings::{
    DateHistogramSettings, FiltersSettings, GeohashGridSettings, HistogramSettings,
    MetricSettings, TermsSettings,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Shared time range of one request cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// Start of the range in epoch milliseconds
    pub fn from_millis(&self) -> i64 {
        self.from.timestamp_millis()
    }

    /// End of the range in epoch milliseconds
    pub fn to_millis(&self) -> i64 {
        self.to.timestamp_millis()
    }

    /// Width of the range in milliseconds (never negative)
    pub fn span_millis(&self) -> i64 {
        (self.to_millis() - self.from_millis()).max(0)
    }
}

/// One incoming panel query, before parsing
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuery {
    #[serde(default)]
    pub ref_id: String,

    #[serde(default)]
    pub max_data_points: i64,

    /// The panel's query model (`query`, `bucketAggs`, `metrics`, ...)
    #[serde(flatten)]
    pub model: Map<String, Value>,
}

impl DataQuery {
    pub fn new(ref_id: impl Into<String>, max_data_points: i64, model: Value) -> Self {
        let model = match model {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            ref_id: ref_id.into(),
            max_data_points,
            model,
        }
    }
}

/// A parsed panel query
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub ref_id: String,
    pub raw_query: String,
    pub alias: String,
    pub interval: String,
    pub max_data_points: i64,
    /// Outermost aggregation first
    pub bucket_aggs: Vec<BucketAgg>,
    pub metrics: Vec<MetricAgg>,
}

impl Query {
    /// Index of metrics by ID, built once per query
    pub fn metrics_by_id(&self) -> HashMap<&str, &MetricAgg> {
        self.metrics.iter().map(|m| (m.id.as_str(), m)).collect()
    }

    /// Apply settings normalization to every aggregation
    pub fn normalized(self) -> Self {
        Self {
            bucket_aggs: self
                .bucket_aggs
                .into_iter()
                .map(BucketAgg::normalized)
                .collect(),
            metrics: self.metrics.into_iter().map(MetricAgg::normalized).collect(),
            ..self
        }
    }
}

/// One level of the aggregation tree
#[derive(Debug, Clone, PartialEq)]
pub struct BucketAgg {
    pub id: String,
    pub field: Option<String>,
    pub kind: BucketAggKind,
}

impl BucketAgg {
    pub fn normalized(self) -> Self {
        Self {
            kind: self.kind.normalized(),
            ..self
        }
    }
}

/// Bucket aggregation type together with its typed settings
#[derive(Debug, Clone, PartialEq)]
pub enum BucketAggKind {
    DateHistogram(DateHistogramSettings),
    Histogram(HistogramSettings),
    Filters(FiltersSettings),
    Terms(TermsSettings),
    GeohashGrid(GeohashGridSettings),
    /// A type this builder does not know; never emitted
    Unknown(String),
}

impl BucketAggKind {
    /// Build the typed variant from the wire type name and raw settings
    pub fn from_parts(agg_type: &str, settings: Map<String, Value>) -> Result<Self> {
        let settings = Value::Object(settings);
        let kind = match agg_type {
            "date_histogram" => Self::DateHistogram(serde_json::from_value(settings)?),
            "histogram" => Self::Histogram(serde_json::from_value(settings)?),
            "filters" => Self::Filters(serde_json::from_value(settings)?),
            "terms" => Self::Terms(serde_json::from_value(settings)?),
            "geohash_grid" => Self::GeohashGrid(serde_json::from_value(settings)?),
            other => Self::Unknown(other.to_string()),
        };
        Ok(kind)
    }

    pub fn type_name(&self) -> &str {
        match self {
            Self::DateHistogram(_) => "date_histogram",
            Self::Histogram(_) => "histogram",
            Self::Filters(_) => "filters",
            Self::Terms(_) => "terms",
            Self::GeohashGrid(_) => "geohash_grid",
            Self::Unknown(name) => name,
        }
    }

    pub fn normalized(self) -> Self {
        match self {
            Self::DateHistogram(s) => Self::DateHistogram(s.normalized()),
            Self::Histogram(s) => Self::Histogram(s.normalized()),
            Self::Terms(s) => Self::Terms(s.normalized()),
            other => other,
        }
    }
}

/// Metric and pipeline aggregation types
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetricType {
    Count,
    Avg,
    Sum,
    Max,
    Min,
    ExtendedStats,
    Percentiles,
    Cardinality,
    TopMetrics,
    Rate,
    RawDocument,
    RawData,
    Logs,
    MovingAvg,
    MovingFn,
    CumulativeSum,
    Derivative,
    SerialDiff,
    BucketScript,
    Other(String),
}

impl MetricType {
    pub fn parse(name: &str) -> Self {
        match name {
            "count" => Self::Count,
            "avg" => Self::Avg,
            "sum" => Self::Sum,
            "max" => Self::Max,
            "min" => Self::Min,
            "extended_stats" => Self::ExtendedStats,
            "percentiles" => Self::Percentiles,
            "cardinality" => Self::Cardinality,
            "top_metrics" => Self::TopMetrics,
            "rate" => Self::Rate,
            "raw_document" => Self::RawDocument,
            "raw_data" => Self::RawData,
            "logs" => Self::Logs,
            "moving_avg" => Self::MovingAvg,
            "moving_fn" => Self::MovingFn,
            "cumulative_sum" => Self::CumulativeSum,
            "derivative" => Self::Derivative,
            "serial_diff" => Self::SerialDiff,
            "bucket_script" => Self::BucketScript,
            other => Self::Other(other.to_string()),
        }
    }

    /// Name used as the aggregation type on the wire
    pub fn as_str(&self) -> &str {
        match self {
            Self::Count => "count",
            Self::Avg => "avg",
            Self::Sum => "sum",
            Self::Max => "max",
            Self::Min => "min",
            Self::ExtendedStats => "extended_stats",
            Self::Percentiles => "percentiles",
            Self::Cardinality => "cardinality",
            Self::TopMetrics => "top_metrics",
            Self::Rate => "rate",
            Self::RawDocument => "raw_document",
            Self::RawData => "raw_data",
            Self::Logs => "logs",
            Self::MovingAvg => "moving_avg",
            Self::MovingFn => "moving_fn",
            Self::CumulativeSum => "cumulative_sum",
            Self::Derivative => "derivative",
            Self::SerialDiff => "serial_diff",
            Self::BucketScript => "bucket_script",
            Self::Other(name) => name,
        }
    }

    pub fn is_pipeline(&self) -> bool {
        matches!(
            self,
            Self::MovingAvg
                | Self::MovingFn
                | Self::CumulativeSum
                | Self::Derivative
                | Self::SerialDiff
                | Self::BucketScript
        )
    }

    pub fn has_multiple_bucket_paths(&self) -> bool {
        matches!(self, Self::BucketScript)
    }

    pub fn supports_inline_script(&self) -> bool {
        matches!(
            self,
            Self::Avg
                | Self::Sum
                | Self::Max
                | Self::Min
                | Self::ExtendedStats
                | Self::Percentiles
                | Self::BucketScript
        )
    }

    /// Types that query raw documents instead of aggregations
    pub fn is_document_query(&self) -> bool {
        matches!(self, Self::RawDocument | Self::RawData | Self::Logs)
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric or pipeline computation
#[derive(Debug, Clone, PartialEq)]
pub struct MetricAgg {
    pub id: String,
    pub metric_type: MetricType,
    pub field: Option<String>,
    pub hide: bool,
    pub settings: MetricSettings,
    /// Single bucket-path reference of a pipeline metric
    pub pipeline_agg: Option<String>,
    /// Named references of a multi-input pipeline metric
    pub pipeline_variables: BTreeMap<String, String>,
}

impl MetricAgg {
    pub fn new(id: impl Into<String>, metric_type: MetricType) -> Self {
        Self {
            id: id.into(),
            metric_type,
            field: None,
            hide: false,
            settings: MetricSettings::default(),
            pipeline_agg: None,
            pipeline_variables: BTreeMap::new(),
        }
    }

    pub fn normalized(self) -> Self {
        let settings = self.settings.normalized(&self.metric_type);
        Self { settings, ..self }
    }
}

// --- raw wire model -------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawModel {
    #[serde(default, deserialize_with = "lenient_string")]
    query: String,
    #[serde(default, deserialize_with = "lenient_string")]
    alias: String,
    #[serde(default, deserialize_with = "lenient_string")]
    interval: String,
    #[serde(default)]
    bucket_aggs: Option<Vec<RawBucketAgg>>,
    #[serde(default)]
    metrics: Option<Vec<RawMetric>>,
}

#[derive(Debug, Deserialize)]
struct RawBucketAgg {
    #[serde(default, deserialize_with = "lenient_string")]
    id: String,
    #[serde(default, rename = "type")]
    agg_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    field: String,
    #[serde(default)]
    settings: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetric {
    #[serde(default, deserialize_with = "lenient_string")]
    id: String,
    #[serde(default, rename = "type")]
    metric_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    field: String,
    #[serde(default)]
    hide: Option<bool>,
    #[serde(default, deserialize_with = "lenient_string")]
    pipeline_agg: String,
    #[serde(default)]
    pipeline_variables: Option<Vec<RawPipelineVariable>>,
    #[serde(default)]
    settings: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPipelineVariable {
    #[serde(default, deserialize_with = "lenient_string")]
    name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pipeline_agg: String,
}

/// Strings, numbers and null all read as a string; anything else is empty
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Parse every panel query, failing the whole batch on the first malformed one
pub fn parse_queries(data_queries: &[DataQuery]) -> Result<Vec<Query>> {
    data_queries.iter().map(parse_query).collect()
}

/// Parse a single panel query
pub fn parse_query(data_query: &DataQuery) -> Result<Query> {
    if data_query.ref_id.is_empty() {
        return Err(Error::Parse("missing required reference ID".to_string()));
    }
    let ref_id = &data_query.ref_id;

    let raw: RawModel = serde_json::from_value(Value::Object(data_query.model.clone()))
        .map_err(|e| Error::Parse(format!("query {}: {}", ref_id, e)))?;

    let bucket_aggs = raw
        .bucket_aggs
        .unwrap_or_default()
        .into_iter()
        .map(|b| parse_bucket_agg(ref_id, b))
        .collect::<Result<Vec<_>>>()?;

    let metrics = raw
        .metrics
        .unwrap_or_default()
        .into_iter()
        .map(|m| parse_metric(ref_id, m))
        .collect::<Result<Vec<_>>>()?;

    Ok(Query {
        ref_id: ref_id.clone(),
        raw_query: raw.query,
        alias: raw.alias,
        interval: raw.interval,
        max_data_points: data_query.max_data_points,
        bucket_aggs,
        metrics,
    })
}

fn parse_bucket_agg(ref_id: &str, raw: RawBucketAgg) -> Result<BucketAgg> {
    let agg_type = raw.agg_type.ok_or_else(|| {
        Error::Parse(format!(
            "query {}: bucket aggregation '{}' is missing a type",
            ref_id, raw.id
        ))
    })?;
    let kind = BucketAggKind::from_parts(&agg_type, raw.settings.unwrap_or_default())
        .map_err(|e| Error::Parse(format!("query {}: bucket aggregation '{}': {}", ref_id, raw.id, e)))?;

    Ok(BucketAgg {
        id: raw.id,
        field: non_empty(raw.field),
        kind,
    })
}

fn parse_metric(ref_id: &str, raw: RawMetric) -> Result<MetricAgg> {
    let metric_type = raw.metric_type.map(|t| MetricType::parse(&t)).ok_or_else(|| {
        Error::Parse(format!(
            "query {}: metric '{}' is missing a type",
            ref_id, raw.id
        ))
    })?;

    let pipeline_variables = if metric_type.has_multiple_bucket_paths() {
        raw.pipeline_variables
            .unwrap_or_default()
            .into_iter()
            .filter(|v| !v.name.is_empty())
            .map(|v| (v.name, v.pipeline_agg))
            .collect()
    } else {
        BTreeMap::new()
    };

    Ok(MetricAgg {
        id: raw.id,
        metric_type,
        field: non_empty(raw.field),
        hide: raw.hide.unwrap_or(false),
        settings: MetricSettings::new(raw.settings.unwrap_or_default()).without_null_strings(),
        pipeline_agg: non_empty(raw.pipeline_agg),
        pipeline_variables,
    })
}
