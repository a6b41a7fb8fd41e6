//! Bucket aggregation tree construction
//!
//! The first bucket aggregation of a query becomes the outermost node; each
//! following one nests inside the previous. Every step returns the node the
//! next level attaches to.

use crate::dsl::{
    AggTree, Aggregation, DateHistogramAgg, ExtendedBounds, Filter, FiltersAgg, GeohashGridAgg,
    HistogramAgg, MetricAggregation, NodeId, TermsAgg, COUNT_BUCKET_PATH, DATE_FORMAT_EPOCH_MS,
};
use crate::model::{BucketAgg, BucketAggKind, MetricAgg, MetricType};
use crate::settings::{
    DateHistogramSettings, FiltersSettings, GeohashGridSettings, HistogramSettings, TermsSettings,
};
use regex::Regex;
use serde_json::Map;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use tracing::debug;

/// Interval written for `auto`; resolves to e.g. `500ms` at encoding time
pub const AUTO_INTERVAL_TOKEN: &str = "$__interval_msms";

/// Inputs shared by every level of one query's tree
pub struct TreeContext<'a> {
    /// Range start, epoch milliseconds
    pub from: i64,
    /// Range end, epoch milliseconds
    pub to: i64,
    /// Field used when a date histogram declares none
    pub time_field: &'a str,
    pub metrics: &'a HashMap<&'a str, &'a MetricAgg>,
}

/// Nest `bucket_aggs` below `parent` in declared order
pub fn add_bucket_aggs(
    tree: &mut AggTree,
    parent: NodeId,
    bucket_aggs: &[BucketAgg],
    ctx: &TreeContext<'_>,
) -> NodeId {
    bucket_aggs
        .iter()
        .fold(parent, |node, agg| add_bucket_agg(tree, node, agg, ctx))
}

/// Add one level; unknown types and empty filter sets add nothing
pub fn add_bucket_agg(
    tree: &mut AggTree,
    parent: NodeId,
    agg: &BucketAgg,
    ctx: &TreeContext<'_>,
) -> NodeId {
    let field = agg.field.as_deref().unwrap_or_default();

    match &agg.kind {
        BucketAggKind::DateHistogram(settings) => {
            let field = agg.field.as_deref().unwrap_or(ctx.time_field);
            tree.add(
                parent,
                &agg.id,
                Aggregation::DateHistogram(date_histogram(field, settings, ctx)),
            )
        }
        BucketAggKind::Histogram(settings) => {
            tree.add(parent, &agg.id, Aggregation::Histogram(histogram(field, settings)))
        }
        BucketAggKind::Filters(settings) => match filters(settings) {
            Some(filters) => tree.add(parent, &agg.id, Aggregation::Filters(filters)),
            None => {
                debug!(id = %agg.id, "skipping filters aggregation without filters");
                parent
            }
        },
        BucketAggKind::Terms(settings) => add_terms(tree, parent, &agg.id, field, settings, ctx),
        BucketAggKind::GeohashGrid(settings) => {
            tree.add(parent, &agg.id, Aggregation::GeohashGrid(geohash_grid(field, settings)))
        }
        BucketAggKind::Unknown(name) => {
            debug!(id = %agg.id, agg_type = %name, "skipping unknown bucket aggregation");
            parent
        }
    }
}

pub fn date_histogram(
    field: &str,
    settings: &DateHistogramSettings,
    ctx: &TreeContext<'_>,
) -> DateHistogramAgg {
    let fixed_interval = match settings.interval() {
        "auto" => AUTO_INTERVAL_TOKEN.to_string(),
        interval => interval.to_string(),
    };

    DateHistogramAgg {
        field: field.to_string(),
        fixed_interval,
        min_doc_count: settings.min_doc_count(),
        extended_bounds: ExtendedBounds {
            min: ctx.from,
            max: ctx.to,
        },
        format: DATE_FORMAT_EPOCH_MS.to_string(),
        offset: settings.offset().map(str::to_string),
        missing: settings.missing().map(str::to_string),
        // utc is the engine default
        time_zone: settings
            .time_zone()
            .filter(|tz| *tz != "utc")
            .map(str::to_string),
    }
}

pub fn histogram(field: &str, settings: &HistogramSettings) -> HistogramAgg {
    HistogramAgg {
        field: field.to_string(),
        interval: settings.interval(),
        min_doc_count: settings.min_doc_count(),
        missing: settings.missing(),
    }
}

pub fn filters(settings: &FiltersSettings) -> Option<FiltersAgg> {
    let filters: BTreeMap<String, Filter> = settings
        .entries()
        .into_iter()
        .map(|entry| (entry.label, Filter::query_string(entry.query)))
        .collect();

    if filters.is_empty() {
        None
    } else {
        Some(FiltersAgg { filters })
    }
}

pub fn geohash_grid(field: &str, settings: &GeohashGridSettings) -> GeohashGridAgg {
    GeohashGridAgg {
        field: field.to_string(),
        precision: settings.precision(),
    }
}

fn metric_id_prefix(order_by: &str) -> Option<&str> {
    static METRIC_ID: OnceLock<Regex> = OnceLock::new();
    METRIC_ID
        .get_or_init(|| Regex::new(r"^(\d+)").expect("valid metric id pattern"))
        .find(order_by)
        .map(|m| m.as_str())
}

/// Terms node; ordering by a metric also adds that metric under the node
fn add_terms(
    tree: &mut AggTree,
    parent: NodeId,
    id: &str,
    field: &str,
    settings: &TermsSettings,
    ctx: &TreeContext<'_>,
) -> NodeId {
    let mut order = BTreeMap::new();
    let mut order_metric = None;

    if let Some(order_by) = settings.order_by() {
        let direction = settings.order().to_string();
        // `{metricId}` or `{metricId}[path]` for multi-value metrics; anything
        // else is a built-in key such as `_term`, `_key` or `_count`
        match metric_id_prefix(order_by) {
            Some(metric_id) => match ctx.metrics.get(metric_id) {
                Some(metric) if metric.metric_type == MetricType::Count => {
                    order.insert(COUNT_BUCKET_PATH.to_string(), direction);
                }
                Some(metric) => {
                    order.insert(order_by.to_string(), direction);
                    order_metric = Some(*metric);
                }
                None => debug!(id, order_by, "terms order references an unknown metric"),
            },
            None => {
                order.insert(order_by.to_string(), direction);
            }
        }
    }

    let node = tree.add(
        parent,
        id,
        Aggregation::Terms(TermsAgg {
            field: field.to_string(),
            size: settings.size(),
            order,
            min_doc_count: settings.min_doc_count(),
            missing: settings.missing().map(str::to_string),
        }),
    );

    if let Some(metric) = order_metric {
        tree.add(
            node,
            &metric.id,
            Aggregation::Metric(MetricAggregation::new(
                metric.metric_type.as_str(),
                metric.field.as_deref(),
                Map::new(),
            )),
        );
    }

    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Loose;
    use serde_json::{json, Value};

    fn bucket(id: &str, agg_type: &str, field: Option<&str>, settings: Value) -> BucketAgg {
        let settings = match settings {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        BucketAgg {
            id: id.to_string(),
            field: field.map(str::to_string),
            kind: BucketAggKind::from_parts(agg_type, settings).unwrap().normalized(),
        }
    }

    fn metric(id: &str, metric_type: MetricType, field: Option<&str>) -> MetricAgg {
        let mut m = MetricAgg::new(id, metric_type);
        m.field = field.map(str::to_string);
        m
    }

    fn render(bucket_aggs: &[BucketAgg], metrics: &[MetricAgg]) -> (AggTree, Value) {
        let index: HashMap<&str, &MetricAgg> = metrics.iter().map(|m| (m.id.as_str(), m)).collect();
        let ctx = TreeContext {
            from: 1000,
            to: 2000,
            time_field: "@timestamp",
            metrics: &index,
        };
        let mut tree = AggTree::new();
        let root = tree.root();
        add_bucket_aggs(&mut tree, root, bucket_aggs, &ctx);
        let value = serde_json::to_value(&tree).unwrap();
        (tree, value)
    }

    #[test]
    fn test_date_histogram_auto_interval() {
        let (tree, value) = render(
            &[bucket("2", "date_histogram", Some("time"), json!({"interval": "auto"}))],
            &[],
        );
        assert_eq!(tree.bucket_depth(), 1);
        assert_eq!(
            value["2"]["date_histogram"],
            json!({
                "field": "time",
                "fixed_interval": "$__interval_msms",
                "min_doc_count": 0,
                "extended_bounds": {"min": 1000, "max": 2000},
                "format": "epoch_millis"
            })
        );
    }

    #[test]
    fn test_date_histogram_options() {
        let (_, value) = render(
            &[bucket(
                "2",
                "date_histogram",
                None,
                json!({"interval": "1h", "min_doc_count": "1", "offset": "+30m",
                       "missing": "0", "timeZone": "Europe/Oslo"}),
            )],
            &[],
        );
        let agg = &value["2"]["date_histogram"];
        assert_eq!(agg["field"], json!("@timestamp"));
        assert_eq!(agg["fixed_interval"], json!("1h"));
        assert_eq!(agg["min_doc_count"], json!(1));
        assert_eq!(agg["offset"], json!("+30m"));
        assert_eq!(agg["missing"], json!("0"));
        assert_eq!(agg["time_zone"], json!("Europe/Oslo"));
    }

    #[test]
    fn test_date_histogram_utc_not_forwarded() {
        let (_, value) = render(
            &[bucket("2", "date_histogram", None, json!({"timeZone": "utc"}))],
            &[],
        );
        assert!(value["2"]["date_histogram"].get("time_zone").is_none());
    }

    #[test]
    fn test_histogram_defaults_and_missing() {
        let (_, value) = render(&[bucket("3", "histogram", Some("bytes"), json!({}))], &[]);
        assert_eq!(
            value["3"]["histogram"],
            json!({"field": "bytes", "interval": 1000, "min_doc_count": 0})
        );

        let (_, value) = render(
            &[bucket("3", "histogram", Some("bytes"), json!({"interval": 10, "missing": 0}))],
            &[],
        );
        assert_eq!(value["3"]["histogram"]["interval"], json!(10));
        assert_eq!(value["3"]["histogram"]["missing"], json!(0));
    }

    #[test]
    fn test_filters() {
        let (_, value) = render(
            &[bucket(
                "2",
                "filters",
                None,
                json!({"filters": [{"query": "a:1", "label": "A"}, {"query": "b:2"}]}),
            )],
            &[],
        );
        assert_eq!(
            value["2"]["filters"]["filters"],
            json!({
                "A": {"query_string": {"analyze_wildcard": true, "query": "a:1"}},
                "b:2": {"query_string": {"analyze_wildcard": true, "query": "b:2"}}
            })
        );
    }

    #[test]
    fn test_empty_filters_emit_nothing() {
        let (tree, value) = render(
            &[
                bucket("2", "filters", None, json!({"filters": []})),
                bucket("3", "terms", Some("host"), json!({})),
            ],
            &[],
        );
        assert_eq!(tree.bucket_depth(), 1);
        assert!(value.get("2").is_none());
        assert!(value.get("3").is_some());
    }

    #[test]
    fn test_unknown_type_skipped() {
        let (tree, value) = render(
            &[
                bucket("2", "nested_thing", Some("x"), json!({})),
                bucket("3", "geohash_grid", Some("location"), json!({})),
            ],
            &[],
        );
        assert_eq!(tree.bucket_depth(), 1);
        assert_eq!(
            value,
            json!({"3": {"geohash_grid": {"field": "location", "precision": 3}}})
        );
    }

    #[test]
    fn test_nesting_follows_declared_order() {
        let aggs = vec![
            bucket("2", "terms", Some("host"), json!({})),
            bucket("3", "histogram", Some("bytes"), json!({})),
            bucket("4", "date_histogram", None, json!({})),
        ];
        let (tree, value) = render(&aggs, &[]);
        assert_eq!(tree.bucket_depth(), aggs.len());
        assert!(value["2"]["terms"].is_object());
        assert!(value["2"]["aggs"]["3"]["histogram"].is_object());
        assert!(value["2"]["aggs"]["3"]["aggs"]["4"]["date_histogram"].is_object());
    }

    #[test]
    fn test_terms_size_and_options() {
        let (_, value) = render(
            &[bucket(
                "2",
                "terms",
                Some("host"),
                json!({"size": "0", "min_doc_count": "2", "missing": "n/a"}),
            )],
            &[],
        );
        assert_eq!(
            value["2"]["terms"],
            json!({"field": "host", "size": 500, "min_doc_count": 2, "missing": "n/a"})
        );
    }

    #[test]
    fn test_terms_order_by_count_metric() {
        let (_, value) = render(
            &[bucket("2", "terms", Some("host"), json!({"orderBy": "1", "order": "asc"}))],
            &[metric("1", MetricType::Count, None)],
        );
        assert_eq!(value["2"]["terms"]["order"], json!({"_count": "asc"}));
        assert!(value["2"].get("aggs").is_none());
    }

    #[test]
    fn test_terms_order_by_metric_adds_sibling() {
        let (_, value) = render(
            &[bucket("2", "terms", Some("host"), json!({"orderBy": "5"}))],
            &[metric("5", MetricType::Avg, Some("latency"))],
        );
        assert_eq!(value["2"]["terms"]["order"], json!({"5": "desc"}));
        assert_eq!(value["2"]["aggs"]["5"], json!({"avg": {"field": "latency"}}));
    }

    #[test]
    fn test_terms_order_by_percentile_path() {
        let (_, value) = render(
            &[bucket("2", "terms", Some("host"), json!({"orderBy": "3[99.0]"}))],
            &[metric("3", MetricType::Percentiles, Some("latency"))],
        );
        assert_eq!(value["2"]["terms"]["order"], json!({"3[99.0]": "desc"}));
        assert!(value["2"]["aggs"]["3"]["percentiles"].is_object());
    }

    #[test]
    fn test_terms_order_by_builtin_key() {
        let (_, value) = render(
            &[bucket("2", "terms", Some("host"), json!({"orderBy": "_term"}))],
            &[],
        );
        assert_eq!(value["2"]["terms"]["order"], json!({"_term": "desc"}));
    }

    #[test]
    fn test_terms_order_by_unknown_metric_has_no_order() {
        let (_, value) = render(
            &[bucket("2", "terms", Some("host"), json!({"orderBy": "9"}))],
            &[],
        );
        assert!(value["2"]["terms"].get("order").is_none());
    }

    #[test]
    fn test_settings_loose_values() {
        let agg = bucket("2", "geohash_grid", Some("loc"), json!({"precision": "5"}));
        match &agg.kind {
            BucketAggKind::GeohashGrid(s) => {
                assert_eq!(s.precision, Some(Loose::Text("5".to_string())));
                assert_eq!(s.precision(), 5);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }
}
