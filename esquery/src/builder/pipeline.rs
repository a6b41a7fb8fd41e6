//! Metric and pipeline attachment
//!
//! Metrics hang off the innermost bucket node. Pipeline metrics reference
//! sibling metrics by ID; a reference to a `count` metric becomes the
//! `_count` path because count is not a named sub-aggregation.

use crate::dsl::{
    AggTree, Aggregation, BucketPath, MetricAggregation, NodeId, PipelineAggregation,
    COUNT_BUCKET_PATH,
};
use crate::model::{MetricAgg, MetricType};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Attach `metrics` under `node` in declared order
pub fn attach_metrics(
    tree: &mut AggTree,
    node: NodeId,
    metrics: &[MetricAgg],
    by_id: &HashMap<&str, &MetricAgg>,
) {
    for metric in metrics {
        if metric.metric_type == MetricType::Count {
            continue;
        }

        let settings = metric.settings.as_map().clone();

        if metric.metric_type.is_pipeline() {
            match resolve_bucket_path(metric, by_id) {
                Some(path) => {
                    tree.add(
                        node,
                        &metric.id,
                        Aggregation::Pipeline(PipelineAggregation::new(
                            metric.metric_type.as_str(),
                            path,
                            settings,
                        )),
                    );
                }
                None => debug!(id = %metric.id, "skipping pipeline metric with unresolved references"),
            }
        } else {
            tree.add(
                node,
                &metric.id,
                Aggregation::Metric(MetricAggregation::new(
                    metric.metric_type.as_str(),
                    metric.field.as_deref(),
                    settings,
                )),
            );
        }
    }
}

/// Bucket path(s) of a pipeline metric, or `None` when nothing resolves
pub fn resolve_bucket_path(
    metric: &MetricAgg,
    by_id: &HashMap<&str, &MetricAgg>,
) -> Option<BucketPath> {
    if metric.metric_type.has_multiple_bucket_paths() {
        let paths: BTreeMap<String, String> = metric
            .pipeline_variables
            .iter()
            .filter_map(|(name, reference)| {
                resolve_reference(reference, by_id).map(|path| (name.clone(), path))
            })
            .collect();

        if paths.is_empty() {
            None
        } else {
            Some(BucketPath::Named(paths))
        }
    } else {
        let reference = metric.pipeline_agg.as_deref()?;
        resolve_reference(reference, by_id).map(BucketPath::Single)
    }
}

/// Only integer-like IDs of existing metrics resolve
fn resolve_reference(reference: &str, by_id: &HashMap<&str, &MetricAgg>) -> Option<String> {
    reference.parse::<i64>().ok()?;
    let target = by_id.get(reference)?;

    if target.metric_type == MetricType::Count {
        Some(COUNT_BUCKET_PATH.to_string())
    } else {
        Some(reference.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MetricSettings;
    use serde_json::{json, Value};

    fn metric(id: &str, metric_type: MetricType) -> MetricAgg {
        MetricAgg::new(id, metric_type)
    }

    fn pipeline(id: &str, metric_type: MetricType, reference: &str) -> MetricAgg {
        let mut m = metric(id, metric_type);
        m.pipeline_agg = Some(reference.to_string());
        m
    }

    fn with_settings(mut m: MetricAgg, settings: Value) -> MetricAgg {
        m.settings = serde_json::from_value::<MetricSettings>(settings).unwrap();
        m.normalized()
    }

    fn render(metrics: &[MetricAgg]) -> (AggTree, Value) {
        let by_id: HashMap<&str, &MetricAgg> = metrics.iter().map(|m| (m.id.as_str(), m)).collect();
        let mut tree = AggTree::new();
        let root = tree.root();
        attach_metrics(&mut tree, root, metrics, &by_id);
        let value = serde_json::to_value(&tree).unwrap();
        (tree, value)
    }

    #[test]
    fn test_count_produces_no_node() {
        let (tree, _) = render(&[metric("1", MetricType::Count)]);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_plain_metric() {
        let mut avg = metric("1", MetricType::Avg);
        avg.field = Some("latency".to_string());
        let avg = with_settings(avg, json!({"script": {"inline": "_value * 2"}}));

        let (_, value) = render(&[avg]);
        assert_eq!(
            value,
            json!({"1": {"avg": {"field": "latency", "script": "_value * 2"}}})
        );
    }

    #[test]
    fn test_pipeline_on_count_uses_count_path() {
        let metrics = vec![
            metric("1", MetricType::Count),
            with_settings(
                pipeline("2", MetricType::MovingAvg, "1"),
                json!({"window": "5"}),
            ),
        ];
        let (_, value) = render(&metrics);
        assert_eq!(
            value,
            json!({"2": {"moving_avg": {"buckets_path": "_count", "window": 5.0}}})
        );
    }

    #[test]
    fn test_pipeline_on_metric_uses_id() {
        let mut sum = metric("1", MetricType::Sum);
        sum.field = Some("bytes".to_string());
        let metrics = vec![sum, pipeline("2", MetricType::Derivative, "1")];
        let (_, value) = render(&metrics);
        assert_eq!(value["2"], json!({"derivative": {"buckets_path": "1"}}));
        assert_eq!(value["1"], json!({"sum": {"field": "bytes"}}));
    }

    #[test]
    fn test_pipeline_with_non_numeric_reference_dropped() {
        let metrics = vec![
            metric("1", MetricType::Avg),
            pipeline("2", MetricType::Derivative, "avg_latency"),
        ];
        let (_, value) = render(&metrics);
        assert!(value.get("2").is_none());
        assert!(value.get("1").is_some());
    }

    #[test]
    fn test_pipeline_with_missing_target_dropped() {
        let (tree, _) = render(&[pipeline("2", MetricType::CumulativeSum, "7")]);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_pipeline_without_reference_dropped() {
        let (tree, _) = render(&[metric("2", MetricType::SerialDiff)]);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_multi_path_pipeline() {
        let mut script = metric("3", MetricType::BucketScript);
        script.pipeline_variables = BTreeMap::from([
            ("total".to_string(), "1".to_string()),
            ("errors".to_string(), "2".to_string()),
            ("ghost".to_string(), "9".to_string()),
            ("named".to_string(), "abc".to_string()),
        ]);
        let script = with_settings(script, json!({"script": "params.errors / params.total"}));

        let metrics = vec![metric("1", MetricType::Count), metric("2", MetricType::Sum), script];
        let (_, value) = render(&metrics);
        assert_eq!(
            value["3"],
            json!({"bucket_script": {
                "buckets_path": {"total": "_count", "errors": "2"},
                "script": "params.errors / params.total"
            }})
        );
    }

    #[test]
    fn test_multi_path_pipeline_all_unresolved_dropped() {
        let mut script = metric("3", MetricType::BucketScript);
        script.pipeline_variables = BTreeMap::from([("x".to_string(), "8".to_string())]);
        let (tree, _) = render(&[script]);
        assert!(tree.is_empty());

        let (tree, _) = render(&[metric("4", MetricType::BucketScript)]);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_attachment_order_follows_metric_list() {
        let metrics = vec![
            metric("3", MetricType::Max),
            metric("1", MetricType::Min),
            metric("2", MetricType::Cardinality),
        ];
        let (tree, _) = render(&metrics);
        let keys: Vec<&str> = tree
            .children(tree.root())
            .iter()
            .map(|id| tree.key(*id))
            .collect();
        assert_eq!(keys, vec!["3", "1", "2"]);
    }
}
