//! Aggregation tree building for one panel query

pub mod pipeline;
pub mod tree;

pub use pipeline::{attach_metrics, resolve_bucket_path};
pub use tree::{add_bucket_agg, add_bucket_aggs, TreeContext, AUTO_INTERVAL_TOKEN};

use crate::dsl::{AggTree, NodeId};
use crate::model::Query;

/// Build the bucket levels of `query` under the tree root and attach its
/// metrics to the innermost level, which is returned
pub fn build_aggregations(
    tree: &mut AggTree,
    query: &Query,
    from: i64,
    to: i64,
    time_field: &str,
) -> NodeId {
    let by_id = query.metrics_by_id();
    let ctx = TreeContext {
        from,
        to,
        time_field,
        metrics: &by_id,
    };

    let root = tree.root();
    let innermost = add_bucket_aggs(tree, root, &query.bucket_aggs, &ctx);
    attach_metrics(tree, innermost, &query.metrics, &by_id);
    innermost
}
