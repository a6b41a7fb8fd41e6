//! Time series query execution
//!
//! Folds every panel query into one multi-search batch, dispatches it through
//! the injected [`Client`] and keys the results by panel reference ID.
//!
//! Structurally invalid panels do not fail the batch: they get an error slot
//! in the result and contribute no search. Parse, interval, build and client
//! failures abort the whole call.

use crate::builder::{add_bucket_agg, build_aggregations, TreeContext};
use crate::client::Client;
use crate::dsl::{
    MultiSearchItem, MultiSearchRequest, MultiSearchRequestBuilder, SearchRequestBuilder,
};
use crate::error::{Error, Result};
use crate::interval::IntervalCalculator;
use crate::model::{
    parse_queries, BucketAgg, BucketAggKind, DataQuery, MetricAgg, MetricType, Query, TimeRange,
};
use crate::response::{DataResponse, QueryDataResponse};
use crate::settings::DateHistogramSettings;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

pub const INVALID_QUERY_MESSAGE: &str = "invalid query, missing metrics and aggregations";

const DEFAULT_DOCUMENT_SIZE: i64 = 500;

/// A built batch, not yet dispatched
#[derive(Debug, Clone, Default)]
pub struct BatchPlan {
    pub request: MultiSearchRequest,
    /// Per-panel errors keyed by reference ID
    pub errors: BTreeMap<String, String>,
}

pub struct TimeSeriesQuery<'a, C: Client + ?Sized> {
    client: &'a C,
    data_queries: &'a [DataQuery],
    time_range: TimeRange,
    calculator: IntervalCalculator,
}

impl<'a, C: Client + ?Sized> TimeSeriesQuery<'a, C> {
    pub fn new(client: &'a C, data_queries: &'a [DataQuery], time_range: TimeRange) -> Self {
        Self {
            client,
            data_queries,
            time_range,
            calculator: IntervalCalculator::default(),
        }
    }

    pub fn with_calculator(mut self, calculator: IntervalCalculator) -> Self {
        self.calculator = calculator;
        self
    }

    /// Parse and build the batch without dispatching it
    pub fn build(&self) -> Result<BatchPlan> {
        let queries = parse_queries(self.data_queries)?;

        let mut ms = MultiSearchRequestBuilder::new();
        let mut errors = BTreeMap::new();
        for query in queries {
            self.process_query(query.normalized(), &mut ms, &mut errors)?;
        }

        let request = ms.build()?;
        debug!(
            searches = request.len(),
            invalid = errors.len(),
            "built multi-search batch"
        );

        Ok(BatchPlan { request, errors })
    }

    /// Build, dispatch, and key the results by reference ID
    pub async fn execute(&self) -> Result<QueryDataResponse> {
        let plan = self.build()?;

        let mut result = QueryDataResponse::default();
        for (ref_id, message) in plan.errors {
            result.responses.insert(ref_id, DataResponse::Error(message));
        }

        if plan.request.is_empty() {
            return Ok(result);
        }

        info!(searches = plan.request.len(), "executing multi-search");
        let response = self.client.execute_multi_search(&plan.request).await?;

        if response.responses.len() != plan.request.len() {
            return Err(Error::Client(format!(
                "expected {} responses, got {}",
                plan.request.len(),
                response.responses.len()
            )));
        }

        for (item, search) in response.responses.into_iter().zip(&plan.request.requests) {
            let slot = match item {
                MultiSearchItem::Success(body) => DataResponse::Search(body),
                MultiSearchItem::Error { error, status } => {
                    warn!(ref_id = %search.ref_id, status, "search failed: {}", error.reason);
                    let message = if error.reason.is_empty() {
                        error.error_type
                    } else {
                        error.reason
                    };
                    DataResponse::Error(message)
                }
            };
            result.responses.insert(search.ref_id.clone(), slot);
        }

        Ok(result)
    }

    fn process_query(
        &self,
        query: Query,
        ms: &mut MultiSearchRequestBuilder,
        errors: &mut BTreeMap<String, String>,
    ) -> Result<()> {
        let document_metric = if query.bucket_aggs.is_empty() {
            // without aggregations only document and log queries make sense
            match query.metrics.first() {
                Some(m) if m.metric_type.is_document_query() => Some(m),
                _ => {
                    warn!(ref_id = %query.ref_id, "{}", INVALID_QUERY_MESSAGE);
                    errors.insert(query.ref_id.clone(), INVALID_QUERY_MESSAGE.to_string());
                    return Ok(());
                }
            }
        } else {
            None
        };

        let min_interval = self.client.min_interval(&query.interval)?;
        let interval = self
            .calculator
            .calculate(&self.time_range, min_interval, query.max_data_points);
        let time_field = self.client.time_field();
        let from = self.time_range.from_millis();
        let to = self.time_range.to_millis();

        let b = ms.search(&query.ref_id, interval);
        b.size(0)
            .add_date_range_filter(time_field, from, to)
            .add_query_string_filter(&query.raw_query);

        match document_metric {
            Some(metric) => add_document_query(b, metric, time_field, from, to),
            None => {
                build_aggregations(b.aggs(), &query, from, to, time_field);
            }
        }

        Ok(())
    }
}

/// Sorting, paging and (for logs) highlighting plus a volume histogram
fn add_document_query(
    b: &mut SearchRequestBuilder,
    metric: &MetricAgg,
    time_field: &str,
    from: i64,
    to: i64,
) {
    b.sort_desc(time_field, Some("boolean"))
        .sort_desc("_doc", None)
        .add_doc_value_field(time_field)
        .size(metric.settings.int_or("size", DEFAULT_DOCUMENT_SIZE));

    if metric.metric_type != MetricType::Logs {
        return;
    }

    b.size(metric.settings.int_or("limit", DEFAULT_DOCUMENT_SIZE))
        .add_highlight();

    let histogram = BucketAgg {
        id: "1".to_string(),
        field: Some(time_field.to_string()),
        kind: BucketAggKind::DateHistogram(DateHistogramSettings::with_interval("auto")),
    };
    let no_metrics: HashMap<&str, &MetricAgg> = HashMap::new();
    let ctx = TreeContext {
        from,
        to,
        time_field,
        metrics: &no_metrics,
    };
    let tree = b.aggs();
    let root = tree.root();
    add_bucket_agg(tree, root, &histogram, &ctx);
}
