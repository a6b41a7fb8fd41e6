//! Search engine query DSL produced by the builder

pub mod aggs;
pub mod msearch;
pub mod search;

pub use aggs::{
    AggTree, Aggregation, BucketPath, DateHistogramAgg, ExtendedBounds, FiltersAgg,
    GeohashGridAgg, HistogramAgg, MetricAggregation, NodeId, PipelineAggregation, TermsAgg,
    COUNT_BUCKET_PATH, DATE_FORMAT_EPOCH_MS,
};
pub use msearch::{
    interpolate_interval, EngineError, MultiSearchHeader, MultiSearchItem, MultiSearchRequest,
    MultiSearchRequestBuilder, MultiSearchResponse, SearchItem,
};
pub use search::{Filter, Highlight, SearchRequest, SearchRequestBuilder};
