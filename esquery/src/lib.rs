//! Panel query to Elasticsearch aggregation DSL translation
//!
//! This crate turns dashboard panel queries into one multi-search request for
//! an Elasticsearch-compatible engine and executes it through an injected
//! client.
//!
//! # Flow
//!
//! 1. [`model::parse_queries`] turns raw panel models into typed [`Query`] values
//! 2. [`settings`] normalizes loosely-typed editor settings
//! 3. [`builder`] nests bucket aggregations and attaches metric and pipeline
//!    aggregations at the innermost level
//! 4. [`executor::TimeSeriesQuery`] folds every query into one
//!    [`dsl::MultiSearchRequest`] and dispatches it through a [`Client`]
//!
//! Supported bucket aggregations:
//! - `date_histogram`
//! - `histogram`
//! - `filters`
//! - `terms`
//! - `geohash_grid`

pub mod builder;
pub mod client;
pub mod dsl;
pub mod error;
pub mod executor;
pub mod interval;
pub mod model;
pub mod response;
pub mod settings;

pub use client::Client;
pub use error::{Error, Result};
pub use executor::{BatchPlan, TimeSeriesQuery, INVALID_QUERY_MESSAGE};
pub use interval::{Interval, IntervalCalculator};
pub use model::{BucketAgg, BucketAggKind, DataQuery, MetricAgg, MetricType, Query, TimeRange};
pub use response::{DataResponse, QueryDataResponse};
