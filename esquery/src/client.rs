//! The search client seam
//!
//! The builder never talks to the network. Everything it needs from the
//! datasource goes through [`Client`]; connection pooling, timeouts and
//! retries are the implementation's business.

use crate::dsl::{MultiSearchRequest, MultiSearchResponse};
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Client: Send + Sync {
    /// Name of the datasource's time field
    fn time_field(&self) -> &str;

    /// Minimum interval for a query, given its interval override (may be empty)
    fn min_interval(&self, query_interval: &str) -> Result<Duration>;

    /// Run the batch in one round trip
    async fn execute_multi_search(&self, request: &MultiSearchRequest)
        -> Result<MultiSearchResponse>;
}
