//! Multi-search batching and NDJSON encoding

use crate::dsl::search::{SearchRequest, SearchRequestBuilder};
use crate::error::Result;
use crate::interval::Interval;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-request header line of a multi-search body
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MultiSearchHeader {
    pub search_type: String,
    pub ignore_unavailable: bool,
    pub index: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_shard_requests: Option<i64>,
}

impl MultiSearchHeader {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            search_type: "query_then_fetch".to_string(),
            ignore_unavailable: true,
            index: index.into(),
            max_concurrent_shard_requests: None,
        }
    }
}

/// One search of the batch and the interval its placeholders resolve to
#[derive(Debug, Clone)]
pub struct SearchItem {
    pub ref_id: String,
    pub interval: Interval,
    pub body: SearchRequest,
}

/// A finalized multi-search batch
#[derive(Debug, Clone, Default)]
pub struct MultiSearchRequest {
    pub requests: Vec<SearchItem>,
}

impl MultiSearchRequest {
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Encode as NDJSON, substituting interval placeholders per request
    pub fn encode(&self, header: &MultiSearchHeader) -> Result<String> {
        let header = serde_json::to_string(header)?;
        let mut payload = String::new();
        for item in &self.requests {
            let body = serde_json::to_string(&item.body)?;
            payload.push_str(&header);
            payload.push('\n');
            payload.push_str(&interpolate_interval(&body, &item.interval));
            payload.push('\n');
        }
        Ok(payload)
    }
}

/// Replace `$__interval_ms` and then `$__interval` in a rendered body
pub fn interpolate_interval(body: &str, interval: &Interval) -> String {
    body.replace("$__interval_ms", &interval.millis.to_string())
        .replace("$__interval", &interval.text)
}

/// Collects searches in order, then finalizes them all at once
#[derive(Debug, Default)]
pub struct MultiSearchRequestBuilder {
    searches: Vec<(String, Interval, SearchRequestBuilder)>,
}

impl MultiSearchRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new search in the batch
    pub fn search(&mut self, ref_id: &str, interval: Interval) -> &mut SearchRequestBuilder {
        self.searches
            .push((ref_id.to_string(), interval, SearchRequestBuilder::new()));
        let last = self.searches.len() - 1;
        &mut self.searches[last].2
    }

    pub fn len(&self) -> usize {
        self.searches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.searches.is_empty()
    }

    /// Fails if any search fails to build; nothing is partially returned
    pub fn build(self) -> Result<MultiSearchRequest> {
        let requests = self
            .searches
            .into_iter()
            .map(|(ref_id, interval, builder)| {
                Ok(SearchItem {
                    ref_id,
                    interval,
                    body: builder.build()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(MultiSearchRequest { requests })
    }
}

/// Engine error of a single multi-search item
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineError {
    #[serde(default, rename = "type")]
    pub error_type: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MultiSearchItem {
    Error {
        error: EngineError,
        #[serde(default)]
        status: u16,
    },
    Success(Value),
}

/// Multi-search response, one item per request in request order
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MultiSearchResponse {
    #[serde(default)]
    pub responses: Vec<MultiSearchItem>,
}
