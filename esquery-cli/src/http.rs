//! reqwest-backed multi-search client

use crate::config::DatasourceConfig;
use async_trait::async_trait;
use esquery::dsl::{MultiSearchHeader, MultiSearchRequest, MultiSearchResponse};
use esquery::{interval, Client, Error, Result};
use std::time::Duration;
use tracing::debug;

pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    header: MultiSearchHeader,
    time_field: String,
    time_interval: Option<String>,
}

impl HttpClient {
    pub fn new(config: &DatasourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Client(e.to_string()))?;

        let mut header = MultiSearchHeader::new(&config.index);
        header.max_concurrent_shard_requests = config.max_concurrent_shard_requests;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            header,
            time_field: config.time_field.clone(),
            time_interval: config.time_interval.clone(),
        })
    }

    /// Header written before every search of a batch
    pub fn header(&self) -> &MultiSearchHeader {
        &self.header
    }
}

#[async_trait]
impl Client for HttpClient {
    fn time_field(&self) -> &str {
        &self.time_field
    }

    fn min_interval(&self, query_interval: &str) -> Result<Duration> {
        interval::min_interval(self.time_interval.as_deref(), query_interval)
    }

    async fn execute_multi_search(
        &self,
        request: &MultiSearchRequest,
    ) -> Result<MultiSearchResponse> {
        let body = request.encode(&self.header)?;
        let url = format!("{}/_msearch", self.base_url);
        debug!(url = %url, bytes = body.len(), "sending multi-search");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Client(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Client(format!(
                "multi-search failed: {} - {}",
                status, text
            )));
        }

        response
            .json::<MultiSearchResponse>()
            .await
            .map_err(|e| Error::Client(e.to_string()))
    }
}
