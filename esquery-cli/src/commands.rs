//! render and run subcommands

use crate::http::HttpClient;
use anyhow::{Context, Result};
use esquery::{DataQuery, TimeRange, TimeSeriesQuery};
use std::fs;
use std::path::Path;
use tracing::info;

/// Read a JSON array of panel queries
pub fn read_queries(path: &Path) -> Result<Vec<DataQuery>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let queries: Vec<DataQuery> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of queries", path.display()))?;
    Ok(queries)
}

/// Print the multi-search body without sending it
pub fn render(client: &HttpClient, queries: &[DataQuery], range: TimeRange) -> Result<()> {
    let plan = TimeSeriesQuery::new(client, queries, range).build()?;

    for (ref_id, message) in &plan.errors {
        eprintln!("{}: {}", ref_id, message);
    }

    if plan.request.is_empty() {
        info!("no searches to render");
        return Ok(());
    }

    print!("{}", plan.request.encode(client.header())?);
    Ok(())
}

/// Execute the batch and print per-panel results as JSON
pub async fn run(client: &HttpClient, queries: &[DataQuery], range: TimeRange) -> Result<()> {
    let result = TimeSeriesQuery::new(client, queries, range).execute().await?;

    let failed = result
        .responses
        .values()
        .filter(|r| r.error().is_some())
        .count();
    info!(panels = result.len(), failed, "query finished");

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
