//! Error types for the query builder

/// Batch-fatal errors.
///
/// Per-panel problems (a query with neither metrics nor aggregations) are not
/// errors at this level; they are reported inside
/// [`QueryDataResponse`](crate::response::QueryDataResponse).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Request build error: {0}")]
    Build(String),

    #[error("Client error: {0}")]
    Client(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
