//! Per-panel results of one execution

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Result slot of one panel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataResponse {
    /// Raw engine response, handed on to the response parser
    Search(Value),
    Error(String),
}

impl DataResponse {
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error(message) => Some(message),
            Self::Search(_) => None,
        }
    }
}

/// Results keyed by panel reference ID
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryDataResponse {
    pub responses: BTreeMap<String, DataResponse>,
}

impl QueryDataResponse {
    pub fn get(&self, ref_id: &str) -> Option<&DataResponse> {
        self.responses.get(ref_id)
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}
