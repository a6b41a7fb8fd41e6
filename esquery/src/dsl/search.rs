//! Search request body

use crate::dsl::aggs::{AggTree, DATE_FORMAT_EPOCH_MS};
use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Highlight markers the response parser looks for in log lines
pub const HIGHLIGHT_PRE_TAG: &str = "@HIGHLIGHT@";
pub const HIGHLIGHT_POST_TAG: &str = "@/HIGHLIGHT@";
const HIGHLIGHT_FRAGMENT_SIZE: i64 = 2_147_483_647;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeFilter {
    pub gte: i64,
    pub lte: i64,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryStringFilter {
    pub analyze_wildcard: bool,
    pub query: String,
}

/// A filter clause
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Range(BTreeMap<String, RangeFilter>),
    QueryString(QueryStringFilter),
}

impl Filter {
    pub fn query_string(query: impl Into<String>) -> Self {
        Self::QueryString(QueryStringFilter {
            analyze_wildcard: true,
            query: query.into(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoolQuery {
    pub filter: Vec<Filter>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryClause {
    pub bool: BoolQuery,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SortSpec {
    pub order: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unmapped_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Highlight {
    pub fields: BTreeMap<String, Map<String, Value>>,
    pub pre_tags: Vec<String>,
    pub post_tags: Vec<String>,
    pub fragment_size: i64,
}

impl Default for Highlight {
    fn default() -> Self {
        Self {
            fields: BTreeMap::from([("*".to_string(), Map::new())]),
            pre_tags: vec![HIGHLIGHT_PRE_TAG.to_string()],
            post_tags: vec![HIGHLIGHT_POST_TAG.to_string()],
            fragment_size: HIGHLIGHT_FRAGMENT_SIZE,
        }
    }
}

/// One search body of a multi-search batch
#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    pub size: i64,
    pub query: QueryClause,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<BTreeMap<String, SortSpec>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub docvalue_fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<Highlight>,
    #[serde(skip_serializing_if = "AggTree::is_empty")]
    pub aggs: AggTree,
}

/// Builder for a [`SearchRequest`]
#[derive(Debug, Clone, Default)]
pub struct SearchRequestBuilder {
    size: i64,
    filters: Vec<Filter>,
    sort: Vec<BTreeMap<String, SortSpec>>,
    docvalue_fields: Vec<String>,
    highlight: Option<Highlight>,
    aggs: AggTree,
}

impl SearchRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&mut self, size: i64) -> &mut Self {
        self.size = size;
        self
    }

    /// Inclusive range on `field`, bounds in epoch milliseconds
    pub fn add_date_range_filter(&mut self, field: &str, from: i64, to: i64) -> &mut Self {
        self.filters.push(Filter::Range(BTreeMap::from([(
            field.to_string(),
            RangeFilter {
                gte: from,
                lte: to,
                format: DATE_FORMAT_EPOCH_MS.to_string(),
            },
        )])));
        self
    }

    /// Free-text filter; a blank query adds nothing
    pub fn add_query_string_filter(&mut self, query: &str) -> &mut Self {
        if !query.trim().is_empty() {
            self.filters.push(Filter::query_string(query));
        }
        self
    }

    pub fn sort_desc(&mut self, field: &str, unmapped_type: Option<&str>) -> &mut Self {
        self.sort.push(BTreeMap::from([(
            field.to_string(),
            SortSpec {
                order: "desc".to_string(),
                unmapped_type: unmapped_type.map(str::to_string),
            },
        )]));
        self
    }

    pub fn add_doc_value_field(&mut self, field: &str) -> &mut Self {
        self.docvalue_fields.push(field.to_string());
        self
    }

    pub fn add_highlight(&mut self) -> &mut Self {
        self.highlight = Some(Highlight::default());
        self
    }

    pub fn aggs(&mut self) -> &mut AggTree {
        &mut self.aggs
    }

    pub fn build(self) -> Result<SearchRequest> {
        for filter in &self.filters {
            if let Filter::Range(ranges) = filter {
                for (field, range) in ranges {
                    if field.is_empty() {
                        return Err(Error::Build("time field is not configured".to_string()));
                    }
                    if range.gte > range.lte {
                        return Err(Error::Build(format!(
                            "time range start {} is after its end {}",
                            range.gte, range.lte
                        )));
                    }
                }
            }
        }

        Ok(SearchRequest {
            size: self.size,
            query: QueryClause {
                bool: BoolQuery {
                    filter: self.filters,
                },
            },
            sort: self.sort,
            docvalue_fields: self.docvalue_fields,
            highlight: self.highlight,
            aggs: self.aggs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filters_serialization() {
        let mut b = SearchRequestBuilder::new();
        b.size(0)
            .add_date_range_filter("@timestamp", 1000, 2000)
            .add_query_string_filter("status:500");

        let value = serde_json::to_value(b.build().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "size": 0,
                "query": {"bool": {"filter": [
                    {"range": {"@timestamp": {"gte": 1000, "lte": 2000, "format": "epoch_millis"}}},
                    {"query_string": {"analyze_wildcard": true, "query": "status:500"}}
                ]}}
            })
        );
    }

    #[test]
    fn test_blank_query_string_skipped() {
        let mut b = SearchRequestBuilder::new();
        b.add_date_range_filter("ts", 0, 1).add_query_string_filter("  ");
        let req = b.build().unwrap();
        assert_eq!(req.query.bool.filter.len(), 1);
    }

    #[test]
    fn test_document_query_parts() {
        let mut b = SearchRequestBuilder::new();
        b.size(100)
            .sort_desc("ts", Some("boolean"))
            .sort_desc("_doc", None)
            .add_doc_value_field("ts")
            .add_highlight();

        let value = serde_json::to_value(b.build().unwrap()).unwrap();
        assert_eq!(
            value["sort"],
            json!([
                {"ts": {"order": "desc", "unmapped_type": "boolean"}},
                {"_doc": {"order": "desc"}}
            ])
        );
        assert_eq!(value["docvalue_fields"], json!(["ts"]));
        assert_eq!(value["highlight"]["pre_tags"], json!(["@HIGHLIGHT@"]));
        assert_eq!(value["highlight"]["fields"], json!({"*": {}}));
        assert!(value.get("aggs").is_none());
    }

    #[test]
    fn test_missing_time_field_fails_build() {
        let mut b = SearchRequestBuilder::new();
        b.add_date_range_filter("", 0, 1);
        assert!(matches!(b.build(), Err(Error::Build(_))));
    }

    #[test]
    fn test_inverted_range_fails_build() {
        let mut b = SearchRequestBuilder::new();
        b.add_date_range_filter("ts", 5, 1);
        assert!(matches!(b.build(), Err(Error::Build(_))));
    }
}
