//! Aggregation settings and their normalization
//!
//! Panel editors store most settings as strings. The engine wants numbers in
//! several places, and older editors used a nested `script.inline` shape. The
//! `normalized` functions here migrate both; each is pure and idempotent.

use crate::model::MetricType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// A settings value as the editor stored it
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Loose {
    Int(i64),
    Float(f64),
    Text(String),
    Other(Value),
}

impl Loose {
    /// Integer value, only when stored as an integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer value, also accepting an integer-like string
    pub fn parse_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert an integer-like string into an integer, leaving anything else
    fn into_int(self) -> Self {
        if let Self::Text(s) = &self {
            if let Ok(v) = s.trim().parse::<i64>() {
                return Self::Int(v);
            }
        }
        self
    }
}

fn text(value: &Option<Loose>) -> Option<&str> {
    value.as_ref().and_then(Loose::as_text)
}

fn normalize_min_doc_count(value: Option<Loose>) -> Option<Loose> {
    value.map(Loose::into_int)
}

/// `date_histogram` settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DateHistogramSettings {
    pub interval: Option<Loose>,
    pub min_doc_count: Option<Loose>,
    pub offset: Option<Loose>,
    pub missing: Option<Loose>,
    #[serde(rename = "timeZone")]
    pub time_zone: Option<Loose>,
}

impl DateHistogramSettings {
    pub fn with_interval(interval: &str) -> Self {
        Self {
            interval: Some(Loose::Text(interval.to_string())),
            ..Self::default()
        }
    }

    pub fn interval(&self) -> &str {
        text(&self.interval).unwrap_or("auto")
    }

    pub fn min_doc_count(&self) -> i64 {
        self.min_doc_count.as_ref().and_then(Loose::as_int).unwrap_or(0)
    }

    pub fn offset(&self) -> Option<&str> {
        text(&self.offset)
    }

    pub fn missing(&self) -> Option<&str> {
        text(&self.missing)
    }

    pub fn time_zone(&self) -> Option<&str> {
        text(&self.time_zone)
    }

    pub fn normalized(self) -> Self {
        Self {
            min_doc_count: normalize_min_doc_count(self.min_doc_count),
            ..self
        }
    }
}

/// `histogram` settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HistogramSettings {
    pub interval: Option<Loose>,
    pub min_doc_count: Option<Loose>,
    pub missing: Option<Loose>,
}

impl HistogramSettings {
    pub fn interval(&self) -> i64 {
        self.interval
            .as_ref()
            .and_then(Loose::parse_int)
            .unwrap_or(1000)
    }

    pub fn min_doc_count(&self) -> i64 {
        self.min_doc_count.as_ref().and_then(Loose::as_int).unwrap_or(0)
    }

    pub fn missing(&self) -> Option<i64> {
        self.missing.as_ref().and_then(Loose::as_int)
    }

    pub fn normalized(self) -> Self {
        Self {
            min_doc_count: normalize_min_doc_count(self.min_doc_count),
            ..self
        }
    }
}

/// `terms` settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TermsSettings {
    pub size: Option<Loose>,
    pub min_doc_count: Option<Loose>,
    pub missing: Option<Loose>,
    #[serde(rename = "orderBy")]
    pub order_by: Option<Loose>,
    pub order: Option<Loose>,
}

pub const DEFAULT_TERMS_SIZE: i64 = 500;

impl TermsSettings {
    /// Bucket count; 500 when absent, unparseable or zero
    pub fn size(&self) -> i64 {
        match self.size.as_ref().and_then(Loose::parse_int) {
            Some(0) | None => DEFAULT_TERMS_SIZE,
            Some(size) => size,
        }
    }

    pub fn min_doc_count(&self) -> Option<i64> {
        self.min_doc_count.as_ref().and_then(Loose::as_int)
    }

    pub fn missing(&self) -> Option<&str> {
        text(&self.missing)
    }

    pub fn order_by(&self) -> Option<&str> {
        text(&self.order_by)
    }

    pub fn order(&self) -> &str {
        text(&self.order).unwrap_or("desc")
    }

    pub fn normalized(self) -> Self {
        Self {
            min_doc_count: normalize_min_doc_count(self.min_doc_count),
            ..self
        }
    }
}

/// `filters` settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FiltersSettings {
    pub filters: Option<Value>,
}

/// One labelled filter of a `filters` aggregation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterEntry {
    pub label: String,
    pub query: String,
}

impl FiltersSettings {
    /// Declared filters; the label falls back to the query text
    pub fn entries(&self) -> Vec<FilterEntry> {
        let Some(Value::Array(items)) = &self.filters else {
            return vec![];
        };

        items
            .iter()
            .map(|item| {
                let query = item
                    .get("query")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let label = match item.get("label").and_then(Value::as_str) {
                    Some(label) if !label.is_empty() => label.to_string(),
                    _ => query.clone(),
                };
                FilterEntry { label, query }
            })
            .collect()
    }
}

/// `geohash_grid` settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GeohashGridSettings {
    pub precision: Option<Loose>,
}

impl GeohashGridSettings {
    pub fn precision(&self) -> i64 {
        self.precision
            .as_ref()
            .and_then(Loose::parse_int)
            .unwrap_or(3)
    }
}

/// Open settings map of a metric, forwarded to the engine as-is
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct MetricSettings(Map<String, Value>);

impl MetricSettings {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Integer setting stored either as a number or an integer-like string
    pub fn int_or(&self, key: &str, default: i64) -> i64 {
        match self.0.get(key) {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    /// Drop entries that older editors stored as the string `"null"`
    pub fn without_null_strings(self) -> Self {
        Self(
            self.0
                .into_iter()
                .filter(|(_, v)| v.as_str() != Some("null"))
                .collect(),
        )
    }

    /// Coerce string numbers the engine needs as floats and flatten legacy scripts
    pub fn normalized(self, metric_type: &MetricType) -> Self {
        let mut map = self.0;

        match metric_type {
            MetricType::MovingAvg => {
                set_float_path(&mut map, &["window"]);
                set_float_path(&mut map, &["predict"]);
                set_float_path(&mut map, &["settings", "alpha"]);
                set_float_path(&mut map, &["settings", "beta"]);
                set_float_path(&mut map, &["settings", "gamma"]);
                set_float_path(&mut map, &["settings", "period"]);
            }
            MetricType::SerialDiff => set_float_path(&mut map, &["lag"]),
            _ => {}
        }

        if metric_type.supports_inline_script() {
            flatten_script(&mut map);
        }

        Self(map)
    }
}

fn set_float_path(map: &mut Map<String, Value>, path: &[&str]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = map;
    for key in parents {
        match current.get_mut(*key) {
            Some(Value::Object(inner)) => current = inner,
            _ => return,
        }
    }

    if let Some(slot) = current.get_mut(*last) {
        let parsed = slot
            .as_str()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .and_then(Number::from_f64);
        if let Some(number) = parsed {
            *slot = Value::Number(number);
        }
    }
}

/// `script: {inline: "..."}` becomes `script: "..."`
fn flatten_script(map: &mut Map<String, Value>) {
    if matches!(map.get("script"), Some(Value::String(_))) {
        return;
    }

    let inline = map
        .get("script")
        .and_then(|s| s.get("inline"))
        .and_then(Value::as_str)
        .map(str::to_string);

    if let Some(script) = inline {
        map.insert("script".to_string(), Value::String(script));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metric_settings(value: Value) -> MetricSettings {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_moving_avg_strings_become_floats() {
        let settings = metric_settings(json!({
            "window": "5",
            "predict": "2",
            "model": "holt_winters",
            "settings": {"alpha": "0.5", "beta": "0.3", "gamma": "x", "period": "7"}
        }))
        .normalized(&MetricType::MovingAvg);

        assert_eq!(settings.get("window"), Some(&json!(5.0)));
        assert_eq!(settings.get("predict"), Some(&json!(2.0)));
        assert_eq!(settings.get("model"), Some(&json!("holt_winters")));
        let inner = settings.get("settings").unwrap();
        assert_eq!(inner["alpha"], json!(0.5));
        assert_eq!(inner["beta"], json!(0.3));
        assert_eq!(inner["gamma"], json!("x"));
        assert_eq!(inner["period"], json!(7.0));
    }

    #[test]
    fn test_serial_diff_lag() {
        let settings = metric_settings(json!({"lag": "3"})).normalized(&MetricType::SerialDiff);
        assert_eq!(settings.get("lag"), Some(&json!(3.0)));
    }

    #[test]
    fn test_other_types_leave_numbers_alone() {
        let settings = metric_settings(json!({"window": "5"})).normalized(&MetricType::Derivative);
        assert_eq!(settings.get("window"), Some(&json!("5")));
    }

    #[test]
    fn test_legacy_inline_script_is_flattened() {
        let settings = metric_settings(json!({"script": {"inline": "_value / 100"}}))
            .normalized(&MetricType::Avg);
        assert_eq!(settings.get("script"), Some(&json!("_value / 100")));
    }

    #[test]
    fn test_flat_script_preferred() {
        let settings =
            metric_settings(json!({"script": "doc['x'].value"})).normalized(&MetricType::Sum);
        assert_eq!(settings.get("script"), Some(&json!("doc['x'].value")));
    }

    #[test]
    fn test_script_untouched_without_script_support() {
        let settings = metric_settings(json!({"script": {"inline": "1"}}))
            .normalized(&MetricType::Cardinality);
        assert_eq!(settings.get("script"), Some(&json!({"inline": "1"})));
    }

    #[test]
    fn test_metric_normalization_is_idempotent() {
        let raw = metric_settings(json!({
            "window": "5",
            "settings": {"alpha": "0.1"},
            "script": {"inline": "x"}
        }));
        for metric_type in [MetricType::MovingAvg, MetricType::Avg, MetricType::SerialDiff] {
            let once = raw.clone().normalized(&metric_type);
            let twice = once.clone().normalized(&metric_type);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_bucket_min_doc_count_normalization() {
        let terms: TermsSettings = serde_json::from_value(json!({"min_doc_count": "2"})).unwrap();
        assert_eq!(terms.min_doc_count(), None);

        let once = terms.normalized();
        assert_eq!(once.min_doc_count(), Some(2));
        assert_eq!(once.clone().normalized(), once);
    }

    #[test]
    fn test_unparseable_min_doc_count_kept() {
        let hist: DateHistogramSettings =
            serde_json::from_value(json!({"min_doc_count": "many"})).unwrap();
        let normalized = hist.normalized();
        assert_eq!(normalized.min_doc_count, Some(Loose::Text("many".to_string())));
        assert_eq!(normalized.min_doc_count(), 0);
    }

    #[test]
    fn test_terms_size_defaults() {
        let size = |v: Value| serde_json::from_value::<TermsSettings>(v).unwrap().size();
        assert_eq!(size(json!({})), 500);
        assert_eq!(size(json!({"size": "abc"})), 500);
        assert_eq!(size(json!({"size": 0})), 500);
        assert_eq!(size(json!({"size": "0"})), 500);
        assert_eq!(size(json!({"size": "20"})), 20);
        assert_eq!(size(json!({"size": 15})), 15);
    }

    #[test]
    fn test_date_histogram_defaults() {
        let settings = DateHistogramSettings::default();
        assert_eq!(settings.interval(), "auto");
        assert_eq!(settings.min_doc_count(), 0);
        assert_eq!(settings.offset(), None);
        assert_eq!(settings.time_zone(), None);
    }

    #[test]
    fn test_filters_label_falls_back_to_query() {
        let settings: FiltersSettings = serde_json::from_value(json!({
            "filters": [
                {"query": "status:200", "label": "ok"},
                {"query": "status:500"},
                {"query": "status:404", "label": ""}
            ]
        }))
        .unwrap();

        let entries = settings.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].label, "ok");
        assert_eq!(entries[1].label, "status:500");
        assert_eq!(entries[2].label, "status:404");
    }

    #[test]
    fn test_filters_not_a_list() {
        let settings: FiltersSettings =
            serde_json::from_value(json!({"filters": "oops"})).unwrap();
        assert!(settings.entries().is_empty());
    }

    #[test]
    fn test_int_or() {
        let settings = metric_settings(json!({"size": "100", "limit": 50, "bad": "x"}));
        assert_eq!(settings.int_or("size", 500), 100);
        assert_eq!(settings.int_or("limit", 500), 50);
        assert_eq!(settings.int_or("bad", 500), 500);
        assert_eq!(settings.int_or("absent", 500), 500);
    }
}
