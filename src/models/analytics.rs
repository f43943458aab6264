//! `AnalyticsResult` — C6's output and C7's input; the canonical shape returned to chat.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsResultType {
    Data,
    Empty,
    Error,
    Clarification,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TimeRangeWindow {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MetricRow {
    pub fecha: String,
    pub banco: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RankingEntry {
    pub banco: String,
    pub promedio: f64,
    pub max: f64,
    pub min: f64,
    pub count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SummaryStats {
    #[serde(default)]
    pub current: Option<f64>,
    #[serde(default)]
    pub previous: Option<f64>,
    #[serde(default)]
    pub first: Option<f64>,
    #[serde(default)]
    pub delta_vs_previous: Option<f64>,
    #[serde(default)]
    pub delta_vs_first: Option<f64>,
    #[serde(default)]
    pub trend: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AnalyticsMetadata {
    #[serde(default)]
    pub sql_generated: Option<String>,
    #[serde(default)]
    pub pipeline: String,
    #[serde(default)]
    pub data_source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnalyticsResult {
    #[serde(rename = "type")]
    pub result_type: AnalyticsResultType,
    pub visualization: String,
    pub metric_name: String,
    pub metric_type: String,
    #[serde(default)]
    pub bank_names: Vec<String>,
    pub time_range: TimeRangeWindow,
    pub data_as_of: String,
    #[serde(default)]
    pub rows: Vec<MetricRow>,
    #[serde(default)]
    pub ranking: Vec<RankingEntry>,
    #[serde(default)]
    pub summary_stats: Option<SummaryStats>,
    pub plotly_config: serde_json::Value,
    #[serde(default)]
    pub metadata: AnalyticsMetadata,
    #[serde(default)]
    pub message: Option<String>,
}

impl AnalyticsResult {
    pub fn empty(metric_name: &str, message: impl Into<String>, data_as_of: String) -> Self {
        Self {
            result_type: AnalyticsResultType::Empty,
            visualization: "none".into(),
            metric_name: metric_name.into(),
            metric_type: String::new(),
            bank_names: vec![],
            time_range: TimeRangeWindow { start: None, end: None },
            data_as_of,
            rows: vec![],
            ranking: vec![],
            summary_stats: None,
            plotly_config: serde_json::Value::Null,
            metadata: AnalyticsMetadata::default(),
            message: Some(message.into()),
        }
    }

    pub fn error(metric_name: &str, message: impl Into<String>, data_as_of: String) -> Self {
        Self {
            result_type: AnalyticsResultType::Error,
            visualization: "none".into(),
            metric_name: metric_name.into(),
            metric_type: String::new(),
            bank_names: vec![],
            time_range: TimeRangeWindow { start: None, end: None },
            data_as_of,
            rows: vec![],
            ranking: vec![],
            summary_stats: None,
            plotly_config: serde_json::Value::Null,
            metadata: AnalyticsMetadata::default(),
            message: Some(message.into()),
        }
    }
}
