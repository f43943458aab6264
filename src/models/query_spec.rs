//! `QuerySpec` — the structured representation of a parsed banking question (C4 output).

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::metric::TimeRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Month,
    Quarter,
    Year,
}

impl Default for Granularity {
    fn default() -> Self {
        Granularity::Month
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VisualizationType {
    Line,
    Bar,
    Table,
}

impl Default for VisualizationType {
    fn default() -> Self {
        VisualizationType::Line
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuerySpec {
    pub metric: String,
    #[serde(default)]
    pub bank_names: Vec<String>,
    pub time_range: TimeRange,
    #[serde(default)]
    pub granularity: Granularity,
    #[serde(default)]
    pub visualization_type: VisualizationType,
    #[serde(default)]
    pub comparison_mode: bool,
    #[serde(default)]
    pub ranking_mode: bool,
    #[serde(default)]
    pub top_n: Option<u32>,
    #[serde(default)]
    pub requires_clarification: bool,
    #[serde(default)]
    pub missing_fields: Vec<String>,
    #[serde(default = "default_confidence")]
    pub confidence_score: f64,
}

fn default_confidence() -> f64 {
    1.0
}

impl QuerySpec {
    /// `is_complete() <=> !requires_clarification && metric non-empty && confidence >= 0.6`.
    ///
    /// Registry membership of `metric` is checked by the caller (C5), since `QuerySpec`
    /// itself has no dependency on the metric registry.
    pub fn is_complete(&self) -> bool {
        !self.requires_clarification && !self.metric.is_empty() && self.confidence_score >= 0.6
    }

    pub fn normalize(mut self) -> Self {
        self.metric = self.metric.to_uppercase().trim().to_string();
        self.bank_names = self.bank_names.iter().map(|b| b.to_uppercase().trim().to_string()).collect();
        self
    }
}
