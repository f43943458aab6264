//! Metric descriptors and the time-range tagged record shared by the NL2SQL pipeline.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Semantic type of a metric's underlying column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Ratio,
    CurrencyMdp,
    Percentage,
    Count,
}

/// Whether a higher or lower reading of a metric is considered favorable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BetterDirection {
    Higher,
    Lower,
    Neutral,
}

/// A single whitelisted metric: canonical name, physical column, and display metadata.
///
/// Invariant: every whitelisted `name` maps to exactly one `column`; no column
/// outside this registry may ever be referenced by generated SQL (enforced by C2).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MetricDescriptor {
    pub name: String,
    pub column: String,
    pub metric_type: MetricType,
    pub better_direction: BetterDirection,
    pub display_name: String,
    pub aliases: Vec<String>,
}

impl MetricDescriptor {
    pub fn is_ratio(&self) -> bool {
        matches!(self.metric_type, MetricType::Ratio | MetricType::Percentage)
    }
}

/// Tagged time-range record. `n` applies to the `last_n_*` variants;
/// `start_date`/`end_date` apply to `year` and `between_dates`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimeRange {
    LastNMonths { n: u32 },
    LastNQuarters { n: u32 },
    Year { start_date: String, end_date: String },
    BetweenDates { start_date: String, end_date: String },
    All,
}

impl TimeRange {
    /// Validates `start_date <= end_date` for bounded variants and `n >= 1` for `last_n_*`.
    pub fn is_valid(&self) -> bool {
        match self {
            TimeRange::LastNMonths { n } | TimeRange::LastNQuarters { n } => *n >= 1,
            TimeRange::Year { start_date, end_date }
            | TimeRange::BetweenDates { start_date, end_date } => start_date <= end_date,
            TimeRange::All => true,
        }
    }

    pub fn is_bounded(&self) -> bool {
        !matches!(self, TimeRange::All)
    }
}
