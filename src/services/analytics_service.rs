//! Analytics Service (C6) — executes whitelist-resolved SQL against the
//! Postgres KPI warehouse and shapes the result into the canonical
//! `AnalyticsResult` consumed by C7 and C9.
//!
//! Ported from the original implementation's `AnalyticsService.get_filtered_data`
//! and `_detect_visualization_mode` (`analytics_service.py`).

use chrono::Utc;
use sqlx::{PgPool, Row};

use crate::models::analytics::{
    AnalyticsMetadata, AnalyticsResult, AnalyticsResultType, MetricRow, RankingEntry, SummaryStats,
    TimeRangeWindow,
};
use crate::services::metric_registry;
use crate::utils::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Evolution,
    Comparison,
    Ranking,
    PointValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VizMode {
    Table,
    Yoy,
    Variation,
    SingleSeries,
    Stacked,
}

const YOY_KEYWORDS: &[&str] = &[
    "año contra año", "año vs año", "yoy", "year over year", "año anterior", "vs año pasado",
    "comparado con el año", "interanual", "variación anual", "variacion anual", "crecimiento anual",
    "cambio anual",
];
const VARIATION_KEYWORDS: &[&str] =
    &["variación mensual", "variacion mensual", "mes a mes", "delta mensual", "mom", "month over month"];
const STACKED_KEYWORDS: &[&str] =
    &["por etapa", "por stage", "composición", "composicion", "distribución", "distribucion", "desglose"];

pub struct AnalyticsService {
    warehouse_db: PgPool,
}

impl AnalyticsService {
    pub fn new(warehouse_db: PgPool) -> Self {
        Self { warehouse_db }
    }

    /// Runs `sql` (already produced and validated by C5) and shapes the rows
    /// per `metric_name`/`intent`/visualization-mode detection.
    pub async fn get_filtered_data(
        &self,
        sql: &str,
        metric_name: &str,
        bank_names: &[String],
        time_window: TimeRangeWindow,
        intent: Intent,
        user_query: Option<&str>,
    ) -> ApiResult<AnalyticsResult> {
        let registry = metric_registry::registry();
        let is_ratio = registry.is_ratio(metric_name);
        let data_as_of = Utc::now().format("%Y-%m-%d").to_string();

        let rows = sqlx::query(sql)
            .fetch_all(&self.warehouse_db)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, sql = sql, "analytics query failed");
                ApiError::Database(e)
            })?;

        if rows.is_empty() {
            return Ok(AnalyticsResult::empty(
                metric_name,
                format!("No hay datos para {}", registry.display(metric_name).unwrap_or(metric_name)),
                data_as_of,
            ));
        }

        if intent == Intent::Ranking {
            return Ok(self.format_ranking(&rows, metric_name, bank_names, time_window, data_as_of)?);
        }

        let metric_rows = self.extract_metric_rows(&rows, is_ratio)?;
        if metric_rows.is_empty() {
            return Ok(AnalyticsResult::empty(
                metric_name,
                "los datos devueltos no contienen valores utilizables",
                data_as_of,
            ));
        }

        let viz_mode = detect_visualization_mode(metric_name, user_query);
        let effective_intent = match viz_mode {
            Some(VizMode::Table) => Intent::Evolution,
            _ => intent,
        };

        let result_intent = if effective_intent == Intent::PointValue && metric_rows.len() >= 4 {
            tracing::debug!(metric = metric_name, rows = metric_rows.len(), "auto-promoting point_value to evolution");
            Intent::Evolution
        } else {
            effective_intent
        };

        let visualization = match (viz_mode, result_intent) {
            (Some(VizMode::Yoy), _) => "yoy",
            (Some(VizMode::Variation), _) => "variation",
            (Some(VizMode::SingleSeries), _) => "single_series",
            (Some(VizMode::Table), _) => "table",
            (Some(VizMode::Stacked), _) => "stacked",
            (None, Intent::Evolution) => "evolution",
            (None, Intent::Comparison) => "comparison",
            (None, Intent::Ranking) => "institution_ranking",
            (None, Intent::PointValue) => "point_value",
        };

        let summary_stats = summary_stats_for(&metric_rows, registry.better_direction(metric_name));

        Ok(AnalyticsResult {
            result_type: AnalyticsResultType::Data,
            visualization: visualization.to_string(),
            metric_name: metric_name.to_string(),
            metric_type: if is_ratio { "ratio".into() } else { "currency_mdp".into() },
            bank_names: bank_names.to_vec(),
            time_range: time_window,
            data_as_of,
            rows: metric_rows,
            ranking: vec![],
            summary_stats: Some(summary_stats),
            plotly_config: serde_json::Value::Null,
            metadata: AnalyticsMetadata {
                sql_generated: Some(sql.to_string()),
                pipeline: "c6_analytics_service".into(),
                data_source: "monthly_kpis".into(),
            },
            message: None,
        })
    }

    fn extract_metric_rows(&self, rows: &[sqlx::postgres::PgRow], is_ratio: bool) -> ApiResult<Vec<MetricRow>> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let fecha: Option<chrono::NaiveDate> = row.try_get("fecha").ok();
            let banco: Option<String> = row.try_get("banco").ok();
            let value: Option<f64> = row.try_get("value").ok();
            let (Some(fecha), Some(banco), Some(mut value)) = (fecha, banco, value) else {
                continue;
            };
            if is_ratio {
                value *= 100.0;
            }
            out.push(MetricRow { fecha: fecha.to_string(), banco, value });
        }
        Ok(out)
    }

    fn format_ranking(
        &self,
        rows: &[sqlx::postgres::PgRow],
        metric_name: &str,
        bank_names: &[String],
        time_window: TimeRangeWindow,
        data_as_of: String,
    ) -> ApiResult<AnalyticsResult> {
        let registry = metric_registry::registry();
        let is_ratio = registry.is_ratio(metric_name);
        let mut ranking = Vec::with_capacity(rows.len());
        for row in rows {
            let banco: Option<String> = row.try_get("banco").ok();
            let promedio: Option<f64> = row.try_get("promedio").ok();
            let max: Option<f64> = row.try_get("max").ok();
            let min: Option<f64> = row.try_get("min").ok();
            let count: Option<i64> = row.try_get("count").ok();
            let (Some(banco), Some(mut promedio), Some(mut max), Some(mut min), Some(count)) =
                (banco, promedio, max, min, count)
            else {
                continue;
            };
            if is_ratio {
                promedio *= 100.0;
                max *= 100.0;
                min *= 100.0;
            }
            ranking.push(RankingEntry { banco, promedio, max, min, count });
        }

        if ranking.is_empty() {
            return Ok(AnalyticsResult::empty(metric_name, "sin datos suficientes para el ranking", data_as_of));
        }

        Ok(AnalyticsResult {
            result_type: AnalyticsResultType::Data,
            visualization: "institution_ranking".into(),
            metric_name: metric_name.to_string(),
            metric_type: if is_ratio { "ratio".into() } else { "currency_mdp".into() },
            bank_names: bank_names.to_vec(),
            time_range: time_window,
            data_as_of,
            rows: vec![],
            ranking,
            summary_stats: None,
            plotly_config: serde_json::Value::Null,
            metadata: AnalyticsMetadata {
                sql_generated: None,
                pipeline: "c6_analytics_service".into(),
                data_source: "monthly_kpis".into(),
            },
            message: None,
        })
    }
}

fn detect_visualization_mode(metric_name: &str, user_query: Option<&str>) -> Option<VizMode> {
    let query_lower = user_query.map(|q| q.to_lowercase()).unwrap_or_default();

    if YOY_KEYWORDS.iter().any(|k| query_lower.contains(k)) {
        return Some(VizMode::Yoy);
    }

    if STACKED_KEYWORDS.iter().any(|k| query_lower.contains(k)) {
        return Some(VizMode::Stacked);
    }

    if query_lower.contains("tabla") || query_lower.contains("table") {
        return Some(VizMode::Table);
    }

    if VARIATION_KEYWORDS.iter().any(|k| query_lower.contains(k)) {
        return Some(VizMode::Variation);
    }

    let metric_lower = metric_name.to_lowercase();
    if metric_lower.contains("variacion") || metric_lower.ends_with("_mm") {
        return Some(VizMode::Variation);
    }

    const SINGLE_SERIES_METRICS: &[&str] = &["tasa_sistema", "tasa_invex_consumo"];
    if SINGLE_SERIES_METRICS.contains(&metric_lower.as_str()) {
        return Some(VizMode::SingleSeries);
    }

    if metric_lower.starts_with("ifrs9_stage") {
        return Some(VizMode::Stacked);
    }

    None
}

fn summary_stats_for(rows: &[MetricRow], better_direction: Option<crate::models::metric::BetterDirection>) -> SummaryStats {
    use crate::models::metric::BetterDirection;

    let current = rows.last().map(|r| r.value);
    let previous = if rows.len() >= 2 { Some(rows[rows.len() - 2].value) } else { None };
    let first = rows.first().map(|r| r.value);

    let delta_vs_previous = match (current, previous) {
        (Some(c), Some(p)) => Some(c - p),
        _ => None,
    };
    let delta_vs_first = match (current, first) {
        (Some(c), Some(f)) => Some(c - f),
        _ => None,
    };

    let trend = delta_vs_previous.map(|delta| {
        let improving = match better_direction {
            Some(BetterDirection::Lower) => delta < 0.0,
            Some(BetterDirection::Higher) => delta > 0.0,
            _ => false,
        };
        if delta.abs() < f64::EPSILON {
            "stable".to_string()
        } else if improving {
            "improving".to_string()
        } else {
            "worsening".to_string()
        }
    });

    SummaryStats { current, previous, first, delta_vs_previous, delta_vs_first, trend }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::metric::BetterDirection;

    #[test]
    fn detects_yoy_keyword() {
        assert_eq!(detect_visualization_mode("imor", Some("como va año contra año")), Some(VizMode::Yoy));
    }

    #[test]
    fn detects_variation_suffix_metric() {
        assert_eq!(detect_visualization_mode("ifrs9_stage1_variacion_mm", None), Some(VizMode::Variation));
    }

    #[test]
    fn detects_stacked_keyword() {
        assert_eq!(detect_visualization_mode("ifrs9_stage1", Some("distribución por etapa")), Some(VizMode::Stacked));
    }

    #[test]
    fn detects_stacked_metric_prefix_without_keyword() {
        assert_eq!(detect_visualization_mode("ifrs9_stage2", None), Some(VizMode::Stacked));
    }

    #[test]
    fn returns_none_for_plain_query() {
        assert_eq!(detect_visualization_mode("imor", Some("cual es el imor de invex")), None);
    }

    #[test]
    fn summary_stats_classifies_lower_is_better_improvement() {
        let rows = vec![
            MetricRow { fecha: "2026-01-01".into(), banco: "INVEX".into(), value: 5.0 },
            MetricRow { fecha: "2026-02-01".into(), banco: "INVEX".into(), value: 3.0 },
        ];
        let stats = summary_stats_for(&rows, Some(BetterDirection::Lower));
        assert_eq!(stats.trend.as_deref(), Some("improving"));
    }

    #[test]
    fn summary_stats_classifies_higher_is_better_worsening() {
        let rows = vec![
            MetricRow { fecha: "2026-01-01".into(), banco: "INVEX".into(), value: 5.0 },
            MetricRow { fecha: "2026-02-01".into(), banco: "INVEX".into(), value: 3.0 },
        ];
        let stats = summary_stats_for(&rows, Some(BetterDirection::Higher));
        assert_eq!(stats.trend.as_deref(), Some("worsening"));
    }
}
