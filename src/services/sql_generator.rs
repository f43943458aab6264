//! SQL Generator (C5) — template-first, LLM-fallback SQL synthesis from a
//! `QuerySpec` and a `RagContext`. Every branch, templated or LLM-produced,
//! is validated by C2 before it is ever returned; a validator rejection is a
//! `generation_failed` result, never partial SQL.

use std::sync::Arc;

use crate::models::metric::TimeRange;
use crate::models::query_spec::QuerySpec;
use crate::models::rag::{RagContext, SqlGenerationErrorCode, SqlGenerationResult};
use crate::services::llm::{LLMServiceImpl, SqlGenerationRequest, SqlGenerationResponse};
use crate::services::metric_registry;
use crate::services::sql_validator;

const MAX_LIMIT: u32 = 1000;
const DEFAULT_RANKING_TOP_N: u32 = 10;

pub struct SqlGenerator {
    llm_service: Option<Arc<LLMServiceImpl>>,
}

impl SqlGenerator {
    pub fn new(llm_service: Option<Arc<LLMServiceImpl>>) -> Self {
        Self { llm_service }
    }

    pub async fn build_sql_from_spec(&self, spec: &QuerySpec, ctx: &RagContext) -> SqlGenerationResult {
        if !spec.is_complete() {
            return SqlGenerationResult::failure(
                SqlGenerationErrorCode::AmbiguousSpec,
                "query spec is incomplete or requires clarification",
            );
        }

        let column = match resolve_metric_column(spec, ctx) {
            Some(c) => c,
            None => {
                return SqlGenerationResult::failure(
                    SqlGenerationErrorCode::UnsupportedMetric,
                    format!("no whitelisted column for metric '{}'", spec.metric),
                );
            },
        };

        let templated = if spec.ranking_mode {
            Some(ranking_sql(&column, spec))
        } else if spec.comparison_mode && spec.bank_names.len() > 1 {
            Some(comparison_sql(&column, spec))
        } else if spec.time_range.is_bounded() {
            Some(time_series_sql(&column, spec))
        } else if matches!(spec.time_range, TimeRange::All) && !spec.comparison_mode {
            Some(aggregate_sql(&column, spec))
        } else {
            None
        };

        let (sql, used_template) = match templated {
            Some(sql) => (sql, true),
            None => match self.llm_fallback(spec, ctx).await {
                Some(sql) => (sql, false),
                None => {
                    return SqlGenerationResult::failure(
                        SqlGenerationErrorCode::GenerationFailed,
                        "no template matched and no LLM fallback is available",
                    );
                },
            },
        };

        let validation = sql_validator::validate(&sql);
        if !validation.valid {
            return SqlGenerationResult::failure(
                if used_template {
                    SqlGenerationErrorCode::ValidationFailed
                } else {
                    SqlGenerationErrorCode::LlmValidationFailed
                },
                validation.error_message.unwrap_or_else(|| "SQL rejected by validator".to_string()),
            );
        }

        let sanitized = validation.sanitized_sql.unwrap_or(sql);
        let mut result = if used_template {
            SqlGenerationResult::success_template(sanitized, template_name(spec))
        } else {
            SqlGenerationResult {
                success: true,
                sql: Some(sanitized),
                error_code: None,
                error_message: None,
                used_template: false,
                metadata: serde_json::json!({ "template": "llm_fallback" }),
            }
        };
        if !validation.warnings.is_empty() {
            result.metadata["warnings"] = serde_json::json!(validation.warnings);
        }
        result
    }

    async fn llm_fallback(&self, spec: &QuerySpec, ctx: &RagContext) -> Option<String> {
        use crate::services::llm::LLMService;

        let llm = self.llm_service.as_ref()?;
        let request = SqlGenerationRequest { spec: spec.clone(), context: ctx.clone() };
        let query_id = format!("sqlgen:{}", spec.metric);
        match llm.analyze::<SqlGenerationRequest, SqlGenerationResponse>(&request, &query_id, false).await {
            Ok(analysis) => Some(analysis.response.sql),
            Err(e) => {
                tracing::warn!(error = %e, "LLM SQL fallback failed");
                None
            },
        }
    }
}

fn resolve_metric_column(spec: &QuerySpec, ctx: &RagContext) -> Option<String> {
    let registry = metric_registry::registry();
    if let Ok(column) = registry.safe_column(&spec.metric) {
        return Some(column);
    }

    let metric_lower = spec.metric.to_lowercase();
    if let Some(prefix_match) =
        registry.whitelisted_columns().into_iter().find(|c| c.starts_with(&metric_lower))
    {
        return Some(prefix_match);
    }

    ctx.get_metric_definition(&spec.metric)
        .and_then(|def| def.preferred_columns.first())
        .cloned()
}

fn bank_filter(spec: &QuerySpec) -> String {
    if spec.bank_names.is_empty() {
        String::new()
    } else if spec.bank_names.len() == 1 {
        format!("banco_norm = '{}'", spec.bank_names[0])
    } else {
        let list = spec.bank_names.iter().map(|b| format!("'{}'", b)).collect::<Vec<_>>().join(", ");
        format!("banco_norm IN ({})", list)
    }
}

fn time_filter(spec: &QuerySpec) -> String {
    match &spec.time_range {
        TimeRange::LastNMonths { n } => format!("fecha >= (CURRENT_DATE - INTERVAL '{} months')", n),
        TimeRange::LastNQuarters { n } => format!("fecha >= (CURRENT_DATE - INTERVAL '{} months')", n * 3),
        TimeRange::Year { start_date, end_date } | TimeRange::BetweenDates { start_date, end_date } => {
            format!("fecha BETWEEN '{}' AND '{}'", start_date, end_date)
        },
        TimeRange::All => String::new(),
    }
}

fn ranking_sql(column: &str, spec: &QuerySpec) -> String {
    let top_n = spec.top_n.unwrap_or(DEFAULT_RANKING_TOP_N).min(MAX_LIMIT);
    let tf = time_filter(spec);
    let where_clause =
        if tf.is_empty() { format!("{} IS NOT NULL", column) } else { format!("{} AND {} IS NOT NULL", tf, column) };
    format!(
        "SELECT banco_norm as banco, AVG({col}) as promedio, MAX({col}) as max, MIN({col}) as min, COUNT(*) as count \
         FROM monthly_kpis WHERE {where_clause} GROUP BY banco_norm ORDER BY promedio DESC LIMIT {top_n}",
        col = column,
        where_clause = where_clause,
        top_n = top_n,
    )
}

fn comparison_sql(column: &str, spec: &QuerySpec) -> String {
    let bf = bank_filter(spec);
    let tf = time_filter(spec);
    let where_clause = match (bf.is_empty(), tf.is_empty()) {
        (false, false) => format!("{} AND {}", bf, tf),
        (false, true) => bf,
        (true, false) => tf,
        (true, true) => "1 = 1".to_string(),
    };
    format!(
        "SELECT banco_norm as banco, fecha, {col} FROM monthly_kpis WHERE {where_clause} \
         ORDER BY fecha ASC, banco_norm ASC LIMIT {limit}",
        col = column,
        where_clause = where_clause,
        limit = MAX_LIMIT,
    )
}

fn time_series_sql(column: &str, spec: &QuerySpec) -> String {
    let bf = bank_filter(spec);
    let tf = time_filter(spec);
    let where_clause = match (bf.is_empty(), tf.is_empty()) {
        (false, false) => format!("{} AND {}", bf, tf),
        (false, true) => bf,
        (true, false) => tf,
        (true, true) => "1 = 1".to_string(),
    };
    format!(
        "SELECT banco_norm as banco, fecha, {col} FROM monthly_kpis WHERE {where_clause} \
         ORDER BY fecha ASC LIMIT {limit}",
        col = column,
        where_clause = where_clause,
        limit = MAX_LIMIT,
    )
}

fn aggregate_sql(column: &str, spec: &QuerySpec) -> String {
    let bf = bank_filter(spec);
    let where_clause = if bf.is_empty() { "1 = 1".to_string() } else { bf };
    format!(
        "SELECT banco_norm as banco, AVG({col}) as promedio, MAX({col}) as max, MIN({col}) as min, COUNT(*) as count \
         FROM monthly_kpis WHERE {where_clause} GROUP BY banco_norm",
        col = column,
        where_clause = where_clause,
    )
}

fn template_name(spec: &QuerySpec) -> &'static str {
    if spec.ranking_mode {
        "ranking"
    } else if spec.comparison_mode && spec.bank_names.len() > 1 {
        "comparison"
    } else if spec.time_range.is_bounded() {
        "time_series"
    } else {
        "aggregate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::query_spec::{Granularity, VisualizationType};

    fn base_spec() -> QuerySpec {
        QuerySpec {
            metric: "IMOR".into(),
            bank_names: vec!["INVEX".into()],
            time_range: TimeRange::LastNMonths { n: 3 },
            granularity: Granularity::Month,
            visualization_type: VisualizationType::Line,
            comparison_mode: false,
            ranking_mode: false,
            top_n: None,
            requires_clarification: false,
            missing_fields: vec![],
            confidence_score: 1.0,
        }
    }

    #[tokio::test]
    async fn rejects_incomplete_spec_as_ambiguous() {
        let generator = SqlGenerator::new(None);
        let mut spec = base_spec();
        spec.requires_clarification = true;
        let result = generator.build_sql_from_spec(&spec, &RagContext::default()).await;
        assert!(!result.success);
        assert_eq!(result.error_code, Some(SqlGenerationErrorCode::AmbiguousSpec));
    }

    #[tokio::test]
    async fn rejects_unsupported_metric() {
        let generator = SqlGenerator::new(None);
        let mut spec = base_spec();
        spec.metric = "NOT_A_METRIC".into();
        let result = generator.build_sql_from_spec(&spec, &RagContext::default()).await;
        assert!(!result.success);
        assert_eq!(result.error_code, Some(SqlGenerationErrorCode::UnsupportedMetric));
    }

    #[tokio::test]
    async fn generates_validated_time_series_sql() {
        let generator = SqlGenerator::new(None);
        let spec = base_spec();
        let result = generator.build_sql_from_spec(&spec, &RagContext::default()).await;
        assert!(result.success);
        assert!(result.used_template);
        let sql = result.sql.unwrap();
        assert!(sql.contains("imor"));
        assert!(sql.contains("INTERVAL '3 months'"));
        assert!(sql.to_uppercase().contains("LIMIT"));
    }

    #[tokio::test]
    async fn ranking_defaults_to_top_10() {
        let generator = SqlGenerator::new(None);
        let mut spec = base_spec();
        spec.ranking_mode = true;
        spec.time_range = TimeRange::All;
        let result = generator.build_sql_from_spec(&spec, &RagContext::default()).await;
        assert!(result.success);
        assert!(result.sql.unwrap().contains("LIMIT 10"));
    }

    #[tokio::test]
    async fn generation_fails_without_template_or_llm() {
        let generator = SqlGenerator::new(None);
        let mut spec = base_spec();
        spec.time_range = TimeRange::All;
        spec.comparison_mode = true;
        spec.bank_names = vec!["INVEX".into()];
        let result = generator.build_sql_from_spec(&spec, &RagContext::default()).await;
        assert!(!result.success);
        assert_eq!(result.error_code, Some(SqlGenerationErrorCode::GenerationFailed));
    }

    #[tokio::test]
    async fn aggregate_template_used_when_no_comparison_or_time_bound() {
        let generator = SqlGenerator::new(None);
        let mut spec = base_spec();
        spec.time_range = TimeRange::All;
        let result = generator.build_sql_from_spec(&spec, &RagContext::default()).await;
        assert!(result.success);
        assert_eq!(result.metadata["template"], serde_json::json!("aggregate"));
    }
}
