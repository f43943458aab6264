//! Query Spec Parser (C4) — NL question to structured `QuerySpec`, LLM-first
//! with a deterministic regex/alias fallback. Deterministic given identical
//! (query, hints, LLM response) — §8 invariant 8.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use crate::models::metric::TimeRange;
use crate::models::query_spec::{Granularity, QuerySpec, VisualizationType};
use crate::services::llm::{LLMServiceImpl, QuerySpecParseRequest, QuerySpecParseResponse};
use crate::services::metric_registry;

const MIN_LLM_CONFIDENCE: f64 = 0.6;

static LAST_N_MONTHS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)ultimos?\s+(\d+)\s+mes").unwrap());
static LAST_N_QUARTERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)ultimos?\s+(\d+)\s+trimestre").unwrap());
static YEAR_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(20\d{2})\b").unwrap());
static BETWEEN_DATES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)desde\s+(\d{4}-\d{2}-\d{2})\s+hasta\s+(\d{4}-\d{2}-\d{2})").unwrap());

const BANK_ALIASES: &[(&str, &str)] = &[
    ("invex", "INVEX"),
    ("bbva", "BBVA"),
    ("santander", "SANTANDER"),
    ("banamex", "BANAMEX"),
    ("citibanamex", "BANAMEX"),
    ("hsbc", "HSBC"),
    ("scotiabank", "SCOTIABANK"),
    ("sistema", "SISTEMA"),
    ("mercado", "SISTEMA"),
    ("promedio", "SISTEMA"),
];

/// Bank names the warehouse does not carry data for. Recognized in the query
/// so the parser can ask for clarification by name instead of lumping them
/// in with genuinely unknown tokens.
const UNSUPPORTED_BANKS: &[(&str, &str)] = &[("banorte", "Banorte")];

pub struct QuerySpecParser {
    llm_service: Option<Arc<LLMServiceImpl>>,
}

impl QuerySpecParser {
    pub fn new(llm_service: Option<Arc<LLMServiceImpl>>) -> Self {
        Self { llm_service }
    }

    pub async fn parse(&self, query: &str, session_id: &str, today: &str) -> QuerySpec {
        if let Some(llm) = self.llm_service.clone() {
            if let Some(spec) = self.try_llm_parse(llm.as_ref(), query, session_id, today).await {
                return spec.normalize();
            }
        }
        self.heuristic_parse(query).normalize()
    }

    async fn try_llm_parse(
        &self,
        llm: &LLMServiceImpl,
        query: &str,
        session_id: &str,
        today: &str,
    ) -> Option<QuerySpec> {
        use crate::services::llm::LLMService;

        let request = QuerySpecParseRequest {
            nl_query: query.to_string(),
            today: today.to_string(),
            known_metrics: metric_registry::registry().all_canonical_names(),
            known_banks: BANK_ALIASES.iter().map(|(_, canonical)| canonical.to_string()).collect(),
        };

        let result =
            llm.analyze::<QuerySpecParseRequest, QuerySpecParseResponse>(&request, session_id, false).await;
        match result {
            Ok(analysis) if analysis.response.spec.confidence_score >= MIN_LLM_CONFIDENCE => {
                Some(analysis.response.spec)
            },
            Ok(_) => {
                tracing::debug!("LLM query-spec parse below confidence threshold, falling back");
                None
            },
            Err(e) => {
                tracing::warn!(error = %e, "LLM query-spec parse failed, falling back to heuristic");
                None
            },
        }
    }

    fn heuristic_parse(&self, query: &str) -> QuerySpec {
        let normalized = query.to_lowercase();
        let mut confidence = 1.0f64;
        let mut missing_fields = Vec::new();

        let metric = metric_registry::registry().resolve(&normalized);
        if metric.is_none() {
            confidence *= 0.5;
            missing_fields.push("metric".to_string());
        }
        let metric = metric.unwrap_or_default();

        let mut bank_names = Vec::new();
        for (alias, canonical) in BANK_ALIASES {
            if normalized.contains(alias) && !bank_names.contains(&canonical.to_string()) {
                bank_names.push(canonical.to_string());
            }
        }
        for (alias, display_name) in UNSUPPORTED_BANKS {
            if normalized.contains(alias) {
                confidence *= 0.3;
                missing_fields.push(format!("bank ({} not available)", display_name));
            }
        }

        let has_unsupported_bank = bank_tokens_in_query(&normalized).any(|t| {
            !BANK_ALIASES.iter().any(|(alias, _)| *alias == t)
        });
        if has_unsupported_bank {
            confidence *= 0.3;
            missing_fields.push("bank (unsupported)".to_string());
        }

        let ranking_mode = normalized.contains("ranking") || normalized.contains("ranking de bancos");
        let comparison_mode = bank_names.len() > 1 || normalized.contains("compar");

        let time_range = parse_time_range(&normalized);
        if time_range.is_none() && !ranking_mode {
            confidence *= 0.7;
            missing_fields.push("time_range".to_string());
        }
        let time_range = time_range.unwrap_or(TimeRange::All);

        let visualization_type = if normalized.contains("tabla") {
            VisualizationType::Table
        } else if time_range.is_bounded() || normalized.contains("evolucion") {
            VisualizationType::Line
        } else {
            VisualizationType::Bar
        };

        let requires_clarification = !missing_fields.is_empty();

        QuerySpec {
            metric,
            bank_names,
            time_range,
            granularity: Granularity::Month,
            visualization_type,
            comparison_mode,
            ranking_mode,
            top_n: if ranking_mode { Some(10) } else { None },
            requires_clarification,
            missing_fields,
            confidence_score: confidence,
        }
    }
}

fn bank_tokens_in_query(normalized: &str) -> impl Iterator<Item = &str> {
    const KNOWN_BANK_WORDS: &[&str] = &[
        "invex", "bbva", "santander", "banamex", "citibanamex", "hsbc", "scotiabank", "inbursa",
        "azteca", "afirme",
    ];
    normalized.split_whitespace().filter(move |w| {
        KNOWN_BANK_WORDS.contains(w) && !BANK_ALIASES.iter().any(|(alias, _)| alias == w)
    })
}

fn parse_time_range(normalized: &str) -> Option<TimeRange> {
    if let Some(caps) = LAST_N_MONTHS.captures(normalized) {
        let n: u32 = caps[1].parse().ok()?;
        return Some(TimeRange::LastNMonths { n });
    }
    if let Some(caps) = LAST_N_QUARTERS.captures(normalized) {
        let n: u32 = caps[1].parse().ok()?;
        return Some(TimeRange::LastNQuarters { n });
    }
    if let Some(caps) = BETWEEN_DATES.captures(normalized) {
        return Some(TimeRange::BetweenDates {
            start_date: caps[1].to_string(),
            end_date: caps[2].to_string(),
        });
    }
    if let Some(caps) = YEAR_REGEX.captures(normalized) {
        let year = &caps[1];
        return Some(TimeRange::Year {
            start_date: format!("{}-01-01", year),
            end_date: format!("{}-12-31", year),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_single_bank_with_time_range() {
        let parser = QuerySpecParser::new(None);
        let spec = parser.parse("IMOR de INVEX ultimos 3 meses", "s1", "2026-07-28").await;
        assert_eq!(spec.metric, "IMOR");
        assert_eq!(spec.bank_names, vec!["INVEX".to_string()]);
        assert_eq!(spec.time_range, TimeRange::LastNMonths { n: 3 });
        assert!(!spec.requires_clarification);
    }

    #[tokio::test]
    async fn flags_unsupported_bank_for_clarification() {
        let parser = QuerySpecParser::new(None);
        let spec = parser.parse("Compara ICOR de INVEX vs Banorte", "s1", "2026-07-28").await;
        assert!(spec.requires_clarification);
        assert!(spec.missing_fields.iter().any(|f| f == "bank (Banorte not available)"));
    }

    #[tokio::test]
    async fn flags_generically_unsupported_bank_for_clarification() {
        let parser = QuerySpecParser::new(None);
        let spec = parser.parse("Compara ICOR de INVEX vs Inbursa", "s1", "2026-07-28").await;
        assert!(spec.requires_clarification);
        assert!(spec.missing_fields.iter().any(|f| f.contains("bank")));
    }

    #[tokio::test]
    async fn detects_ranking_mode_with_default_top_n() {
        let parser = QuerySpecParser::new(None);
        let spec = parser.parse("ranking de bancos por activo total", "s1", "2026-07-28").await;
        assert!(spec.ranking_mode);
        assert_eq!(spec.top_n, Some(10));
    }

    #[tokio::test]
    async fn parser_is_deterministic() {
        let parser = QuerySpecParser::new(None);
        let a = parser.parse("IMOR de INVEX ultimos 3 meses", "s1", "2026-07-28").await;
        let b = parser.parse("IMOR de INVEX ultimos 3 meses", "s1", "2026-07-28").await;
        assert_eq!(a.metric, b.metric);
        assert_eq!(a.time_range, b.time_range);
        assert_eq!(a.confidence_score, b.confidence_score);
    }
}
