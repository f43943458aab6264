//! Metric Registry (C1) — the column whitelist and NLP topic map every other
//! component trusts instead of touching the warehouse schema directly.
//!
//! Ported from the original implementation's `TOPIC_MAP`, `PRIORITY_METRICS`,
//! and `SAFE_METRIC_COLUMNS` static tables (`analytics_service.py`,
//! `query_spec_parser.py`). Constructed once as a process-wide singleton since
//! the tables are static and never mutate at runtime.

use std::sync::OnceLock;

use crate::models::metric::{BetterDirection, MetricDescriptor, MetricType};
use crate::utils::error::{ApiError, ApiResult};

static REGISTRY: OnceLock<MetricRegistry> = OnceLock::new();

pub fn registry() -> &'static MetricRegistry {
    REGISTRY.get_or_init(MetricRegistry::bootstrap)
}

/// In-memory metric descriptor table plus the topic map used for resolving
/// free-form phrases to canonical metric names.
pub struct MetricRegistry {
    descriptors: Vec<MetricDescriptor>,
    /// phrase -> canonical name, for exact and substring matching. Longer
    /// phrases are matched first so "activo total" wins over "activo".
    topic_map: Vec<(String, String)>,
    /// tokens that should never be matched as part of a bank name
    bank_tokens: Vec<String>,
}

impl MetricRegistry {
    fn bootstrap() -> Self {
        let descriptors = vec![
            MetricDescriptor {
                name: "IMOR".into(),
                column: "imor".into(),
                metric_type: MetricType::Percentage,
                better_direction: BetterDirection::Lower,
                display_name: "Índice de Morosidad".into(),
                aliases: vec!["imor".into(), "morosidad".into(), "indice de morosidad".into()],
            },
            MetricDescriptor {
                name: "ICOR".into(),
                column: "icor".into(),
                metric_type: MetricType::Percentage,
                better_direction: BetterDirection::Higher,
                display_name: "Índice de Cobertura".into(),
                aliases: vec!["icor".into(), "cobertura".into(), "indice de cobertura".into()],
            },
            MetricDescriptor {
                name: "ROE".into(),
                column: "roe".into(),
                metric_type: MetricType::Percentage,
                better_direction: BetterDirection::Higher,
                display_name: "Retorno sobre Capital".into(),
                aliases: vec!["roe".into(), "retorno sobre capital".into()],
            },
            MetricDescriptor {
                name: "ROA".into(),
                column: "roa".into(),
                metric_type: MetricType::Percentage,
                better_direction: BetterDirection::Higher,
                display_name: "Retorno sobre Activos".into(),
                aliases: vec!["roa".into(), "retorno sobre activos".into()],
            },
            MetricDescriptor {
                name: "ACTIVO_TOTAL".into(),
                column: "activo_total".into(),
                metric_type: MetricType::CurrencyMdp,
                better_direction: BetterDirection::Higher,
                display_name: "Activo Total".into(),
                aliases: vec!["activo total".into(), "activos totales".into(), "activo".into()],
            },
            MetricDescriptor {
                name: "CARTERA_TOTAL".into(),
                column: "cartera_total".into(),
                metric_type: MetricType::CurrencyMdp,
                better_direction: BetterDirection::Higher,
                display_name: "Cartera Total".into(),
                aliases: vec!["cartera total".into(), "cartera de credito".into(), "cartera".into()],
            },
            MetricDescriptor {
                name: "CAPTACION_TOTAL".into(),
                column: "captacion_total".into(),
                metric_type: MetricType::CurrencyMdp,
                better_direction: BetterDirection::Higher,
                display_name: "Captación Total".into(),
                aliases: vec!["captacion total".into(), "captacion".into(), "depositos".into()],
            },
            MetricDescriptor {
                name: "MARGEN_FINANCIERO".into(),
                column: "margen_financiero".into(),
                metric_type: MetricType::CurrencyMdp,
                better_direction: BetterDirection::Higher,
                display_name: "Margen Financiero".into(),
                aliases: vec!["margen financiero".into(), "margen".into()],
            },
            MetricDescriptor {
                name: "IFRS9_STAGE1_VARIACION_MM".into(),
                column: "ifrs9_stage1_variacion_mm".into(),
                metric_type: MetricType::Ratio,
                better_direction: BetterDirection::Neutral,
                display_name: "Variación Mensual IFRS9 Etapa 1".into(),
                aliases: vec!["variacion ifrs9 etapa 1".into(), "ifrs9 stage 1".into()],
            },
            MetricDescriptor {
                name: "NUMERO_CLIENTES".into(),
                column: "numero_clientes".into(),
                metric_type: MetricType::Count,
                better_direction: BetterDirection::Higher,
                display_name: "Número de Clientes".into(),
                aliases: vec!["numero de clientes".into(), "clientes".into()],
            },
        ];

        let mut topic_map: Vec<(String, String)> = descriptors
            .iter()
            .flat_map(|d| d.aliases.iter().map(move |a| (a.clone(), d.name.clone())))
            .collect();
        // longest phrase first so substring matching prefers specific phrases
        topic_map.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        let bank_tokens = vec![
            "invex".into(),
            "banorte".into(),
            "sistema".into(),
            "mercado".into(),
            "promedio".into(),
            "bbva".into(),
            "santander".into(),
            "banamex".into(),
            "citibanamex".into(),
            "hsbc".into(),
            "scotiabank".into(),
        ];

        Self { descriptors, topic_map, bank_tokens }
    }

    /// (1) exact key lookup, (2) whole-word priority match, (3) longest
    /// substring match skipping bank-token-only keys, (4) bounded fuzzy
    /// match (similarity >= 0.6, inputs < 30 chars only).
    pub fn resolve(&self, user_phrase: &str) -> Option<String> {
        let normalized = normalize(user_phrase);
        if normalized.is_empty() {
            return None;
        }

        if let Some((_, canonical)) = self.topic_map.iter().find(|(phrase, _)| *phrase == normalized) {
            return Some(canonical.clone());
        }

        let words: Vec<&str> = normalized.split_whitespace().collect();
        for (phrase, canonical) in &self.topic_map {
            if phrase.split_whitespace().count() == 1 && words.contains(&phrase.as_str()) {
                return Some(canonical.clone());
            }
        }

        for (phrase, canonical) in &self.topic_map {
            if self.bank_tokens.iter().any(|bt| phrase == bt) {
                continue;
            }
            if normalized.contains(phrase.as_str()) {
                return Some(canonical.clone());
            }
        }

        if normalized.len() < 30 {
            let mut best: Option<(&str, f64)> = None;
            for (phrase, canonical) in &self.topic_map {
                let sim = strsim::jaro_winkler(&normalized, phrase);
                if sim >= 0.6 && best.map(|(_, s)| sim > s).unwrap_or(true) {
                    best = Some((canonical.as_str(), sim));
                }
            }
            return best.map(|(c, _)| c.to_string());
        }

        None
    }

    pub fn descriptor(&self, canonical_name: &str) -> Option<&MetricDescriptor> {
        self.descriptors.iter().find(|d| d.name.eq_ignore_ascii_case(canonical_name))
    }

    /// Fails with `UnauthorizedMetric` if `canonical_name` is not whitelisted.
    /// Every column reaching SQL synthesis must pass through here first.
    pub fn safe_column(&self, canonical_name: &str) -> ApiResult<String> {
        self.descriptor(canonical_name)
            .map(|d| d.column.clone())
            .ok_or_else(|| {
                tracing::warn!(metric = canonical_name, "metric escaped whitelist lookup");
                ApiError::unauthorized_metric(canonical_name)
            })
    }

    pub fn display(&self, canonical_name: &str) -> Option<&str> {
        self.descriptor(canonical_name).map(|d| d.display_name.as_str())
    }

    pub fn better_direction(&self, canonical_name: &str) -> Option<BetterDirection> {
        self.descriptor(canonical_name).map(|d| d.better_direction)
    }

    pub fn is_ratio(&self, canonical_name: &str) -> bool {
        self.descriptor(canonical_name).map(|d| d.is_ratio()).unwrap_or(false)
    }

    /// All whitelisted physical columns, lowercased. Used by C2's whitelist check.
    pub fn whitelisted_columns(&self) -> Vec<String> {
        self.descriptors.iter().map(|d| d.column.to_lowercase()).collect()
    }

    pub fn all_canonical_names(&self) -> Vec<String> {
        self.descriptors.iter().map(|d| d.name.clone()).collect()
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_exact_alias() {
        assert_eq!(registry().resolve("imor"), Some("IMOR".to_string()));
    }

    #[test]
    fn resolves_substring_phrase() {
        assert_eq!(registry().resolve("cual es el imor de invex"), Some("IMOR".to_string()));
    }

    #[test]
    fn resolves_fuzzy_typo() {
        assert_eq!(registry().resolve("imro"), Some("IMOR".to_string()));
    }

    #[test]
    fn returns_none_for_unknown_phrase() {
        assert_eq!(registry().resolve("xyzzy plugh quux"), None);
    }

    #[test]
    fn safe_column_rejects_unwhitelisted_name() {
        assert!(registry().safe_column("DROP TABLE").is_err());
    }

    #[test]
    fn safe_column_resolves_known_metric() {
        assert_eq!(registry().safe_column("IMOR").unwrap(), "imor");
    }
}
