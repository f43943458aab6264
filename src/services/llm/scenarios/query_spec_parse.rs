//! Query spec parsing scenario (C4) — LLM fallback when the heuristic parser
//! can't confidently resolve a natural-language banking question.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::QuerySpec;
use crate::services::llm::models::LLMScenario;
use crate::services::llm::service::{LLMAnalysisRequestTrait, LLMAnalysisResponseTrait};

const SYSTEM_PROMPT: &str = r#"You translate natural-language questions about Peruvian bank
financial indicators into a structured QuerySpec JSON object. Only use metric names and bank
names from the lists provided in the request; never invent one. If the question is ambiguous
(missing metric, missing bank when comparison is implied, unresolvable relative time range),
set requires_clarification=true and list the missing fields in missing_fields.

Respond with a single JSON object matching this shape exactly:
{
  "metric": string,
  "bank_names": string[],
  "time_range": {"type": "last_n_months"|"last_n_quarters"|"year"|"between_dates"|"all", ...},
  "granularity": "month"|"quarter"|"year",
  "visualization_type": "line"|"bar"|"table",
  "comparison_mode": bool,
  "ranking_mode": bool,
  "top_n": number|null,
  "requires_clarification": bool,
  "missing_fields": string[],
  "confidence_score": number
}"#;

#[derive(Debug, Clone, Serialize)]
pub struct QuerySpecParseRequest {
    pub nl_query: String,
    pub today: String,
    pub known_metrics: Vec<String>,
    pub known_banks: Vec<String>,
}

impl LLMAnalysisRequestTrait for QuerySpecParseRequest {
    fn scenario(&self) -> LLMScenario {
        LLMScenario::QuerySpecParse
    }

    fn system_prompt(&self) -> String {
        SYSTEM_PROMPT.to_string()
    }

    fn cache_key(&self) -> String {
        format!("query_spec_parse:{:x}", Sha256::digest(self.nl_query.trim().to_lowercase()))
    }

    fn context_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.nl_query.as_bytes());
        hasher.update(self.today.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySpecParseResponse {
    #[serde(flatten)]
    pub spec: QuerySpec,
}

impl LLMAnalysisResponseTrait for QuerySpecParseResponse {
    fn summary(&self) -> &str {
        &self.spec.metric
    }

    fn confidence(&self) -> Option<f64> {
        Some(self.spec.confidence_score)
    }
}
