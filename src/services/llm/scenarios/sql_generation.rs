//! SQL generation scenario (C5) — LLM fallback when no template matches a
//! parsed `QuerySpec`. Still subject to C2 validation before use.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::query_spec::QuerySpec;
use crate::models::rag::RagContext;
use crate::services::llm::models::LLMScenario;
use crate::services::llm::service::{LLMAnalysisRequestTrait, LLMAnalysisResponseTrait};

const SYSTEM_PROMPT: &str = r#"You write a single read-only SQL SELECT statement against the
`monthly_kpis` warehouse table to answer a banking analytics question, given a structured query
spec and retrieved schema/metric context. Only reference columns present in the provided column
whitelist. Never emit DDL, DML, multiple statements, or comments. Always include a LIMIT unless
the statement aggregates with GROUP BY.

Respond with a single JSON object: {"sql": string}."#;

#[derive(Debug, Clone, Serialize)]
pub struct SqlGenerationRequest {
    pub spec: QuerySpec,
    pub context: RagContext,
}

impl LLMAnalysisRequestTrait for SqlGenerationRequest {
    fn scenario(&self) -> LLMScenario {
        LLMScenario::SqlGeneration
    }

    fn system_prompt(&self) -> String {
        SYSTEM_PROMPT.to_string()
    }

    fn cache_key(&self) -> String {
        let spec_json = serde_json::to_string(&self.spec).unwrap_or_default();
        format!("sql_generation:{:x}", Sha256::digest(spec_json.as_bytes()))
    }

    fn context_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_string(&self.spec).unwrap_or_default().as_bytes());
        hasher.update(self.context.available_columns.join(",").as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlGenerationResponse {
    pub sql: String,
}

impl LLMAnalysisResponseTrait for SqlGenerationResponse {
    fn summary(&self) -> &str {
        &self.sql
    }

    fn confidence(&self) -> Option<f64> {
        None
    }
}
