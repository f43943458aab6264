//! Chat narrative scenario (C9) — turns an `AnalyticsResult` into the
//! streamed natural-language answer shown alongside a chart artifact.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::services::llm::models::LLMScenario;
use crate::services::llm::service::{LLMAnalysisRequestTrait, LLMAnalysisResponseTrait};

const SYSTEM_PROMPT: &str = r#"You are a banking analytics assistant. Given the user's question
and a JSON summary of the analytics result already computed for them, write a concise narrative
answer in the same language as the question. Reference concrete numbers from the summary. Do not
invent data not present in the summary. If the result type is "empty" or "error", explain that
plainly and suggest a rephrasing. Keep the answer under 200 words unless asked for detail.

Respond with a single JSON object: {"narrative": string, "confidence": number}."#;

/// System prompt for turns with no tool/RAG context, used with the plain-text
/// streaming path (`LLMServiceImpl::stream_narrative_deltas`) rather than the
/// JSON-object contract above, since there is no structured summary to wrap.
pub const PLAIN_NARRATIVE_SYSTEM_PROMPT: &str = "You are a banking analytics assistant having a \
direct conversation with the user. Answer their question conversationally, in the same language \
they used. Keep the answer under 200 words unless asked for detail.";

#[derive(Debug, Clone, Serialize)]
pub struct ChatNarrativeRequest {
    pub user_question: String,
    pub analytics_summary_json: String,
    pub conversation_context: Vec<String>,
}

impl LLMAnalysisRequestTrait for ChatNarrativeRequest {
    fn scenario(&self) -> LLMScenario {
        LLMScenario::ChatNarrative
    }

    fn system_prompt(&self) -> String {
        SYSTEM_PROMPT.to_string()
    }

    fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.user_question.trim().to_lowercase().as_bytes());
        hasher.update(self.analytics_summary_json.as_bytes());
        format!("chat_narrative:{:x}", hasher.finalize())
    }

    fn context_hash(&self) -> String {
        format!("{:x}", Sha256::digest(self.analytics_summary_json.as_bytes()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatNarrativeResponse {
    pub narrative: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl LLMAnalysisResponseTrait for ChatNarrativeResponse {
    fn summary(&self) -> &str {
        &self.narrative
    }

    fn confidence(&self) -> Option<f64> {
        self.confidence
    }
}
