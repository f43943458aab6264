//! LLM Service Module
//!
//! Provides LLM-backed analysis capabilities used by the query-spec parser (C4),
//! the SQL generator's LLM fallback (C5), and the chat orchestrator's narrative
//! step (C9). LLM access itself is a generic capability; each caller supplies
//! its own request/response scenario.

mod client;
mod models;
mod repository;
mod scenarios;
mod service;

// Re-exports for external use
pub use models::*;
pub use scenarios::chat_narrative::{ChatNarrativeRequest, ChatNarrativeResponse, PLAIN_NARRATIVE_SYSTEM_PROMPT};
pub use scenarios::query_spec_parse::{QuerySpecParseRequest, QuerySpecParseResponse};
pub use scenarios::sql_generation::{SqlGenerationRequest, SqlGenerationResponse};
pub use service::{LLMAnalysisResult, LLMService, LLMServiceImpl};

#[allow(unused_imports)]
pub(crate) use client::LLMClient;
#[allow(unused_imports)]
pub(crate) use repository::LLMRepository;
#[allow(unused_imports)]
pub(crate) use service::{LLMAnalysisRequestTrait, LLMAnalysisResponseTrait};
