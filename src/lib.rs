//! Bankwise Library
//!
//! Conversational banking analytics backend: translates natural-language
//! questions into validated SQL against a KPI warehouse, shapes the result
//! into chart-ready data, and narrates it back over a streamed chat turn.

use std::sync::Arc;

use sqlx::{PgPool, SqlitePool};

pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::llm::{LLMError, LLMService, LLMServiceImpl};
pub use services::{
    AnalyticsService, ChatOrchestrator, DocumentService, QuerySpecParser, RagContextService,
    SqlGenerator,
};

/// Application shared state.
///
/// Rust's type system is the DI container: every service is constructed once
/// in `main` and handed to handlers wrapped in `Arc` for cheap cloning.
/// `metric_registry`, `sql_validator`, and `visualization_builder` are pure
/// function modules (or a process-wide singleton) and need no state here.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub warehouse_db: PgPool,

    pub llm_service: Arc<LLMServiceImpl>,
    pub rag_context_service: Arc<RagContextService>,
    pub query_spec_parser: Arc<QuerySpecParser>,
    pub sql_generator: Arc<SqlGenerator>,
    pub analytics_service: Arc<AnalyticsService>,
    pub document_service: Arc<DocumentService>,
    pub chat_orchestrator: Arc<ChatOrchestrator>,

    pub jwt_secret: Arc<str>,
}
