pub mod analytics_service;
pub mod chat_orchestrator;
pub mod document_service;
pub mod llm;
pub mod metric_registry;
pub mod query_spec_parser;
pub mod rag_context_service;
pub mod sql_generator;
pub mod sql_validator;
pub mod vector_store;
pub mod visualization_builder;

pub use analytics_service::{AnalyticsService, Intent};
pub use chat_orchestrator::{ChatEvent, ChatOrchestrator, ChatTurnRequest, ToolsEnabled, TurnHandle};
pub use document_service::{DocumentService, Embedder, HashEmbedder, PlainTextExtractor, TextExtractor};
pub use llm::{LLMAnalysisResult, LLMError, LLMService, LLMServiceImpl};
pub use query_spec_parser::QuerySpecParser;
pub use rag_context_service::RagContextService;
pub use sql_generator::SqlGenerator;
pub use vector_store::{InMemoryVectorStore, QdrantVectorStore, VectorStore};
