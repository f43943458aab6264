pub mod artifacts;
pub mod chat;
pub mod documents;
pub mod llm;
