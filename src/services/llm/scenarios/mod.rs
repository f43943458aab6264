//! LLM Analysis Scenarios
//!
//! Each scenario implements LLMAnalysisRequestTrait and LLMAnalysisResponseTrait.

pub mod chat_narrative;
pub mod query_spec_parse;
pub mod sql_generation;
