//! RAG context bundle (C3 output) and the C5/C2 result types that consume it.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MetricDefinitionEntry {
    pub metric_name: String,
    pub formula: String,
    #[serde(default)]
    pub columns_required: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub preferred_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SchemaSnippet {
    pub table: String,
    pub column: String,
    #[serde(default)]
    pub data_type: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExampleSource {
    Learned,
    Static,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExampleQuery {
    pub nl_query: String,
    pub sql_template: String,
    #[serde(default)]
    pub source: Option<ExampleSource>,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RagContext {
    #[serde(default)]
    pub metric_definitions: Vec<MetricDefinitionEntry>,
    #[serde(default)]
    pub schema_snippets: Vec<SchemaSnippet>,
    #[serde(default)]
    pub example_queries: Vec<ExampleQuery>,
    #[serde(default)]
    pub available_columns: Vec<String>,
}

impl RagContext {
    pub fn has_column(&self, column_name: &str) -> bool {
        self.available_columns.iter().any(|c| c.eq_ignore_ascii_case(column_name))
    }

    pub fn get_metric_definition(&self, metric_name: &str) -> Option<&MetricDefinitionEntry> {
        self.metric_definitions
            .iter()
            .find(|d| d.metric_name.eq_ignore_ascii_case(metric_name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SqlGenerationErrorCode {
    AmbiguousSpec,
    UnsupportedMetric,
    ValidationFailed,
    LlmValidationFailed,
    GenerationFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SqlGenerationResult {
    pub success: bool,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub error_code: Option<SqlGenerationErrorCode>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub used_template: bool,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl SqlGenerationResult {
    pub fn failure(code: SqlGenerationErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            sql: None,
            error_code: Some(code),
            error_message: Some(message.into()),
            used_template: false,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn success_template(sql: String, template: &str) -> Self {
        Self {
            success: true,
            sql: Some(sql),
            error_code: None,
            error_message: None,
            used_template: true,
            metadata: serde_json::json!({ "template": template }),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub sanitized_sql: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}
