//! Chat session/message/artifact lifecycle (C9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ChatSessionRow {
    pub id: String,
    pub owner_user_id: i64,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ChatMessageRow {
    pub id: String,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub file_ids_json: String,
    pub metadata_json: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub file_ids: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<ChatMessageRow> for ChatMessage {
    fn from(row: ChatMessageRow) -> Self {
        let role = match row.role.as_str() {
            "assistant" => MessageRole::Assistant,
            "system" => MessageRole::System,
            _ => MessageRole::User,
        };
        Self {
            id: row.id,
            session_id: row.session_id,
            role,
            content: row.content,
            file_ids: serde_json::from_str(&row.file_ids_json).unwrap_or_default(),
            metadata: serde_json::from_str(&row.metadata_json).unwrap_or(serde_json::Value::Null),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    BankChart,
    Markdown,
    Code,
    Graph,
    AuditReport,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::BankChart => "bank_chart",
            ArtifactType::Markdown => "markdown",
            ArtifactType::Code => "code",
            ArtifactType::Graph => "graph",
            ArtifactType::AuditReport => "audit_report",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ArtifactVersion {
    pub version: i32,
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ArtifactRow {
    pub id: String,
    pub owner_user_id: i64,
    pub session_id: Option<String>,
    #[sqlx(rename = "artifact_type")]
    pub artifact_type: String,
    pub title: String,
    pub versions_json: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Artifact {
    pub id: String,
    pub owner_user_id: i64,
    pub session_id: Option<String>,
    pub artifact_type: ArtifactType,
    pub title: String,
    pub versions: Vec<ArtifactVersion>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Artifact {
    pub fn latest_content(&self) -> Option<&serde_json::Value> {
        self.versions.last().map(|v| &v.content)
    }
}

impl From<ArtifactRow> for Artifact {
    fn from(row: ArtifactRow) -> Self {
        let artifact_type = match row.artifact_type.as_str() {
            "markdown" => ArtifactType::Markdown,
            "code" => ArtifactType::Code,
            "graph" => ArtifactType::Graph,
            "audit_report" => ArtifactType::AuditReport,
            _ => ArtifactType::BankChart,
        };
        Self {
            id: row.id,
            owner_user_id: row.owner_user_id,
            session_id: row.session_id,
            artifact_type,
            title: row.title,
            versions: serde_json::from_str(&row.versions_json).unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
