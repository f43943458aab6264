//! Document lifecycle (C8) — ingest, extraction status, and the vector chunk payload shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Uploading,
    Processing,
    Ready,
    Failed,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStatus::Uploading => "uploading",
            ExtractionStatus::Processing => "processing",
            ExtractionStatus::Ready => "ready",
            ExtractionStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "processing" => ExtractionStatus::Processing,
            "ready" => ExtractionStatus::Ready,
            "failed" => ExtractionStatus::Failed,
            _ => ExtractionStatus::Uploading,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PageContent {
    pub page: i32,
    pub text: String,
    #[serde(default)]
    pub has_table: bool,
    #[serde(default)]
    pub image_refs: Vec<String>,
}

/// A document row as persisted in the application-state store.
///
/// `pages_json` holds a serialized `Vec<PageContent>`; kept as JSON text rather than a
/// child table because the sqlite-backed state store never queries into page contents —
/// only the vector store (Qdrant-shaped) does, via `VectorChunk` payloads.
#[derive(Debug, Clone, FromRow)]
pub struct DocumentRow {
    pub id: String,
    pub owner_user_id: i64,
    pub session_id: Option<String>,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub status: String,
    pub content_hash: String,
    pub pages_json: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Document {
    pub id: String,
    pub owner_user_id: i64,
    pub session_id: Option<String>,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub status: ExtractionStatus,
    pub content_hash: String,
    pub pages: Vec<PageContent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        let pages = serde_json::from_str(&row.pages_json).unwrap_or_default();
        Self {
            id: row.id,
            owner_user_id: row.owner_user_id,
            session_id: row.session_id,
            filename: row.filename,
            content_type: row.content_type,
            size_bytes: row.size_bytes,
            status: ExtractionStatus::from_str(&row.status),
            content_hash: row.content_hash,
            pages,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Payload stored alongside a vector in the document-chunk collection.
///
/// Invariant: `session_id` is mandatory and every search MUST filter on it (C8 §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorChunkPayload {
    pub session_id: String,
    pub document_id: String,
    pub chunk_id: i64,
    pub text: String,
    pub page: i32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct DocumentHit {
    pub payload: VectorChunkPayload,
    pub score: f32,
}
