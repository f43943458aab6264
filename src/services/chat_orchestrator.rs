//! Chat Orchestrator (C9) — coordinates one user turn end to end: session
//! resolution, document context, the banking-analytics tool pipeline
//! (C4→C3→C5→C6→C7), narrative streaming, and persistence.
//!
//! Ported from the original implementation's `BankAnalyticsOrchestrator`
//! (`core/orchestrator.py`), generalized from a single-tool workflow into a
//! multi-tool chat turn with SSE streaming. The bounded producer/consumer
//! channel and cancel-on-drop idiom mirror the teacher's spawn/shutdown
//! pattern for background tasks, adapted from periodic-task cancellation
//! to turn-scoped cancellation.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::Utc;
use futures_core::Stream;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::chat::{ArtifactRow, ArtifactType, ChatMessageRow, MessageRole};
use crate::models::analytics::AnalyticsResultType;
use crate::services::analytics_service::{AnalyticsService, Intent};
use crate::services::document_service::DocumentService;
use crate::services::llm::{
    ChatNarrativeRequest, ChatNarrativeResponse, LLMServiceImpl, PLAIN_NARRATIVE_SYSTEM_PROMPT,
};
use crate::services::query_spec_parser::QuerySpecParser;
use crate::services::rag_context_service::RagContextService;
use crate::services::sql_generator::SqlGenerator;
use crate::services::visualization_builder;
use crate::utils::error::{ApiError, ApiResult};

const DOC_CONTEXT_TOP_K: usize = 3;
const DOC_CONTEXT_SCORE_THRESHOLD: f32 = 0.7;
const PER_DOC_CHAR_BUDGET: usize = 4000;
const TOTAL_CHAR_BUDGET: usize = 12000;
const MIN_MAX_TOKENS: u32 = 500;

const ANALYTICS_KEYWORDS: &[&str] = &[
    "imor", "icor", "roe", "roa", "cartera", "activo", "captacion", "margen financiero",
    "morosidad", "cobertura", "ranking", "compar", "evolucion", "ifrs9", "clientes",
];

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChatEvent {
    Meta { session_id: String, message_id: String },
    BankChart { result: serde_json::Value },
    BankClarification { missing_fields: Vec<String>, message: String },
    ArtifactCreated { artifact_id: String },
    Chunk { delta: String },
    Done { session_id: String, message_id: String },
    Error { code: i32, message: String },
}

pub struct ChatTurnRequest {
    pub owner_user_id: i64,
    pub session_id: Option<String>,
    pub content: String,
    pub file_ids: Vec<String>,
    pub tools_enabled: ToolsEnabled,
}

#[derive(Debug, Clone, Default)]
pub struct ToolsEnabled {
    pub banking_analytics: bool,
}

pub struct ChatOrchestrator {
    db: SqlitePool,
    query_spec_parser: Arc<QuerySpecParser>,
    rag_context_service: Arc<RagContextService>,
    sql_generator: Arc<SqlGenerator>,
    analytics_service: Arc<AnalyticsService>,
    document_service: Arc<DocumentService>,
    llm_service: Arc<LLMServiceImpl>,
    stream_queue_size: usize,
    max_tokens_ceiling: u32,
    turn_timeout: Duration,
}

impl ChatOrchestrator {
    pub fn new(
        db: SqlitePool,
        query_spec_parser: Arc<QuerySpecParser>,
        rag_context_service: Arc<RagContextService>,
        sql_generator: Arc<SqlGenerator>,
        analytics_service: Arc<AnalyticsService>,
        document_service: Arc<DocumentService>,
        llm_service: Arc<LLMServiceImpl>,
        stream_queue_size: usize,
        max_tokens_ceiling: u32,
        turn_timeout_secs: u64,
    ) -> Self {
        Self {
            db,
            query_spec_parser,
            rag_context_service,
            sql_generator,
            analytics_service,
            document_service,
            llm_service,
            stream_queue_size,
            max_tokens_ceiling,
            turn_timeout: Duration::from_secs(turn_timeout_secs),
        }
    }

    /// Spawns the turn's producer task and returns the bounded receiver side
    /// of the event stream. Dropping the returned handle aborts the producer.
    pub fn run_turn(self: Arc<Self>, request: ChatTurnRequest) -> TurnHandle {
        let (tx, rx) = mpsc::channel(self.stream_queue_size);
        let orchestrator = self.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = tokio::time::timeout(orchestrator.turn_timeout, orchestrator.drive_turn(request, &tx))
                .await
                .unwrap_or_else(|_| Err(ApiError::timeout("chat turn exceeded its time budget")))
            {
                let _ = tx.send(ChatEvent::Error { code: e.error_code(), message: e.to_string() }).await;
            }
        });
        TurnHandle { rx, _guard: AbortGuard(task) }
    }

    async fn drive_turn(&self, request: ChatTurnRequest, tx: &mpsc::Sender<ChatEvent>) -> ApiResult<()> {
        let session_id = self.resolve_session(request.owner_user_id, request.session_id).await?;
        let user_message_id = Uuid::new_v4().to_string();
        self.persist_message(
            &session_id,
            &user_message_id,
            MessageRole::User,
            &request.content,
            &request.file_ids,
            serde_json::Value::Null,
        )
        .await?;

        tx.send(ChatEvent::Meta { session_id: session_id.clone(), message_id: user_message_id.clone() })
            .await
            .map_err(|_| ApiError::backend_unavailable("chat event receiver dropped"))?;

        let doc_context = self.prepare_document_context(&session_id, &request).await;

        let tool_result = if request.tools_enabled.banking_analytics || classifies_as_analytics(&request.content) {
            self.run_banking_analytics_tool(&session_id, &request.content, tx).await?
        } else {
            None
        };

        let narrative = if doc_context.is_some() || tool_result.is_some() {
            let narrative = self.build_narrative(&request.content, &doc_context, tool_result.as_ref()).await;
            let narrative = if narrative.trim().is_empty() { fallback_message(&doc_context, &tool_result) } else { narrative };
            for chunk in pseudo_chunks(&narrative) {
                tx.send(ChatEvent::Chunk { delta: chunk })
                    .await
                    .map_err(|_| ApiError::backend_unavailable("chat event receiver dropped"))?;
            }
            narrative
        } else {
            self.stream_true_deltas(&request.content, tx).await?
        };

        let assistant_message_id = Uuid::new_v4().to_string();
        let metadata = serde_json::json!({ "tool_used": tool_result.is_some() });
        self.persist_message(&session_id, &assistant_message_id, MessageRole::Assistant, &narrative, &[], metadata)
            .await?;

        tx.send(ChatEvent::Done { session_id, message_id: assistant_message_id })
            .await
            .map_err(|_| ApiError::backend_unavailable("chat event receiver dropped"))?;
        Ok(())
    }

    async fn resolve_session(&self, owner_user_id: i64, session_id: Option<String>) -> ApiResult<String> {
        if let Some(id) = session_id {
            let exists: Option<(String,)> =
                sqlx::query_as("SELECT id FROM chat_sessions WHERE id = ? AND owner_user_id = ?")
                    .bind(&id)
                    .bind(owner_user_id)
                    .fetch_optional(&self.db)
                    .await?;
            if exists.is_some() {
                return Ok(id);
            }
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query("INSERT INTO chat_sessions (id, owner_user_id, title, created_at, updated_at) VALUES (?, ?, NULL, ?, ?)")
            .bind(&id)
            .bind(owner_user_id)
            .bind(now)
            .bind(now)
            .execute(&self.db)
            .await?;
        Ok(id)
    }

    async fn persist_message(
        &self,
        session_id: &str,
        message_id: &str,
        role: MessageRole,
        content: &str,
        file_ids: &[String],
        metadata: serde_json::Value,
    ) -> ApiResult<()> {
        sqlx::query(
            "INSERT INTO chat_messages (id, session_id, role, content, file_ids_json, metadata_json, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(message_id)
        .bind(session_id)
        .bind(role.as_str())
        .bind(content)
        .bind(serde_json::to_string(file_ids)?)
        .bind(metadata.to_string())
        .bind(Utc::now())
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Attachment adoption is non-inheriting: only the file IDs carried by
    /// *this* request are searched, never a stale read of the session.
    async fn prepare_document_context(&self, session_id: &str, request: &ChatTurnRequest) -> Option<String> {
        if request.file_ids.is_empty() {
            return None;
        }

        match self
            .document_service
            .search(session_id, &request.content, DOC_CONTEXT_TOP_K, DOC_CONTEXT_SCORE_THRESHOLD)
            .await
        {
            Ok(hits) if !hits.is_empty() => {
                let mut budget = TOTAL_CHAR_BUDGET;
                let mut parts = Vec::new();
                for hit in hits {
                    let truncated: String = hit.payload.text.chars().take(PER_DOC_CHAR_BUDGET.min(budget)).collect();
                    budget = budget.saturating_sub(truncated.len());
                    parts.push(truncated);
                    if budget == 0 {
                        break;
                    }
                }
                Some(parts.join("\n---\n"))
            },
            Ok(_) => self.fallback_to_full_text(request).await,
            Err(e) => {
                tracing::warn!(error = %e, "document RAG search failed, continuing without document context");
                self.fallback_to_full_text(request).await
            },
        }
    }

    async fn fallback_to_full_text(&self, request: &ChatTurnRequest) -> Option<String> {
        let mut budget = TOTAL_CHAR_BUDGET;
        let mut parts = Vec::new();
        for file_id in &request.file_ids {
            let Ok(Some(doc)) = self.document_service.get(file_id).await else { continue };
            if doc.status != crate::models::document::ExtractionStatus::Ready {
                continue;
            }
            let full_text: String = doc.pages.iter().map(|p| p.text.as_str()).collect::<Vec<_>>().join("\n");
            let truncated: String = full_text.chars().take(PER_DOC_CHAR_BUDGET.min(budget)).collect();
            budget = budget.saturating_sub(truncated.len());
            parts.push(truncated);
            if budget == 0 {
                break;
            }
        }
        if parts.is_empty() { None } else { Some(parts.join("\n---\n")) }
    }

    async fn run_banking_analytics_tool(
        &self,
        session_id: &str,
        query: &str,
        tx: &mpsc::Sender<ChatEvent>,
    ) -> ApiResult<Option<serde_json::Value>> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let spec = self.query_spec_parser.parse(query, session_id, &today).await;

        if spec.requires_clarification {
            let _ = tx
                .send(ChatEvent::BankClarification {
                    missing_fields: spec.missing_fields.clone(),
                    message: format!("Necesito más detalle: {}", spec.missing_fields.join(", ")),
                })
                .await;
            return Ok(None);
        }

        let ctx = self.rag_context_service.rag_context_for_spec(&spec, Some(query)).await;
        let sql_result = self.sql_generator.build_sql_from_spec(&spec, &ctx).await;
        let Some(sql) = sql_result.sql else {
            return Err(ApiError::unsupported_spec(
                sql_result.error_message.unwrap_or_else(|| "SQL generation failed".into()),
            ));
        };

        let intent = if spec.ranking_mode {
            Intent::Ranking
        } else if spec.comparison_mode {
            Intent::Comparison
        } else if spec.time_range.is_bounded() {
            Intent::Evolution
        } else {
            Intent::PointValue
        };

        let time_window = crate::models::analytics::TimeRangeWindow { start: None, end: None };
        let analytics_result = self
            .analytics_service
            .get_filtered_data(&sql, &spec.metric, &spec.bank_names, time_window, intent, Some(query))
            .await?;

        let charted = visualization_builder::build_chart(analytics_result);
        let payload = serde_json::to_value(&charted)?;
        let _ = tx.send(ChatEvent::BankChart { result: payload.clone() }).await;

        if charted.result_type == AnalyticsResultType::Data {
            if let Ok(artifact_id) = self.persist_chart_artifact(session_id, &sql, &payload).await {
                let _ = tx.send(ChatEvent::ArtifactCreated { artifact_id }).await;
            }
        }

        Ok(Some(payload))
    }

    async fn persist_chart_artifact(
        &self,
        session_id: &str,
        sql: &str,
        chart: &serde_json::Value,
    ) -> ApiResult<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let version = serde_json::json!({
            "version": 1,
            "content": { "chart": chart, "sql": sql },
            "created_at": now,
        });
        let versions_json = serde_json::to_string(&vec![version])?;

        sqlx::query(
            "INSERT INTO artifacts (id, owner_user_id, session_id, artifact_type, title, versions_json, created_at, updated_at) \
             VALUES (?, 0, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(session_id)
        .bind(ArtifactType::BankChart.as_str())
        .bind("Análisis bancario")
        .bind(versions_json)
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await?;
        Ok(id)
    }

    async fn build_narrative(
        &self,
        question: &str,
        doc_context: &Option<String>,
        tool_result: Option<&serde_json::Value>,
    ) -> String {
        use crate::services::llm::LLMService;

        let summary_json = tool_result
            .map(|v| v.to_string())
            .or_else(|| doc_context.clone())
            .unwrap_or_else(|| "{}".to_string());

        let request = ChatNarrativeRequest {
            user_question: question.to_string(),
            analytics_summary_json: summary_json,
            conversation_context: vec![],
        };

        let estimated_prompt_tokens = (question.len() + request.analytics_summary_json.len()) / 4;
        let _max_tokens = dynamic_max_tokens(estimated_prompt_tokens as u32, self.max_tokens_ceiling);

        match self.llm_service.analyze::<ChatNarrativeRequest, ChatNarrativeResponse>(&request, question, false).await
        {
            Ok(analysis) => analysis.response.narrative,
            Err(e) => {
                tracing::warn!(error = %e, "chat narrative LLM call failed");
                String::new()
            },
        }
    }

    /// Turns with neither RAG nor tool context have nothing for the LLM to
    /// narrate precisely, so there is no accuracy risk in forwarding real
    /// upstream deltas instead of a structured-then-re-chunked narrative.
    /// Falls back to `fallback_message` (emitted as a single final chunk) if
    /// the stream errors or produces no content at all.
    async fn stream_true_deltas(&self, question: &str, tx: &mpsc::Sender<ChatEvent>) -> ApiResult<String> {
        let mut rx = match self
            .llm_service
            .stream_narrative_deltas(PLAIN_NARRATIVE_SYSTEM_PROMPT.to_string(), question.to_string())
            .await
        {
            Ok(rx) => rx,
            Err(e) => {
                tracing::warn!(error = %e, "chat narrative stream failed to start");
                let fallback = fallback_message(&None, &None);
                tx.send(ChatEvent::Chunk { delta: fallback.clone() })
                    .await
                    .map_err(|_| ApiError::backend_unavailable("chat event receiver dropped"))?;
                return Ok(fallback);
            },
        };

        let mut narrative = String::new();
        while let Some(delta) = rx.recv().await {
            match delta {
                Ok(content) => {
                    narrative.push_str(&content);
                    tx.send(ChatEvent::Chunk { delta: content })
                        .await
                        .map_err(|_| ApiError::backend_unavailable("chat event receiver dropped"))?;
                },
                Err(e) => {
                    tracing::warn!(error = %e, "chat narrative stream errored mid-turn");
                    break;
                },
            }
        }

        if narrative.trim().is_empty() {
            let fallback = fallback_message(&None, &None);
            tx.send(ChatEvent::Chunk { delta: fallback.clone() })
                .await
                .map_err(|_| ApiError::backend_unavailable("chat event receiver dropped"))?;
            return Ok(fallback);
        }

        Ok(narrative)
    }
}

/// Consuming this as a `Stream` yields the turn's events in order; dropping
/// it early (the SSE client disconnected, or the caller stopped polling)
/// aborts the still-running producer task.
pub struct TurnHandle {
    rx: mpsc::Receiver<ChatEvent>,
    _guard: AbortGuard,
}

impl TurnHandle {
    /// Drains every event synchronously for the non-streaming JSON response
    /// path; the producer task still runs to completion behind the channel.
    pub async fn recv(&mut self) -> Option<ChatEvent> {
        self.rx.recv().await
    }
}

impl Stream for TurnHandle {
    type Item = ChatEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Aborts the producer task when the handle is dropped.
struct AbortGuard(tokio::task::JoinHandle<()>);

impl Drop for AbortGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn classifies_as_analytics(query: &str) -> bool {
    let lower = query.to_lowercase();
    ANALYTICS_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Model context window minus a safety margin, clamped to [500, configured ceiling].
fn dynamic_max_tokens(estimated_prompt_tokens: u32, ceiling: u32) -> u32 {
    const MODEL_LIMIT: u32 = 16000;
    const SAFETY_MARGIN: u32 = 1000;
    let available = MODEL_LIMIT.saturating_sub(estimated_prompt_tokens).saturating_sub(SAFETY_MARGIN);
    available.clamp(MIN_MAX_TOKENS, ceiling)
}

fn pseudo_chunks(narrative: &str) -> Vec<String> {
    const CHUNK_CHARS: usize = 40;
    let chars: Vec<char> = narrative.chars().collect();
    chars.chunks(CHUNK_CHARS).map(|c| c.iter().collect()).collect()
}

fn fallback_message(doc_context: &Option<String>, tool_result: &Option<serde_json::Value>) -> String {
    if tool_result.is_some() {
        "No pude generar una narrativa para este análisis; el gráfico adjunto refleja los datos obtenidos.".into()
    } else if doc_context.is_some() {
        "Los documentos adjuntos aún se están procesando; intenta de nuevo en un momento.".into()
    } else {
        "No pude generar una respuesta para esta pregunta; intenta reformularla.".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_banking_keywords() {
        assert!(classifies_as_analytics("cual es el IMOR de INVEX"));
        assert!(!classifies_as_analytics("hola, como estas"));
    }

    #[test]
    fn dynamic_max_tokens_respects_floor_and_ceiling() {
        assert_eq!(dynamic_max_tokens(0, 4096), 4096);
        assert_eq!(dynamic_max_tokens(20_000, 4096), MIN_MAX_TOKENS);
    }

    #[test]
    fn pseudo_chunks_covers_full_text() {
        let narrative = "a".repeat(100);
        let chunks = pseudo_chunks(&narrative);
        let joined: String = chunks.concat();
        assert_eq!(joined, narrative);
    }

    #[test]
    fn fallback_message_is_never_empty() {
        assert!(!fallback_message(&None, &None).is_empty());
    }
}
