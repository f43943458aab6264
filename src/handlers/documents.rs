//! Document upload/ingest endpoint (§6): accepts a multipart upload and
//! streams the lifecycle of one `file_id` as SSE events `meta | progress |
//! heartbeat | ready | failed`, backed by `DocumentService` (C8).
//!
//! Unlike the chat turn, cancellation here is fire-and-forget: if the
//! consumer disconnects, the producer keeps ingesting and indexing because
//! its output is cache-bound and reusable by a later request for the same
//! content hash (§5 "Cancellation").

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{Extension, Multipart, Path, State};
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::AppState;
use crate::middleware::CallerId;
use crate::models::document::Document;
use crate::utils::error::{ApiError, ApiResult};

const INGEST_QUEUE_SIZE: usize = 16;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DocumentEvent {
    Meta { file_id: String, trace_id: String },
    Progress { file_id: String, trace_id: String, phase: &'static str, pct: u8, status: &'static str },
    Heartbeat { file_id: String, trace_id: String },
    Ready { file_id: String, trace_id: String, document: Document },
    Failed { file_id: String, trace_id: String, error: String },
}

/// POST /api/documents, multipart form with a single `file` field and an
/// optional `session_id` field.
#[utoipa::path(
    post,
    path = "/api/documents",
    responses(
        (status = 200, description = "Document lifecycle SSE stream (meta|progress|heartbeat|ready|failed)"),
        (status = 400, description = "Missing session_id or file field"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    Extension(CallerId(owner_user_id)): Extension<CallerId>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut session_id: Option<String> = None;
    let mut filename = String::from("upload.bin");
    let mut content_type = String::from("application/octet-stream");
    let mut bytes: Vec<u8> = Vec::new();

    while let Ok(Some(field)) = multipart.next_field().await {
        match field.name().unwrap_or_default() {
            "session_id" => {
                if let Ok(text) = field.text().await {
                    session_id = Some(text);
                }
            },
            "file" => {
                filename = field.file_name().unwrap_or("upload.bin").to_string();
                content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
                bytes = field.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
            },
            _ => {},
        }
    }

    let session_id = match session_id {
        Some(id) => id,
        None => return ApiError::validation_error("session_id field is required").into_response(),
    };
    if bytes.is_empty() {
        return ApiError::validation_error("file field is required and must not be empty").into_response();
    }

    let file_id = Uuid::new_v4().to_string();
    let trace_id = Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::channel(INGEST_QUEUE_SIZE);

    let document_service = state.document_service.clone();
    let spawn_file_id = file_id.clone();
    let spawn_trace_id = trace_id.clone();
    tokio::spawn(async move {
        run_ingest(document_service, owner_user_id, session_id, filename, content_type, bytes, spawn_file_id, spawn_trace_id, tx)
            .await;
    });

    let stream = ReceiverStream::new(rx).map(|event| -> Result<Event, Infallible> {
        Ok(Event::default().event(event_name(&event)).json_data(&event).unwrap_or_else(|_| Event::default()))
    });
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

async fn run_ingest(
    document_service: Arc<crate::services::DocumentService>,
    owner_user_id: i64,
    session_id: String,
    filename: String,
    content_type: String,
    bytes: Vec<u8>,
    file_id: String,
    trace_id: String,
    tx: mpsc::Sender<DocumentEvent>,
) {
    if tx.send(DocumentEvent::Meta { file_id: file_id.clone(), trace_id: trace_id.clone() }).await.is_err() {
        return;
    }
    let phases: [(&'static str, u8); 3] =
        [("upload", 10), ("extract", 40), ("cache", 60)];
    for (phase, pct) in phases {
        if tx
            .send(DocumentEvent::Progress {
                file_id: file_id.clone(),
                trace_id: trace_id.clone(),
                phase,
                pct,
                status: "in_progress",
            })
            .await
            .is_err()
        {
            return;
        }
    }

    if tx
        .send(DocumentEvent::Progress {
            file_id: file_id.clone(),
            trace_id: trace_id.clone(),
            phase: "embedding",
            pct: 85,
            status: "in_progress",
        })
        .await
        .is_err()
    {
        return;
    }

    let ingest_fut = document_service.ingest(owner_user_id, &session_id, &filename, &content_type, &bytes);
    tokio::pin!(ingest_fut);
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await; // first tick fires immediately, not 30s of silence

    let ingest_result = loop {
        tokio::select! {
            result = &mut ingest_fut => break result,
            _ = heartbeat.tick() => {
                if tx
                    .send(DocumentEvent::Heartbeat { file_id: file_id.clone(), trace_id: trace_id.clone() })
                    .await
                    .is_err()
                {
                    // consumer gone; ingest keeps running per the module's fire-and-forget contract
                }
            },
        }
    };

    match ingest_result {
        Ok(document) => {
            let _ = tx
                .send(DocumentEvent::Progress {
                    file_id: file_id.clone(),
                    trace_id: trace_id.clone(),
                    phase: "complete",
                    pct: 100,
                    status: "ready",
                })
                .await;
            let _ = tx.send(DocumentEvent::Ready { file_id, trace_id, document }).await;
        },
        Err(e) => {
            let _ = tx.send(DocumentEvent::Failed { file_id, trace_id, error: e.to_string() }).await;
        },
    }
}

fn event_name(event: &DocumentEvent) -> &'static str {
    match event {
        DocumentEvent::Meta { .. } => "meta",
        DocumentEvent::Progress { .. } => "progress",
        DocumentEvent::Heartbeat { .. } => "heartbeat",
        DocumentEvent::Ready { .. } => "ready",
        DocumentEvent::Failed { .. } => "failed",
    }
}

/// GET /api/documents/:id
#[utoipa::path(
    get,
    path = "/api/documents/{id}",
    params(("id" = String, Path, description = "Document ID")),
    responses(
        (status = 200, description = "Document metadata and extracted pages", body = Document),
        (status = 403, description = "Document not owned by caller"),
        (status = 404, description = "Document not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Extension(CallerId(caller_user_id)): Extension<CallerId>,
    Path(document_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.document_service.ownership_check(&document_id, caller_user_id).await?;
    let document =
        state.document_service.get(&document_id).await?.ok_or_else(|| ApiError::not_found("document"))?;
    Ok(Json(document))
}
