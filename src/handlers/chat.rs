//! Chat endpoint (§6): a POST that returns either a JSON-collected turn or,
//! when the caller sends `Accept: text/event-stream`, an SSE stream of the
//! `ChatEvent` sequence the orchestrator (C9) produces.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Extension, State};
use axum::http::{HeaderMap, header};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use serde::Deserialize;
use tokio_stream::StreamExt;

use crate::AppState;
use crate::middleware::CallerId;
use crate::services::chat_orchestrator::{ChatEvent, ChatTurnRequest, ToolsEnabled};
use crate::utils::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct ChatTurnPayload {
    pub session_id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub file_ids: Vec<String>,
    #[serde(default)]
    pub tools_enabled: ToolsEnabledPayload,
}

#[derive(Debug, Default, Deserialize)]
pub struct ToolsEnabledPayload {
    #[serde(default)]
    pub banking_analytics: bool,
}

/// POST /api/chat
#[utoipa::path(
    post,
    path = "/api/chat",
    responses(
        (status = 200, description = "Chat turn result (JSON or SSE event stream)"),
        (status = 401, description = "Missing or invalid bearer token"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn chat_turn(
    State(state): State<Arc<AppState>>,
    Extension(CallerId(owner_user_id)): Extension<CallerId>,
    headers: HeaderMap,
    Json(payload): Json<ChatTurnPayload>,
) -> impl IntoResponse {
    let request = ChatTurnRequest {
        owner_user_id,
        session_id: payload.session_id,
        content: payload.content,
        file_ids: payload.file_ids,
        tools_enabled: ToolsEnabled { banking_analytics: payload.tools_enabled.banking_analytics },
    };

    let wants_sse =
        headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()).is_some_and(|v| v.contains("text/event-stream"));

    let handle = state.chat_orchestrator.clone().run_turn(request);

    if wants_sse {
        stream_turn(handle).into_response()
    } else {
        collect_turn(handle).await.into_response()
    }
}

fn stream_turn(handle: crate::services::chat_orchestrator::TurnHandle) -> impl IntoResponse {
    let events = handle.map(|event| -> Result<Event, Infallible> {
        Ok(Event::default().event(event_name(&event)).json_data(&event).unwrap_or_else(|_| Event::default()))
    });
    Sse::new(events).keep_alive(axum::response::sse::KeepAlive::default())
}

async fn collect_turn(mut handle: crate::services::chat_orchestrator::TurnHandle) -> ApiResult<Json<serde_json::Value>> {
    let mut chunks = String::new();
    let mut meta = serde_json::Value::Null;
    let mut bank_chart = None;
    let mut artifact_id = None;

    while let Some(event) = handle.recv().await {
        match event {
            ChatEvent::Meta { session_id, message_id } => {
                meta = serde_json::json!({ "session_id": session_id, "message_id": message_id });
            },
            ChatEvent::BankChart { result } => bank_chart = Some(result),
            ChatEvent::ArtifactCreated { artifact_id: id } => artifact_id = Some(id),
            ChatEvent::Chunk { delta } => chunks.push_str(&delta),
            ChatEvent::Done { session_id, message_id } => {
                return Ok(Json(serde_json::json!({
                    "session_id": session_id,
                    "message_id": message_id,
                    "content": chunks,
                    "bank_chart": bank_chart,
                    "artifact_id": artifact_id,
                })));
            },
            ChatEvent::BankClarification { missing_fields, message } => {
                return Ok(Json(serde_json::json!({
                    "meta": meta,
                    "clarification": { "missing_fields": missing_fields, "message": message },
                })));
            },
            ChatEvent::Error { code, message } => {
                return Err(crate::utils::error::ApiError::internal_error(format!("[{}] {}", code, message)));
            },
        }
    }

    Ok(Json(serde_json::json!({ "meta": meta, "content": chunks })))
}

fn event_name(event: &ChatEvent) -> &'static str {
    match event {
        ChatEvent::Meta { .. } => "meta",
        ChatEvent::BankChart { .. } => "bank_chart",
        ChatEvent::BankClarification { .. } => "bank_clarification",
        ChatEvent::ArtifactCreated { .. } => "artifact_created",
        ChatEvent::Chunk { .. } => "chunk",
        ChatEvent::Done { .. } => "done",
        ChatEvent::Error { .. } => "error",
    }
}
