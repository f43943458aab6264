//! Artifacts CRUD (§6): `{id, user_id, session_id, type, title, content,
//! versions[], created_at, updated_at}`, ownership-checked on every
//! operation. No dedicated service sits in front of the `artifacts` table —
//! same as the chat orchestrator's own `persist_chart_artifact`, these
//! handlers query it directly through the shared `SqlitePool`.

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::middleware::CallerId;
use crate::models::chat::{Artifact, ArtifactRow, ArtifactType, ArtifactVersion};
use crate::utils::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct CreateArtifactPayload {
    pub session_id: Option<String>,
    pub artifact_type: ArtifactType,
    pub title: String,
    pub content: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct AddVersionPayload {
    pub content: serde_json::Value,
}

/// GET /api/artifacts
#[utoipa::path(
    get,
    path = "/api/artifacts",
    responses((status = 200, description = "Artifacts owned by the caller", body = [Artifact])),
    security(("bearer_auth" = []))
)]
pub async fn list_artifacts(
    State(state): State<Arc<AppState>>,
    Extension(CallerId(owner_user_id)): Extension<CallerId>,
) -> ApiResult<impl IntoResponse> {
    let rows: Vec<ArtifactRow> = sqlx::query_as(
        "SELECT * FROM artifacts WHERE owner_user_id = ? ORDER BY updated_at DESC",
    )
    .bind(owner_user_id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(rows.into_iter().map(Artifact::from).collect::<Vec<_>>()))
}

/// GET /api/artifacts/:id
#[utoipa::path(
    get,
    path = "/api/artifacts/{id}",
    params(("id" = String, Path, description = "Artifact ID")),
    responses(
        (status = 200, description = "Artifact with version history", body = Artifact),
        (status = 404, description = "Artifact not found or not owned by caller"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_artifact(
    State(state): State<Arc<AppState>>,
    Extension(CallerId(caller_user_id)): Extension<CallerId>,
    Path(artifact_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let artifact = fetch_owned(&state, &artifact_id, caller_user_id).await?;
    Ok(Json(artifact))
}

/// POST /api/artifacts
#[utoipa::path(
    post,
    path = "/api/artifacts",
    responses((status = 201, description = "Artifact created", body = Artifact)),
    security(("bearer_auth" = []))
)]
pub async fn create_artifact(
    State(state): State<Arc<AppState>>,
    Extension(CallerId(owner_user_id)): Extension<CallerId>,
    Json(payload): Json<CreateArtifactPayload>,
) -> ApiResult<impl IntoResponse> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let versions = vec![ArtifactVersion { version: 1, content: payload.content, created_at: now }];
    let versions_json = serde_json::to_string(&versions)?;

    sqlx::query(
        r#"INSERT INTO artifacts
           (id, owner_user_id, session_id, artifact_type, title, versions_json, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(owner_user_id)
    .bind(&payload.session_id)
    .bind(payload.artifact_type.as_str())
    .bind(&payload.title)
    .bind(&versions_json)
    .bind(now)
    .bind(now)
    .execute(&state.db)
    .await?;

    let artifact = fetch_owned(&state, &id, owner_user_id).await?;
    Ok((StatusCode::CREATED, Json(artifact)))
}

/// POST /api/artifacts/:id/versions — appends a new version, preserving history.
#[utoipa::path(
    post,
    path = "/api/artifacts/{id}/versions",
    params(("id" = String, Path, description = "Artifact ID")),
    responses(
        (status = 200, description = "Artifact with the new version appended", body = Artifact),
        (status = 404, description = "Artifact not found or not owned by caller"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn add_artifact_version(
    State(state): State<Arc<AppState>>,
    Extension(CallerId(caller_user_id)): Extension<CallerId>,
    Path(artifact_id): Path<String>,
    Json(payload): Json<AddVersionPayload>,
) -> ApiResult<impl IntoResponse> {
    let mut artifact = fetch_owned(&state, &artifact_id, caller_user_id).await?;
    let next_version = artifact.versions.last().map(|v| v.version + 1).unwrap_or(1);
    let now = Utc::now();
    artifact.versions.push(ArtifactVersion { version: next_version, content: payload.content, created_at: now });
    let versions_json = serde_json::to_string(&artifact.versions)?;

    sqlx::query("UPDATE artifacts SET versions_json = ?, updated_at = ? WHERE id = ?")
        .bind(&versions_json)
        .bind(now)
        .bind(&artifact_id)
        .execute(&state.db)
        .await?;

    let artifact = fetch_owned(&state, &artifact_id, caller_user_id).await?;
    Ok(Json(artifact))
}

/// DELETE /api/artifacts/:id
#[utoipa::path(
    delete,
    path = "/api/artifacts/{id}",
    params(("id" = String, Path, description = "Artifact ID")),
    responses(
        (status = 204, description = "Artifact deleted"),
        (status = 404, description = "Artifact not found or not owned by caller"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_artifact(
    State(state): State<Arc<AppState>>,
    Extension(CallerId(caller_user_id)): Extension<CallerId>,
    Path(artifact_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    fetch_owned(&state, &artifact_id, caller_user_id).await?;
    sqlx::query("DELETE FROM artifacts WHERE id = ?").bind(&artifact_id).execute(&state.db).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_owned(state: &AppState, artifact_id: &str, caller_user_id: i64) -> ApiResult<Artifact> {
    let row: Option<ArtifactRow> =
        sqlx::query_as("SELECT * FROM artifacts WHERE id = ?").bind(artifact_id).fetch_optional(&state.db).await?;
    let row = row.ok_or_else(|| ApiError::not_found("artifact"))?;
    if row.owner_user_id != caller_user_id {
        return Err(ApiError::not_found("artifact"));
    }
    Ok(Artifact::from(row))
}
