//! LLM provider management endpoints. Scoped down from the teacher's
//! `handlers/llm.rs`: no root-cause-analysis/profile-analyzer endpoints
//! survive here, only the provider CRUD + status surface this backend
//! still needs to configure which model the chat narrative step calls.

use std::sync::Arc;

use axum::{Json, extract::{Path, State}, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::AppState;
use crate::services::llm::{CreateProviderRequest, LLMError, LLMProviderInfo, LLMService, UpdateProviderRequest};
use crate::utils::error::ApiResult;

/// GET /api/llm/providers
#[utoipa::path(
    get,
    path = "/api/llm/providers",
    responses((status = 200, description = "Configured LLM providers", body = [LLMProviderInfo])),
    security(("bearer_auth" = []))
)]
pub async fn list_providers(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let providers = state.llm_service.list_providers().await?;
    Ok(Json(providers))
}

/// GET /api/llm/providers/:id
#[utoipa::path(
    get,
    path = "/api/llm/providers/{id}",
    params(("id" = i64, Path, description = "Provider ID")),
    responses(
        (status = 200, description = "Provider details", body = LLMProviderInfo),
        (status = 404, description = "Provider not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_provider(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> ApiResult<impl IntoResponse> {
    let provider =
        state.llm_service.get_provider(id).await?.ok_or(LLMError::ProviderNotFound(id.to_string()))?;
    Ok(Json(provider))
}

/// GET /api/llm/providers/active
#[utoipa::path(
    get,
    path = "/api/llm/providers/active",
    responses((status = 200, description = "The currently active provider, if any")),
    security(("bearer_auth" = []))
)]
pub async fn get_active_provider(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let provider = state.llm_service.get_active_provider().await?;
    Ok(Json(provider))
}

/// POST /api/llm/providers
#[utoipa::path(
    post,
    path = "/api/llm/providers",
    responses((status = 201, description = "Provider created", body = LLMProviderInfo)),
    security(("bearer_auth" = []))
)]
pub async fn create_provider(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProviderRequest>,
) -> ApiResult<impl IntoResponse> {
    let provider = state.llm_service.create_provider(req).await?;
    Ok((StatusCode::CREATED, Json(LLMProviderInfo::from(&provider))))
}

/// PUT /api/llm/providers/:id
#[utoipa::path(
    put,
    path = "/api/llm/providers/{id}",
    params(("id" = i64, Path, description = "Provider ID")),
    responses((status = 200, description = "Provider updated", body = LLMProviderInfo)),
    security(("bearer_auth" = []))
)]
pub async fn update_provider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateProviderRequest>,
) -> ApiResult<impl IntoResponse> {
    let provider = state.llm_service.update_provider(id, req).await?;
    Ok(Json(LLMProviderInfo::from(&provider)))
}

/// DELETE /api/llm/providers/:id
#[utoipa::path(
    delete,
    path = "/api/llm/providers/{id}",
    params(("id" = i64, Path, description = "Provider ID")),
    responses((status = 204, description = "Provider deleted")),
    security(("bearer_auth" = []))
)]
pub async fn delete_provider(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> ApiResult<impl IntoResponse> {
    state.llm_service.delete_provider(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/llm/providers/:id/activate
#[utoipa::path(
    post,
    path = "/api/llm/providers/{id}/activate",
    params(("id" = i64, Path, description = "Provider ID")),
    responses((status = 200, description = "Provider activated", body = LLMProviderInfo)),
    security(("bearer_auth" = []))
)]
pub async fn activate_provider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.llm_service.activate_provider(id).await?;
    let provider =
        state.llm_service.get_provider(id).await?.ok_or(LLMError::ProviderNotFound(id.to_string()))?;
    Ok(Json(provider))
}

/// POST /api/llm/providers/:id/deactivate
#[utoipa::path(
    post,
    path = "/api/llm/providers/{id}/deactivate",
    params(("id" = i64, Path, description = "Provider ID")),
    responses((status = 200, description = "Provider deactivated", body = LLMProviderInfo)),
    security(("bearer_auth" = []))
)]
pub async fn deactivate_provider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.llm_service.deactivate_provider(id).await?;
    let provider =
        state.llm_service.get_provider(id).await?.ok_or(LLMError::ProviderNotFound(id.to_string()))?;
    Ok(Json(provider))
}

/// POST /api/llm/providers/:id/test
#[utoipa::path(
    post,
    path = "/api/llm/providers/{id}/test",
    params(("id" = i64, Path, description = "Provider ID")),
    responses((status = 200, description = "Connection test result")),
    security(("bearer_auth" = []))
)]
pub async fn test_provider_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let result = state.llm_service.test_connection(id).await?;
    Ok(Json(result))
}

/// GET /api/llm/status
#[utoipa::path(
    get,
    path = "/api/llm/status",
    responses((status = 200, description = "LLM subsystem status", body = LLMStatusResponse)),
    security(("bearer_auth" = []))
)]
pub async fn get_status(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let providers = state.llm_service.list_providers().await?;
    let active_provider = providers.iter().find(|p| p.is_active).cloned();

    Ok(Json(LLMStatusResponse {
        enabled: state.llm_service.is_available(),
        active_provider,
        provider_count: providers.len(),
    }))
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct LLMStatusResponse {
    pub enabled: bool,
    pub active_provider: Option<LLMProviderInfo>,
    pub provider_count: usize,
}
