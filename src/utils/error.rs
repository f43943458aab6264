use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// API error with rich context and automatic error trait implementations.
///
/// Uses thiserror for ergonomic propagation; each variant carries the context
/// needed to render both a log line and a client-facing message.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("unauthorized metric: {0}")]
    UnauthorizedMetric(String),

    #[error("unsupported query: {0}")]
    UnsupportedSpec(String),

    #[error("SQL validation failed: {0}")]
    SqlValidationFailure(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("tool busy: {0}")]
    ToolBusy(String),

    #[error("rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    pub fn unauthorized_metric(message: impl Into<String>) -> Self {
        Self::UnauthorizedMetric(message.into())
    }

    pub fn unsupported_spec(message: impl Into<String>) -> Self {
        Self::UnsupportedSpec(message.into())
    }

    pub fn sql_validation_failure(message: impl Into<String>) -> Self {
        Self::SqlValidationFailure(message.into())
    }

    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    pub fn tool_busy(message: impl Into<String>) -> Self {
        Self::ToolBusy(message.into())
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit(message.into())
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::Other(anyhow::anyhow!(message.into()))
    }

    /// Numeric code families mirror the HTTP status ranges they map to.
    pub fn error_code(&self) -> i32 {
        match self {
            Self::ValidationError(_) => 4001,
            Self::UnauthorizedMetric(_) => 4002,
            Self::UnsupportedSpec(_) => 4003,
            Self::SqlValidationFailure(_) => 4004,
            Self::NotFound(_) => 4040,
            Self::PermissionDenied(_) => 4030,
            Self::RateLimit(_) => 4290,
            Self::ToolBusy(_) => 5030,
            Self::BackendUnavailable(_) => 5031,
            Self::Timeout(_) => 5032,
            Self::Database(_) => 5001,
            Self::Other(_) => 5000,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let message = self.to_string();

        let status = match &self {
            Self::ValidationError(_) | Self::UnsupportedSpec(_) | Self::SqlValidationFailure(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::UnauthorizedMetric(_) | Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::ToolBusy(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::BackendUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Database(_) | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if matches!(status, StatusCode::INTERNAL_SERVER_ERROR | StatusCode::BAD_GATEWAY) {
            tracing::error!(error = %message, code, "request failed");
        } else {
            tracing::warn!(error = %message, code, "request rejected");
        }

        let response = ApiErrorResponse { code, message, details: None };
        (status, Json(response)).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::internal_error(format!("JSON serialization error: {}", err))
    }
}

impl From<crate::services::llm::LLMError> for ApiError {
    fn from(err: crate::services::llm::LLMError) -> Self {
        use crate::services::llm::LLMError;
        match err {
            LLMError::NoProviderConfigured | LLMError::Disabled => ApiError::backend_unavailable(err.to_string()),
            LLMError::ProviderNotFound(_) => ApiError::not_found(err.to_string()),
            LLMError::Timeout(_) => ApiError::timeout(err.to_string()),
            LLMError::RateLimited(_) => ApiError::rate_limit(err.to_string()),
            LLMError::ApiError(_) | LLMError::ParseError(_) => ApiError::backend_unavailable(err.to_string()),
            LLMError::DatabaseError(e) => ApiError::Database(e),
            LLMError::SerializationError(e) => ApiError::from(e),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
