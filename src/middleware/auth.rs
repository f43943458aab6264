//! Caller-identity middleware. Decodes the bearer token issued by the
//! upstream auth gateway into a `user_id` and inserts it into request
//! extensions; no Casbin/RBAC layer (the teacher's `auth_middleware` also
//! resolves organization/role context and enforces policy, which this
//! backend has no equivalent of).

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::utils::error::ApiError;
use crate::utils::jwt::JwtUtil;

#[derive(Clone)]
pub struct AuthState {
    pub jwt_util: Arc<JwtUtil>,
}

/// Caller identity extracted from a verified bearer token.
#[derive(Clone, Copy, Debug)]
pub struct CallerId(pub i64);

pub async fn auth_middleware(State(state): State<AuthState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::permission_denied("missing authorization header"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::permission_denied("invalid authorization header format"))?;

    let claims = state.jwt_util.verify_token(token)?;
    let user_id = claims.sub.parse::<i64>().map_err(|_| ApiError::permission_denied("malformed subject claim"))?;

    req.extensions_mut().insert(CallerId(user_id));
    Ok(next.run(req).await)
}
