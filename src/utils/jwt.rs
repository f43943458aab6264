//! Minimal caller-identity verification. The original `auth_middleware`
//! (teacher) additionally resolves organization/role context and enforces
//! Casbin policy; this backend has no multi-tenant RBAC, so only identity
//! (`user_id`) is decoded from the bearer token issued by the upstream
//! auth gateway.

use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::utils::error::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

pub struct JwtUtil {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtUtil {
    pub fn new(secret: &str) -> Self {
        Self { decoding_key: DecodingKey::from_secret(secret.as_bytes()), validation: Validation::default() }
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| ApiError::permission_denied(format!("invalid token: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    #[test]
    fn verifies_token_signed_with_same_secret() {
        let claims = Claims { sub: "42".to_string(), exp: 9_999_999_999 };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"test-secret")).unwrap();

        let util = JwtUtil::new("test-secret");
        let decoded = util.verify_token(&token).unwrap();
        assert_eq!(decoded.sub, "42");
    }

    #[test]
    fn rejects_token_signed_with_different_secret() {
        let claims = Claims { sub: "42".to_string(), exp: 9_999_999_999 };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"other-secret")).unwrap();

        let util = JwtUtil::new("test-secret");
        assert!(util.verify_token(&token).is_err());
    }
}
