//! Bearer-token validation. User storage and session issuance live in a
//! separate gateway; this service only validates HS256 tokens and extracts
//! the caller's identity and role.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::header, http::request::Parts};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ApiError;
use crate::AppState;

/// Back-office roles, least to most privileged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Clerk,
    Manager,
    Owner,
}

/// Claim structure for bearer tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    pub name: Option<String>,
    pub role: Role,
    /// Issued at (seconds since epoch)
    pub iat: i64,
    /// Expiration (seconds since epoch)
    pub exp: i64,
}

/// Authenticated caller extracted from the Authorization header
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: Option<String>,
    pub role: Role,
}

impl AuthUser {
    pub fn is_owner(&self) -> bool {
        self.role == Role::Owner
    }

    /// Invoice edit/delete rule: the original author, or an owner
    pub fn may_modify(&self, author: Uuid) -> bool {
        self.id == author || self.is_owner()
    }
}

/// Issues an HS256 token. Used by tests and local tooling; production
/// tokens come from the auth gateway.
pub fn issue_token(
    secret: &str,
    user_id: Uuid,
    name: Option<String>,
    role: Role,
    ttl_secs: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        name,
        role,
        iat: now,
        exp: now + ttl_secs,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Validates a bearer token against the configured secret
pub fn validate_token(secret: &str, token: &str) -> Result<AuthUser, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|_| ApiError::Unauthorized)?;

    let id = Uuid::parse_str(&data.claims.sub).map_err(|_| ApiError::Unauthorized)?;
    Ok(AuthUser {
        id,
        name: data.claims.name,
        role: data.claims.role,
    })
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let token = header_value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .ok_or(ApiError::Unauthorized)?;

        validate_token(&state.config.jwt_secret, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit_test_secret_key_that_is_long_enough_000";

    #[test]
    fn round_trips_a_valid_token() {
        let user_id = Uuid::new_v4();
        let token = issue_token(SECRET, user_id, Some("Sara".into()), Role::Manager, 3600)
            .expect("token issued");
        let user = validate_token(SECRET, &token).expect("token valid");
        assert_eq!(user.id, user_id);
        assert_eq!(user.role, Role::Manager);
    }

    #[test]
    fn rejects_a_token_signed_with_another_secret() {
        let token = issue_token("another_secret_key_that_is_long_enough_xx", Uuid::new_v4(), None, Role::Clerk, 3600)
            .expect("token issued");
        assert!(validate_token(SECRET, &token).is_err());
    }

    #[test]
    fn rejects_an_expired_token() {
        // Far enough in the past to clear the validator's default leeway
        let token =
            issue_token(SECRET, Uuid::new_v4(), None, Role::Clerk, -3600).expect("token issued");
        assert!(validate_token(SECRET, &token).is_err());
    }

    #[test]
    fn owner_may_modify_anyone_elses_invoice() {
        let owner = AuthUser {
            id: Uuid::new_v4(),
            name: None,
            role: Role::Owner,
        };
        assert!(owner.may_modify(Uuid::new_v4()));

        let clerk = AuthUser {
            id: Uuid::new_v4(),
            name: None,
            role: Role::Clerk,
        };
        assert!(clerk.may_modify(clerk.id));
        assert!(!clerk.may_modify(Uuid::new_v4()));
    }
}
