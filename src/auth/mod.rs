use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::errors::ErrorResponse;
use crate::AppState;

pub mod roles {
    pub const ADMIN: &str = "admin";
    pub const CASHIER: &str = "cashier";
    pub const CUSTOMER: &str = "customer";
}

/// JWT claims carried by every bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject, the user id.
    pub sub: String,
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authorization token")]
    MissingToken,

    #[error("Invalid authorization token")]
    InvalidToken,

    #[error("Authorization token expired")]
    TokenExpired,

    #[error("Malformed subject claim")]
    MalformedSubject,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: "Unauthorized".to_string(),
            message: self.to_string(),
            details: None,
            timestamp: Utc::now().to_rfc3339(),
        };
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

/// Issues and validates HS256 bearer tokens.
#[derive(Clone)]
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_secs: usize,
}

impl AuthService {
    pub fn new(secret: &str, expiration_secs: usize) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_secs,
        }
    }

    pub fn generate_token(&self, user_id: Uuid, roles: &[&str]) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            iat: now,
            exp: now + self.expiration_secs as i64,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|_| AuthError::InvalidToken)
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })
    }
}

/// Authenticated caller, extracted from the Authorization header.
/// Extraction failure is a 401; role checks in handlers produce 403.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(roles::ADMIN)
    }

    pub fn is_cashier(&self) -> bool {
        self.has_role(roles::CASHIER)
    }

    pub fn is_customer(&self) -> bool {
        self.has_role(roles::CUSTOMER)
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        let user_id = Uuid::parse_str(&claims.sub).unwrap_or_else(|_| Uuid::nil());
        AuthUser {
            user_id,
            roles: claims.roles,
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);

        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingToken)?;

        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or(AuthError::MissingToken)?;

        let claims = state.auth.validate_token(token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::MalformedSubject)?;

        Ok(AuthUser {
            user_id,
            roles: claims.roles,
        })
    }
}
