use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};

/// Standard error body returned for every 4xx/5xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Bad Request").
    pub error: String,
    /// Human-readable description.
    pub message: String,
    /// Per-field validation messages, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
    /// ISO 8601 timestamp when the error occurred.
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Validation failed")]
    ValidationFailed(Vec<String>),

    /// Business-rule rejection inside the order workflow. The message is
    /// shown to the caller verbatim.
    #[error("{0}")]
    InvalidOperation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationFailed(_) | Self::InvalidOperation(_) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::DatabaseError(_)
            | Self::PaymentFailed(_)
            | Self::ExternalServiceError(_)
            | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message suitable for HTTP responses. Internal errors collapse to a
    /// generic message so implementation details never leak.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            Self::PaymentFailed(_) | Self::ExternalServiceError(_) => {
                "Payment initialization failed".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.response_message();

        let details = match &self {
            ServiceError::ValidationFailed(messages) if !messages.is_empty() => {
                Some(messages.clone())
            }
            _ => None,
        };

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
            details,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_rule_rejections_are_bad_requests() {
        let err = ServiceError::InvalidOperation(
            "Sorry, insufficient stock for the requested quantity of item SKU: ABC".into(),
        );
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.response_message(),
            "Sorry, insufficient stock for the requested quantity of item SKU: ABC"
        );
    }

    #[test]
    fn internal_errors_hide_detail() {
        let err = ServiceError::DatabaseError(DbErr::Custom("connection refused".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.response_message(), "Database error");

        let err = ServiceError::PaymentFailed("gateway returned 503".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.response_message(), "Payment initialization failed");
    }

    #[test]
    fn unpaid_lookup_is_forbidden() {
        let err = ServiceError::Forbidden("Payment not clear".into());
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.response_message(), "Payment not clear");
    }
}
