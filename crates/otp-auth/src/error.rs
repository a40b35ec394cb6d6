//! Error types for the authentication service.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use otp_store::StoreError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Authentication error types.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Rate limit exceeded: maximum {max_requests} OTP requests per {window_minutes} minutes")]
    RateLimited {
        max_requests: u32,
        window_minutes: u64,
    },

    #[error("Invalid OTP: no active code for this phone number")]
    CodeNotFound,

    #[error("OTP expired")]
    CodeExpired,

    #[error("Invalid OTP: code does not match")]
    CodeMismatch,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to create identity: {0}")]
    IdentityCreation(#[source] StoreError),

    #[error("Failed to sign session token: {0}")]
    Signing(String),

    #[error("Identity not found: {0}")]
    IdentityNotFound(i64),

    #[error("Invalid phone number format: {0}")]
    InvalidPhoneNumber(String),

    #[error("Invalid code format: {0}")]
    InvalidCode(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Too many requests")]
    GlobalRateLimitExceeded,
}

impl AuthError {
    /// Infrastructure failures are reported to clients without detail.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AuthError::Store(_) | AuthError::IdentityCreation(_) | AuthError::Signing(_)
        )
    }

    pub fn status_code(&self) -> (StatusCode, &'static str) {
        match self {
            AuthError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            AuthError::CodeNotFound => (StatusCode::UNAUTHORIZED, "CODE_NOT_FOUND"),
            AuthError::CodeExpired => (StatusCode::UNAUTHORIZED, "CODE_EXPIRED"),
            AuthError::CodeMismatch => (StatusCode::UNAUTHORIZED, "CODE_MISMATCH"),
            AuthError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            AuthError::IdentityCreation(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "IDENTITY_CREATION_ERROR")
            }
            AuthError::Signing(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SIGNING_ERROR"),
            AuthError::IdentityNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AuthError::InvalidPhoneNumber(_) => (StatusCode::BAD_REQUEST, "INVALID_PHONE_NUMBER"),
            AuthError::InvalidCode(_) => (StatusCode::BAD_REQUEST, "INVALID_CODE"),
            AuthError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AuthError::GlobalRateLimitExceeded => {
                (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT_EXCEEDED")
            }
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_code();

        let message = if self.is_internal() {
            error!(error = %self, "Request failed");
            "Internal error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        AuthError::Signing(e.to_string())
    }
}

/// Result type alias for authentication errors.
pub type AuthResult<T> = Result<T, AuthError>;
