//! HTTP request handlers.

use super::types::{
    validate_code, validate_phone_number, HealthResponse, ListUsersQuery, SendOtpRequest,
    SendOtpResponse, VerifyOtpRequest,
};
use super::AppState;
use crate::directory::{IdentityPage, DEFAULT_LIMIT};
use crate::error::AuthError;
use crate::session::{AuthSession, SessionClaims};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use otp_store::Identity;
use tracing::info;

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_healthy = state.directory.count().await.is_ok();

    Json(HealthResponse {
        status: "ok".to_string(),
        store_driver: state.store_driver.clone(),
        store_healthy,
    })
}

/// Issue a one-time code for a phone number.
pub async fn send_otp(
    State(state): State<AppState>,
    Json(request): Json<SendOtpRequest>,
) -> Result<Json<SendOtpResponse>, AuthError> {
    validate_phone_number(&request.phone_number).map_err(AuthError::InvalidPhoneNumber)?;
    info!(phone_number = %request.phone_number, "OTP request received");

    let code = state.otp.issue_code(&request.phone_number).await?;

    Ok(Json(SendOtpResponse {
        phone_number: code.phone_number,
        message: "OTP sent successfully".to_string(),
        expires_at: code.expires_at,
    }))
}

/// Verify a code and log in, registering the phone number on first use.
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(request): Json<VerifyOtpRequest>,
) -> Result<Json<AuthSession>, AuthError> {
    validate_phone_number(&request.phone_number).map_err(AuthError::InvalidPhoneNumber)?;
    validate_code(&request.code).map_err(AuthError::InvalidCode)?;
    info!(phone_number = %request.phone_number, "OTP verification received");

    let session = state
        .sessions
        .authenticate(&request.phone_number, &request.code)
        .await?;

    Ok(Json(session))
}

/// Identity of the bearer.
pub async fn current_user(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
) -> Result<Json<Identity>, AuthError> {
    Ok(Json(state.directory.get(claims.user_id).await?))
}

/// List identities with pagination and phone number search.
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<IdentityPage>, AuthError> {
    let page = state
        .directory
        .list(
            query.page.unwrap_or(1),
            query.limit.unwrap_or(i64::from(DEFAULT_LIMIT)),
            query.search.as_deref().unwrap_or(""),
        )
        .await?;

    Ok(Json(page))
}

/// Get an identity by key.
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Identity>, AuthError> {
    Ok(Json(state.directory.get(id).await?))
}
