//! API request and response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest E.164 number, excluding the leading `+`.
const MAX_PHONE_DIGITS: usize = 15;
const MIN_PHONE_DIGITS: usize = 8;
const CODE_LENGTH: usize = 6;

/// Request a one-time code.
#[derive(Debug, Deserialize)]
pub struct SendOtpRequest {
    /// Phone number in E.164 format (e.g. "+15551230000")
    pub phone_number: String,
}

/// Response after issuing a code.
#[derive(Debug, Serialize)]
pub struct SendOtpResponse {
    pub phone_number: String,
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

/// Submit a one-time code.
#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub phone_number: String,

    /// Six-digit code
    pub code: String,
}

/// Query parameters for listing identities.
#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub store_driver: String,
    pub store_healthy: bool,
}

/// Check that `number` is E.164: `+`, a non-zero leading digit, 8 to 15 digits.
pub fn validate_phone_number(number: &str) -> Result<(), String> {
    let digits = number
        .strip_prefix('+')
        .ok_or_else(|| "Phone number must start with +".to_string())?;

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err("Phone number must contain only digits after +".into());
    }

    if digits.starts_with('0') {
        return Err("Country code cannot start with 0".into());
    }

    if digits.len() < MIN_PHONE_DIGITS {
        return Err("Phone number too short".into());
    }

    if digits.len() > MAX_PHONE_DIGITS {
        return Err("Phone number too long".into());
    }

    Ok(())
}

/// Check that `code` is exactly six ASCII digits.
pub fn validate_code(code: &str) -> Result<(), String> {
    if code.len() != CODE_LENGTH || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("Code must be exactly {} digits", CODE_LENGTH));
    }
    Ok(())
}
