//! Identity and one-time code records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered identity, created on the first successful verification
/// for a phone number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Identity {
    /// Numeric key assigned by the store on creation.
    pub id: i64,
    /// Phone number in E.164 format, unique across identities.
    pub phone_number: String,
    pub registered_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The live one-time code for a phone number.
///
/// At most one exists per phone number; reissuing replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OneTimeCode {
    pub phone_number: String,
    #[serde(skip_serializing)]
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl OneTimeCode {
    pub fn new(
        phone_number: impl Into<String>,
        code: impl Into<String>,
        created_at: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            phone_number: phone_number.into(),
            code: code.into(),
            expires_at: created_at + ttl,
            created_at,
        }
    }

    /// A code is expired strictly after its expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn matches(&self, submitted: &str) -> bool {
        self.code == submitted
    }
}

/// Append-only record of a code request, counted by the sliding window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceRecord {
    pub phone_number: String,
    pub requested_at: DateTime<Utc>,
}

/// Result of an atomic issuance attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueOutcome {
    /// Request logged and the code stored.
    Issued,
    /// The window was already full; nothing was written.
    Limited { recent: u64 },
}
