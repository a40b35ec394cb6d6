//! Storage capabilities consumed by the OTP engine and session issuer.

use crate::error::StoreResult;
use crate::types::{Identity, IssueOutcome, OneTimeCode};
use crate::window::SlidingWindow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Live codes plus the append-only issuance log.
///
/// Every method is a single atomic operation against the backing store.
/// A dropped future must leave no partial write behind.
#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Count issuance records for `phone_number` requested at or after `since`.
    async fn count_issuances(&self, phone_number: &str, since: DateTime<Utc>) -> StoreResult<u64>;

    /// Insert or replace the live code for its phone number.
    async fn upsert_code(&self, code: &OneTimeCode) -> StoreResult<()>;

    async fn get_code(&self, phone_number: &str) -> StoreResult<Option<OneTimeCode>>;

    /// Delete the live code for `phone_number` only if it still holds `code`.
    ///
    /// Returns whether a code was removed.
    async fn delete_code(&self, phone_number: &str, code: &str) -> StoreResult<bool>;

    /// Check the window, append an issuance record and upsert `code`, as one
    /// operation serialized per phone number.
    ///
    /// The window is evaluated against `code.created_at`.
    async fn issue(&self, code: &OneTimeCode, window: &SlidingWindow) -> StoreResult<IssueOutcome>;
}

/// Registered identities.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Create an identity. Fails with `StoreError::Conflict` if the phone
    /// number is already registered.
    async fn create_identity(
        &self,
        phone_number: &str,
        registered_at: DateTime<Utc>,
    ) -> StoreResult<Identity>;

    async fn get_by_phone(&self, phone_number: &str) -> StoreResult<Option<Identity>>;

    async fn get_by_key(&self, id: i64) -> StoreResult<Option<Identity>>;

    /// One page of identities whose phone number contains `search`
    /// (case-insensitive), ordered by key, plus the total match count.
    ///
    /// `page` is 1-based; callers normalize `page` and `limit`.
    async fn list(&self, page: u32, limit: u32, search: &str) -> StoreResult<(Vec<Identity>, u64)>;

    async fn count(&self) -> StoreResult<u64>;
}
