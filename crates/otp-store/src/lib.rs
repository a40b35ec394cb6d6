//! Storage for phone OTP authentication.
//!
//! Holds the live one-time code per phone number, the append-only issuance
//! log that feeds the sliding-window rate limit, and registered identities.
//! Backends: in-memory and PostgreSQL, selected by driver name at startup.

mod backend;
mod error;
mod memory;
mod postgres;
mod store;
mod types;
mod window;

pub use backend::{
    MemoryBuilder, PostgresBuilder, StoreBuilder, StoreRegistry, StoreSettings, Stores,
    MEMORY_DRIVER, POSTGRES_DRIVER,
};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{CodeStore, IdentityStore};
pub use types::*;
pub use window::SlidingWindow;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_code_expiry_is_strict() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let code = OneTimeCode::new("+15551230000", "042917", created, chrono::Duration::minutes(2));

        assert_eq!(code.expires_at, created + chrono::Duration::minutes(2));
        assert!(!code.is_expired_at(created));
        assert!(!code.is_expired_at(code.expires_at));
        assert!(code.is_expired_at(code.expires_at + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_code_matches_exactly() {
        let code = OneTimeCode::new("+15551230000", "042917", Utc::now(), chrono::Duration::minutes(2));

        assert!(code.matches("042917"));
        assert!(!code.matches("42917"));
        assert!(!code.matches("042918"));
    }

    #[test]
    fn test_code_value_not_serialized() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let code = OneTimeCode::new("+15551230000", "042917", created, chrono::Duration::minutes(2));
        let json = serde_json::to_string(&code).unwrap();

        assert!(json.contains("\"phone_number\":\"+15551230000\""));
        assert!(json.contains("\"expires_at\""));
        assert!(!json.contains("042917"));
    }

    #[test]
    fn test_identity_serialization() {
        let now = Utc::now();
        let identity = Identity {
            id: 1,
            phone_number: "+15551230000".into(),
            registered_at: now,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_string(&identity).unwrap();
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"registered_at\""));

        let back: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, identity);
    }
}
