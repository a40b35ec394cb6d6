//! One-time code issuance and verification.

use crate::config::OtpConfig;
use crate::error::{AuthError, AuthResult};
use anyhow::{bail, Context};
use chrono::{Duration, Utc};
use otp_store::{CodeStore, IssueOutcome, OneTimeCode, SlidingWindow};
use rand::Rng;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Exclusive upper bound of generated codes; six decimal digits.
const CODE_SPACE: u32 = 1_000_000;

/// Code lifetime and issuance limit.
#[derive(Debug, Clone, Copy)]
pub struct OtpPolicy {
    pub code_ttl: Duration,
    pub window: SlidingWindow,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            code_ttl: Duration::minutes(2),
            window: SlidingWindow::default(),
        }
    }
}

impl TryFrom<&OtpConfig> for OtpPolicy {
    type Error = anyhow::Error;

    /// Rate-limit messages state the window in minutes, so it must be a
    /// positive whole number of them.
    fn try_from(config: &OtpConfig) -> anyhow::Result<Self> {
        let code_ttl = Duration::from_std(config.code_ttl).context("otp.code_ttl out of range")?;
        if code_ttl <= Duration::zero() {
            bail!("otp.code_ttl must be positive");
        }

        let window = config.sliding_window();
        let length = window.length;
        if length.is_zero() || length.as_secs() % 60 != 0 || length.subsec_nanos() != 0 {
            bail!("otp.window must be a whole number of minutes, got {:?}", length);
        }

        Ok(Self { code_ttl, window })
    }
}

/// Uniformly random code in `[0, 1_000_000)`, zero-padded to six digits.
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{:06}", rng.gen_range(0..CODE_SPACE))
}

/// Issues and verifies one-time codes against a [`CodeStore`].
pub struct OtpEngine {
    store: Arc<dyn CodeStore>,
    policy: OtpPolicy,
}

impl OtpEngine {
    pub fn new(store: Arc<dyn CodeStore>, policy: OtpPolicy) -> Self {
        Self { store, policy }
    }

    /// Issue a fresh code for `phone_number`, replacing any live one.
    ///
    /// The code is written to the log instead of being delivered by SMS.
    #[instrument(skip(self))]
    pub async fn issue_code(&self, phone_number: &str) -> AuthResult<OneTimeCode> {
        let code = OneTimeCode::new(
            phone_number,
            generate_code(&mut rand::thread_rng()),
            Utc::now(),
            self.policy.code_ttl,
        );

        match self.store.issue(&code, &self.policy.window).await? {
            IssueOutcome::Issued => {}
            IssueOutcome::Limited { recent } => {
                warn!(recent, "OTP rate limit exceeded");
                return Err(AuthError::RateLimited {
                    max_requests: self.policy.window.max_events,
                    window_minutes: self.policy.window.minutes(),
                });
            }
        }

        // Stand-in for SMS delivery.
        info!(
            code = %code.code,
            expires_at = %code.expires_at.format("%H:%M:%S"),
            "OTP issued"
        );

        Ok(code)
    }

    /// Verify `code` for `phone_number`, consuming it on success.
    ///
    /// A mismatch leaves the live code in place for another attempt.
    #[instrument(skip(self, code))]
    pub async fn verify_code(&self, phone_number: &str, code: &str) -> AuthResult<()> {
        let live = self
            .store
            .get_code(phone_number)
            .await?
            .ok_or(AuthError::CodeNotFound)?;

        if live.is_expired_at(Utc::now()) {
            self.store.delete_code(phone_number, &live.code).await?;
            info!("Expired OTP removed");
            return Err(AuthError::CodeExpired);
        }

        if !live.matches(code) {
            warn!("OTP mismatch");
            return Err(AuthError::CodeMismatch);
        }

        // Losing a race with another verifier means the code is already spent.
        if !self.store.delete_code(phone_number, &live.code).await? {
            return Err(AuthError::CodeNotFound);
        }

        info!("OTP verified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otp_store::MemoryStore;
    use rand::rngs::mock::StepRng;

    const PHONE: &str = "+15551230000";

    fn engine_with(store: &MemoryStore, policy: OtpPolicy) -> OtpEngine {
        OtpEngine::new(Arc::new(store.clone()), policy)
    }

    #[test]
    fn test_generate_code_is_six_digits() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let code = generate_code(&mut rng);
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_generate_code_zero_pads() {
        let mut rng = StepRng::new(0, 0);
        assert_eq!(generate_code(&mut rng), "000000");
    }

    fn otp_config(code_ttl: std::time::Duration, window: std::time::Duration) -> OtpConfig {
        OtpConfig {
            code_ttl,
            window,
            max_requests: 3,
        }
    }

    #[test]
    fn test_policy_from_config() {
        let config = otp_config(
            std::time::Duration::from_secs(30),
            std::time::Duration::from_secs(15 * 60),
        );
        let policy = OtpPolicy::try_from(&config).unwrap();

        assert_eq!(policy.code_ttl, Duration::seconds(30));
        assert_eq!(policy.window.max_events, 3);
        assert_eq!(policy.window.minutes(), 15);
    }

    #[test]
    fn test_policy_rejects_partial_minute_window() {
        let ttl = std::time::Duration::from_secs(120);

        for secs in [0, 30, 90] {
            let config = otp_config(ttl, std::time::Duration::from_secs(secs));
            let err = OtpPolicy::try_from(&config).unwrap_err();
            assert!(err.to_string().contains("otp.window"), "{secs}s: {err}");
        }
    }

    #[test]
    fn test_policy_rejects_unrepresentable_ttl() {
        let window = std::time::Duration::from_secs(600);

        let err = OtpPolicy::try_from(&otp_config(std::time::Duration::MAX, window)).unwrap_err();
        assert!(err.to_string().contains("otp.code_ttl"));

        let err = OtpPolicy::try_from(&otp_config(std::time::Duration::ZERO, window)).unwrap_err();
        assert!(err.to_string().contains("otp.code_ttl"));
    }

    #[tokio::test]
    async fn test_issue_sets_expiry_from_ttl() {
        let store = MemoryStore::new();
        let engine = engine_with(&store, OtpPolicy::default());

        let code = engine.issue_code(PHONE).await.unwrap();

        assert_eq!(code.phone_number, PHONE);
        assert_eq!(code.expires_at - code.created_at, chrono::Duration::minutes(2));
        assert_eq!(store.get_code(PHONE).await.unwrap(), Some(code));
    }

    #[tokio::test]
    async fn test_fourth_issue_in_window_is_rate_limited() {
        let store = MemoryStore::new();
        let engine = engine_with(&store, OtpPolicy::default());

        for _ in 0..3 {
            engine.issue_code(PHONE).await.unwrap();
        }

        let err = engine.issue_code(PHONE).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::RateLimited {
                max_requests: 3,
                window_minutes: 10
            }
        ));
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded: maximum 3 OTP requests per 10 minutes"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_issue_never_exceeds_limit() {
        let store = MemoryStore::new();
        let engine = Arc::new(engine_with(&store, OtpPolicy::default()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.issue_code(PHONE).await })
            })
            .collect();

        let mut issued = 0;
        let mut limited = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => issued += 1,
                Err(AuthError::RateLimited { .. }) => limited += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(issued, 3);
        assert_eq!(limited, 5);
        assert_eq!(store.live_code_count().await, 1);
    }

    #[tokio::test]
    async fn test_reissue_overwrites_and_stale_code_fails() {
        let store = MemoryStore::new();
        let engine = engine_with(&store, OtpPolicy::default());

        let first = engine.issue_code(PHONE).await.unwrap();
        let second = engine.issue_code(PHONE).await.unwrap();

        assert_eq!(store.live_code_count().await, 1);

        if first.code != second.code {
            let err = engine.verify_code(PHONE, &first.code).await.unwrap_err();
            assert!(matches!(err, AuthError::CodeMismatch));
        }

        engine.verify_code(PHONE, &second.code).await.unwrap();
        let err = engine.verify_code(PHONE, &first.code).await.unwrap_err();
        assert!(matches!(err, AuthError::CodeNotFound));
    }

    #[tokio::test]
    async fn test_verified_code_is_single_use() {
        let store = MemoryStore::new();
        let engine = engine_with(&store, OtpPolicy::default());

        let code = engine.issue_code(PHONE).await.unwrap();
        engine.verify_code(PHONE, &code.code).await.unwrap();

        let err = engine.verify_code(PHONE, &code.code).await.unwrap_err();
        assert!(matches!(err, AuthError::CodeNotFound));
    }

    #[tokio::test]
    async fn test_unknown_phone_is_not_found() {
        let store = MemoryStore::new();
        let engine = engine_with(&store, OtpPolicy::default());

        let err = engine.verify_code(PHONE, "123456").await.unwrap_err();
        assert!(matches!(err, AuthError::CodeNotFound));
    }

    #[tokio::test]
    async fn test_mismatch_keeps_code_for_retry() {
        let store = MemoryStore::new();
        let engine = engine_with(&store, OtpPolicy::default());

        store
            .upsert_code(&OneTimeCode::new(
                PHONE,
                "111111",
                Utc::now(),
                chrono::Duration::minutes(2),
            ))
            .await
            .unwrap();

        let err = engine.verify_code(PHONE, "222222").await.unwrap_err();
        assert!(matches!(err, AuthError::CodeMismatch));
        assert!(store.get_code(PHONE).await.unwrap().is_some());

        engine.verify_code(PHONE, "111111").await.unwrap();
        assert!(store.get_code(PHONE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_code_is_removed() {
        let store = MemoryStore::new();
        let engine = engine_with(&store, OtpPolicy::default());

        let issued_at = Utc::now() - chrono::Duration::minutes(3);
        store
            .upsert_code(&OneTimeCode::new(
                PHONE,
                "042917",
                issued_at,
                chrono::Duration::minutes(2),
            ))
            .await
            .unwrap();

        let err = engine.verify_code(PHONE, "042917").await.unwrap_err();
        assert!(matches!(err, AuthError::CodeExpired));
        assert!(store.get_code(PHONE).await.unwrap().is_none());

        let err = engine.verify_code(PHONE, "042917").await.unwrap_err();
        assert!(matches!(err, AuthError::CodeNotFound));
    }

    #[tokio::test]
    async fn test_expired_by_short_ttl() {
        let store = MemoryStore::new();
        let policy = OtpPolicy {
            code_ttl: Duration::milliseconds(50),
            ..OtpPolicy::default()
        };
        let engine = engine_with(&store, policy);

        let code = engine.issue_code(PHONE).await.unwrap();

        // Wait for the code to expire
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let err = engine.verify_code(PHONE, &code.code).await.unwrap_err();
        assert!(matches!(err, AuthError::CodeExpired));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_verify_succeeds_once() {
        let store = MemoryStore::new();
        let engine = Arc::new(engine_with(&store, OtpPolicy::default()));
        let code = engine.issue_code(PHONE).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                let value = code.code.clone();
                tokio::spawn(async move { engine.verify_code(PHONE, &value).await })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => successes += 1,
                Err(AuthError::CodeNotFound) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(successes, 1);
    }
}
