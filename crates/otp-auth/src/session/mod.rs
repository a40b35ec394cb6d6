//! Login and implicit registration after code verification.

mod signer;

pub use signer::{JwtSigner, SessionClaims, Signer};

#[cfg(test)]
pub use signer::MockSigner;

use crate::error::{AuthError, AuthResult};
use crate::otp::OtpEngine;
use chrono::Utc;
use otp_store::{Identity, IdentityStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// A signed token and the identity it was minted for.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub user: Identity,
}

/// Verifies codes, resolves or registers the identity and signs a token.
pub struct SessionIssuer {
    otp: Arc<OtpEngine>,
    identities: Arc<dyn IdentityStore>,
    signer: Arc<dyn Signer>,
}

impl SessionIssuer {
    pub fn new(
        otp: Arc<OtpEngine>,
        identities: Arc<dyn IdentityStore>,
        signer: Arc<dyn Signer>,
    ) -> Self {
        Self {
            otp,
            identities,
            signer,
        }
    }

    /// Authenticate `phone_number` with `code`.
    ///
    /// The code is consumed before the identity lookup, so a failure past
    /// verification still leaves it spent.
    #[instrument(skip(self, code))]
    pub async fn authenticate(&self, phone_number: &str, code: &str) -> AuthResult<AuthSession> {
        self.otp.verify_code(phone_number, code).await?;

        let user = match self.identities.get_by_phone(phone_number).await? {
            Some(identity) => identity,
            None => self.register(phone_number).await?,
        };

        let token = self.signer.sign(user.id, &user.phone_number)?;

        info!(user_id = user.id, "Session issued");
        Ok(AuthSession { token, user })
    }

    /// Create the identity for a first login. If a concurrent login for the
    /// same number registered it first, that identity is used instead.
    async fn register(&self, phone_number: &str) -> AuthResult<Identity> {
        match self.identities.create_identity(phone_number, Utc::now()).await {
            Ok(identity) => {
                info!(user_id = identity.id, "New identity registered");
                Ok(identity)
            }
            Err(e) if e.is_conflict() => {
                debug!("Identity registered concurrently");
                self.identities
                    .get_by_phone(phone_number)
                    .await
                    .map_err(AuthError::IdentityCreation)?
                    .ok_or(AuthError::IdentityCreation(e))
            }
            Err(e) => Err(AuthError::IdentityCreation(e)),
        }
    }
}
