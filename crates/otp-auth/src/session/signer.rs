//! Session token signing.

use crate::error::{AuthError, AuthResult};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,          // Subject (identity key as string)
    pub user_id: i64,         // Identity key
    pub phone_number: String, // Verified phone number
    pub exp: i64,             // Expiration timestamp
    pub iat: i64,             // Issued at timestamp
    pub iss: String,          // Issuer
    pub jti: String,          // Unique token identifier
}

/// Mints session tokens binding an identity key to its phone number.
#[cfg_attr(test, mockall::automock)]
pub trait Signer: Send + Sync {
    fn sign(&self, identity_key: i64, phone_number: &str) -> AuthResult<String>;
}

/// HS256 JWT signer.
#[derive(Clone)]
pub struct JwtSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl JwtSigner {
    pub fn new(secret: &str, issuer: impl Into<String>, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            ttl,
        }
    }

    /// Verify and decode a session token.
    pub fn verify(&self, token: &str) -> AuthResult<SessionClaims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);

        decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::Unauthorized(e.to_string()))
    }
}

impl Signer for JwtSigner {
    fn sign(&self, identity_key: i64, phone_number: &str) -> AuthResult<String> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| AuthError::Signing(format!("token_ttl out of range: {e}")))?;

        let claims = SessionClaims {
            sub: identity_key.to_string(),
            user_id: identity_key,
            phone_number: phone_number.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(secret: &str) -> JwtSigner {
        JwtSigner::new(secret, "otp-auth-test", Duration::from_secs(3600))
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = signer("test_secret_key");
        let token = signer.sign(7, "+15551230000").unwrap();

        let claims = signer.verify(&token).unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.phone_number, "+15551230000");
        assert_eq!(claims.iss, "otp-auth-test");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_tokens_are_unique() {
        let signer = signer("test_secret_key");
        let a = signer.verify(&signer.sign(1, "+15551230000").unwrap()).unwrap();
        let b = signer.verify(&signer.sign(1, "+15551230000").unwrap()).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_invalid_token() {
        let result = signer("test_secret_key").verify("invalid_token");
        assert!(matches!(result, Err(AuthError::Unauthorized(_))));
    }

    #[test]
    fn test_wrong_secret() {
        let token = signer("secret1").sign(1, "+15551230000").unwrap();
        assert!(signer("secret2").verify(&token).is_err());
    }

    #[test]
    fn test_wrong_issuer() {
        let token = JwtSigner::new("secret", "someone-else", Duration::from_secs(3600))
            .sign(1, "+15551230000")
            .unwrap();
        assert!(signer("secret").verify(&token).is_err());
    }
}
