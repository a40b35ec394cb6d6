//! Phone number authentication with one-time codes.
//!
//! A caller asks for a six-digit code for a phone number, then submits it to
//! receive a signed session token. The first successful login registers the
//! number as a new identity.
//! - Codes expire after a short lifetime and are single use
//! - Code issuance is limited per phone number over a sliding window
//! - Identities can be listed and looked up by bearer-authenticated callers

pub mod api;
pub mod config;
pub mod directory;
pub mod error;
pub mod otp;
pub mod session;

pub use config::Config;
pub use directory::{Directory, IdentityPage, PageRequest};
pub use error::{AuthError, AuthResult};
pub use otp::{generate_code, OtpEngine, OtpPolicy};
pub use session::{AuthSession, JwtSigner, SessionClaims, SessionIssuer, Signer};
