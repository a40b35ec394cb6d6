//! HTTP API for the authentication service.

mod handlers;
mod middleware;
mod types;

pub use handlers::*;
pub use middleware::{logging_middleware, rate_limit_middleware, require_session, RateLimitState};
pub use types::*;

use crate::directory::Directory;
use crate::otp::OtpEngine;
use crate::session::{JwtSigner, SessionIssuer};
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use otp_store::Stores;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Code issuance and verification
    pub otp: Arc<OtpEngine>,
    /// Login and implicit registration
    pub sessions: Arc<SessionIssuer>,
    /// Identity lookups
    pub directory: Arc<Directory>,
    /// Session token signer, also used to verify bearer tokens
    pub tokens: Arc<JwtSigner>,
    /// Name of the active store backend
    pub store_driver: String,
}

impl AppState {
    /// Create new application state.
    pub fn new(otp: OtpEngine, stores: &Stores, tokens: JwtSigner) -> Self {
        let otp = Arc::new(otp);
        let tokens = Arc::new(tokens);
        let sessions = SessionIssuer::new(otp.clone(), stores.identities.clone(), tokens.clone());

        Self {
            otp,
            sessions: Arc::new(sessions),
            directory: Arc::new(Directory::new(stores.identities.clone())),
            tokens,
            store_driver: stores.driver.clone(),
        }
    }
}

/// Create the API router with default rate limiting.
pub fn create_router(state: AppState) -> Router {
    create_router_with_rate_limit(state, RateLimitState::new(60))
}

/// Create the API router with custom rate limiting.
pub fn create_router_with_rate_limit(state: AppState, rate_limit: RateLimitState) -> Router {
    let users = Router::new()
        .route("/me", get(handlers::current_user))
        .route("/list", get(handlers::list_users))
        .route("/:id", get(handlers::get_user))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    let auth = Router::new()
        .route("/send-otp", post(handlers::send_otp))
        .route("/verify-otp", post(handlers::verify_otp));

    Router::new()
        // Health check (no rate limiting)
        .route("/health", get(handlers::health))
        .nest(
            "/api/v1",
            Router::new()
                .nest("/auth", auth)
                .nest("/users", users)
                .layer(axum_middleware::from_fn_with_state(
                    rate_limit,
                    rate_limit_middleware,
                )),
        )
        .layer(axum_middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
