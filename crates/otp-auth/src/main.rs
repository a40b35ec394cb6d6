//! OTP authentication service - Entry point.

use otp_auth::{
    api::{create_router_with_rate_limit, AppState, RateLimitState},
    config::Config,
    JwtSigner, OtpEngine, OtpPolicy,
};
use otp_store::StoreRegistry;
use secrecy::ExposeSecret;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting OTP authentication service");

    // Open the configured store backend
    let registry = StoreRegistry::with_defaults();
    let stores = match registry.open(&config.store).await {
        Ok(s) => s,
        Err(e) => {
            error!(driver = %config.store.driver, "Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    let policy = match OtpPolicy::try_from(&config.otp) {
        Ok(p) => p,
        Err(e) => {
            error!("Invalid OTP policy: {:#}", e);
            std::process::exit(1);
        }
    };
    info!(
        code_ttl_secs = policy.code_ttl.num_seconds(),
        max_requests = policy.window.max_events,
        window_minutes = policy.window.minutes(),
        "OTP policy"
    );
    let engine = OtpEngine::new(stores.codes.clone(), policy);

    let signer = JwtSigner::new(
        config.session.jwt_secret.expose_secret(),
        config.session.issuer.clone(),
        config.session.token_ttl,
    );

    // Create application state
    let state = AppState::new(engine, &stores, signer);

    // Create rate limiter from config
    let rate_limit = RateLimitState::new(config.rate_limit.global_per_minute);

    // Create router with rate limiting
    let app = create_router_with_rate_limit(state, rate_limit);

    // Bind to address
    let addr = SocketAddr::new(
        config.server.listen_addr.parse().unwrap_or([0, 0, 0, 0].into()),
        config.server.port,
    );

    info!("Listening on {}", addr);

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    // Run server
    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
