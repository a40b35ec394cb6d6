//! Configuration for the authentication service.

use anyhow::{Context, Result};
use otp_store::{SlidingWindow, StoreSettings};
use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

/// Service configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage backend configuration
    #[serde(default)]
    pub store: StoreSettings,

    /// One-time code policy
    #[serde(default)]
    pub otp: OtpConfig,

    /// Session token configuration
    pub session: SessionConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    /// How long an issued code stays valid
    #[serde(default = "default_code_ttl", with = "humantime_serde")]
    pub code_ttl: Duration,

    /// Length of the sliding issuance window
    #[serde(default = "default_window", with = "humantime_serde")]
    pub window: Duration,

    /// Codes allowed per phone number within the window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
}

#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    /// HMAC secret for session tokens
    pub jwt_secret: SecretString,

    /// Token issuer claim
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// Token lifetime
    #[serde(default = "default_token_ttl", with = "humantime_serde")]
    pub token_ttl: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Global requests per minute across all clients
    #[serde(default = "default_global_rpm")]
    pub global_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default implementations
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_port(),
        }
    }
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            code_ttl: default_code_ttl(),
            window: default_window(),
            max_requests: default_max_requests(),
        }
    }
}

impl OtpConfig {
    pub fn sliding_window(&self) -> SlidingWindow {
        SlidingWindow::new(self.max_requests, self.window)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global_per_minute: default_global_rpm(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_listen_addr() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8080
}

fn default_code_ttl() -> Duration {
    Duration::from_secs(2 * 60)
}

fn default_window() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_max_requests() -> u32 {
    3
}

fn default_issuer() -> String {
    "otp-auth".into()
}

fn default_token_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_global_rpm() -> u32 {
    60
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(false),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
