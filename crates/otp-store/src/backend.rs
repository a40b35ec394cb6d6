//! Store backend selection.
//!
//! A driver name from configuration is looked up once at startup in a
//! [`StoreRegistry`] to open the matching backend.

use crate::error::{StoreError, StoreResult};
use crate::memory::MemoryStore;
use crate::postgres::PgStore;
use crate::store::{CodeStore, IdentityStore};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const MEMORY_DRIVER: &str = "memory";
pub const POSTGRES_DRIVER: &str = "postgres";

/// Storage configuration.
#[derive(Debug, Deserialize)]
pub struct StoreSettings {
    /// Backend driver name
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Connection string (required by the postgres driver)
    pub database_url: Option<SecretString>,

    /// Maximum pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a store call may wait for a pooled connection
    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,

    /// Create missing tables on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            database_url: None,
            max_connections: default_max_connections(),
            acquire_timeout: default_acquire_timeout(),
            run_migrations: true,
        }
    }
}

fn default_driver() -> String {
    MEMORY_DRIVER.into()
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_true() -> bool {
    true
}

/// The opened stores. Both handles may point at the same backend.
#[derive(Clone)]
pub struct Stores {
    pub driver: String,
    pub codes: Arc<dyn CodeStore>,
    pub identities: Arc<dyn IdentityStore>,
}

impl Stores {
    pub fn memory() -> Self {
        Self::from_memory(MemoryStore::new())
    }

    pub fn from_memory(store: MemoryStore) -> Self {
        Self {
            driver: MEMORY_DRIVER.into(),
            codes: Arc::new(store.clone()),
            identities: Arc::new(store),
        }
    }
}

/// Opens a backend from settings.
#[async_trait]
pub trait StoreBuilder: Send + Sync {
    async fn build(&self, settings: &StoreSettings) -> StoreResult<Stores>;
}

pub struct MemoryBuilder;

#[async_trait]
impl StoreBuilder for MemoryBuilder {
    async fn build(&self, _settings: &StoreSettings) -> StoreResult<Stores> {
        Ok(Stores::memory())
    }
}

pub struct PostgresBuilder;

#[async_trait]
impl StoreBuilder for PostgresBuilder {
    async fn build(&self, settings: &StoreSettings) -> StoreResult<Stores> {
        let url = settings
            .database_url
            .as_ref()
            .ok_or_else(|| StoreError::Config("postgres driver requires database_url".into()))?;

        let store = PgStore::connect(
            url.expose_secret(),
            settings.max_connections,
            settings.acquire_timeout,
        )
        .await?;

        if settings.run_migrations {
            store.migrate().await?;
        }

        Ok(Stores {
            driver: POSTGRES_DRIVER.into(),
            codes: Arc::new(store.clone()),
            identities: Arc::new(store),
        })
    }
}

/// Driver name to backend builder.
pub struct StoreRegistry {
    builders: HashMap<String, Box<dyn StoreBuilder>>,
}

impl StoreRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Registry with the memory and postgres drivers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(MEMORY_DRIVER, MemoryBuilder);
        registry.register(POSTGRES_DRIVER, PostgresBuilder);
        registry
    }

    pub fn register(&mut self, driver: impl Into<String>, builder: impl StoreBuilder + 'static) {
        self.builders.insert(driver.into(), Box::new(builder));
    }

    pub fn drivers(&self) -> Vec<&str> {
        let mut drivers: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        drivers.sort_unstable();
        drivers
    }

    /// Open the backend named by `settings.driver`.
    pub async fn open(&self, settings: &StoreSettings) -> StoreResult<Stores> {
        let builder = self
            .builders
            .get(&settings.driver)
            .ok_or_else(|| StoreError::UnknownDriver(settings.driver.clone()))?;

        let stores = builder.build(settings).await?;
        info!(driver = %settings.driver, "Store opened");
        Ok(stores)
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_drivers() {
        let registry = StoreRegistry::with_defaults();
        assert_eq!(registry.drivers(), vec!["memory", "postgres"]);
    }

    #[test]
    fn test_default_settings() {
        let settings = StoreSettings::default();
        assert_eq!(settings.driver, "memory");
        assert!(settings.database_url.is_none());
        assert_eq!(settings.acquire_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_open_memory() {
        let stores = StoreRegistry::with_defaults()
            .open(&StoreSettings::default())
            .await
            .unwrap();

        assert_eq!(stores.driver, "memory");
        assert_eq!(stores.identities.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_open_unknown_driver() {
        let settings = StoreSettings {
            driver: "mysql".into(),
            ..StoreSettings::default()
        };

        let result = StoreRegistry::with_defaults().open(&settings).await;
        assert!(matches!(result, Err(StoreError::UnknownDriver(d)) if d == "mysql"));
    }

    #[tokio::test]
    async fn test_postgres_requires_url() {
        let settings = StoreSettings {
            driver: "postgres".into(),
            ..StoreSettings::default()
        };

        let result = StoreRegistry::with_defaults().open(&settings).await;
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[tokio::test]
    async fn test_empty_registry_has_no_drivers() {
        let result = StoreRegistry::new().open(&StoreSettings::default()).await;
        assert!(matches!(result, Err(StoreError::UnknownDriver(_))));
    }
}
