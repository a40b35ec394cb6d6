//! In-memory store implementation.

use crate::error::{StoreError, StoreResult};
use crate::store::{CodeStore, IdentityStore};
use crate::types::{Identity, IssuanceRecord, IssueOutcome, OneTimeCode};
use crate::window::SlidingWindow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

#[derive(Debug, Default)]
struct CodeTables {
    /// Live codes indexed by phone number
    codes: HashMap<String, OneTimeCode>,
    /// Issuance log indexed by phone number, oldest first
    issuances: HashMap<String, Vec<IssuanceRecord>>,
}

impl CodeTables {
    fn count_since(&self, phone_number: &str, since: DateTime<Utc>) -> u64 {
        self.issuances
            .get(phone_number)
            .map(|log| log.iter().filter(|r| r.requested_at >= since).count() as u64)
            .unwrap_or(0)
    }
}

#[derive(Debug)]
struct IdentityTables {
    /// Identities indexed by key, iterated in key order
    by_key: BTreeMap<i64, Identity>,
    /// Phone number to key
    by_phone: HashMap<String, i64>,
    next_key: i64,
}

impl Default for IdentityTables {
    fn default() -> Self {
        Self {
            by_key: BTreeMap::new(),
            by_phone: HashMap::new(),
            next_key: 1,
        }
    }
}

/// Process-local store for codes and identities.
///
/// Each table sits behind one lock, so check-then-write sequences are
/// atomic for every phone number. Data is lost on restart.
#[derive(Clone, Default)]
pub struct MemoryStore {
    codes: Arc<RwLock<CodeTables>>,
    identities: Arc<RwLock<IdentityTables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of issuance records ever logged for a phone number.
    pub async fn issuance_log_len(&self, phone_number: &str) -> usize {
        let tables = self.codes.read().await;
        tables.issuances.get(phone_number).map(Vec::len).unwrap_or(0)
    }

    /// Number of live codes across all phone numbers.
    pub async fn live_code_count(&self) -> usize {
        self.codes.read().await.codes.len()
    }
}

#[async_trait]
impl CodeStore for MemoryStore {
    async fn count_issuances(&self, phone_number: &str, since: DateTime<Utc>) -> StoreResult<u64> {
        Ok(self.codes.read().await.count_since(phone_number, since))
    }

    async fn upsert_code(&self, code: &OneTimeCode) -> StoreResult<()> {
        let mut tables = self.codes.write().await;
        tables.codes.insert(code.phone_number.clone(), code.clone());
        Ok(())
    }

    async fn get_code(&self, phone_number: &str) -> StoreResult<Option<OneTimeCode>> {
        Ok(self.codes.read().await.codes.get(phone_number).cloned())
    }

    #[instrument(skip(self, code))]
    async fn delete_code(&self, phone_number: &str, code: &str) -> StoreResult<bool> {
        let mut tables = self.codes.write().await;
        let holds_code = tables
            .codes
            .get(phone_number)
            .map(|live| live.code == code)
            .unwrap_or(false);

        if holds_code {
            tables.codes.remove(phone_number);
            debug!("Deleted live code");
        }

        Ok(holds_code)
    }

    #[instrument(skip(self, code, window), fields(phone_number = %code.phone_number))]
    async fn issue(&self, code: &OneTimeCode, window: &SlidingWindow) -> StoreResult<IssueOutcome> {
        let mut tables = self.codes.write().await;

        let recent = tables.count_since(&code.phone_number, window.start(code.created_at));
        if !window.admits(recent) {
            debug!(recent, "Issuance window full");
            return Ok(IssueOutcome::Limited { recent });
        }

        tables
            .issuances
            .entry(code.phone_number.clone())
            .or_default()
            .push(IssuanceRecord {
                phone_number: code.phone_number.clone(),
                requested_at: code.created_at,
            });
        tables.codes.insert(code.phone_number.clone(), code.clone());

        debug!(recent = recent + 1, "Issuance recorded");
        Ok(IssueOutcome::Issued)
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    #[instrument(skip(self))]
    async fn create_identity(
        &self,
        phone_number: &str,
        registered_at: DateTime<Utc>,
    ) -> StoreResult<Identity> {
        let mut tables = self.identities.write().await;

        if tables.by_phone.contains_key(phone_number) {
            return Err(StoreError::Conflict(phone_number.to_string()));
        }

        let id = tables.next_key;
        tables.next_key += 1;

        let now = Utc::now();
        let identity = Identity {
            id,
            phone_number: phone_number.to_string(),
            registered_at,
            created_at: now,
            updated_at: now,
        };

        tables.by_phone.insert(phone_number.to_string(), id);
        tables.by_key.insert(id, identity.clone());

        debug!(id, "Identity created");
        Ok(identity)
    }

    async fn get_by_phone(&self, phone_number: &str) -> StoreResult<Option<Identity>> {
        let tables = self.identities.read().await;
        Ok(tables
            .by_phone
            .get(phone_number)
            .and_then(|id| tables.by_key.get(id))
            .cloned())
    }

    async fn get_by_key(&self, id: i64) -> StoreResult<Option<Identity>> {
        Ok(self.identities.read().await.by_key.get(&id).cloned())
    }

    async fn list(&self, page: u32, limit: u32, search: &str) -> StoreResult<(Vec<Identity>, u64)> {
        let tables = self.identities.read().await;
        let needle = search.to_lowercase();

        let matching: Vec<&Identity> = tables
            .by_key
            .values()
            .filter(|identity| identity.phone_number.to_lowercase().contains(&needle))
            .collect();

        let total = matching.len() as u64;
        let offset = (page.max(1) as usize - 1) * limit as usize;
        let items = matching
            .into_iter()
            .skip(offset)
            .take(limit as usize)
            .cloned()
            .collect();

        Ok((items, total))
    }

    async fn count(&self) -> StoreResult<u64> {
        Ok(self.identities.read().await.by_key.len() as u64)
    }
}
