//! Paginated identity lookups.

use crate::error::{AuthError, AuthResult};
use otp_store::{Identity, IdentityStore};
use serde::Serialize;
use std::sync::Arc;

pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

/// Normalized page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Page below 1 becomes 1; a limit outside `1..=100` becomes 10.
    pub fn normalize(page: i64, limit: i64) -> Self {
        let page = u32::try_from(page.max(1)).unwrap_or(u32::MAX);
        let limit = if (1..=i64::from(MAX_LIMIT)).contains(&limit) {
            limit as u32
        } else {
            DEFAULT_LIMIT
        };
        Self { page, limit }
    }
}

/// One page of identities.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityPage {
    pub users: Vec<Identity>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

/// Read-only access to registered identities.
pub struct Directory {
    store: Arc<dyn IdentityStore>,
}

impl Directory {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// List identities whose phone number contains `search`, by ascending key.
    pub async fn list(&self, page: i64, limit: i64, search: &str) -> AuthResult<IdentityPage> {
        let request = PageRequest::normalize(page, limit);
        let (users, total) = self.store.list(request.page, request.limit, search).await?;

        Ok(IdentityPage {
            users,
            total,
            page: request.page,
            limit: request.limit,
            total_pages: total.div_ceil(u64::from(request.limit)),
        })
    }

    pub async fn get(&self, id: i64) -> AuthResult<Identity> {
        self.store
            .get_by_key(id)
            .await?
            .ok_or(AuthError::IdentityNotFound(id))
    }

    pub async fn count(&self) -> AuthResult<u64> {
        Ok(self.store.count().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use otp_store::MemoryStore;

    async fn directory_with(count: usize) -> Directory {
        let store = MemoryStore::new();
        for i in 0..count {
            store
                .create_identity(&format!("+1555{:07}", i), Utc::now())
                .await
                .unwrap();
        }
        Directory::new(Arc::new(store))
    }

    #[test]
    fn test_normalize_out_of_range() {
        assert_eq!(
            PageRequest::normalize(0, 1000),
            PageRequest { page: 1, limit: 10 }
        );
        assert_eq!(
            PageRequest::normalize(-5, 0),
            PageRequest { page: 1, limit: 10 }
        );
        assert_eq!(
            PageRequest::normalize(3, 101),
            PageRequest { page: 3, limit: 10 }
        );
    }

    #[test]
    fn test_normalize_in_range() {
        assert_eq!(
            PageRequest::normalize(2, 1),
            PageRequest { page: 2, limit: 1 }
        );
        assert_eq!(
            PageRequest::normalize(1, 100),
            PageRequest { page: 1, limit: 100 }
        );
    }

    #[tokio::test]
    async fn test_list_normalizes_and_counts_pages() {
        let directory = directory_with(23).await;

        let page = directory.list(0, 1000, "").await.unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, 10);
        assert_eq!(page.total, 23);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.users.len(), 10);
        assert!(page.users.windows(2).all(|w| w[0].id < w[1].id));
        assert_eq!(page.users[0].id, 1);
    }

    #[tokio::test]
    async fn test_list_exact_multiple_of_limit() {
        let directory = directory_with(20).await;
        let page = directory.list(2, 10, "").await.unwrap();

        assert_eq!(page.total_pages, 2);
        assert_eq!(page.users.first().map(|u| u.id), Some(11));
    }

    #[tokio::test]
    async fn test_list_empty() {
        let directory = directory_with(0).await;
        let page = directory.list(1, 10, "").await.unwrap();

        assert_eq!(page.total, 0);
        assert_eq!(page.total_pages, 0);
        assert!(page.users.is_empty());
    }

    #[tokio::test]
    async fn test_list_search() {
        let directory = directory_with(12).await;
        let page = directory.list(1, 10, "11").await.unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.users[0].phone_number, "+15550000011");
    }

    #[tokio::test]
    async fn test_get_by_key() {
        let directory = directory_with(2).await;

        assert_eq!(directory.get(2).await.unwrap().phone_number, "+15550000001");
        assert!(matches!(
            directory.get(9).await,
            Err(AuthError::IdentityNotFound(9))
        ));
        assert_eq!(directory.count().await.unwrap(), 2);
    }
}
