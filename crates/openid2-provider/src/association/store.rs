//! Association storage
//!
//! This module provides the association store abstraction and an in-memory
//! implementation. Associations are keyed by `(endpoint, handle)`.

use super::Association;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
#[cfg(feature = "memory")]
use std::collections::HashMap;
#[cfg(feature = "memory")]
use std::sync::Arc;
#[cfg(feature = "memory")]
use tokio::sync::RwLock;

/// Association store trait.
///
/// Implementations may be shared between concurrent requests. `add` must
/// check for an existing entry and insert atomically, and `delete` must
/// report `true` to exactly one of several concurrent callers removing the
/// same entry.
#[async_trait]
pub trait AssociationStore: Send + Sync {
    /// Store a new association.
    ///
    /// Fails with [`StoreError::DuplicateHandle`] if an association with the
    /// same endpoint and handle is already present.
    async fn add(&self, association: Association) -> StoreResult<()>;

    /// Get the association for `endpoint` and `handle`, if any.
    async fn get(&self, endpoint: &str, handle: &str) -> StoreResult<Option<Association>>;

    /// Get all associations for `endpoint`.
    async fn find(&self, endpoint: &str) -> StoreResult<Vec<Association>>;

    /// Remove the association for `endpoint` and `handle`.
    ///
    /// Removing an absent association is not an error.
    ///
    /// # Returns
    ///
    /// Whether an association was removed by this call
    async fn delete(&self, endpoint: &str, handle: &str) -> StoreResult<bool>;
}

/// In-memory association store.
///
/// Suitable for single-process providers and testing. Providers running
/// several instances need a shared backend.
#[cfg(feature = "memory")]
#[derive(Clone, Default)]
pub struct MemoryAssociationStore {
    /// endpoint -> handle -> association
    associations: Arc<RwLock<HashMap<String, HashMap<String, Association>>>>,
}

#[cfg(feature = "memory")]
impl std::fmt::Debug for MemoryAssociationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAssociationStore").finish_non_exhaustive()
    }
}

#[cfg(feature = "memory")]
impl MemoryAssociationStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored associations across all endpoints.
    pub async fn len(&self) -> usize {
        self.associations
            .read()
            .await
            .values()
            .map(HashMap::len)
            .sum()
    }

    /// Check if the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(feature = "memory")]
#[async_trait]
impl AssociationStore for MemoryAssociationStore {
    async fn add(&self, association: Association) -> StoreResult<()> {
        let mut associations = self.associations.write().await;
        let handles = associations
            .entry(association.endpoint.clone())
            .or_default();

        if handles.contains_key(&association.handle) {
            return Err(StoreError::DuplicateHandle);
        }
        handles.insert(association.handle.clone(), association);
        Ok(())
    }

    async fn get(&self, endpoint: &str, handle: &str) -> StoreResult<Option<Association>> {
        let associations = self.associations.read().await;
        Ok(associations
            .get(endpoint)
            .and_then(|handles| handles.get(handle))
            .cloned())
    }

    async fn find(&self, endpoint: &str) -> StoreResult<Vec<Association>> {
        let associations = self.associations.read().await;
        Ok(associations
            .get(endpoint)
            .map(|handles| handles.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete(&self, endpoint: &str, handle: &str) -> StoreResult<bool> {
        let mut associations = self.associations.write().await;
        let Some(handles) = associations.get_mut(endpoint) else {
            return Ok(false);
        };

        let removed = handles.remove(handle).is_some();
        if handles.is_empty() {
            associations.remove(endpoint);
        }
        Ok(removed)
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::association::AssociationType;
    use chrono::{Duration, Utc};

    fn association(endpoint: &str, handle: &str) -> Association {
        Association {
            endpoint: endpoint.to_string(),
            handle: handle.to_string(),
            secret: vec![7u8; 32],
            assoc_type: AssociationType::HmacSha256,
            expires: Utc::now() + Duration::minutes(1),
        }
    }

    #[tokio::test]
    async fn test_add_and_get() {
        let store = MemoryAssociationStore::new();
        store.add(association("", "h1")).await.unwrap();

        let found = store.get("", "h1").await.unwrap();
        assert_eq!(found.map(|a| a.handle), Some("h1".to_string()));
        assert!(store.get("", "h2").await.unwrap().is_none());
        assert!(store.get("https://rp.example", "h1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_handle_rejected() {
        let store = MemoryAssociationStore::new();
        store.add(association("", "h1")).await.unwrap();

        let result = store.add(association("", "h1")).await;
        assert_eq!(result, Err(StoreError::DuplicateHandle));

        // Same handle under a different endpoint is a distinct key
        store.add(association("https://rp.example", "h1")).await.unwrap();
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_find_by_endpoint() {
        let store = MemoryAssociationStore::new();
        store.add(association("", "h1")).await.unwrap();
        store.add(association("", "h2")).await.unwrap();
        store.add(association("https://rp.example", "h3")).await.unwrap();

        let mut handles: Vec<String> = store
            .find("")
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.handle)
            .collect();
        handles.sort();

        assert_eq!(handles, vec!["h1".to_string(), "h2".to_string()]);
        assert!(store.find("https://other.example").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryAssociationStore::new();
        store.add(association("", "h1")).await.unwrap();

        assert!(store.delete("", "h1").await.unwrap());
        assert!(!store.delete("", "h1").await.unwrap());
        assert!(!store.delete("missing", "h1").await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_delete_single_winner() {
        let store = MemoryAssociationStore::new();
        store.add(association("", "h1")).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move { store.delete("", "h1").await.unwrap() }));
        }

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
