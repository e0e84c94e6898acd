// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::codec::SealedEntry;
use crate::crypto::EncryptedPayload;
use crate::key::CompositeKey;
use super::traits::{BackingStore, StorageError};

/// Process-local backing store. Useful for tests and single-process setups.
pub struct InMemoryStore {
    data: DashMap<CompositeKey, SealedEntry>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Get current entry count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn contains(&self, identifier: &str, store_name: &str) -> bool {
        self.data.contains_key(&CompositeKey::new(identifier, store_name))
    }

    /// Raw stored entry, bypassing the async trait.
    #[must_use]
    pub fn peek(&self, identifier: &str, store_name: &str) -> Option<SealedEntry> {
        self.data
            .get(&CompositeKey::new(identifier, store_name))
            .map(|r| r.value().clone())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackingStore for InMemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, identifier: &str, store_name: &str) -> Result<Option<SealedEntry>, StorageError> {
        Ok(self.peek(identifier, store_name))
    }

    async fn set(
        &self,
        identifier: &str,
        store_name: &str,
        payload: &EncryptedPayload,
        expires_at: i64,
    ) -> Result<(), StorageError> {
        self.data.insert(
            CompositeKey::new(identifier, store_name),
            SealedEntry {
                payload: payload.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn remove(&self, identifier: &str, store_name: &str) -> Result<(), StorageError> {
        self.data.remove(&CompositeKey::new(identifier, store_name));
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.data.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Algorithm, SealedData};

    fn payload(tag: &str) -> EncryptedPayload {
        EncryptedPayload {
            sealed: SealedData {
                key_id: 0,
                algorithm: Algorithm::Aes256Gcm,
                nonce: vec![0; 12],
                ciphertext: tag.as_bytes().to_vec(),
                auth_tag: vec![0; 16],
            },
            value_type: "string".into(),
            compressed: false,
        }
    }

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = InMemoryStore::new();
        store.set("user:1", "profile", &payload("a"), 99).await.unwrap();

        let entry = store.get("user:1", "profile").await.unwrap().unwrap();
        assert_eq!(entry.payload, payload("a"));
        assert_eq!(entry.expires_at, 99);
    }

    #[tokio::test]
    async fn test_store_name_is_part_of_key() {
        let store = InMemoryStore::new();
        store.set("user:1", "profile", &payload("a"), 0).await.unwrap();

        assert!(store.get("user:1", "settings").await.unwrap().is_none());
        assert!(store.contains("user:1", "profile"));
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = InMemoryStore::new();
        store.set("k", "s", &payload("v1"), 0).await.unwrap();
        store.set("k", "s", &payload("v2"), 0).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.peek("k", "s").unwrap().payload, payload("v2"));
    }

    #[tokio::test]
    async fn test_remove_nonexistent_is_ok() {
        let store = InMemoryStore::new();
        assert!(store.remove("nope", "s").await.is_ok());
    }

    #[tokio::test]
    async fn test_clear() {
        let store = InMemoryStore::new();
        for i in 0..10 {
            store.set(&format!("item-{}", i), "s", &payload("x"), 0).await.unwrap();
        }
        assert_eq!(store.len(), 10);

        store.clear().await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryStore::new());
        let mut handles = vec![];

        for batch in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    let id = format!("batch-{}-item-{}", batch, i);
                    store.set(&id, "s", &payload("x"), 0).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len(), 100);
    }
}
