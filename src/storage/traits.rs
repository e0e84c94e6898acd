// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use thiserror::Error;

use crate::codec::SealedEntry;
use crate::crypto::EncryptedPayload;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Durable store behind the authoritative tier.
///
/// Implementations hold sealed payloads only; they never see plaintext. Keys
/// are `(identifier, store_name)` pairs. Expiry is enforced by the cache, so a
/// store may return entries whose `expires_at` has passed.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// A name for logs and metrics, e.g. "memory".
    fn name(&self) -> &'static str;

    async fn get(&self, identifier: &str, store_name: &str) -> Result<Option<SealedEntry>, StorageError>;

    async fn set(
        &self,
        identifier: &str,
        store_name: &str,
        payload: &EncryptedPayload,
        expires_at: i64,
    ) -> Result<(), StorageError>;

    /// Removing a missing key is not an error.
    async fn remove(&self, identifier: &str, store_name: &str) -> Result<(), StorageError>;

    async fn clear(&self) -> Result<(), StorageError>;
}
