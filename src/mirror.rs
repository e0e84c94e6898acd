// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Mirror (client) tier.
//!
//! A [`MirrorCache`] serves reads from a fast local [`MirrorStore`] while the
//! entry is fresh and otherwise reads through to the [`AuthoritativeCache`],
//! backfilling itself on the way back. Writes always land on the
//! authoritative tier first; the mirror is updated only after that succeeds,
//! so it can lag the source of truth but never run ahead of it.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::cache::{AuthoritativeCache, CacheResult, Tier};
use crate::error::CacheError;
use crate::key::{now_millis, CompositeKey};
use crate::metrics;
use crate::storage::traits::StorageError;
use crate::value::DataValue;

const TIER: &str = "mirror";

/// A decoded value held by a mirror.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorEntry {
    pub value: DataValue,
    pub expires_at: i64,
    pub last_updated: i64,
}

impl MirrorEntry {
    #[must_use]
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        self.expires_at > now_ms
    }
}

/// Client-side storage behind a mirror.
///
/// Holds plaintext values and is local to one execution context, so calls are
/// synchronous. Only `set` may fail (e.g. quota exceeded).
pub trait MirrorStore: Send + Sync {
    fn name(&self) -> &'static str;

    fn get(&self, key: &CompositeKey) -> Option<MirrorEntry>;

    fn set(&self, key: CompositeKey, entry: MirrorEntry) -> Result<(), StorageError>;

    fn remove(&self, key: &CompositeKey);

    fn clear(&self);
}

/// Process-local mirror store.
#[derive(Default)]
pub struct InMemoryMirrorStore {
    data: DashMap<CompositeKey, MirrorEntry>,
}

impl InMemoryMirrorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl MirrorStore for InMemoryMirrorStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &CompositeKey) -> Option<MirrorEntry> {
        self.data.get(key).map(|r| r.value().clone())
    }

    fn set(&self, key: CompositeKey, entry: MirrorEntry) -> Result<(), StorageError> {
        self.data.insert(key, entry);
        Ok(())
    }

    fn remove(&self, key: &CompositeKey) {
        self.data.remove(key);
    }

    fn clear(&self) {
        self.data.clear();
    }
}

pub struct MirrorCache {
    store: Arc<dyn MirrorStore>,
    authority: Arc<AuthoritativeCache>,
}

impl MirrorCache {
    pub fn new(store: Arc<dyn MirrorStore>, authority: Arc<AuthoritativeCache>) -> Self {
        Self { store, authority }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn MirrorStore> {
        &self.store
    }

    #[must_use]
    pub fn authority(&self) -> &Arc<AuthoritativeCache> {
        &self.authority
    }

    /// The fresh mirrored entry for `key`, dropping it if expired.
    #[must_use]
    pub fn peek(&self, key: &CompositeKey) -> Option<MirrorEntry> {
        let entry = self.store.get(key)?;
        if entry.is_fresh(now_millis()) {
            Some(entry)
        } else {
            self.store.remove(key);
            None
        }
    }

    /// Read-through get. Mirror hits carry the mirror's timestamps and zero
    /// hit counters; counters live in the authoritative tier.
    pub async fn get(&self, identifier: &str, store_name: &str) -> Result<CacheResult, CacheError> {
        let key = CompositeKey::new(identifier, store_name);

        if let Some(entry) = self.peek(&key) {
            metrics::record_hit(TIER);
            metrics::record_operation(TIER, "get", "hit");
            return Ok(CacheResult {
                identifier: key.identifier,
                store_name: key.store_name,
                value: Some(entry.value),
                expiration_date: entry.expires_at,
                last_updated_date: entry.last_updated,
                last_accessed_date: now_millis(),
                get_hit_count: 0,
                set_hit_count: 0,
                tier: Some(Tier::Mirror),
            });
        }

        metrics::record_miss(TIER);
        let result = self.authority.get(identifier, store_name).await?;
        if let Some(ref value) = result.value {
            self.backfill(key, value.clone(), result.expiration_date, result.last_updated_date);
        }
        Ok(result)
    }

    /// Best-effort mirror update; failures are logged.
    pub fn backfill(&self, key: CompositeKey, value: DataValue, expires_at: i64, last_updated: i64) {
        let entry = MirrorEntry {
            value,
            expires_at,
            last_updated,
        };
        if let Err(e) = self.store.set(key.clone(), entry) {
            warn!(key = %key, backend = self.store.name(), error = %e, "Mirror backfill failed");
            // a stale copy must not outlive a failed update
            self.store.remove(&key);
        } else {
            debug!(key = %key, "Mirror backfilled");
        }
    }

    /// Write-through set: authoritative tier first, then the mirror.
    pub async fn set(
        &self,
        identifier: &str,
        store_name: &str,
        value: DataValue,
        expiration_date: i64,
    ) -> Result<(), CacheError> {
        self.authority
            .set(identifier, store_name, value.clone(), expiration_date)
            .await?;
        self.backfill(CompositeKey::new(identifier, store_name), value, expiration_date, now_millis());
        metrics::record_operation(TIER, "set", "success");
        Ok(())
    }

    pub async fn remove(&self, identifier: &str, store_name: &str) -> Result<(), CacheError> {
        self.authority.remove(identifier, store_name).await?;
        self.store.remove(&CompositeKey::new(identifier, store_name));
        metrics::record_operation(TIER, "remove", "success");
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        self.authority.clear().await?;
        self.store.clear();
        metrics::record_operation(TIER, "clear", "success");
        Ok(())
    }
}
