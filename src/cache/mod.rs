// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Authoritative (server) tier.
//!
//! The [`AuthoritativeCache`] is the source of truth. It validates its
//! configuration, keeps decoded values in a bounded local cache, tracks per-key
//! hit counters, and routes every write through the [`EntryCodec`] and the
//! [`BatchWriter`] to a [`BackingStore`].
//!
//! # Read path
//!
//! ```text
//! get(id, store)
//!    │
//!    ├─► local cache ───────────── hit ──► counters++ ──► value
//!    │        └─ expired ──► implicit remove ──► absent
//!    ├─► staged batch entry ───── hit ──► decode ──► repopulate local
//!    └─► backing store (no retry) hit ──► decode ──► repopulate local
//!             └─ expired ──► implicit remove ──► absent
//! ```
//!
//! # Per-key state
//!
//! ```text
//! Absent ──set──► Present(fresh) ──now ≥ expiration──► Present(expired)
//!   ▲                  │                                      │
//!   └── remove/clear ──┴──────────── get (implicit remove) ◄──┘
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sealed_cache::{AuthoritativeCache, CacheConfig, DataValue, InMemoryStore};
//! use sealed_cache::key::now_millis;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let cache = AuthoritativeCache::new(&CacheConfig::default(), Arc::new(InMemoryStore::new())).unwrap();
//!
//! cache.set("user:1", "profile", DataValue::String("a".into()), now_millis() + 60_000).await.unwrap();
//! let hit = cache.get("user:1", "profile").await.unwrap();
//! assert_eq!(hit.value, Some(DataValue::String("a".into())));
//! assert_eq!((hit.get_hit_count, hit.set_hit_count), (1, 1));
//! # }
//! ```

mod types;

pub use types::{BatchResult, CacheResult, EntryStatus, Tier};

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::batching::{BatchWriter, FlushReason, FlushReport};
use crate::codec::EntryCodec;
use crate::config::{CacheConfig, CacheSettings};
use crate::crypto::key_manager::KeyManager;
use crate::error::CacheError;
use crate::eviction::local::{LocalCache, LocalLookup};
use crate::key::{is_valid_timestamp, now_millis, CompositeKey};
use crate::metrics::{self, LatencyTimer};
use crate::resilience::retry::retry;
use crate::storage::traits::BackingStore;
use crate::value::DataValue;

const TIER: &str = "authoritative";

/// Counters and timestamps for a present key.
#[derive(Debug, Clone, Copy, Default)]
struct EntryStats {
    get_hits: u64,
    set_hits: u64,
    last_updated: i64,
    last_accessed: i64,
}

pub struct AuthoritativeCache {
    settings: CacheSettings,
    codec: EntryCodec,
    local: LocalCache,
    writer: Arc<BatchWriter>,
    store: Arc<dyn BackingStore>,
    stats: DashMap<CompositeKey, EntryStats>,
    rotation_task: Mutex<Option<JoinHandle<()>>>,
}

impl AuthoritativeCache {
    /// Validate `config` and build a cache with no background tasks.
    ///
    /// Key material is loaded or generated on first use. Writes are flushed
    /// when the batch fills or on an explicit [`flush`](Self::flush); use
    /// [`open`](Self::open) for the timer-driven runtime.
    pub fn new(config: &CacheConfig, store: Arc<dyn BackingStore>) -> Result<Self, CacheError> {
        let settings = config.validate()?;
        let keys = Arc::new(KeyManager::new(settings.key_manager_config()));
        Ok(Self::build(settings, keys, store))
    }

    /// Validate `config`, best-effort load key material, and start the flush
    /// timer plus the rotation ticker when `rotation_interval_ms` is set.
    #[tracing::instrument(skip(config, store), fields(backend = store.name()))]
    pub async fn open(config: &CacheConfig, store: Arc<dyn BackingStore>) -> Result<Arc<Self>, CacheError> {
        let settings = config.validate()?;
        let keys = Arc::new(KeyManager::open(settings.key_manager_config()).await);
        let cache = Arc::new(Self::build(settings, keys, store));

        cache.writer.start();
        if let Some(period) = cache.settings.rotation_interval {
            cache.start_rotation(period);
        }
        info!(
            cache_size = cache.settings.cache_size,
            policy = %cache.settings.eviction_policy,
            algorithm = %cache.settings.algorithm,
            "Authoritative cache opened"
        );
        Ok(cache)
    }

    fn build(settings: CacheSettings, keys: Arc<KeyManager>, store: Arc<dyn BackingStore>) -> Self {
        let mut codec = EntryCodec::new(keys, settings.algorithm);
        if let Some(level) = settings.compression_level {
            codec = codec.with_compression(level);
        }
        let local = LocalCache::new(settings.cache_size, settings.ttl, settings.eviction_policy);
        let writer = Arc::new(BatchWriter::new(Arc::clone(&store), settings.batch_writer_config()));

        Self {
            settings,
            codec,
            local,
            writer,
            store,
            stats: DashMap::new(),
            rotation_task: Mutex::new(None),
        }
    }

    fn start_rotation(&self, period: std::time::Duration) {
        let keys = Arc::clone(self.codec.key_manager());
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = keys.rotate().await {
                    warn!(error = %e, "Scheduled key rotation failed");
                }
            }
        });
        if let Some(previous) = self.rotation_task.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop background tasks and flush every staged write.
    ///
    /// Returns the number of entries persisted by the final flush.
    #[tracing::instrument(skip(self))]
    pub async fn close(&self) -> Result<usize, CacheError> {
        if let Some(handle) = self.rotation_task.lock().take() {
            handle.abort();
        }
        let persisted = self.writer.stop().await?;
        info!(persisted, "Authoritative cache closed");
        Ok(persisted)
    }

    #[must_use]
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    #[must_use]
    pub fn key_manager(&self) -> &Arc<KeyManager> {
        self.codec.key_manager()
    }

    /// Entries held in the local cache.
    #[must_use]
    pub fn len(&self) -> usize {
        self.local.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    /// Writes staged but not yet flushed.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.writer.len()
    }

    // ========== Reads ==========

    /// Look up a key. Missing, expired and undecryptable entries come back
    /// absent; only backing-store failures are errors.
    #[tracing::instrument(skip(self), fields(tier))]
    pub async fn get(&self, identifier: &str, store_name: &str) -> Result<CacheResult, CacheError> {
        let _timer = LatencyTimer::new(TIER, "get");
        let key = CompositeKey::new(identifier, store_name);

        match self.local.get(&key) {
            LocalLookup::Hit(hit) => {
                tracing::Span::current().record("tier", "local");
                metrics::record_hit("local");
                metrics::record_operation(TIER, "get", "hit");
                return Ok(self.record_get_hit(&key, hit.value, hit.expires_at));
            }
            LocalLookup::Expired => return Ok(self.expire(&key).await),
            LocalLookup::Miss => {}
        }

        if let Some(staged) = self.writer.pending(&key) {
            if staged.expires_at <= now_millis() {
                return Ok(self.expire(&key).await);
            }
            tracing::Span::current().record("tier", "pending");
            return Ok(self.promote(&key, &staged.payload, staged.expires_at, "pending").await);
        }

        let stored = match self.store.get(identifier, store_name).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Backing store lookup failed");
                metrics::record_store_error(self.store.name(), "get");
                metrics::record_operation(TIER, "get", "error");
                return Err(e.into());
            }
        };

        match stored {
            None => {
                debug!("Miss");
                metrics::record_miss(TIER);
                metrics::record_operation(TIER, "get", "miss");
                self.forget_stats(&key);
                Ok(CacheResult::absent(&key))
            }
            Some(entry) if entry.expires_at <= now_millis() => Ok(self.expire(&key).await),
            Some(entry) => {
                tracing::Span::current().record("tier", "store");
                Ok(self.promote(&key, &entry.payload, entry.expires_at, "store").await)
            }
        }
    }

    /// Decode a staged or stored payload, repopulate the local cache and
    /// count the hit. Undecodable payloads read as absent.
    async fn promote(
        &self,
        key: &CompositeKey,
        payload: &crate::crypto::EncryptedPayload,
        expires_at: i64,
        source: &str,
    ) -> CacheResult {
        match self.codec.decode_entry(payload).await {
            Ok(value) => {
                self.local.insert(key.clone(), value.clone(), expires_at);
                metrics::set_local_cache_items(self.local.len());
                metrics::record_hit(source);
                metrics::record_operation(TIER, "get", "hit");
                debug!(source, "Promoted to local cache");
                self.record_get_hit(key, value, expires_at)
            }
            Err(e) => {
                warn!(key = %key, key_id = payload.key_id(), error = %e, "Entry could not be decoded, treating as absent");
                metrics::record_operation(TIER, "get", "undecodable");
                self.forget_stats(key);
                CacheResult::absent(key)
            }
        }
    }

    fn record_get_hit(&self, key: &CompositeKey, value: DataValue, expires_at: i64) -> CacheResult {
        let now = now_millis();
        let stats = {
            let mut stats = self.stats.entry(key.clone()).or_default();
            stats.get_hits += 1;
            stats.last_accessed = now;
            *stats
        };
        CacheResult {
            identifier: key.identifier.clone(),
            store_name: key.store_name.clone(),
            value: Some(value),
            expiration_date: expires_at,
            last_updated_date: stats.last_updated,
            last_accessed_date: stats.last_accessed,
            get_hit_count: stats.get_hits,
            set_hit_count: stats.set_hits,
            tier: Some(Tier::Authoritative),
        }
    }

    /// Drop counters for a key that read absent, unless a write for it has
    /// landed locally since.
    fn forget_stats(&self, key: &CompositeKey) {
        if !self.local.contains(key) && self.writer.pending(key).is_none() {
            self.stats.remove(key);
        }
    }

    /// Implicit remove of an expired key. A failure to remove it from the
    /// backing store is logged; the read still reports absent.
    async fn expire(&self, key: &CompositeKey) -> CacheResult {
        debug!(key = %key, "Entry expired");
        metrics::record_operation(TIER, "get", "expired");
        if let Err(e) = self.remove(&key.identifier, &key.store_name).await {
            warn!(key = %key, error = %e, "Failed to remove expired entry");
        }
        CacheResult::absent(key)
    }

    /// Where `(identifier, store_name)` currently lives.
    pub async fn status(&self, identifier: &str, store_name: &str) -> Result<EntryStatus, CacheError> {
        let key = CompositeKey::new(identifier, store_name);
        let now = now_millis();

        if self.writer.pending(&key).is_some_and(|e| e.expires_at > now) {
            return Ok(EntryStatus::Pending);
        }
        if self.local.contains(&key) {
            return Ok(EntryStatus::Cached);
        }
        match self.store.get(identifier, store_name).await? {
            Some(entry) if entry.expires_at > now => Ok(EntryStatus::Persisted),
            _ => Ok(EntryStatus::Missing),
        }
    }

    // ========== Writes ==========

    /// Encode and stage `value`, caching it locally right away.
    ///
    /// When the staged batch fills, the flush runs before this returns. The
    /// write is already accepted at that point, so a flush failure is logged
    /// and left to the batch writer's retry and requeue policy.
    #[tracing::instrument(skip(self, value), fields(value_type = %value.value_type()))]
    pub async fn set(
        &self,
        identifier: &str,
        store_name: &str,
        value: DataValue,
        expiration_date: i64,
    ) -> Result<(), CacheError> {
        let _timer = LatencyTimer::new(TIER, "set");
        if !is_valid_timestamp(expiration_date) {
            metrics::record_operation(TIER, "set", "rejected");
            return Err(CacheError::InvalidExpirationDate(expiration_date));
        }

        let entry = self.codec.encode_entry(&value, expiration_date).await?;
        let key = CompositeKey::new(identifier, store_name);

        self.local.insert(key.clone(), value, expiration_date);
        let batch_full = self.writer.add(key.clone(), entry.payload, expiration_date);
        {
            let mut stats = self.stats.entry(key).or_default();
            stats.set_hits += 1;
            stats.last_updated = now_millis();
        }
        metrics::set_local_cache_items(self.local.len());
        metrics::record_operation(TIER, "set", "success");

        if batch_full {
            if let Err(e) = self.writer.flush_with_reason(FlushReason::Size).await {
                warn!(error = %e, "Size-triggered flush failed");
            }
        }
        Ok(())
    }

    /// Drop the key from every layer and reset its counters.
    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, identifier: &str, store_name: &str) -> Result<(), CacheError> {
        let _timer = LatencyTimer::new(TIER, "remove");
        let key = CompositeKey::new(identifier, store_name);

        self.local.remove(&key);
        self.writer.discard(&key);
        self.stats.remove(&key);
        metrics::set_local_cache_items(self.local.len());

        // an in-flight flush may still write this key
        self.writer.wait_idle().await;

        let result = retry("store_remove", &self.settings.write_retry, || {
            let store = Arc::clone(&self.store);
            let key = key.clone();
            async move { store.remove(&key.identifier, &key.store_name).await }
        })
        .await;

        match result {
            Ok(()) => {
                metrics::record_operation(TIER, "remove", "success");
                Ok(())
            }
            Err(e) => {
                metrics::record_store_error(self.store.name(), "remove");
                metrics::record_operation(TIER, "remove", "error");
                Err(e.into())
            }
        }
    }

    /// Drop every entry and reset all counters.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self) -> Result<(), CacheError> {
        let _timer = LatencyTimer::new(TIER, "clear");
        self.local.clear();
        let discarded = self.writer.discard_all();
        self.stats.clear();
        metrics::set_local_cache_items(0);

        self.writer.wait_idle().await;

        let result = retry("store_clear", &self.settings.write_retry, || {
            let store = Arc::clone(&self.store);
            async move { store.clear().await }
        })
        .await;

        match result {
            Ok(()) => {
                info!(discarded, "Cache cleared");
                metrics::record_operation(TIER, "clear", "success");
                Ok(())
            }
            Err(e) => {
                metrics::record_store_error(self.store.name(), "clear");
                metrics::record_operation(TIER, "clear", "error");
                Err(e.into())
            }
        }
    }

    /// Persist staged writes now.
    pub async fn flush(&self) -> Result<FlushReport, CacheError> {
        Ok(self.writer.flush().await?)
    }

    /// Rotate encryption keys. Existing entries keep their original key.
    pub async fn rotate_keys(&self) -> Result<bool, CacheError> {
        Ok(self.key_manager().rotate().await?)
    }
}

impl Drop for AuthoritativeCache {
    fn drop(&mut self) {
        if let Some(handle) = self.rotation_task.lock().take() {
            handle.abort();
        }
    }
}
