// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Two-tier coordinator.
//!
//! The [`TwoTierCache`] is the single entry point that ties the tiers
//! together:
//! - the [`AuthoritativeCache`] (source of truth, durable)
//! - an optional [`MirrorCache`] (fast local reads) for contexts that have one
//! - the [`SyncBus`] that tells every other context about changes
//!
//! # Write path
//!
//! ```text
//! set/remove/clear ──► authoritative tier ──ok──► own mirror ──► SyncBus.notify
//!                              │                                   │
//!                              └─ error: nothing else happens      ├─► (id, store)
//!                                                                  ├─► (id, "*")
//!                                                                  ├─► ("*", store)
//!                                                                  └─► ("*", "*") ──► other mirrors
//! ```
//!
//! A coordinator with a mirror subscribes it under `("*", "*")`, so several
//! coordinators sharing one authority and one bus keep their mirrors in step.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sealed_cache::{
//!     AuthoritativeCache, CacheConfig, DataValue, InMemoryMirrorStore, InMemoryStore, SyncBus,
//!     TwoTierCache,
//! };
//! use sealed_cache::key::now_millis;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let authority = Arc::new(
//!     AuthoritativeCache::new(&CacheConfig::default(), Arc::new(InMemoryStore::new())).unwrap(),
//! );
//! let bus = Arc::new(SyncBus::new());
//! let server = TwoTierCache::new(authority.clone(), bus.clone());
//! let client = TwoTierCache::with_mirror(authority, bus, Arc::new(InMemoryMirrorStore::new()));
//!
//! server.set("user:1", "profile", DataValue::Integer(7), now_millis() + 60_000).await.unwrap();
//! let seen = client.get("user:1", "profile").await.unwrap();
//! assert_eq!(seen.value, Some(DataValue::Integer(7)));
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::{AuthoritativeCache, BatchResult, CacheResult};
use crate::error::CacheError;
use crate::key::{now_millis, CompositeKey};
use crate::metrics;
use crate::mirror::{MirrorCache, MirrorEntry, MirrorStore};
use crate::sync_bus::{ChangeEvent, ChangeKind, ListenerError, Subscription, SyncBus};
use crate::value::DataValue;

const TIER: &str = "coordinator";

pub struct TwoTierCache {
    authority: Arc<AuthoritativeCache>,
    bus: Arc<SyncBus>,
    mirror: Option<Arc<MirrorCache>>,
    /// Keeps the mirror in step with changes made elsewhere
    mirror_subscription: Option<Subscription>,
    max_age: Duration,
}

impl TwoTierCache {
    /// Coordinator without a mirror (server-side contexts).
    pub fn new(authority: Arc<AuthoritativeCache>, bus: Arc<SyncBus>) -> Self {
        let max_age = authority.settings().max_age;
        Self {
            authority,
            bus,
            mirror: None,
            mirror_subscription: None,
            max_age,
        }
    }

    /// Coordinator with a mirror backed by `store`, subscribed to every change
    /// published on `bus`.
    pub fn with_mirror(authority: Arc<AuthoritativeCache>, bus: Arc<SyncBus>, store: Arc<dyn MirrorStore>) -> Self {
        let mirror = Arc::new(MirrorCache::new(Arc::clone(&store), Arc::clone(&authority)));
        let subscription = {
            let store = Arc::clone(&store);
            bus.subscribe(crate::key::WILDCARD, crate::key::WILDCARD, move |event| {
                apply_to_mirror(store.as_ref(), event)
            })
        };
        debug!(backend = store.name(), "Mirror attached to sync bus");

        let max_age = authority.settings().max_age;
        Self {
            authority,
            bus,
            mirror: Some(mirror),
            mirror_subscription: Some(subscription),
            max_age,
        }
    }

    #[must_use]
    pub fn authority(&self) -> &Arc<AuthoritativeCache> {
        &self.authority
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<SyncBus> {
        &self.bus
    }

    #[must_use]
    pub fn mirror(&self) -> Option<&Arc<MirrorCache>> {
        self.mirror.as_ref()
    }

    /// Register a listener for changes to `(identifier, store_name)`.
    /// Either half may be `"*"`.
    pub fn subscribe<F>(&self, identifier: &str, store_name: &str, listener: F) -> Subscription
    where
        F: Fn(&ChangeEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.bus.subscribe(identifier, store_name, listener)
    }

    /// Read, preferring a fresh mirror entry.
    pub async fn get(&self, identifier: &str, store_name: &str) -> Result<CacheResult, CacheError> {
        match self.mirror {
            Some(ref mirror) => mirror.get(identifier, store_name).await,
            None => self.authority.get(identifier, store_name).await,
        }
    }

    pub async fn set(
        &self,
        identifier: &str,
        store_name: &str,
        value: DataValue,
        expiration_date: i64,
    ) -> Result<(), CacheError> {
        match self.mirror {
            Some(ref mirror) => mirror.set(identifier, store_name, value.clone(), expiration_date).await?,
            None => {
                self.authority
                    .set(identifier, store_name, value.clone(), expiration_date)
                    .await?
            }
        }

        let key = CompositeKey::new(identifier, store_name);
        self.publish(ChangeEvent::set(key, value, expiration_date));
        Ok(())
    }

    pub async fn remove(&self, identifier: &str, store_name: &str) -> Result<(), CacheError> {
        match self.mirror {
            Some(ref mirror) => mirror.remove(identifier, store_name).await?,
            None => self.authority.remove(identifier, store_name).await?,
        }
        self.publish(ChangeEvent::removed(CompositeKey::new(identifier, store_name)));
        Ok(())
    }

    /// Clear every tier, then send a `Cleared` event to every subscribed key.
    pub async fn clear(&self) -> Result<(), CacheError> {
        match self.mirror {
            Some(ref mirror) => mirror.clear().await?,
            None => self.authority.clear().await?,
        }
        for key in self.bus.keys() {
            let event = ChangeEvent::cleared(key.clone());
            self.bus.notify(&key, &event);
        }
        Ok(())
    }

    /// Set every entry with a uniform expiration of now + max age.
    ///
    /// Entries are written one after another; a failing entry is counted and
    /// logged but does not stop the rest.
    #[tracing::instrument(skip(self, entries))]
    pub async fn preload_cache<I>(&self, entries: I) -> BatchResult
    where
        I: IntoIterator<Item = (CompositeKey, DataValue)>,
    {
        let expiration_date = now_millis().saturating_add(self.max_age.as_millis() as i64);
        let mut result = BatchResult {
            total: 0,
            succeeded: 0,
            failed: 0,
        };

        for (key, value) in entries {
            result.total += 1;
            match self.set(&key.identifier, &key.store_name, value, expiration_date).await {
                Ok(()) => result.succeeded += 1,
                Err(e) => {
                    warn!(key = %key, error = %e, "Preload entry failed");
                    result.failed += 1;
                }
            }
        }

        let status = if result.is_success() { "success" } else { "partial" };
        metrics::record_operation(TIER, "preload", status);
        info!(total = result.total, failed = result.failed, "Preload complete");
        result
    }

    /// Publish under the exact key and each wildcard form of it.
    fn publish(&self, event: ChangeEvent) {
        for key in event.key.fan_out() {
            self.bus.notify(&key, &event);
        }
    }
}

impl Drop for TwoTierCache {
    fn drop(&mut self) {
        if let Some(subscription) = self.mirror_subscription.take() {
            subscription.unsubscribe();
        }
    }
}

fn apply_to_mirror(store: &dyn MirrorStore, event: &ChangeEvent) -> Result<(), ListenerError> {
    match event.kind {
        ChangeKind::Set => {
            let (Some(value), Some(expires_at)) = (event.value.clone(), event.expires_at) else {
                return Err(ListenerError::new("set event without value"));
            };
            let entry = MirrorEntry {
                value,
                expires_at,
                last_updated: now_millis(),
            };
            if let Err(e) = store.set(event.key.clone(), entry) {
                store.remove(&event.key);
                return Err(ListenerError::new(e.to_string()));
            }
        }
        ChangeKind::Removed => store.remove(&event.key),
        ChangeKind::Cleared => store.clear(),
    }
    Ok(())
}
