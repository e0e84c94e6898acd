// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded in-process cache of decoded values.
//!
//! Victims are chosen by an O(n) scan of entry metadata on insert at
//! capacity. Stale entries are purged first, so a live entry is only evicted
//! when every slot holds a fresh value.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::seq::IteratorRandom;
use tracing::debug;

use super::{EvictionPolicy, EvictionReason};
use crate::key::{now_millis, CompositeKey};
use crate::metrics;
use crate::value::DataValue;

#[derive(Debug, Clone)]
struct LocalEntry {
    value: DataValue,
    expires_at: i64,
    inserted_at: Instant,
    /// Monotonic tick of the last read or write
    last_access: u64,
    access_count: u64,
}

impl LocalEntry {
    fn ttl_lapsed(&self, ttl: Duration, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= ttl
    }

    fn expired(&self, now_ms: i64) -> bool {
        self.expires_at <= now_ms
    }
}

/// A value served from the local cache.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalHit {
    pub value: DataValue,
    pub expires_at: i64,
}

/// Outcome of a local lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalLookup {
    Hit(LocalHit),
    /// Not cached locally (never was, evicted, or TTL lapsed)
    Miss,
    /// Cached but past its expiration date; the entry has been dropped
    Expired,
}

#[derive(Default)]
struct LocalState {
    entries: HashMap<CompositeKey, LocalEntry>,
    tick: u64,
}

impl LocalState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

pub struct LocalCache {
    capacity: usize,
    ttl: Duration,
    policy: EvictionPolicy,
    state: Mutex<LocalState>,
}

impl LocalCache {
    /// `capacity` of zero is treated as one.
    pub fn new(capacity: usize, ttl: Duration, policy: EvictionPolicy) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            policy,
            state: Mutex::new(LocalState::default()),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &CompositeKey) -> LocalLookup {
        let now = Instant::now();
        let now_ms = now_millis();
        let mut state = self.state.lock();

        let (lapsed, expired) = match state.entries.get(key) {
            None => return LocalLookup::Miss,
            Some(entry) => (entry.ttl_lapsed(self.ttl, now), entry.expired(now_ms)),
        };

        if expired {
            state.entries.remove(key);
            metrics::record_eviction(EvictionReason::Expired.as_str());
            return LocalLookup::Expired;
        }
        if lapsed {
            state.entries.remove(key);
            metrics::record_eviction(EvictionReason::Ttl.as_str());
            return LocalLookup::Miss;
        }

        let tick = state.next_tick();
        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.last_access = tick;
                entry.access_count += 1;
                LocalLookup::Hit(LocalHit {
                    value: entry.value.clone(),
                    expires_at: entry.expires_at,
                })
            }
            None => LocalLookup::Miss,
        }
    }

    /// Whether a fresh entry is cached, without touching recency.
    #[must_use]
    pub fn contains(&self, key: &CompositeKey) -> bool {
        let now = Instant::now();
        let now_ms = now_millis();
        self.state
            .lock()
            .entries
            .get(key)
            .is_some_and(|e| !e.ttl_lapsed(self.ttl, now) && !e.expired(now_ms))
    }

    /// Insert or replace. Returns the key evicted to make room, if any.
    pub fn insert(&self, key: CompositeKey, value: DataValue, expires_at: i64) -> Option<CompositeKey> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let tick = state.next_tick();

        let mut victim = None;
        if !state.entries.contains_key(&key) && state.entries.len() >= self.capacity {
            self.purge_stale(&mut state, now);
            if state.entries.len() >= self.capacity {
                victim = self.select_victim(&state);
                if let Some(ref evicted) = victim {
                    state.entries.remove(evicted);
                    metrics::record_eviction(EvictionReason::Capacity.as_str());
                    debug!(key = %evicted, policy = %self.policy, "Evicted local entry");
                }
            }
        }

        state.entries.insert(
            key,
            LocalEntry {
                value,
                expires_at,
                inserted_at: now,
                last_access: tick,
                access_count: 0,
            },
        );
        victim
    }

    pub fn remove(&self, key: &CompositeKey) -> bool {
        self.state.lock().entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    /// Drop every entry whose TTL lapsed or whose expiration passed.
    fn purge_stale(&self, state: &mut LocalState, now: Instant) {
        let now_ms = now_millis();
        let ttl = self.ttl;
        state.entries.retain(|_, e| {
            if e.expired(now_ms) {
                metrics::record_eviction(EvictionReason::Expired.as_str());
                false
            } else if e.ttl_lapsed(ttl, now) {
                metrics::record_eviction(EvictionReason::Ttl.as_str());
                false
            } else {
                true
            }
        });
    }

    fn select_victim(&self, state: &LocalState) -> Option<CompositeKey> {
        match self.policy {
            EvictionPolicy::Lru => state
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Lfu => state
                .entries
                .iter()
                .min_by_key(|(_, e)| (e.access_count, e.last_access))
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Random => state
                .entries
                .keys()
                .choose(&mut rand::thread_rng())
                .cloned(),
        }
    }
}
