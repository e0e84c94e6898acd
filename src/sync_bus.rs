// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process change notification.
//!
//! The [`SyncBus`] maps a [`CompositeKey`] to the listeners registered under
//! it. `notify` runs those listeners synchronously, in registration order,
//! on the caller's task. A listener that returns an error or panics is
//! logged and skipped; the remaining listeners still run.
//!
//! The bus does not interpret wildcards. Publishers that want `"*"`
//! subscribers to see a change publish under each key from
//! [`CompositeKey::fan_out`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use sealed_cache::{ChangeEvent, CompositeKey, SyncBus};
//!
//! let bus = Arc::new(SyncBus::new());
//! let seen = Arc::new(AtomicUsize::new(0));
//! let counter = seen.clone();
//! let sub = bus.subscribe("user:1", "profile", move |_event| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//!     Ok(())
//! });
//!
//! let key = CompositeKey::new("user:1", "profile");
//! bus.notify(&key, &ChangeEvent::removed(key.clone()));
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//!
//! assert!(sub.unsubscribe());
//! assert!(!sub.unsubscribe());
//! ```

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, warn};

use crate::key::CompositeKey;
use crate::metrics;
use crate::value::DataValue;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("listener failed: {0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Set,
    Removed,
    Cleared,
}

/// A change to the authoritative state.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Key that changed; for `Cleared`, the key the event is delivered under
    pub key: CompositeKey,
    pub kind: ChangeKind,
    /// New value for `Set`
    pub value: Option<DataValue>,
    pub expires_at: Option<i64>,
}

impl ChangeEvent {
    #[must_use]
    pub fn set(key: CompositeKey, value: DataValue, expires_at: i64) -> Self {
        Self {
            key,
            kind: ChangeKind::Set,
            value: Some(value),
            expires_at: Some(expires_at),
        }
    }

    #[must_use]
    pub fn removed(key: CompositeKey) -> Self {
        Self {
            key,
            kind: ChangeKind::Removed,
            value: None,
            expires_at: None,
        }
    }

    #[must_use]
    pub fn cleared(key: CompositeKey) -> Self {
        Self {
            key,
            kind: ChangeKind::Cleared,
            value: None,
            expires_at: None,
        }
    }
}

pub type SubscriptionId = u64;

pub type Listener = Arc<dyn Fn(&ChangeEvent) -> Result<(), ListenerError> + Send + Sync>;

/// Outcome of one `notify`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Default)]
pub struct SyncBus {
    listeners: RwLock<HashMap<CompositeKey, Vec<(SubscriptionId, Listener)>>>,
    next_id: AtomicU64,
}

impl SyncBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` under `(identifier, store_name)`.
    ///
    /// The returned handle is the only way to unsubscribe; dropping it
    /// leaves the listener registered.
    pub fn subscribe<F>(self: &Arc<Self>, identifier: &str, store_name: &str, listener: F) -> Subscription
    where
        F: Fn(&ChangeEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        let key = CompositeKey::new(identifier, store_name);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .write()
            .entry(key.clone())
            .or_default()
            .push((id, Arc::new(listener)));
        debug!(key = %key, id, "Listener subscribed");

        Subscription {
            bus: Arc::downgrade(self),
            key,
            id,
        }
    }

    /// Remove one listener. Idempotent: returns false if it was already gone.
    pub fn unsubscribe(&self, key: &CompositeKey, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(entries) = listeners.get_mut(key) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(key);
        }
        removed
    }

    /// Run every listener registered under `key`.
    ///
    /// Listeners are snapshotted first, so they may subscribe or unsubscribe
    /// while being notified.
    pub fn notify(&self, key: &CompositeKey, event: &ChangeEvent) -> Delivery {
        let snapshot: Vec<(SubscriptionId, Listener)> = match self.listeners.read().get(key) {
            Some(entries) => entries.clone(),
            None => return Delivery::default(),
        };

        let mut delivery = Delivery::default();
        for (id, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => delivery.delivered += 1,
                Ok(Err(e)) => {
                    warn!(key = %key, id, error = %e, "Listener returned an error");
                    metrics::record_listener_error("error");
                    delivery.failed += 1;
                }
                Err(panic) => {
                    let msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    warn!(key = %key, id, panic = %msg, "Listener panicked");
                    metrics::record_listener_error("panic");
                    delivery.failed += 1;
                }
            }
        }
        delivery
    }

    /// Keys with at least one listener.
    #[must_use]
    pub fn keys(&self) -> Vec<CompositeKey> {
        self.listeners.read().keys().cloned().collect()
    }

    #[must_use]
    pub fn listener_count(&self, key: &CompositeKey) -> usize {
        self.listeners.read().get(key).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }
}

/// Handle for one registered listener.
#[must_use = "dropping a Subscription does not unsubscribe; keep it to call unsubscribe()"]
#[derive(Debug, Clone)]
pub struct Subscription {
    bus: Weak<SyncBus>,
    key: CompositeKey,
    id: SubscriptionId,
}

impl Subscription {
    #[must_use]
    pub fn key(&self) -> &CompositeKey {
        &self.key
    }

    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Idempotent; also a no-op once the bus is gone.
    pub fn unsubscribe(&self) -> bool {
        self.bus
            .upgrade()
            .is_some_and(|bus| bus.unsubscribe(&self.key, self.id))
    }
}
