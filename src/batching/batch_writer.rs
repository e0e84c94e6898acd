// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Coalescing batch writer for durable persistence.
//!
//! The [`BatchWriter`] stages sealed payloads per key and persists them to a
//! [`BackingStore`] when the staging map reaches the batch size, when the
//! periodic timer fires, or on shutdown.
//!
//! # Flush protocol
//!
//! ```text
//!  add(k, p) ──► staging map (last write per key wins)
//!                    │
//!  flush() ──► flush_lock ──► snapshot + clear (atomic) ──► set() per key ──► outcome
//!                │                                                              │
//!                └── caller arriving while a flush runs waits, then ◄───────────┘
//!                    returns that flush's outcome instead of starting another
//! ```
//!
//! Entries staged after a snapshot is taken land in the next flush. A failed
//! flush does not restore its snapshot unless `requeue_failed` is set, and
//! even then a newer staged write or a discard for the same key wins.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::crypto::EncryptedPayload;
use crate::key::CompositeKey;
use crate::metrics;
use crate::resilience::retry::{retry, RetryConfig};
use crate::storage::traits::{BackingStore, StorageError};

/// Why a flush ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Staging map reached the batch size
    Size,
    /// Periodic timer
    Interval,
    /// Explicit `flush()` call
    Manual,
    /// Final flush from `stop()`
    Shutdown,
}

impl FlushReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Interval => "interval",
            Self::Manual => "manual",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct BatchWriterConfig {
    /// Staged entries that trigger an immediate flush
    pub batch_size: usize,
    /// Period of the background flush timer
    pub flush_interval: Duration,
    /// Retry policy for each key's durable write
    pub retry: RetryConfig,
    /// Re-stage entries whose write failed
    pub requeue_failed: bool,
}

impl Default for BatchWriterConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval: Duration::from_millis(1000),
            retry: RetryConfig::write(),
            requeue_failed: false,
        }
    }
}

/// A staged write, owned by the writer until flushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub key: CompositeKey,
    pub payload: EncryptedPayload,
    pub expires_at: i64,
}

/// Summary of a flush that persisted every entry in its snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushReport {
    /// None when the snapshot was empty
    pub batch_id: Option<String>,
    pub reason: FlushReason,
    pub persisted: usize,
    pub duration: Duration,
}

impl FlushReport {
    fn empty(reason: FlushReason) -> Self {
        Self {
            batch_id: None,
            reason,
            persisted: 0,
            duration: Duration::ZERO,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BatchError {
    #[error("batch {batch_id} failed to persist {failed} of {total} entries: {source}")]
    FlushFailed {
        batch_id: String,
        failed: usize,
        total: usize,
        source: StorageError,
    },
}

#[derive(Default)]
struct Staging {
    entries: HashMap<CompositeKey, BatchEntry>,
    /// Keys discarded since the last snapshot
    discarded: HashSet<CompositeKey>,
    /// `discard_all` called since the last snapshot
    cleared: bool,
}

pub struct BatchWriter {
    store: Arc<dyn BackingStore>,
    config: BatchWriterConfig,
    staging: Mutex<Staging>,
    /// Held for the duration of a flush
    flush_lock: tokio::sync::Mutex<()>,
    /// Completed flushes
    epoch: AtomicU64,
    last_outcome: Mutex<Result<FlushReport, BatchError>>,
    timer: Mutex<Option<Timer>>,
}

/// Background flush task plus its shutdown signal.
struct Timer {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl BatchWriter {
    pub fn new(store: Arc<dyn BackingStore>, config: BatchWriterConfig) -> Self {
        Self {
            store,
            config,
            staging: Mutex::new(Staging::default()),
            flush_lock: tokio::sync::Mutex::new(()),
            epoch: AtomicU64::new(0),
            last_outcome: Mutex::new(Ok(FlushReport::empty(FlushReason::Manual))),
            timer: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BatchWriterConfig {
        &self.config
    }

    /// Staged entry count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.staging.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stage `payload` for `key`, replacing any earlier staged write.
    ///
    /// Returns true when the staging map has reached the batch size; the
    /// caller is expected to `flush()`.
    pub fn add(&self, key: CompositeKey, payload: EncryptedPayload, expires_at: i64) -> bool {
        let mut staging = self.staging.lock();
        staging.discarded.remove(&key);
        staging.entries.insert(
            key.clone(),
            BatchEntry {
                key,
                payload,
                expires_at,
            },
        );
        let len = staging.entries.len();
        drop(staging);

        metrics::set_batch_pending(len);
        len >= self.config.batch_size
    }

    /// The staged (not yet flushed) entry for `key`.
    #[must_use]
    pub fn pending(&self, key: &CompositeKey) -> Option<BatchEntry> {
        self.staging.lock().entries.get(key).cloned()
    }

    /// Drop the staged write for `key` so no later flush persists it.
    pub fn discard(&self, key: &CompositeKey) -> bool {
        let mut staging = self.staging.lock();
        staging.discarded.insert(key.clone());
        staging.entries.remove(key).is_some()
    }

    /// Drop every staged write.
    pub fn discard_all(&self) -> usize {
        let mut staging = self.staging.lock();
        staging.cleared = true;
        staging.discarded.clear();
        let dropped = staging.entries.len();
        staging.entries.clear();
        metrics::set_batch_pending(0);
        dropped
    }

    /// Wait until no flush is in flight.
    pub async fn wait_idle(&self) {
        let _guard = self.flush_lock.lock().await;
    }

    pub async fn flush(&self) -> Result<FlushReport, BatchError> {
        self.flush_with_reason(FlushReason::Manual).await
    }

    /// Flush staged entries, or join the flush already in flight.
    #[tracing::instrument(skip(self), fields(reason = %reason))]
    pub async fn flush_with_reason(&self, reason: FlushReason) -> Result<FlushReport, BatchError> {
        let seen = self.epoch.load(Ordering::Acquire);
        let _guard = self.flush_lock.lock().await;

        if self.epoch.load(Ordering::Acquire) != seen {
            debug!("Joined in-flight flush");
            return self.last_outcome.lock().clone();
        }

        let outcome = self.persist_snapshot(reason).await;
        *self.last_outcome.lock() = outcome.clone();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    async fn persist_snapshot(&self, reason: FlushReason) -> Result<FlushReport, BatchError> {
        let snapshot: Vec<BatchEntry> = {
            let mut staging = self.staging.lock();
            staging.discarded.clear();
            staging.cleared = false;
            staging.entries.drain().map(|(_, entry)| entry).collect()
        };
        metrics::set_batch_pending(self.len());

        if snapshot.is_empty() {
            return Ok(FlushReport::empty(reason));
        }

        let batch_id = Uuid::new_v4().to_string();
        let total = snapshot.len();
        let start = Instant::now();
        debug!(batch_id = %batch_id, count = total, "Flushing batch");

        let mut failed = Vec::new();
        let mut first_error = None;
        for entry in snapshot {
            let result = retry("batch_write", &self.config.retry, || {
                let store = Arc::clone(&self.store);
                let entry = entry.clone();
                async move {
                    store
                        .set(&entry.key.identifier, &entry.key.store_name, &entry.payload, entry.expires_at)
                        .await
                }
            })
            .await;

            if let Err(e) = result {
                warn!(batch_id = %batch_id, key = %entry.key, error = %e, "Batch entry write failed");
                metrics::record_store_error(self.store.name(), "set");
                first_error.get_or_insert(e);
                failed.push(entry);
            }
        }

        let duration = start.elapsed();
        let persisted = total - failed.len();
        metrics::record_batch_flush(reason.as_str(), persisted, duration);

        match first_error {
            None => {
                debug!(batch_id = %batch_id, persisted, ?duration, "Batch flushed");
                Ok(FlushReport {
                    batch_id: Some(batch_id),
                    reason,
                    persisted,
                    duration,
                })
            }
            Some(source) => {
                let failed_count = failed.len();
                metrics::record_flush_failure(failed_count);
                if self.config.requeue_failed {
                    self.requeue(failed);
                }
                Err(BatchError::FlushFailed {
                    batch_id,
                    failed: failed_count,
                    total,
                    source,
                })
            }
        }
    }

    /// Re-stage failed entries unless superseded or discarded meanwhile.
    fn requeue(&self, failed: Vec<BatchEntry>) {
        let mut staging = self.staging.lock();
        if staging.cleared {
            return;
        }
        let mut requeued = 0;
        for entry in failed {
            if staging.discarded.contains(&entry.key) || staging.entries.contains_key(&entry.key) {
                continue;
            }
            staging.entries.insert(entry.key.clone(), entry);
            requeued += 1;
        }
        debug!(requeued, "Re-staged failed batch entries");
    }

    /// Spawn the periodic flush timer. Calling twice replaces the timer.
    ///
    /// The task holds a weak reference and exits once the writer is dropped.
    /// A shutdown signal is only observed between ticks, so a flush the timer
    /// has started always runs to completion.
    pub fn start(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.config.flush_interval;
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {}
                }
                let Some(writer) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = writer.flush_with_reason(FlushReason::Interval).await {
                    warn!(error = %e, "Periodic flush failed");
                }
            }
            debug!("Flush timer exited");
        });

        if let Some(previous) = self.timer.lock().replace(Timer { handle, shutdown }) {
            let _ = previous.shutdown.send(true);
        }
    }

    /// Stop the timer, wait out any flush it has in flight, then flush until
    /// nothing is staged.
    ///
    /// Returns the total persisted across the final flushes. A flush failure
    /// is returned immediately.
    #[tracing::instrument(skip(self))]
    pub async fn stop(&self) -> Result<usize, BatchError> {
        let timer = self.timer.lock().take();
        if let Some(timer) = timer {
            let _ = timer.shutdown.send(true);
            if let Err(e) = timer.handle.await {
                warn!(error = %e, "Flush timer ended abnormally");
            }
        }

        let mut persisted = 0;
        loop {
            let report = self.flush_with_reason(FlushReason::Shutdown).await?;
            persisted += report.persisted;
            if self.is_empty() {
                break;
            }
        }
        info!(persisted, "Batch writer stopped");
        Ok(persisted)
    }
}

impl Drop for BatchWriter {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Algorithm, SealedData};
    use crate::storage::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

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

    fn key(id: &str) -> CompositeKey {
        CompositeKey::new(id, "s")
    }

    fn config(batch_size: usize) -> BatchWriterConfig {
        BatchWriterConfig {
            batch_size,
            flush_interval: Duration::from_secs(3600),
            retry: RetryConfig::fast(2),
            requeue_failed: false,
        }
    }

    /// Blocks every `set` until released; counts calls.
    struct GatedStore {
        inner: InMemoryStore,
        entered: Notify,
        release: Notify,
        calls: AtomicUsize,
    }

    impl GatedStore {
        fn new() -> Self {
            Self {
                inner: InMemoryStore::new(),
                entered: Notify::new(),
                release: Notify::new(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BackingStore for GatedStore {
        fn name(&self) -> &'static str {
            "gated"
        }
        async fn get(&self, id: &str, store: &str) -> Result<Option<crate::codec::SealedEntry>, StorageError> {
            self.inner.get(id, store).await
        }
        async fn set(&self, id: &str, store: &str, p: &EncryptedPayload, exp: i64) -> Result<(), StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.set(id, store, p, exp).await
        }
        async fn remove(&self, id: &str, store: &str) -> Result<(), StorageError> {
            self.inner.remove(id, store).await
        }
        async fn clear(&self) -> Result<(), StorageError> {
            self.inner.clear().await
        }
    }

    /// Fails every `set`.
    struct DownStore;

    #[async_trait]
    impl BackingStore for DownStore {
        fn name(&self) -> &'static str {
            "down"
        }
        async fn get(&self, _: &str, _: &str) -> Result<Option<crate::codec::SealedEntry>, StorageError> {
            Ok(None)
        }
        async fn set(&self, _: &str, _: &str, _: &EncryptedPayload, _: i64) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("down".into()))
        }
        async fn remove(&self, _: &str, _: &str) -> Result<(), StorageError> {
            Ok(())
        }
        async fn clear(&self) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_add_signals_batch_size() {
        let writer = BatchWriter::new(Arc::new(InMemoryStore::new()), config(3));
        assert!(!writer.add(key("a"), payload("1"), 0));
        assert!(!writer.add(key("b"), payload("1"), 0));
        // overwrite does not grow the map
        assert!(!writer.add(key("b"), payload("2"), 0));
        assert!(writer.add(key("c"), payload("1"), 0));
        assert_eq!(writer.len(), 3);
    }

    #[tokio::test]
    async fn test_flush_persists_last_write_per_key() {
        let store = Arc::new(InMemoryStore::new());
        let writer = BatchWriter::new(store.clone(), config(100));
        writer.add(key("a"), payload("v1"), 10);
        writer.add(key("a"), payload("v2"), 20);
        writer.add(key("b"), payload("v1"), 30);

        let report = writer.flush().await.unwrap();
        assert_eq!(report.persisted, 2);
        assert!(report.batch_id.is_some());
        assert!(writer.is_empty());

        let a = store.peek("a", "s").unwrap();
        assert_eq!(a.payload, payload("v2"));
        assert_eq!(a.expires_at, 20);
    }

    #[tokio::test]
    async fn test_empty_flush_is_noop() {
        let writer = BatchWriter::new(Arc::new(InMemoryStore::new()), config(10));
        let report = writer.flush().await.unwrap();
        assert_eq!(report.persisted, 0);
        assert!(report.batch_id.is_none());
    }

    #[tokio::test]
    async fn test_entries_added_during_flush_go_to_next_batch() {
        let store = Arc::new(GatedStore::new());
        let writer = Arc::new(BatchWriter::new(store.clone(), config(100)));
        writer.add(key("first"), payload("1"), 0);

        let flushing = {
            let writer = writer.clone();
            tokio::spawn(async move { writer.flush().await })
        };
        store.entered.notified().await;

        // snapshot already taken
        writer.add(key("second"), payload("2"), 0);
        assert!(writer.pending(&key("second")).is_some());

        store.release.notify_one();
        let report = flushing.await.unwrap().unwrap();
        assert_eq!(report.persisted, 1);
        assert!(store.inner.contains("first", "s"));
        assert!(!store.inner.contains("second", "s"));

        let next = {
            let writer = writer.clone();
            tokio::spawn(async move { writer.flush().await })
        };
        store.entered.notified().await;
        store.release.notify_one();
        assert_eq!(next.await.unwrap().unwrap().persisted, 1);
        assert!(store.inner.contains("second", "s"));
    }

    #[tokio::test]
    async fn test_concurrent_flush_joins_in_flight() {
        let store = Arc::new(GatedStore::new());
        let writer = Arc::new(BatchWriter::new(store.clone(), config(100)));
        writer.add(key("a"), payload("1"), 0);

        let first = {
            let writer = writer.clone();
            tokio::spawn(async move { writer.flush().await })
        };
        store.entered.notified().await;

        let second = {
            let writer = writer.clone();
            tokio::spawn(async move { writer.flush().await })
        };
        tokio::task::yield_now().await;

        store.release.notify_one();
        let a = first.await.unwrap().unwrap();
        let b = second.await.unwrap().unwrap();

        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.batch_id, b.batch_id);
    }

    #[tokio::test]
    async fn test_failed_flush_drops_snapshot_by_default() {
        let writer = BatchWriter::new(Arc::new(DownStore), config(100));
        writer.add(key("a"), payload("1"), 0);

        let err = writer.flush().await.unwrap_err();
        let BatchError::FlushFailed { failed, total, .. } = err;
        assert_eq!((failed, total), (1, 1));
        assert!(writer.is_empty());
    }

    #[tokio::test]
    async fn test_failed_flush_requeues_when_enabled() {
        let writer = BatchWriter::new(
            Arc::new(DownStore),
            BatchWriterConfig {
                requeue_failed: true,
                ..config(100)
            },
        );
        writer.add(key("a"), payload("1"), 0);
        assert!(writer.flush().await.is_err());
        assert_eq!(writer.pending(&key("a")).unwrap().payload, payload("1"));
    }

    #[tokio::test]
    async fn test_requeue_does_not_override_newer_write() {
        let writer = BatchWriter::new(
            Arc::new(DownStore),
            BatchWriterConfig {
                requeue_failed: true,
                ..config(100)
            },
        );
        writer.add(key("a"), payload("old"), 0);
        let snapshot: Vec<BatchEntry> = writer.staging.lock().entries.drain().map(|(_, e)| e).collect();
        writer.add(key("a"), payload("new"), 0);
        writer.requeue(snapshot);
        assert_eq!(writer.pending(&key("a")).unwrap().payload, payload("new"));
    }

    #[tokio::test]
    async fn test_requeue_skips_discarded() {
        let writer = BatchWriter::new(
            Arc::new(DownStore),
            BatchWriterConfig {
                requeue_failed: true,
                ..config(100)
            },
        );
        writer.add(key("a"), payload("1"), 0);
        writer.add(key("b"), payload("1"), 0);
        let snapshot: Vec<BatchEntry> = writer.staging.lock().entries.drain().map(|(_, e)| e).collect();
        writer.discard(&key("a"));
        writer.requeue(snapshot);
        assert!(writer.pending(&key("a")).is_none());
        assert!(writer.pending(&key("b")).is_some());
    }

    #[tokio::test]
    async fn test_discard_prevents_persist() {
        let store = Arc::new(InMemoryStore::new());
        let writer = BatchWriter::new(store.clone(), config(100));
        writer.add(key("a"), payload("1"), 0);
        writer.add(key("b"), payload("1"), 0);

        assert!(writer.discard(&key("a")));
        assert!(!writer.discard(&key("a")));
        writer.flush().await.unwrap();
        assert!(!store.contains("a", "s"));
        assert!(store.contains("b", "s"));

        writer.add(key("c"), payload("1"), 0);
        assert_eq!(writer.discard_all(), 1);
        assert_eq!(writer.flush().await.unwrap().persisted, 0);
    }

    #[tokio::test]
    async fn test_stop_flushes_everything() {
        let store = Arc::new(InMemoryStore::new());
        let writer = Arc::new(BatchWriter::new(store.clone(), config(100)));
        writer.start();
        for i in 0..5 {
            writer.add(key(&format!("k{}", i)), payload("x"), 0);
        }

        assert_eq!(writer.stop().await.unwrap(), 5);
        assert_eq!(store.len(), 5);
        assert!(writer.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_in_flight_timer_flush() {
        let store = Arc::new(GatedStore::new());
        let writer = Arc::new(BatchWriter::new(
            store.clone(),
            BatchWriterConfig {
                flush_interval: Duration::from_millis(20),
                ..config(100)
            },
        ));
        writer.add(key("a"), payload("1"), 0);
        writer.add(key("b"), payload("2"), 0);
        writer.start();

        // timer flush has drained the staging map and is blocked in set()
        store.entered.notified().await;
        assert!(writer.is_empty());

        let stopping = {
            let writer = writer.clone();
            tokio::spawn(async move { writer.stop().await })
        };
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert!(!stopping.is_finished());

        store.release.notify_one();
        store.entered.notified().await;
        store.release.notify_one();

        stopping.await.unwrap().unwrap();
        assert_eq!(store.inner.len(), 2);
        assert!(store.inner.contains("a", "s"));
        assert!(store.inner.contains("b", "s"));
        assert!(writer.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_flushes_periodically() {
        let store = Arc::new(InMemoryStore::new());
        let writer = Arc::new(BatchWriter::new(
            store.clone(),
            BatchWriterConfig {
                flush_interval: Duration::from_millis(100),
                ..config(100)
            },
        ));
        writer.start();
        writer.add(key("a"), payload("1"), 0);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(store.contains("a", "s"));
        writer.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_retried_before_failing() {
        struct FlakyStore {
            inner: InMemoryStore,
            failures_left: AtomicUsize,
        }

        #[async_trait]
        impl BackingStore for FlakyStore {
            fn name(&self) -> &'static str {
                "flaky"
            }
            async fn get(&self, id: &str, s: &str) -> Result<Option<crate::codec::SealedEntry>, StorageError> {
                self.inner.get(id, s).await
            }
            async fn set(&self, id: &str, s: &str, p: &EncryptedPayload, e: i64) -> Result<(), StorageError> {
                if self
                    .failures_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    return Err(StorageError::Backend("transient".into()));
                }
                self.inner.set(id, s, p, e).await
            }
            async fn remove(&self, id: &str, s: &str) -> Result<(), StorageError> {
                self.inner.remove(id, s).await
            }
            async fn clear(&self) -> Result<(), StorageError> {
                self.inner.clear().await
            }
        }

        let store = Arc::new(FlakyStore {
            inner: InMemoryStore::new(),
            failures_left: AtomicUsize::new(1),
        });
        let writer = BatchWriter::new(store.clone(), config(100));
        writer.add(key("a"), payload("1"), 0);

        assert_eq!(writer.flush().await.unwrap().persisted, 1);
        assert!(store.inner.contains("a", "s"));
    }
}
