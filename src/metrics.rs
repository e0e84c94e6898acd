// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for sealed-cache.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host process is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `sealed_cache_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `tier`: authoritative, mirror, coordinator
//! - `operation`: get, set, remove, clear, preload
//! - `status`: success, error, miss

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a cache operation outcome
pub fn record_operation(tier: &str, operation: &str, status: &str) {
    counter!(
        "sealed_cache_operations_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(tier: &str, operation: &str, duration: Duration) {
    histogram!(
        "sealed_cache_operation_seconds",
        "tier" => tier.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a read hit. `source` is where the value came from: local, pending, store, mirror.
pub fn record_hit(source: &str) {
    counter!("sealed_cache_hits_total", "source" => source.to_string()).increment(1);
}

pub fn record_miss(tier: &str) {
    counter!("sealed_cache_misses_total", "tier" => tier.to_string()).increment(1);
}

/// Record a completed batch flush
pub fn record_batch_flush(reason: &str, count: usize, duration: Duration) {
    counter!("sealed_cache_batch_flushes_total", "reason" => reason.to_string()).increment(1);
    histogram!("sealed_cache_batch_size").record(count as f64);
    histogram!("sealed_cache_batch_flush_seconds").record(duration.as_secs_f64());
}

/// Record entries that could not be persisted by a flush
pub fn record_flush_failure(failed: usize) {
    counter!("sealed_cache_batch_flush_failures_total").increment(1);
    counter!("sealed_cache_batch_failed_entries_total").increment(failed as u64);
}

/// Set number of staged writes awaiting flush
pub fn set_batch_pending(count: usize) {
    gauge!("sealed_cache_batch_pending_items").set(count as f64);
}

/// Set current local cache item count
pub fn set_local_cache_items(count: usize) {
    gauge!("sealed_cache_local_cache_items").set(count as f64);
}

/// Record local cache eviction
pub fn record_eviction(reason: &str) {
    counter!("sealed_cache_evictions_total", "reason" => reason.to_string()).increment(1);
}

pub fn record_key_rotation() {
    counter!("sealed_cache_key_rotations_total").increment(1);
}

/// Payload opened with a key other than the one it declared
pub fn record_decrypt_fallback() {
    counter!("sealed_cache_decrypt_fallbacks_total").increment(1);
}

/// Payload could not be opened with any retained key
pub fn record_decrypt_failure() {
    counter!("sealed_cache_decrypt_failures_total").increment(1);
}

pub fn record_listener_error(kind: &str) {
    counter!("sealed_cache_listener_errors_total", "kind" => kind.to_string()).increment(1);
}

/// Record backing store error
pub fn record_store_error(backend: &str, operation: &str) {
    counter!(
        "sealed_cache_store_errors_total",
        "backend" => backend.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    tier: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(tier: &'static str, operation: &'static str) -> Self {
        Self {
            tier,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.tier, self.operation, self.start.elapsed());
    }
}
