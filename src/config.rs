// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the cache.
//!
//! [`CacheConfig`] is the raw, deserializable surface. Numeric fields are
//! signed so that a negative value reaches validation and is rejected by
//! name instead of failing to parse. [`CacheConfig::validate`] is the only
//! way to obtain [`CacheSettings`], which the cache tiers consume.
//!
//! # Example
//!
//! ```
//! use sealed_cache::CacheConfig;
//!
//! // Minimal config (uses defaults)
//! let settings = CacheConfig::default().validate().unwrap();
//! assert_eq!(settings.cache_size, 1000);
//!
//! // Rejected, not clamped
//! let err = CacheConfig { cache_size: -1, ..Default::default() }
//!     .validate()
//!     .unwrap_err();
//! assert!(err.to_string().contains("cache size"));
//! ```

use std::path::PathBuf;
use std::time::Duration;
use serde::Deserialize;
use thiserror::Error;

use crate::batching::BatchWriterConfig;
use crate::compression::{self, MAX_COMPRESSION_LEVEL};
use crate::crypto::key_file::KeyFile;
use crate::crypto::key_manager::KeyManagerConfig;
use crate::crypto::{Algorithm, MAX_KEYS};
use crate::eviction::EvictionPolicy;
use crate::resilience::retry::RetryConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be positive (got {value})")]
    NotPositive { field: &'static str, value: i64 },

    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: i64 },

    #[error("compression level must be between 1 and 22 (got {0})")]
    CompressionLevel(i64),

    #[error("unrecognized eviction policy '{0}' (expected lru, lfu or random)")]
    EvictionPolicy(String),

    #[error("unrecognized algorithm '{0}' (expected aes-256-gcm, aes-128-gcm or chacha20-poly1305)")]
    Algorithm(String),

    #[error("key size {got} does not match {algorithm} (expects {expected} bytes)")]
    KeySize {
        algorithm: Algorithm,
        got: i64,
        expected: usize,
    },

    #[error("compression requested but the `compression` feature is not enabled")]
    CompressionUnavailable,
}

/// Raw cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Local cache capacity in entries
    #[serde(default = "default_cache_size")]
    pub cache_size: i64,

    /// Hard TTL for local cache entries
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: i64,

    /// "lru", "lfu" or "random"
    #[serde(default = "default_eviction_policy")]
    pub eviction_policy: String,

    /// "aes-256-gcm", "aes-128-gcm" or "chacha20-poly1305"
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Key length in bytes; must match the algorithm
    #[serde(default = "default_key_size")]
    pub key_size: i64,

    /// Staged writes that trigger an immediate flush
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: i64,

    /// Period of automatic key rotation (None = rotate only on demand)
    #[serde(default)]
    pub rotation_interval_ms: Option<i64>,

    /// Minimum time between two rotations
    #[serde(default = "default_min_rotation_gap_ms")]
    pub min_rotation_gap_ms: i64,

    /// zstd level, 1-22. Validated even when `compress` is off
    #[serde(default = "default_compression_level")]
    pub compression_level: i64,

    #[serde(default)]
    pub compress: bool,

    /// Attempts per durable write, including the first
    #[serde(default = "default_write_retries")]
    pub write_retries: i64,

    /// Re-stage writes from a failed flush
    #[serde(default)]
    pub requeue_failed_writes: bool,

    /// Key-material side-file (None = in-memory keys only)
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// Expiry applied by `preload_cache` (defaults to `ttl_ms`)
    #[serde(default)]
    pub max_age_ms: Option<i64>,
}

fn default_cache_size() -> i64 { 1000 }
fn default_ttl_ms() -> i64 { 3_600_000 }
fn default_eviction_policy() -> String { "lru".to_string() }
fn default_algorithm() -> String { "aes-256-gcm".to_string() }
fn default_key_size() -> i64 { 32 }
fn default_batch_size() -> i64 { 100 }
fn default_flush_interval_ms() -> i64 { 1000 }
fn default_min_rotation_gap_ms() -> i64 { 60_000 }
fn default_compression_level() -> i64 { 3 }
fn default_write_retries() -> i64 { 3 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_size: default_cache_size(),
            ttl_ms: default_ttl_ms(),
            eviction_policy: default_eviction_policy(),
            algorithm: default_algorithm(),
            key_size: default_key_size(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            rotation_interval_ms: None,
            min_rotation_gap_ms: default_min_rotation_gap_ms(),
            compression_level: default_compression_level(),
            compress: false,
            write_retries: default_write_retries(),
            requeue_failed_writes: false,
            key_file: None,
            max_age_ms: None,
        }
    }
}

fn positive(field: &'static str, value: i64) -> Result<u64, ConfigError> {
    if value <= 0 {
        return Err(ConfigError::NotPositive { field, value });
    }
    Ok(value as u64)
}

fn non_negative(field: &'static str, value: i64) -> Result<u64, ConfigError> {
    if value < 0 {
        return Err(ConfigError::Negative { field, value });
    }
    Ok(value as u64)
}

impl CacheConfig {
    /// Check every field and produce typed settings. Nothing is clamped.
    pub fn validate(&self) -> Result<CacheSettings, ConfigError> {
        let cache_size = positive("cache size", self.cache_size)? as usize;
        let ttl = Duration::from_millis(positive("ttl", self.ttl_ms)?);
        let batch_size = positive("batch size", self.batch_size)? as usize;
        let flush_interval = Duration::from_millis(positive("flush interval", self.flush_interval_ms)?);
        let rotation_interval = self
            .rotation_interval_ms
            .map(|ms| positive("rotation interval", ms).map(Duration::from_millis))
            .transpose()?;
        let min_rotation_gap = Duration::from_millis(non_negative("minimum rotation gap", self.min_rotation_gap_ms)?);
        let write_attempts = positive("write retries", self.write_retries)? as usize;
        let max_age = match self.max_age_ms {
            Some(ms) => Duration::from_millis(positive("max age", ms)?),
            None => ttl,
        };

        if !(1..=i64::from(MAX_COMPRESSION_LEVEL)).contains(&self.compression_level) {
            return Err(ConfigError::CompressionLevel(self.compression_level));
        }
        if self.compress && !compression::is_available() {
            return Err(ConfigError::CompressionUnavailable);
        }

        let eviction_policy: EvictionPolicy = self
            .eviction_policy
            .parse()
            .map_err(|_| ConfigError::EvictionPolicy(self.eviction_policy.clone()))?;
        let algorithm: Algorithm = self
            .algorithm
            .parse()
            .map_err(|_| ConfigError::Algorithm(self.algorithm.clone()))?;

        let key_size = positive("key size", self.key_size)? as usize;
        if key_size != algorithm.key_len() {
            return Err(ConfigError::KeySize {
                algorithm,
                got: self.key_size,
                expected: algorithm.key_len(),
            });
        }

        Ok(CacheSettings {
            cache_size,
            ttl,
            eviction_policy,
            algorithm,
            key_size,
            batch_size,
            flush_interval,
            rotation_interval,
            min_rotation_gap,
            compression_level: self.compress.then_some(self.compression_level as i32),
            write_retry: RetryConfig::with_attempts(write_attempts),
            requeue_failed_writes: self.requeue_failed_writes,
            key_file: self.key_file.clone(),
            max_age,
        })
    }
}

/// Validated configuration. Built only by [`CacheConfig::validate`].
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub cache_size: usize,
    pub ttl: Duration,
    pub eviction_policy: EvictionPolicy,
    pub algorithm: Algorithm,
    pub key_size: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub rotation_interval: Option<Duration>,
    pub min_rotation_gap: Duration,
    /// Some(level) when compression is on
    pub compression_level: Option<i32>,
    pub write_retry: RetryConfig,
    pub requeue_failed_writes: bool,
    pub key_file: Option<PathBuf>,
    pub max_age: Duration,
}

impl CacheSettings {
    #[must_use]
    pub fn key_manager_config(&self) -> KeyManagerConfig {
        KeyManagerConfig {
            algorithm: self.algorithm,
            key_size: self.key_size,
            max_keys: MAX_KEYS,
            min_rotation_gap: self.min_rotation_gap,
            key_file: self.key_file.clone().map(KeyFile::new),
        }
    }

    #[must_use]
    pub fn batch_writer_config(&self) -> BatchWriterConfig {
        BatchWriterConfig {
            batch_size: self.batch_size,
            flush_interval: self.flush_interval,
            retry: self.write_retry.clone(),
            requeue_failed: self.requeue_failed_writes,
        }
    }
}
