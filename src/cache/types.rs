// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types returned by the cache tiers.

use crate::key::CompositeKey;
use crate::value::DataValue;

/// Which tier served a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Authoritative,
    Mirror,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authoritative => write!(f, "authoritative"),
            Self::Mirror => write!(f, "mirror"),
        }
    }
}

/// Outcome of a `get`.
///
/// A missing, expired or undecryptable key yields an absent result
/// (`value = None`, zero counters and timestamps) rather than an error.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheResult {
    pub identifier: String,
    pub store_name: String,
    pub value: Option<DataValue>,
    /// Epoch millis; 0 when absent
    pub expiration_date: i64,
    pub last_updated_date: i64,
    pub last_accessed_date: i64,
    pub get_hit_count: u64,
    pub set_hit_count: u64,
    /// None when absent
    pub tier: Option<Tier>,
}

impl CacheResult {
    #[must_use]
    pub fn absent(key: &CompositeKey) -> Self {
        Self {
            identifier: key.identifier.clone(),
            store_name: key.store_name.clone(),
            value: None,
            expiration_date: 0,
            last_updated_date: 0,
            last_accessed_date: 0,
            get_hit_count: 0,
            set_hit_count: 0,
            tier: None,
        }
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    #[must_use]
    pub fn key(&self) -> CompositeKey {
        CompositeKey::new(self.identifier.clone(), self.store_name.clone())
    }
}

/// Where an entry currently lives in the authoritative tier.
///
/// Checked in order: a staged write wins over a cached copy, which wins over
/// the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Staged in the batch writer, not yet durable
    Pending,
    /// In the local cache
    Cached,
    /// Only in the backing store
    Persisted,
    /// Absent or expired
    Missing,
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Cached => write!(f, "Cached"),
            Self::Persisted => write!(f, "Persisted"),
            Self::Missing => write!(f, "Missing"),
        }
    }
}

/// Result of a bulk operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    /// Total items in the batch
    pub total: usize,
    /// Successfully processed items
    pub succeeded: usize,
    /// Failed items
    pub failed: usize,
}

impl BatchResult {
    /// Check if all items succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}
