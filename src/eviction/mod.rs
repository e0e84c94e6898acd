// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Eviction for the authoritative tier's local cache.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Eviction Module                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  mod.rs     - EvictionPolicy: lru | lfu | random             │
//! │  local.rs   - LocalCache: bounded map + hard TTL             │
//! │  └─ LocalEntry: value + recency tick + access count          │
//! │  └─ victim selection on insert at capacity                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Size bound and TTL are independent: an entry leaves the local cache when
//! its TTL lapses or when it is chosen as a victim, whichever comes first.
//! Leaving the local cache does not remove it from the backing store.

pub mod local;

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// Victim selection policy when the local cache is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently used
    #[default]
    Lru,
    /// Least frequently used, ties broken by recency
    Lfu,
    /// Uniformly random
    Random,
}

impl EvictionPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lru => "lru",
            Self::Lfu => "lfu",
            Self::Random => "random",
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(Self::Lru),
            "lfu" => Ok(Self::Lfu),
            "random" => Ok(Self::Random),
            other => Err(format!("unrecognized eviction policy '{}'", other)),
        }
    }
}

/// Why an entry left the local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// Chosen as victim at capacity
    Capacity,
    /// Local TTL lapsed
    Ttl,
    /// Entry expiration date passed
    Expired,
}

impl EvictionReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Capacity => "capacity",
            Self::Ttl => "ttl",
            Self::Expired => "expired",
        }
    }
}
