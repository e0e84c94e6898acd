// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Sealed Cache
//!
//! A two-tier cache with encryption at rest.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  TwoTierCache (coordinator)                 │
//! │  • Routes get/set/remove/clear across tiers                │
//! │  • Publishes every change on the SyncBus                   │
//! └─────────────────────────────────────────────────────────────┘
//!            │                                    │
//!            ▼                                    ▼
//! ┌──────────────────────────┐        ┌──────────────────────────┐
//! │   MirrorCache (client)   │◄───────│   SyncBus (in-process)   │
//! │  • Fresh local reads     │ notify │  • Listeners per key     │
//! │  • Read-through/backfill │        │  • Wildcard fan-out      │
//! └──────────────────────────┘        └──────────────────────────┘
//!            │ write-through
//!            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │             AuthoritativeCache (source of truth)            │
//! │  • Local LRU/LFU/random cache + hard TTL                   │
//! │  • Hit counters, expiry, validated configuration           │
//! └─────────────────────────────────────────────────────────────┘
//!            │                                    │
//!            ▼                                    ▼
//! ┌──────────────────────────┐        ┌──────────────────────────┐
//! │   EntryCodec             │        │   BatchWriter            │
//! │  • Canonical bytes       │        │  • Coalesced flushes     │
//! │  • KeyManager (rotation, │        │  • One flush in flight   │
//! │    fallback decrypt)     │        │  • Retry per write       │
//! └──────────────────────────┘        └──────────────────────────┘
//!                                                 │
//!                                                 ▼
//!                                     ┌──────────────────────────┐
//!                                     │   BackingStore (durable) │
//!                                     └──────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sealed_cache::{AuthoritativeCache, CacheConfig, DataValue, InMemoryStore, SyncBus, TwoTierCache};
//! use sealed_cache::key::now_millis;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CacheConfig {
//!         key_file: Some("keys.json".into()),
//!         ..Default::default()
//!     };
//!     let authority = AuthoritativeCache::open(&config, Arc::new(InMemoryStore::new())).await?;
//!     let cache = TwoTierCache::new(authority.clone(), Arc::new(SyncBus::new()));
//!
//!     cache.set("user:1", "profile", DataValue::String("a".into()), now_millis() + 3_600_000).await?;
//!     let hit = cache.get("user:1", "profile").await?;
//!     println!("{:?} (gets={})", hit.value, hit.get_hit_count);
//!
//!     authority.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Encryption at rest**: AES-GCM or ChaCha20-Poly1305, keys rotated within a bounded window
//! - **Batch Writes**: Flush by count or time, never two flushes at once
//! - **Retry Logic**: Bounded exponential backoff for durable writes
//! - **Compression**: Optional zstd before sealing (`compression` feature)
//!
//! ## Configuration
//!
//! See [`CacheConfig`] for all configuration options.

pub mod batching;
pub mod cache;
pub mod codec;
pub mod compression;
pub mod config;
pub mod coordinator;
pub mod crypto;
pub mod error;
pub mod eviction;
pub mod key;
pub mod metrics;
pub mod mirror;
pub mod resilience;
pub mod storage;
pub mod sync_bus;
pub mod value;

pub use batching::{BatchError, BatchWriter, FlushReason, FlushReport};
pub use cache::{AuthoritativeCache, BatchResult, CacheResult, EntryStatus, Tier};
pub use codec::{CodecError, EntryCodec, SealedEntry};
pub use config::{CacheConfig, CacheSettings, ConfigError};
pub use coordinator::TwoTierCache;
pub use crypto::key_manager::{KeyManager, KeyManagerConfig};
pub use crypto::{Algorithm, CryptoError, EncryptedPayload};
pub use error::CacheError;
pub use eviction::EvictionPolicy;
pub use key::CompositeKey;
pub use metrics::LatencyTimer;
pub use mirror::{InMemoryMirrorStore, MirrorCache, MirrorEntry, MirrorStore};
pub use resilience::retry::RetryConfig;
pub use storage::memory::InMemoryStore;
pub use storage::traits::{BackingStore, StorageError};
pub use sync_bus::{ChangeEvent, ChangeKind, ListenerError, Subscription, SyncBus};
pub use value::{DataValue, ValueType};
