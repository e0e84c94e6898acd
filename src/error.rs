// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Errors returned by the cache tiers and the coordinator.
//!
//! Component errors ([`ConfigError`], [`CryptoError`], [`CodecError`],
//! [`StorageError`], [`BatchError`]) live next to the code that produces
//! them and convert into [`CacheError`] with `?`.

use thiserror::Error;

use crate::batching::BatchError;
use crate::codec::CodecError;
use crate::config::ConfigError;
use crate::crypto::CryptoError;
use crate::storage::traits::StorageError;

#[derive(Error, Debug)]
pub enum CacheError {
    /// Rejected at construction; never retried.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    /// Expiration outside the representable range of instants.
    #[error("invalid expiration date: {0}")]
    InvalidExpirationDate(i64),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Surfaced after the write retry budget is spent, or immediately on reads.
    #[error("backing store failure: {0}")]
    BackingStore(#[from] StorageError),

    #[error(transparent)]
    Batch(#[from] BatchError),
}

impl CacheError {
    /// True for failures worth retrying later (store or flush errors).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::BackingStore(_) | Self::Batch(_))
    }
}
