// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backing-store contract and the in-memory implementation.
//!
//! Concrete durable backends (document databases, remote key/value services)
//! live outside this crate and plug in through [`traits::BackingStore`].

pub mod memory;
pub mod traits;
