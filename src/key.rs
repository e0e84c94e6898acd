// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Composite keys and wall-clock helpers.
//!
//! Every entry is addressed by an `(identifier, store_name)` pair. Timestamps
//! are epoch milliseconds throughout the crate.

use std::fmt;
use serde::{Deserialize, Serialize};

/// Identifier or store name that matches every key when subscribing.
pub const WILDCARD: &str = "*";

/// Largest representable instant, in epoch millis (±100,000,000 days).
pub const MAX_TIMESTAMP_MILLIS: i64 = 8_640_000_000_000_000;

/// `(identifier, store_name)` pair, unique within a backing store.
///
/// # Example
///
/// ```
/// use sealed_cache::CompositeKey;
///
/// let key = CompositeKey::new("user:1", "profile");
/// assert_eq!(key.to_string(), "profile/user:1");
/// assert!(!key.is_wildcard());
/// assert!(CompositeKey::all().is_wildcard());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompositeKey {
    pub identifier: String,
    pub store_name: String,
}

impl CompositeKey {
    pub fn new(identifier: impl Into<String>, store_name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            store_name: store_name.into(),
        }
    }

    /// The `("*", "*")` key.
    #[must_use]
    pub fn all() -> Self {
        Self::new(WILDCARD, WILDCARD)
    }

    /// True if either half is the wildcard.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.identifier == WILDCARD || self.store_name == WILDCARD
    }

    /// Keys a change to `self` must be published under, exact key first.
    ///
    /// Wildcard halves are not expanded again, so a literal `"*"` identifier
    /// does not produce duplicates.
    #[must_use]
    pub fn fan_out(&self) -> Vec<CompositeKey> {
        let mut keys = vec![self.clone()];
        let candidates = [
            CompositeKey::new(self.identifier.clone(), WILDCARD),
            CompositeKey::new(WILDCARD, self.store_name.clone()),
            CompositeKey::all(),
        ];
        for candidate in candidates {
            if !keys.contains(&candidate) {
                keys.push(candidate);
            }
        }
        keys
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store_name, self.identifier)
    }
}

/// Current wall-clock time in epoch millis.
#[must_use]
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// True if `millis` is a representable instant.
#[must_use]
pub fn is_valid_timestamp(millis: i64) -> bool {
    (-MAX_TIMESTAMP_MILLIS..=MAX_TIMESTAMP_MILLIS).contains(&millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_exact_key_first() {
        let key = CompositeKey::new("user:1", "profile");
        let keys = key.fan_out();
        assert_eq!(keys.len(), 4);
        assert_eq!(keys[0], key);
        assert!(keys.contains(&CompositeKey::new("user:1", "*")));
        assert!(keys.contains(&CompositeKey::new("*", "profile")));
        assert!(keys.contains(&CompositeKey::all()));
    }

    #[test]
    fn test_fan_out_of_wildcard_has_no_duplicates() {
        let keys = CompositeKey::new("*", "profile").fan_out();
        assert_eq!(keys.len(), 2);

        let keys = CompositeKey::all().fan_out();
        assert_eq!(keys, vec![CompositeKey::all()]);
    }

    #[test]
    fn test_timestamp_bounds() {
        assert!(is_valid_timestamp(0));
        assert!(is_valid_timestamp(now_millis()));
        assert!(is_valid_timestamp(-MAX_TIMESTAMP_MILLIS));
        assert!(!is_valid_timestamp(MAX_TIMESTAMP_MILLIS + 1));
        assert!(!is_valid_timestamp(i64::MIN));
    }
}
