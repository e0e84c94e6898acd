// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Property-based tests for values, the entry codec and hit counters.
//!
//! Uses proptest to generate values of every variant plus random/malformed
//! payloads, and verifies round-trips hold and bad input only yields clean
//! errors.
//!
//! Run with: `cargo test --test proptest_values`

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::Value;

use sealed_cache::key::now_millis;
use sealed_cache::value::{GeoMember, ScoredMember, StreamEntry};
use sealed_cache::{
    Algorithm, AuthoritativeCache, CacheConfig, DataValue, EntryCodec, InMemoryStore, KeyManager,
    KeyManagerConfig,
};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Floats with a short exact decimal form, so JSON text round-trips them.
fn exact_float() -> impl Strategy<Value = f64> {
    (-4_000_000i32..4_000_000).prop_map(|n| f64::from(n) / 4.0)
}

fn small_string() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9:_ -]{0,12}"
}

fn json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
    ];

    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map(small_string(), inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn data_value_strategy() -> impl Strategy<Value = DataValue> {
    prop_oneof![
        Just(DataValue::Null),
        any::<bool>().prop_map(DataValue::Boolean),
        any::<i64>().prop_map(DataValue::Integer),
        exact_float().prop_map(DataValue::Float),
        ".*".prop_map(DataValue::String),
        prop::collection::vec(small_string(), 0..8).prop_map(DataValue::List),
        prop::collection::btree_set(small_string(), 0..8).prop_map(DataValue::Set),
        prop::collection::btree_map(small_string(), small_string(), 0..8).prop_map(DataValue::Hash),
        prop::collection::vec(
            (small_string(), prop::collection::btree_map(small_string(), small_string(), 0..4))
                .prop_map(|(id, fields)| StreamEntry { id, fields }),
            0..4
        )
        .prop_map(DataValue::Stream),
        prop::collection::vec(
            (small_string(), exact_float()).prop_map(|(member, score)| ScoredMember { member, score }),
            0..6
        )
        .prop_map(DataValue::SortedSet),
        prop::collection::btree_set(small_string(), 0..8).prop_map(DataValue::HyperLogLog),
        prop::collection::vec(
            (small_string(), exact_float(), exact_float()).prop_map(|(member, longitude, latitude)| GeoMember {
                member,
                longitude,
                latitude,
            }),
            0..4
        )
        .prop_map(DataValue::Geo),
        json_strategy().prop_map(DataValue::Json),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn codec(algorithm: Algorithm) -> EntryCodec {
    let keys = KeyManager::new(KeyManagerConfig {
        algorithm,
        key_size: algorithm.key_len(),
        ..Default::default()
    });
    EntryCodec::new(Arc::new(keys), algorithm)
}

// =============================================================================
// Codec Round-Trip Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every variant decodes to the value that was encoded
    #[test]
    fn prop_codec_roundtrip(
        value in data_value_strategy(),
        algorithm in prop_oneof![
            Just(Algorithm::Aes256Gcm),
            Just(Algorithm::Aes128Gcm),
            Just(Algorithm::ChaCha20Poly1305),
        ],
        expires_at in 0i64..4_000_000_000_000,
    ) {
        let rt = runtime();
        let codec = codec(algorithm);
        let (entry, decoded) = rt.block_on(async {
            let entry = codec.encode_entry(&value, expires_at).await.unwrap();
            let decoded = codec.decode_entry(&entry.payload).await.unwrap();
            (entry, decoded)
        });

        prop_assert_eq!(entry.expires_at, expires_at);
        prop_assert_eq!(entry.payload.value_type.as_str(), value.value_type().as_str());
        prop_assert_eq!(decoded, value);
    }

    /// Tampered ciphertext is rejected, never decoded into a different value
    #[test]
    fn prop_tampered_payload_rejected(
        value in data_value_strategy(),
        flip in 1u8..=255,
        position in 0usize..4096,
    ) {
        let rt = runtime();
        let codec = codec(Algorithm::Aes256Gcm);
        let result = rt.block_on(async {
            let mut entry = codec.encode_entry(&value, 0).await.unwrap();
            let sealed = &mut entry.payload.sealed;
            let mut bytes: Vec<&mut u8> = sealed
                .ciphertext
                .iter_mut()
                .chain(sealed.auth_tag.iter_mut())
                .collect();
            let idx = position % bytes.len();
            *bytes[idx] ^= flip;
            codec.decode_entry(&entry.payload).await
        });
        prop_assert!(result.is_err());
    }

    /// A declared type tag that does not match the plaintext never panics
    #[test]
    fn prop_retagged_payload_never_panics(
        value in data_value_strategy(),
        tag in prop_oneof![
            Just("null"), Just("boolean"), Just("integer"), Just("float"), Just("string"),
            Just("list"), Just("set"), Just("hash"), Just("stream"), Just("zset"),
            Just("hll"), Just("geo"), Just("json"), Just("bogus"),
        ],
    ) {
        let rt = runtime();
        let codec = codec(Algorithm::Aes256Gcm);
        rt.block_on(async {
            let mut entry = codec.encode_entry(&value, 0).await.unwrap();
            entry.payload.value_type = tag.to_string();
            let _ = codec.decode_entry(&entry.payload).await;
        });
    }
}

// =============================================================================
// Deserialization Fuzz Tests
// =============================================================================

proptest! {
    /// DataValue deserialization should never panic on arbitrary bytes
    #[test]
    fn fuzz_data_value_from_random_bytes(bytes in prop::collection::vec(any::<u8>(), 0..2048)) {
        let _ = serde_json::from_slice::<DataValue>(&bytes);
    }

    /// Tagged JSON form survives serialization
    #[test]
    fn prop_tagged_json_roundtrip(value in data_value_strategy()) {
        let json = serde_json::to_vec(&value).unwrap();
        let back: DataValue = serde_json::from_slice(&json).unwrap();
        prop_assert_eq!(back, value);
    }
}

// =============================================================================
// Hit Counter Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// n gets and m sets move the counters by exactly n and m; remove resets both
    #[test]
    fn prop_hit_counters_are_exact(sets in 1u64..12, gets in 0u64..12) {
        let rt = runtime();
        rt.block_on(async {
            let cache = AuthoritativeCache::new(&CacheConfig::default(), Arc::new(InMemoryStore::new())).unwrap();
            let expires = now_millis() + 3_600_000;

            for i in 0..sets {
                cache.set("k", "s", DataValue::Integer(i as i64), expires).await.unwrap();
            }
            for _ in 0..gets {
                cache.get("k", "s").await.unwrap();
            }
            let r = cache.get("k", "s").await.unwrap();
            assert_eq!(r.get_hit_count, gets + 1);
            assert_eq!(r.set_hit_count, sets);
            assert_eq!(r.value, Some(DataValue::Integer(sets as i64 - 1)));

            cache.remove("k", "s").await.unwrap();
            let gone = cache.get("k", "s").await.unwrap();
            assert_eq!((gone.get_hit_count, gone.set_hit_count), (0, 0));
        });
    }
}
