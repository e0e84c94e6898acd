// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic sealed-cache usage example.
//!
//! Demonstrates:
//! 1. Opening an authoritative tier with a key side-file
//! 2. Two coordinators sharing one sync bus, each with its own mirror
//! 3. Writing entries and watching change events arrive
//! 4. Reading back from the mirror and authoritative tiers
//! 5. Rotating keys while old entries stay readable
//! 6. Displaying captured metrics
//! 7. Clean shutdown
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use sealed_cache::key::now_millis;
use sealed_cache::{
    AuthoritativeCache, CacheConfig, CompositeKey, DataValue, InMemoryMirrorStore, InMemoryStore,
    SyncBus, TwoTierCache,
};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sealed_cache=info".into()),
        )
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           sealed-cache: Basic Usage Example                   ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Open the authoritative tier
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Opening authoritative cache...");
    let key_dir = std::env::temp_dir().join(format!("sealed-cache-demo-{}", std::process::id()));
    std::fs::create_dir_all(&key_dir)?;

    let config = CacheConfig {
        cache_size: 100,
        batch_size: 10,
        flush_interval_ms: 250,
        min_rotation_gap_ms: 0,
        key_file: Some(key_dir.join("keys.json")),
        ..Default::default()
    };
    let store = Arc::new(InMemoryStore::new());
    let authority = AuthoritativeCache::open(&config, store.clone()).await?;
    println!("   ✅ Ready ({} / {})", authority.settings().algorithm, authority.settings().eviction_policy);

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Two contexts sharing a bus
    // ─────────────────────────────────────────────────────────────────────────
    let bus = Arc::new(SyncBus::new());
    let writer = TwoTierCache::with_mirror(authority.clone(), bus.clone(), Arc::new(InMemoryMirrorStore::new()));
    let reader_mirror = Arc::new(InMemoryMirrorStore::new());
    let reader = TwoTierCache::with_mirror(authority.clone(), bus.clone(), reader_mirror.clone());

    let watch = reader.subscribe("*", "profile", |event| {
        println!("   📣 {:?} {}", event.kind, event.key);
        Ok(())
    });

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Write a few entries
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Writing entries through the first context...");
    let expires = now_millis() + 3_600_000;
    let entries = vec![
        ("user:alice", DataValue::Json(json!({"name": "Alice", "role": "admin"}))),
        ("user:bob", DataValue::String("Bob".into())),
        ("user:carol", DataValue::Integer(42)),
    ];
    for (id, value) in &entries {
        let start = std::time::Instant::now();
        writer.set(id, "profile", value.clone(), expires).await?;
        println!("   └─ {} ({:?})", id, start.elapsed());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Read back from the second context
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📖 Reading through the second context (mirror was filled by the bus)...");
    println!("   Mirror holds {} entries", reader_mirror.len());
    for (id, _) in &entries {
        let r = reader.get(id, "profile").await?;
        println!("   └─ {} → {:?} via {:?}", id, r.value, r.tier);
    }

    println!("\n📖 Reading the authoritative tier directly...");
    let r = authority.get("user:alice", "profile").await?;
    println!("   └─ user:alice gets={} sets={}", r.get_hit_count, r.set_hit_count);

    println!("\n⏳ Flushing staged writes...");
    let report = authority.flush().await?;
    println!("   ✅ Persisted {} entries in {:?}", report.persisted, report.duration);
    for (id, _) in &entries {
        println!("   └─ {}: {}", id, authority.status(id, "profile").await?);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Rotate keys
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔐 Rotating keys...");
    authority.rotate_keys().await?;
    authority.rotate_keys().await?;
    println!("   └─ Retained generations: {:?}", authority.key_manager().fingerprints());

    let cold = AuthoritativeCache::new(&config, store.clone())?;
    let r = cold.get("user:bob", "profile").await?;
    println!("   └─ Cold read of user:bob after rotation → {:?}", r.value);
    let key = CompositeKey::new("user:bob", "profile");
    if let Some(entry) = store.peek(&key.identifier, &key.store_name) {
        println!("   └─ Sealed under key id {}", entry.payload.key_id());
    }

    writer.remove("user:bob", "profile").await?;
    println!("   └─ Removed user:bob, present={}", reader.get("user:bob", "profile").await?.is_present());

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Dump raw metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Raw Metrics:");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 7. Clean shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Shutting down...");
    watch.unsubscribe();
    drop(reader);
    drop(writer);
    let flushed = authority.close().await?;
    println!("   ✅ Shutdown complete! Final flush persisted {} entries", flushed);

    if let Err(e) = std::fs::remove_dir_all(&key_dir) {
        println!("   └─ Warning: could not remove {}: {}", key_dir.display(), e);
    }

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Dump all captured metrics grouped by kind
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut counters: Vec<_> = vec![];
    let mut gauges: Vec<_> = vec![];
    let mut histograms: Vec<_> = vec![];

    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let name = key.name().to_string();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        match value {
            DebugValue::Counter(v) => counters.push((name, label_str, v)),
            DebugValue::Gauge(v) => gauges.push((name, label_str, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                let avg = if count > 0 { sum / count as f64 } else { 0.0 };
                histograms.push((name, label_str, count, avg));
            }
        }
    }

    counters.sort();
    gauges.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    histograms.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    if !counters.is_empty() {
        println!("   ┌─ Counters (cumulative)");
        for (name, labels, value) in &counters {
            println!("   │  └─ {}{} = {}", name, labels, value);
        }
    }
    if !gauges.is_empty() {
        println!("   ├─ Gauges (current value)");
        for (name, labels, value) in &gauges {
            println!("   │  └─ {}{} = {:.2}", name, labels, value);
        }
    }
    if !histograms.is_empty() {
        println!("   └─ Histograms (distributions)");
        for (name, labels, count, avg) in &histograms {
            println!("   │  └─ {}{} count={} avg={:.6}", name, labels, count, avg);
        }
    }
    if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
}
