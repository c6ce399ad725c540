// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic tiered-store usage example.
//!
//! Demonstrates:
//! 1. Two stores sharing one bounded memory pool
//! 2. Writes going to the tier of record, reads faulting into the near tier
//! 3. Pool-driven eviction with write-back and pinning
//! 4. Displaying metrics
//! 5. Clean shutdown
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::time::Instant;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use tiered_store::{Element, FromLargestEvictor, MemoryPool, StoreConfig, TieredStore};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter("tiered_store=info")
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           tiered-store: Basic Usage Example                   ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. One pool, two stores
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Creating a 16 KB pool shared by two stores...");
    let pool = MemoryPool::new("shared", 16 * 1024, FromLargestEvictor);
    let users: TieredStore<String, String> = TieredStore::on_heap("users", &pool, StoreConfig::default())?;
    let blobs: TieredStore<u64, Vec<u8>> = TieredStore::on_heap("blobs", &pool, StoreConfig::default())?;
    println!("   └─ {:?}", pool);

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Writes land in the tier of record only
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Writing 5 users...");
    for (id, name) in ["alice", "bob", "carol", "dave", "erin"].iter().enumerate() {
        users.put(Element::new(format!("user.{id}"), name.to_string()))?;
    }
    println!("   └─ authority entries: {}, near-tier entries: {}", users.len()?, users.in_memory_len()?);

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Reads fault in once, then hit
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📖 Reading user.0 twice...");
    for attempt in ["fault", "hit"] {
        let start = Instant::now();
        let element = users.get(&"user.0".to_string())?;
        let name = element.as_ref().map(|e| e.value().as_str()).unwrap_or("(missing)");
        println!("   └─ {attempt}: {name} ({:?})", start.elapsed());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Pool pressure: large blobs push user entries out
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🗜️  Pinning user.0, then loading 8 × 4 KB blobs...");
    users.set_pinned(&"user.0".to_string(), true)?;
    for id in 1..5 {
        users.get(&format!("user.{id}"))?;
    }
    for id in 0..8u64 {
        blobs.put(Element::new(id, vec![0u8; 4096]))?;
        blobs.get(&id)?;
    }
    println!("   └─ pool: {} / {} bytes ({})", pool.consumed(), pool.capacity(), pool.pressure());
    println!("   └─ users near tier: {} entries, user.0 resident: {}",
        users.in_memory_len()?,
        users.contains_key_in_memory(&"user.0".to_string())?);
    println!("   └─ blobs near tier: {} entries", blobs.in_memory_len()?);
    println!("   └─ users: {}", users.stats()?);
    println!("   └─ blobs: {}", blobs.stats()?);

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Raw Metrics:");
    pool.update_gauge_metrics();
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Disposing stores...");
    users.dispose();
    blobs.dispose();
    println!("   ✅ Pool released: {} bytes, {} participants", pool.consumed(), pool.participant_count());

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");
    Ok(())
}

/// Print every captured metric, grouped by kind.
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut counters = Vec::new();
    let mut gauges = Vec::new();
    let mut histograms = Vec::new();

    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let name = if labels.is_empty() {
            key.name().to_string()
        } else {
            format!("{}{{{}}}", key.name(), labels.join(","))
        };

        match value {
            DebugValue::Counter(v) => counters.push((name, v)),
            DebugValue::Gauge(v) => gauges.push((name, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                histograms.push((name, count, sum));
            }
        }
    }

    counters.sort_by(|a, b| a.0.cmp(&b.0));
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    println!("   ┌─ Counters");
    for (name, value) in &counters {
        println!("   │  └─ {name} = {value}");
    }
    println!("   ├─ Gauges");
    for (name, value) in &gauges {
        println!("   │  └─ {name} = {value:.2}");
    }
    println!("   └─ Histograms");
    for (name, count, sum) in &histograms {
        let avg = if *count > 0 { sum / *count as f64 } else { 0.0 };
        println!("      └─ {name} count={count} avg={avg:.6}");
    }
}
