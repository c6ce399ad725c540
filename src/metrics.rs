// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for tiered stores and memory pools.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host process is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `tiered_store_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//! - `_bytes` suffix for sizes
//!
//! # Labels
//! - `tier`: caching, authority, store
//! - `operation`: get, put, remove, fault, write_back, ...
//! - `status`: success, error
//! - `store` / `pool`: instance names

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record an operation outcome
pub fn record_operation(tier: &str, operation: &str, status: &str) {
    counter!(
        "tiered_store_operations_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(tier: &str, operation: &str, duration: Duration) {
    histogram!(
        "tiered_store_operation_seconds",
        "tier" => tier.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

// ═══════════════════════════════════════════════════════════════════════════
// NEAR TIER - Hits, faults and evictions
// ═══════════════════════════════════════════════════════════════════════════

/// Record a near-tier lookup outcome (hit, loaded, uncached, absent, failed)
pub fn record_fault(store: &str, outcome: &str) {
    counter!(
        "tiered_store_lookups_total",
        "store" => store.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record threads that waited on another thread's in-flight load
pub fn record_fault_wait(store: &str) {
    counter!(
        "tiered_store_fault_waits_total",
        "store" => store.to_string()
    )
    .increment(1);
}

/// Record eviction event
pub fn record_eviction(store: &str, count: usize, bytes: u64) {
    counter!("tiered_store_evictions_total", "store" => store.to_string()).increment(count as u64);
    counter!("tiered_store_evicted_bytes_total", "store" => store.to_string()).increment(bytes);
}

/// Record an eviction whose write-back failed (entry kept)
pub fn record_write_back_failure(store: &str) {
    counter!(
        "tiered_store_write_back_failures_total",
        "store" => store.to_string()
    )
    .increment(1);
}

/// Set near-tier occupancy
pub fn set_store_entries(store: &str, count: usize, bytes: u64) {
    gauge!("tiered_store_near_tier_items", "store" => store.to_string()).set(count as f64);
    gauge!("tiered_store_near_tier_bytes", "store" => store.to_string()).set(bytes as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// MEMORY POOL - Shared budget
// ═══════════════════════════════════════════════════════════════════════════

/// Record an add that left the pool over capacity
pub fn record_soft_overflow(pool: &str) {
    counter!(
        "tiered_store_pool_soft_overflows_total",
        "pool" => pool.to_string()
    )
    .increment(1);
}

/// Record one evictor pass
pub fn record_pool_reclaim(pool: &str, requested: u64, freed: u64) {
    counter!("tiered_store_pool_reclaims_total", "pool" => pool.to_string()).increment(1);
    histogram!("tiered_store_pool_reclaim_requested_bytes", "pool" => pool.to_string())
        .record(requested as f64);
    histogram!("tiered_store_pool_reclaim_freed_bytes", "pool" => pool.to_string())
        .record(freed as f64);
}

/// Set pool consumption and capacity
pub fn set_pool_bytes(pool: &str, consumed: u64, capacity: u64) {
    gauge!("tiered_store_pool_consumed_bytes", "pool" => pool.to_string()).set(consumed as f64);
    gauge!("tiered_store_pool_capacity_bytes", "pool" => pool.to_string()).set(capacity as f64);
}

/// Set pool pressure level (0 = Normal, 1 = Elevated, 2 = Critical, 3 = Overflow)
pub fn set_pool_pressure(pool: &str, level: u8) {
    gauge!("tiered_store_pool_pressure", "pool" => pool.to_string()).set(level as f64);
}

/// Set registered participant count
pub fn set_pool_participants(pool: &str, count: usize) {
    gauge!("tiered_store_pool_participants", "pool" => pool.to_string()).set(count as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// ERROR TRACKING - Categorized error counters for alerting
// ═══════════════════════════════════════════════════════════════════════════

/// Record an error with category for alerting
pub fn record_error(tier: &str, operation: &str, error_type: &str) {
    counter!(
        "tiered_store_errors_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

/// Set store status (for monitoring lifecycle transitions)
pub fn set_store_status(store: &str, status: &str) {
    counter!(
        "tiered_store_status_transitions_total",
        "store" => store.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    tier: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(tier: &'static str, operation: &'static str) -> Self {
        Self {
            tier,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.tier, self.operation, self.start.elapsed());
    }
}

/// Convenience macro for timing operations
#[macro_export]
macro_rules! time_operation {
    ($tier:expr, $op:expr) => {
        $crate::metrics::LatencyTimer::new($tier, $op)
    };
}
