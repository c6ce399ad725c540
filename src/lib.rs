// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Tiered Store
//!
//! An in-process, tiered object cache: a fast near tier in front of a tier
//! of record, with shared byte-bounded memory pools that evict across every
//! cache registered with them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        TieredStore                          │
//! │  • Reads: near tier, single-flight fault-in on miss         │
//! │  • Writes: authoritative tier, then invalidate near tier    │
//! └─────────────────────────────────────────────────────────────┘
//!                 │                              │
//!                 ▼                              ▼
//! ┌───────────────────────────────┐  ┌──────────────────────────┐
//! │   CachingTier (near tier)     │  │   AuthoritativeTier      │
//! │  • OnHeapCachingTier          │  │  • InMemoryAuthority     │
//! │  • LRU / LFU / FIFO victims   │──►  • fault / write_back    │
//! │  • pinning                    │  │                          │
//! └───────────────────────────────┘  └──────────────────────────┘
//!                 │ PoolParticipant (bytes, count, pinned)
//!                 ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        MemoryPool                           │
//! │  • One byte budget shared by many stores                    │
//! │  • Over capacity → PoolEvictor asks participants to shed    │
//! │  • Nothing left to shed → soft overflow (warn + metric)     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use tiered_store::{Element, FromLargestEvictor, MemoryPool, StoreConfig, TieredStore};
//!
//! // Two stores sharing a 1 MB budget
//! let pool = MemoryPool::new("shared", 1024 * 1024, FromLargestEvictor);
//! let users: TieredStore<String, String> =
//!     TieredStore::on_heap("users", &pool, StoreConfig::default()).unwrap();
//! let sessions: TieredStore<u64, Vec<u8>> =
//!     TieredStore::on_heap("sessions", &pool, StoreConfig::default()).unwrap();
//!
//! users.put(Element::new("user.1".into(), "alice".into())).unwrap();
//! sessions.put(Element::new(42, vec![0u8; 4096])).unwrap();
//!
//! // Misses fault in from the authoritative tier and charge the pool
//! assert!(users.get(&"user.1".into()).unwrap().is_some());
//! assert!(sessions.get(&42).unwrap().is_some());
//! assert!(pool.consumed() > 4096);
//!
//! users.dispose();
//! sessions.dispose();
//! assert_eq!(pool.consumed(), 0);
//! ```
//!
//! ## Configuration
//!
//! See [`StoreConfig`] and [`PoolConfig`].
//!
//! ## Modules
//!
//! - [`coordinator`]: the [`TieredStore`] orchestrator
//! - [`tier`]: tier traits and the reference tiers
//! - [`pool`]: memory pools, participants and evictors
//! - [`eviction`]: per-tier entry ordering
//! - [`size`]: byte-cost estimation
//! - [`metrics`]: `metrics`-crate instrumentation

pub mod config;
pub mod coordinator;
pub mod element;
pub mod error;
pub mod eviction;
pub mod metrics;
pub mod pool;
pub mod size;
pub mod tier;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use config::{parse_byte_size, ByteSize, EvictorKind, PoolConfig, StoreConfig};
pub use coordinator::{StoreStats, StoreStatus, TieredStore};
pub use element::{CacheKey, CacheValue, Element, Expiry};
pub use error::{ConfigError, StoreError, StoreResult};
pub use eviction::{EntryPolicy, EvictionCandidate, VictimSelector};
pub use pool::{
    AddOutcome, FromLargestEvictor, MemoryPool, PoolEvictor, PoolMember, PoolOwner, PoolParticipant,
    PoolPressure, ProportionalEvictor,
};
pub use size::{FixedSizeEstimator, HeapSizeEstimator, SizeBounds, SizeEstimator, SizeOf, ENTRY_OVERHEAD_BYTES};
pub use tier::{
    AuthoritativeTier, CachingTier, ElementComparator, EvictionListener, Fetch, InMemoryAuthority, Loader,
    OnHeapCachingTier, TierStats, ValueComparator,
};
pub use metrics::LatencyTimer;
