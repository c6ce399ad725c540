// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Entry-level eviction ordering for caching tiers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Eviction                                  │
//! ├──────────────────────────────────────────────────────────────┤
//! │  pool/evictor.rs  - which participants shed bytes            │
//! │  └─ FromLargestEvictor: largest evictable contribution first │
//! ├──────────────────────────────────────────────────────────────┤
//! │  eviction/policy.rs - which entries a participant sheds      │
//! │  └─ EntryPolicy: LRU / LFU / FIFO over EvictionCandidate     │
//! │  └─ VictimSelector: bounded pick, pinned never selected      │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod policy;

pub use policy::{EntryPolicy, EvictionCandidate, VictimSelector};
