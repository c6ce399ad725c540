// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the tiered store coordinator.

use crate::tier::TierStats;

/// Store lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    /// Accepting operations
    Alive,
    /// `dispose()` has run; every operation fails with `Disposed`
    Disposed,
}

impl std::fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alive => write!(f, "Alive"),
            Self::Disposed => write!(f, "Disposed"),
        }
    }
}

/// Point-in-time statistics for a [`super::TieredStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Near-tier counters
    pub tier: TierStats,
    /// Resident near-tier entries
    pub in_memory_entries: usize,
    /// Bytes charged to the pool by the near tier
    pub in_memory_bytes: u64,
    /// Entries in the authoritative tier
    pub authority_entries: usize,
}

impl StoreStats {
    /// Fraction of lookups served by the near tier (0.0 when idle).
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.tier.hits + self.tier.misses;
        if total == 0 {
            0.0
        } else {
            self.tier.hits as f64 / total as f64
        }
    }
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "hits={} misses={} faults={} evictions={} in_memory={} ({} bytes) authority={}",
            self.tier.hits,
            self.tier.misses,
            self.tier.faults,
            self.tier.evictions,
            self.in_memory_entries,
            self.in_memory_bytes,
            self.authority_entries
        )
    }
}
