// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::Deserialize;

/// Entry metadata for victim ordering, borrowed from the tier's map.
///
/// Ticks come from a per-tier logical clock, so ordering is exact even when
/// many entries are touched within the same millisecond.
#[derive(Debug, Clone, Copy)]
pub struct EvictionCandidate<'a, K> {
    pub key: &'a K,
    /// Tick at which the entry became resident
    pub inserted: u64,
    /// Tick of the most recent hit (equals `inserted` until hit)
    pub last_access: u64,
    pub hits: u64,
    pub pinned: bool,
}

/// Order in which a caching tier gives up its own entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryPolicy {
    /// Least recently used first
    #[default]
    Lru,
    /// Fewest hits first, ties broken by recency
    Lfu,
    /// Oldest insertion first
    Fifo,
}

impl EntryPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lru => "lru",
            Self::Lfu => "lfu",
            Self::Fifo => "fifo",
        }
    }

    /// Sort key: lowest evicts first.
    fn rank<K>(&self, candidate: &EvictionCandidate<'_, K>) -> (u64, u64) {
        match self {
            Self::Lru => (candidate.last_access, candidate.inserted),
            Self::Lfu => (candidate.hits, candidate.last_access),
            Self::Fifo => (candidate.inserted, 0),
        }
    }

    /// A selector keeping the first `count` victims in this policy's order.
    pub fn selector<K: Clone>(&self, count: usize) -> VictimSelector<K> {
        VictimSelector {
            policy: *self,
            count,
            heap: BinaryHeap::with_capacity(count.saturating_add(1).min(1024)),
        }
    }
}

impl std::fmt::Display for EntryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

struct Ranked<K> {
    rank: (u64, u64),
    key: K,
}

impl<K> PartialEq for Ranked<K> {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank
    }
}

impl<K> Eq for Ranked<K> {}

impl<K> PartialOrd for Ranked<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Ranked<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank.cmp(&other.rank)
    }
}

/// Bounded selection of the lowest-ranked unpinned candidates.
///
/// Candidates are offered one at a time while the caller walks its map. A
/// max-heap of at most `count` entries holds the best victims seen so far,
/// so one pass costs `O(n log count)` and a key is only cloned when it
/// enters the heap.
pub struct VictimSelector<K> {
    policy: EntryPolicy,
    count: usize,
    heap: BinaryHeap<Ranked<K>>,
}

impl<K: Clone> VictimSelector<K> {
    pub fn offer(&mut self, candidate: EvictionCandidate<'_, K>) {
        if candidate.pinned || self.count == 0 {
            return;
        }
        let rank = self.policy.rank(&candidate);
        if self.heap.len() >= self.count {
            match self.heap.peek() {
                Some(worst) if rank >= worst.rank => return,
                _ => {}
            }
        }
        self.heap.push(Ranked {
            rank,
            key: candidate.key.clone(),
        });
        if self.heap.len() > self.count {
            self.heap.pop();
        }
    }

    /// Selected victims, first to evict first.
    pub fn into_victims(self) -> Vec<K> {
        self.heap.into_sorted_vec().into_iter().map(|ranked| ranked.key).collect()
    }
}
