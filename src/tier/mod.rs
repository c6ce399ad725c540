// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tier capabilities.
//!
//! A [`TieredStore`](crate::TieredStore) composes exactly two tiers:
//!
//! - a [`CachingTier`]: fast, bounded, may drop entries at any time
//!   (after notifying its [`EvictionListener`]s);
//! - an [`AuthoritativeTier`]: the tier of record, consulted on every
//!   near-tier miss and receiving every write.
//!
//! Reference implementations: [`OnHeapCachingTier`] and [`InMemoryAuthority`].

mod heap;
mod memory;

pub use heap::OnHeapCachingTier;
pub use memory::InMemoryAuthority;

use std::sync::Arc;

use crate::element::Element;
use crate::error::StoreResult;

/// Loader handed to [`CachingTier::get`]; called at most once per miss.
pub type Loader<'a, K, V> = &'a mut dyn FnMut() -> StoreResult<Option<Element<K, V>>>;

/// Result of a near-tier lookup.
#[derive(Debug, Clone)]
pub enum Fetch<K, V> {
    /// Served from the near tier
    Hit(Element<K, V>),
    /// Faulted in and now cached
    Loaded(Element<K, V>),
    /// Faulted in, but the slot was invalidated while loading; not cached
    Uncached(Element<K, V>),
    /// The loader found nothing
    Absent,
}

impl<K, V> Fetch<K, V> {
    pub fn into_element(self) -> Option<Element<K, V>> {
        match self {
            Self::Hit(e) | Self::Loaded(e) | Self::Uncached(e) => Some(e),
            Self::Absent => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    /// Label used for logging and metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Hit(_) => "hit",
            Self::Loaded(_) => "loaded",
            Self::Uncached(_) => "uncached",
            Self::Absent => "absent",
        }
    }
}

/// Counters kept by a caching tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
    /// Loader invocations (one per collapsed miss)
    pub faults: u64,
    pub fault_failures: u64,
    pub evictions: u64,
    pub evicted_bytes: u64,
    pub write_back_failures: u64,
}

/// Notified synchronously before a caching tier drops an entry.
///
/// Returning an error vetoes the eviction: the entry stays resident.
pub trait EvictionListener<K, V>: Send + Sync {
    fn on_evicted(&self, key: &K, element: &Element<K, V>) -> StoreResult<()>;
}

/// Equality used by the conditional operations.
pub trait ElementComparator<K, V>: Send + Sync {
    fn equals(&self, a: &Element<K, V>, b: &Element<K, V>) -> bool;
}

/// Compares values with `PartialEq`, ignoring metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueComparator;

impl<K, V: PartialEq> ElementComparator<K, V> for ValueComparator {
    fn equals(&self, a: &Element<K, V>, b: &Element<K, V>) -> bool {
        a.value() == b.value()
    }
}

/// The fast, bounded front tier.
pub trait CachingTier<K, V>: Send + Sync {
    /// Return the cached element, or fault it in through `loader`.
    ///
    /// Concurrent misses on the same key share one loader call; every caller
    /// receives the same element or the same error. `update_stats` controls
    /// whether a hit counts as an access.
    fn get(&self, key: &K, loader: Loader<'_, K, V>, update_stats: bool) -> StoreResult<Fetch<K, V>>;

    /// Drop the entry without notifying listeners. An in-flight load for the
    /// key is invalidated and its result will not be cached.
    fn remove(&self, key: &K) -> Option<Element<K, V>>;

    fn clear(&self);

    fn add_eviction_listener(&self, listener: Arc<dyn EvictionListener<K, V>>);

    fn contains(&self, key: &K) -> bool;

    /// Resident entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn size_in_bytes(&self) -> u64;

    /// Snapshot of resident elements.
    fn elements(&self) -> Vec<Element<K, V>>;

    /// Re-estimate a resident entry's size and adjust pool accounting.
    fn recalculate_size(&self, key: &K);

    fn set_pinned(&self, key: &K, pinned: bool);

    fn is_pinned(&self, key: &K) -> bool;

    fn unpin_all(&self);

    fn stats(&self) -> TierStats;

    fn dispose(&self);
}

/// The tier of record.
pub trait AuthoritativeTier<K, V>: Send + Sync {
    /// Look up `key` on behalf of a near-tier miss.
    fn fault(&self, key: &K, update_stats: bool) -> StoreResult<Option<Element<K, V>>>;

    /// Persist an element leaving the near tier (access metadata only;
    /// never resurrects a removed key).
    fn write_back(&self, element: &Element<K, V>) -> StoreResult<()>;

    /// Returns `true` when an existing mapping was overwritten.
    fn put(&self, element: Element<K, V>) -> StoreResult<bool>;

    fn put_if_absent(&self, element: Element<K, V>) -> StoreResult<Option<Element<K, V>>>;

    fn remove(&self, key: &K) -> StoreResult<Option<Element<K, V>>>;

    fn remove_element(
        &self,
        element: &Element<K, V>,
        comparator: &dyn ElementComparator<K, V>,
    ) -> StoreResult<Option<Element<K, V>>>;

    fn replace_if(
        &self,
        old: &Element<K, V>,
        new: Element<K, V>,
        comparator: &dyn ElementComparator<K, V>,
    ) -> StoreResult<bool>;

    fn replace(&self, element: Element<K, V>) -> StoreResult<Option<Element<K, V>>>;

    fn remove_all(&self) -> StoreResult<()>;

    fn flush(&self) -> StoreResult<()>;

    fn dispose(&self) -> StoreResult<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains_key(&self, key: &K) -> bool;

    fn keys(&self) -> Vec<K>;

    /// Remove expired elements. Returns the keys that were dropped.
    fn expire_elements(&self) -> Vec<K>;
}
