// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Conditional writes, pinning and introspection.
//!
//! The conditional operations delegate to the authoritative tier and only
//! invalidate the near tier when the authoritative state actually changed.

use tracing::debug;

use crate::element::{CacheKey, CacheValue, Element};
use crate::error::{StoreError, StoreResult};
use crate::tier::ElementComparator;

use super::{StoreStats, TieredStore};

impl<K: CacheKey, V: CacheValue> TieredStore<K, V> {
    // ═══════════════════════════════════════════════════════════════════════════
    // API: Conditional writes
    // ═══════════════════════════════════════════════════════════════════════════

    /// Insert unless a mapping exists. Returns the existing element, if any.
    #[tracing::instrument(skip(self, element), fields(store = %self.name))]
    pub fn put_if_absent(&self, element: Element<K, V>) -> StoreResult<Option<Element<K, V>>> {
        let element = self.prepare(element);
        let key = element.key().clone();

        let _tiers = self.live_tiers()?;
        let previous = self.authority.put_if_absent(element)?;
        if previous.is_none() {
            self.invalidate(&key);
        }
        Ok(previous)
    }

    /// Remove the mapping only if it equals `element` under `comparator`.
    #[tracing::instrument(skip(self, element, comparator), fields(store = %self.name))]
    pub fn remove_element(
        &self,
        element: &Element<K, V>,
        comparator: &dyn ElementComparator<K, V>,
    ) -> StoreResult<Option<Element<K, V>>> {
        let _tiers = self.live_tiers()?;
        let removed = self.authority.remove_element(element, comparator)?;
        if removed.is_some() {
            self.invalidate(element.key());
        }
        Ok(removed)
    }

    /// Replace the mapping with `new` only if it currently equals `old`.
    ///
    /// Fails with [`StoreError::KeyMismatch`] when the two elements have
    /// different keys.
    #[tracing::instrument(skip(self, old, new, comparator), fields(store = %self.name))]
    pub fn replace_if(
        &self,
        old: &Element<K, V>,
        new: Element<K, V>,
        comparator: &dyn ElementComparator<K, V>,
    ) -> StoreResult<bool> {
        if old.key() != new.key() {
            return Err(StoreError::KeyMismatch);
        }
        let new = self.prepare(new);

        let _tiers = self.live_tiers()?;
        let replaced = self.authority.replace_if(old, new, comparator)?;
        if replaced {
            self.invalidate(old.key());
        }
        Ok(replaced)
    }

    /// Replace an existing mapping. Returns the previous element, or `None`
    /// (and changes nothing) when the key was absent.
    #[tracing::instrument(skip(self, element), fields(store = %self.name))]
    pub fn replace(&self, element: Element<K, V>) -> StoreResult<Option<Element<K, V>>> {
        let element = self.prepare(element);
        let key = element.key().clone();

        let _tiers = self.live_tiers()?;
        let previous = self.authority.replace(element)?;
        if previous.is_some() {
            self.invalidate(&key);
        }
        Ok(previous)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // API: Pinning
    // ═══════════════════════════════════════════════════════════════════════════

    /// Exclude `key` from near-tier eviction. The intent also applies to a
    /// key that is loaded later.
    pub fn set_pinned(&self, key: &K, pinned: bool) -> StoreResult<()> {
        let _tiers = self.live_tiers()?;
        self.caching.set_pinned(key, pinned);
        debug!(store = %self.name, key = ?key, pinned, "Pin changed");
        Ok(())
    }

    pub fn is_pinned(&self, key: &K) -> StoreResult<bool> {
        let _tiers = self.live_tiers()?;
        Ok(self.caching.is_pinned(key))
    }

    pub fn unpin_all(&self) -> StoreResult<()> {
        let _tiers = self.live_tiers()?;
        self.caching.unpin_all();
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // API: Introspection
    // ═══════════════════════════════════════════════════════════════════════════

    /// Whether the authoritative tier holds `key`.
    pub fn contains_key(&self, key: &K) -> StoreResult<bool> {
        let _tiers = self.live_tiers()?;
        Ok(self.authority.contains_key(key))
    }

    /// Whether the near tier currently holds `key`.
    pub fn contains_key_in_memory(&self, key: &K) -> StoreResult<bool> {
        let _tiers = self.live_tiers()?;
        Ok(self.caching.contains(key))
    }

    pub fn keys(&self) -> StoreResult<Vec<K>> {
        let _tiers = self.live_tiers()?;
        Ok(self.authority.keys())
    }

    /// Entries in the authoritative tier.
    pub fn len(&self) -> StoreResult<usize> {
        let _tiers = self.live_tiers()?;
        Ok(self.authority.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn in_memory_len(&self) -> StoreResult<usize> {
        let _tiers = self.live_tiers()?;
        Ok(self.caching.len())
    }

    pub fn in_memory_size_in_bytes(&self) -> StoreResult<u64> {
        let _tiers = self.live_tiers()?;
        Ok(self.caching.size_in_bytes())
    }

    /// Re-estimate a near-tier entry after its value changed size in place.
    pub fn recalculate_size(&self, key: &K) -> StoreResult<()> {
        let _tiers = self.live_tiers()?;
        self.caching.recalculate_size(key);
        Ok(())
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        let _tiers = self.live_tiers()?;
        Ok(StoreStats {
            tier: self.caching.stats(),
            in_memory_entries: self.caching.len(),
            in_memory_bytes: self.caching.size_in_bytes(),
            authority_entries: self.authority.len(),
        })
    }
}
