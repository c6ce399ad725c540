// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tiered store coordinator.
//!
//! The [`TieredStore`] ties a [`CachingTier`] to an [`AuthoritativeTier`]:
//!
//! - reads go to the near tier; a miss faults the key in from the
//!   authoritative tier, with concurrent misses collapsed into one load;
//! - writes go to the authoritative tier and then *invalidate* the near-tier
//!   entry (never update it), so the next read faults the new value in;
//! - entries evicted from the near tier are written back to the
//!   authoritative tier before they are dropped.
//!
//! # Lifecycle
//!
//! ```text
//! Alive ──dispose()──► Disposed
//! ```
//!
//! # Example
//!
//! ```
//! use tiered_store::{Element, MemoryPool, StoreConfig, TieredStore};
//!
//! let pool = MemoryPool::unbounded("example");
//! let store: TieredStore<String, String> =
//!     TieredStore::on_heap("users", &pool, StoreConfig::default()).unwrap();
//!
//! store.put(Element::new("user.1".into(), "alice".into())).unwrap();
//! assert!(!store.contains_key_in_memory(&"user.1".into()).unwrap());
//!
//! let element = store.get(&"user.1".into()).unwrap().unwrap();
//! assert_eq!(element.value(), "alice");
//! assert!(store.contains_key_in_memory(&"user.1".into()).unwrap());
//! ```

mod api;
mod lifecycle;
mod types;

pub use types::{StoreStatus, StoreStats};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::element::{CacheKey, CacheValue, Element, Expiry};
use crate::error::{StoreError, StoreResult};
use crate::metrics::{self, LatencyTimer};
use crate::pool::MemoryPool;
use crate::size::SizeOf;
use crate::tier::{AuthoritativeTier, CachingTier, EvictionListener, InMemoryAuthority, OnHeapCachingTier};

/// Writes evicted near-tier elements back to the authoritative tier.
struct AuthorityWriteBack<K, V> {
    authority: Arc<dyn AuthoritativeTier<K, V>>,
}

impl<K: CacheKey, V: CacheValue> EvictionListener<K, V> for AuthorityWriteBack<K, V> {
    fn on_evicted(&self, key: &K, element: &Element<K, V>) -> StoreResult<()> {
        self.authority
            .write_back(element)
            .map_err(|err| StoreError::WriteBack {
                key: format!("{key:?}"),
                reason: err.to_string(),
            })
    }
}

/// Two-tier cache: a bounded near tier in front of a tier of record.
///
/// # Thread Safety
///
/// The store is `Send + Sync`. Single-key operations run concurrently under
/// the read side of an internal lock; `remove_all` takes the write side so it
/// never interleaves with an in-flight fault.
pub struct TieredStore<K: CacheKey, V: CacheValue> {
    pub(super) name: String,
    pub(super) caching: Arc<dyn CachingTier<K, V>>,
    pub(super) authority: Arc<dyn AuthoritativeTier<K, V>>,
    pub(super) tier_lock: RwLock<()>,
    pub(super) config: StoreConfig,
    pub(super) default_expiry: Expiry,
    pub(super) disposed: AtomicBool,
}

impl<K: CacheKey, V: CacheValue> TieredStore<K, V> {
    /// Compose a store from two tiers. Registers the write-back listener on
    /// the caching tier.
    pub fn new(
        name: impl Into<String>,
        caching: Arc<dyn CachingTier<K, V>>,
        authority: Arc<dyn AuthoritativeTier<K, V>>,
        config: StoreConfig,
    ) -> StoreResult<Self> {
        config.validate()?;
        let name = name.into();

        caching.add_eviction_listener(Arc::new(AuthorityWriteBack {
            authority: Arc::clone(&authority),
        }));

        info!(
            store = %name,
            policy = %config.eviction_policy,
            write_back_on_dispose = config.write_back_on_dispose,
            "Tiered store created"
        );
        metrics::set_store_status(&name, "alive");

        Ok(Self {
            default_expiry: config.default_expiry(),
            name,
            caching,
            authority,
            tier_lock: RwLock::new(()),
            config,
            disposed: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(super) fn ensure_live(&self) -> StoreResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(StoreError::Disposed(self.name.clone()));
        }
        Ok(())
    }

    /// Shared side of the tier lock. Checked after acquiring, so a caller
    /// that queued behind `dispose` fails instead of reaching the tiers.
    pub(super) fn live_tiers(&self) -> StoreResult<RwLockReadGuard<'_, ()>> {
        let tiers = self.tier_lock.read();
        self.ensure_live()?;
        Ok(tiers)
    }

    pub(super) fn prepare(&self, mut element: Element<K, V>) -> Element<K, V> {
        element.resolve_expiry(self.default_expiry);
        element
    }

    pub(super) fn invalidate(&self, key: &K) {
        if self.caching.remove(key).is_some() {
            debug!(store = %self.name, key = ?key, "Near tier invalidated");
        }
    }

    fn track<T>(&self, operation: &'static str, result: StoreResult<T>) -> StoreResult<T> {
        match &result {
            Ok(_) => metrics::record_operation("store", operation, "success"),
            Err(err) => {
                metrics::record_operation("store", operation, "error");
                metrics::record_error("store", operation, err.kind());
            }
        }
        result
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // API: Reads
    // ═══════════════════════════════════════════════════════════════════════════

    /// Get an element, faulting it in from the authoritative tier on a miss.
    ///
    /// Concurrent misses on the same key share one authoritative load. If
    /// that load fails, every waiter receives the same
    /// [`StoreError::LoadFailure`] and the next call retries.
    #[tracing::instrument(skip(self), fields(store = %self.name))]
    pub fn get(&self, key: &K) -> StoreResult<Option<Element<K, V>>> {
        let _timer = LatencyTimer::new("store", "get");
        let result = self.fault(key, true);
        self.track("get", result)
    }

    /// Like [`get`](Self::get) but without updating hit or recency statistics.
    #[tracing::instrument(skip(self), fields(store = %self.name))]
    pub fn get_quiet(&self, key: &K) -> StoreResult<Option<Element<K, V>>> {
        let _timer = LatencyTimer::new("store", "get_quiet");
        let result = self.fault(key, false);
        self.track("get_quiet", result)
    }

    /// [`get`](Self::get) each key, stopping at the first error.
    pub fn get_all<'a>(&self, keys: impl IntoIterator<Item = &'a K>) -> StoreResult<HashMap<K, Option<Element<K, V>>>>
    where
        K: 'a,
    {
        keys.into_iter()
            .map(|key| Ok((key.clone(), self.get(key)?)))
            .collect()
    }

    /// [`get_quiet`](Self::get_quiet) each key, stopping at the first error.
    pub fn get_all_quiet<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a K>,
    ) -> StoreResult<HashMap<K, Option<Element<K, V>>>>
    where
        K: 'a,
    {
        keys.into_iter()
            .map(|key| Ok((key.clone(), self.get_quiet(key)?)))
            .collect()
    }

    fn fault(&self, key: &K, update_stats: bool) -> StoreResult<Option<Element<K, V>>> {
        let _tiers = self.live_tiers()?;

        let authority = &self.authority;
        let mut loader = || authority.fault(key, update_stats);
        let fetch = self.caching.get(key, &mut loader, update_stats)?;

        debug!(store = %self.name, key = ?key, outcome = fetch.outcome(), "Lookup");
        Ok(fetch.into_element())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // API: Writes
    // ═══════════════════════════════════════════════════════════════════════════

    /// Write through to the authoritative tier, then invalidate the near
    /// tier (also when the write fails). Returns `true` when an existing
    /// mapping was overwritten.
    #[tracing::instrument(skip(self, element), fields(store = %self.name))]
    pub fn put(&self, element: Element<K, V>) -> StoreResult<bool> {
        let _timer = LatencyTimer::new("store", "put");
        let element = self.prepare(element);
        let key = element.key().clone();

        let _tiers = self.live_tiers()?;
        let result = self.authority.put(element);
        self.invalidate(&key);
        self.track("put", result)
    }

    /// [`put`](Self::put) each element, stopping at the first error.
    pub fn put_all(&self, elements: impl IntoIterator<Item = Element<K, V>>) -> StoreResult<()> {
        for element in elements {
            self.put(element)?;
        }
        Ok(())
    }

    /// Remove from the authoritative tier, then invalidate the near tier
    /// unconditionally. Idempotent.
    #[tracing::instrument(skip(self), fields(store = %self.name))]
    pub fn remove(&self, key: &K) -> StoreResult<Option<Element<K, V>>> {
        let _timer = LatencyTimer::new("store", "remove");

        let _tiers = self.live_tiers()?;
        let result = self.authority.remove(key);
        self.invalidate(key);
        self.track("remove", result)
    }

    /// [`remove`](Self::remove) each key, stopping at the first error.
    pub fn remove_keys<'a>(&self, keys: impl IntoIterator<Item = &'a K>) -> StoreResult<()>
    where
        K: 'a,
    {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }
}

impl<K, V> TieredStore<K, V>
where
    K: CacheKey + SizeOf,
    V: CacheValue + SizeOf,
{
    /// A store with an [`OnHeapCachingTier`] charged to `pool` in front of
    /// an [`InMemoryAuthority`].
    pub fn on_heap(name: impl Into<String>, pool: &Arc<MemoryPool>, config: StoreConfig) -> StoreResult<Self> {
        let name = name.into();
        let authority: Arc<InMemoryAuthority<K, V>> =
            Arc::new(InMemoryAuthority::new(format!("{name}.authority")));
        Self::on_heap_with_authority(name, pool, authority, config)
    }

    /// An [`OnHeapCachingTier`] charged to `pool` in front of `authority`.
    pub fn on_heap_with_authority(
        name: impl Into<String>,
        pool: &Arc<MemoryPool>,
        authority: Arc<dyn AuthoritativeTier<K, V>>,
        config: StoreConfig,
    ) -> StoreResult<Self> {
        config.validate()?;
        let name = name.into();
        let caching: Arc<OnHeapCachingTier<K, V>> = OnHeapCachingTier::new(name.clone(), pool, &config);
        Self::new(name, caching, authority, config)
    }
}

impl<K: CacheKey, V: CacheValue> std::fmt::Debug for TieredStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredStore")
            .field("name", &self.name)
            .field("status", &self.status())
            .field("in_memory_entries", &self.caching.len())
            .field("authority_entries", &self.authority.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::FromLargestEvictor;

    fn store() -> TieredStore<String, String> {
        let pool = MemoryPool::unbounded("test");
        TieredStore::on_heap("test", &pool, StoreConfig::default()).unwrap()
    }

    fn element(key: &str, value: &str) -> Element<String, String> {
        Element::new(key.to_string(), value.to_string())
    }

    #[test]
    fn test_put_then_get_round_trip() {
        let store = store();
        assert!(!store.put(element("a", "1")).unwrap());
        assert!(store.put(element("a", "2")).unwrap());

        let got = store.get(&"a".to_string()).unwrap().unwrap();
        assert_eq!(got.value(), "2");
    }

    #[test]
    fn test_write_invalidates_near_tier() {
        let store = store();
        let key = "a".to_string();
        store.put(element("a", "1")).unwrap();
        store.get(&key).unwrap();
        assert!(store.contains_key_in_memory(&key).unwrap());

        store.put(element("a", "2")).unwrap();
        assert!(!store.contains_key_in_memory(&key).unwrap());
        assert_eq!(store.get(&key).unwrap().unwrap().value(), "2");
    }

    #[test]
    fn test_get_missing_is_none() {
        let store = store();
        assert!(store.get(&"nope".to_string()).unwrap().is_none());
        assert!(!store.contains_key_in_memory(&"nope".to_string()).unwrap());
    }

    #[test]
    fn test_get_quiet_leaves_hit_count() {
        let store = store();
        let key = "a".to_string();
        store.put(element("a", "1")).unwrap();

        store.get_quiet(&key).unwrap();
        store.get_quiet(&key).unwrap();
        assert_eq!(store.get_quiet(&key).unwrap().unwrap().hit_count(), 0);

        store.get(&key).unwrap();
        assert_eq!(store.get_quiet(&key).unwrap().unwrap().hit_count(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = store();
        let key = "a".to_string();
        store.put(element("a", "1")).unwrap();
        store.get(&key).unwrap();

        assert!(store.remove(&key).unwrap().is_some());
        assert!(store.remove(&key).unwrap().is_none());
        assert!(!store.contains_key(&key).unwrap());
        assert!(!store.contains_key_in_memory(&key).unwrap());
    }

    #[test]
    fn test_put_all_and_remove_keys() {
        let store = store();
        store
            .put_all((0..5).map(|i| element(&format!("k{i}"), "v")))
            .unwrap();
        assert_eq!(store.len().unwrap(), 5);

        let keys: Vec<String> = (0..3).map(|i| format!("k{i}")).collect();
        store.remove_keys(&keys).unwrap();
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn test_get_all_faults_each_key() {
        let store = store();
        store.put_all((0..3).map(|i| element(&format!("k{i}"), "v"))).unwrap();
        let keys: Vec<String> = ["k0", "k1", "missing"].iter().map(|k| k.to_string()).collect();

        let found = store.get_all(&keys).unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(found["k0"].as_ref().map(|e| e.value().as_str()), Some("v"));
        assert!(found["missing"].is_none());
        assert!(store.contains_key_in_memory(&"k1".to_string()).unwrap());
        assert!(!store.contains_key_in_memory(&"k2".to_string()).unwrap());
        assert_eq!(store.stats().unwrap().tier.misses, 3);
    }

    #[test]
    fn test_get_all_quiet_leaves_hit_count() {
        let store = store();
        store.put(element("a", "1")).unwrap();
        let keys = vec!["a".to_string()];

        store.get_all_quiet(&keys).unwrap();
        let found = store.get_all_quiet(&keys).unwrap();
        assert_eq!(found["a"].as_ref().map(|e| e.hit_count()), Some(0));

        store.get_all(&keys).unwrap();
        let found = store.get_all_quiet(&keys).unwrap();
        assert_eq!(found["a"].as_ref().map(|e| e.hit_count()), Some(1));
    }

    #[test]
    fn test_default_expiry_applied_on_put() {
        let pool = MemoryPool::unbounded("test");
        let config = StoreConfig { time_to_live_secs: 60, ..Default::default() };
        let store: TieredStore<String, String> = TieredStore::on_heap("test", &pool, config).unwrap();

        store.put(element("a", "1")).unwrap();
        let got = store.get(&"a".to_string()).unwrap().unwrap();
        assert_eq!(got.expiry(), Expiry::ttl(std::time::Duration::from_secs(60)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let pool = MemoryPool::new("test", 1024, FromLargestEvictor);
        let config = StoreConfig { min_entry_bytes: 10, max_entry_bytes: 5, ..Default::default() };
        let result: StoreResult<TieredStore<String, String>> = TieredStore::on_heap("test", &pool, config);
        assert!(matches!(result, Err(StoreError::Config(_))));
        assert_eq!(pool.participant_count(), 0);
    }
}
