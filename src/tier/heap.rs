// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! On-heap caching tier backed by a [`MemoryPool`].
//!
//! # Slots
//!
//! Every key maps to either a `Loading` slot (a fault in flight, shared by
//! every thread that misses on the key) or a `Resident` slot. Only the thread
//! that installed the `Loading` slot runs the loader; the others block on the
//! fault until the leader completes it.
//!
//! ```text
//! vacant ──miss──► Loading(fault, gen) ──loaded──► Resident(gen)
//!                        │                              │
//!                        ├─absent/failed──► vacant      ├─evicted (listeners first)──► vacant
//!                        └─removed────────► vacant      └─removed──────────────────► vacant
//!                           (leader reports Uncached)
//! ```
//!
//! The slot is always updated before the fault is completed, so a waiter
//! that wakes up and retries sees the final state. The leader completes the
//! fault through a drop guard: a panicking loader still releases waiters.
//!
//! # Accounting
//!
//! Bytes are charged to the pool participant before a loaded element is
//! installed, so an eviction triggered by the charge never picks the entry
//! being loaded. Listeners run with no map guard held; the entry is only
//! removed (and its bytes released) after every listener accepted it.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, info, warn};

use super::{CachingTier, EvictionListener, Fetch, Loader, TierStats};
use crate::config::StoreConfig;
use crate::element::{CacheKey, CacheValue, Element};
use crate::error::{StoreError, StoreResult};
use crate::eviction::{EntryPolicy, EvictionCandidate};
use crate::metrics;
use crate::pool::{MemoryPool, PoolOwner, PoolParticipant};
use crate::size::{HeapSizeEstimator, SizeBounds, SizeEstimator, SizeOf};

enum FaultState<K, V> {
    Pending,
    Done(StoreResult<Fetch<K, V>>),
}

/// A load in flight. Completed exactly once.
struct Fault<K, V> {
    state: Mutex<FaultState<K, V>>,
    ready: Condvar,
}

impl<K: Clone, V: Clone> Fault<K, V> {
    fn new() -> Self {
        Self {
            state: Mutex::new(FaultState::Pending),
            ready: Condvar::new(),
        }
    }

    fn complete(&self, result: StoreResult<Fetch<K, V>>) {
        let mut state = self.state.lock();
        if matches!(*state, FaultState::Pending) {
            *state = FaultState::Done(result);
            self.ready.notify_all();
        }
    }

    fn wait(&self) -> StoreResult<Fetch<K, V>> {
        let mut state = self.state.lock();
        loop {
            if let FaultState::Done(result) = &*state {
                return result.clone();
            }
            self.ready.wait(&mut state);
        }
    }
}

struct Resident<K, V> {
    element: Element<K, V>,
    size: u64,
    generation: u64,
    inserted: u64,
    last_access: u64,
    pinned: bool,
}

enum Slot<K, V> {
    Loading { fault: Arc<Fault<K, V>>, generation: u64 },
    Resident(Resident<K, V>),
}

enum Lookup<K, V> {
    Hit(Element<K, V>),
    Wait(Arc<Fault<K, V>>),
    Lead(Arc<Fault<K, V>>, u64),
    Expired(Resident<K, V>),
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    faults: AtomicU64,
    fault_failures: AtomicU64,
    evictions: AtomicU64,
    evicted_bytes: AtomicU64,
    write_back_failures: AtomicU64,
}

/// Completes the leader's fault even if the loader unwinds.
struct FaultGuard<'a, K: CacheKey, V: CacheValue> {
    tier: &'a OnHeapCachingTier<K, V>,
    key: &'a K,
    fault: Arc<Fault<K, V>>,
    generation: u64,
    completed: bool,
}

impl<K: CacheKey, V: CacheValue> FaultGuard<'_, K, V> {
    fn complete(mut self, result: StoreResult<Fetch<K, V>>) {
        self.completed = true;
        self.fault.complete(result);
    }
}

impl<K: CacheKey, V: CacheValue> Drop for FaultGuard<'_, K, V> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        self.tier.clear_loading(self.key, self.generation);
        self.fault.complete(Err(StoreError::load_failure(
            self.key,
            StoreError::Backend("loader panicked".into()),
        )));
    }
}

/// Reference [`CachingTier`]: a `DashMap` of slots whose bytes are charged
/// to a shared [`MemoryPool`].
pub struct OnHeapCachingTier<K: CacheKey, V: CacheValue> {
    name: String,
    map: DashMap<K, Slot<K, V>>,
    participant: PoolParticipant,
    estimator: Box<dyn SizeEstimator<K, V>>,
    bounds: SizeBounds,
    policy: EntryPolicy,
    max_entries: usize,
    listeners: RwLock<Vec<Arc<dyn EvictionListener<K, V>>>>,
    /// Pin intents; survive removal so later loads come in pinned
    pinned_keys: DashSet<K>,
    clock: AtomicU64,
    generations: AtomicU64,
    counters: Counters,
    disposed: AtomicBool,
}

impl<K, V> OnHeapCachingTier<K, V>
where
    K: CacheKey + SizeOf,
    V: CacheValue + SizeOf,
{
    /// Tier sized by [`HeapSizeEstimator`].
    pub fn new(name: impl Into<String>, pool: &Arc<MemoryPool>, config: &StoreConfig) -> Arc<Self> {
        Self::with_estimator(name, pool, config, HeapSizeEstimator)
    }
}

impl<K: CacheKey, V: CacheValue> OnHeapCachingTier<K, V> {
    pub fn with_estimator(
        name: impl Into<String>,
        pool: &Arc<MemoryPool>,
        config: &StoreConfig,
        estimator: impl SizeEstimator<K, V> + 'static,
    ) -> Arc<Self> {
        let name = name.into();
        let tier = Arc::new_cyclic(|weak: &Weak<Self>| {
            let owner: Weak<dyn PoolOwner> = weak.clone();
            Self {
                participant: pool.register(name.clone(), owner),
                name: name.clone(),
                map: DashMap::new(),
                estimator: Box::new(estimator),
                bounds: config.size_bounds(),
                policy: config.eviction_policy,
                max_entries: config.max_entries_local_heap,
                listeners: RwLock::new(Vec::new()),
                pinned_keys: DashSet::new(),
                clock: AtomicU64::new(0),
                generations: AtomicU64::new(0),
                counters: Counters::default(),
                disposed: AtomicBool::new(false),
            }
        });
        info!(
            tier = %name,
            pool = %pool.name(),
            policy = %config.eviction_policy,
            max_entries = config.max_entries_local_heap,
            "Caching tier created"
        );
        tier
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn participant(&self) -> &PoolParticipant {
        &self.participant
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn size_of(&self, element: &Element<K, V>) -> u64 {
        self.bounds.clamp(SizeEstimator::size_of(self.estimator.as_ref(), element))
    }

    fn lookup(&self, key: &K, update_stats: bool) -> Lookup<K, V> {
        match self.map.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let expired = match occupied.get() {
                    Slot::Loading { fault, .. } => return Lookup::Wait(Arc::clone(fault)),
                    Slot::Resident(resident) => resident.element.is_expired(),
                };
                if expired {
                    return match occupied.remove() {
                        Slot::Resident(resident) => Lookup::Expired(resident),
                        Slot::Loading { fault, .. } => Lookup::Wait(fault),
                    };
                }
                match occupied.get_mut() {
                    Slot::Resident(resident) => {
                        if update_stats {
                            resident.element.record_access();
                            resident.last_access = self.tick();
                        }
                        Lookup::Hit(resident.element.clone())
                    }
                    Slot::Loading { fault, .. } => Lookup::Wait(Arc::clone(fault)),
                }
            }
            Entry::Vacant(vacant) => {
                let fault = Arc::new(Fault::new());
                let generation = self.next_generation();
                vacant.insert(Slot::Loading {
                    fault: Arc::clone(&fault),
                    generation,
                });
                Lookup::Lead(fault, generation)
            }
        }
    }

    fn lead(
        &self,
        key: &K,
        fault: Arc<Fault<K, V>>,
        generation: u64,
        loader: Loader<'_, K, V>,
    ) -> StoreResult<Fetch<K, V>> {
        self.counters.faults.fetch_add(1, Ordering::Relaxed);
        let guard = FaultGuard {
            tier: self,
            key,
            fault,
            generation,
            completed: false,
        };

        let result = match loader() {
            Ok(Some(element)) => Ok(self.install(key, generation, element)),
            Ok(None) => {
                self.clear_loading(key, generation);
                Ok(Fetch::Absent)
            }
            Err(err) => {
                self.clear_loading(key, generation);
                self.counters.fault_failures.fetch_add(1, Ordering::Relaxed);
                warn!(tier = %self.name, key = ?key, error = %err, "Fault failed");
                metrics::record_error("caching", "fault", err.kind());
                Err(StoreError::load_failure(key, err))
            }
        };

        let outcome = match &result {
            Ok(fetch) => fetch.outcome(),
            Err(_) => "failed",
        };
        debug!(tier = %self.name, key = ?key, outcome, "Fault completed");
        metrics::record_fault(&self.name, outcome);

        guard.complete(result.clone());
        result
    }

    /// Swap the `Loading` slot for a resident element. Reports `Uncached`
    /// when the slot was invalidated while loading.
    fn install(&self, key: &K, generation: u64, element: Element<K, V>) -> Fetch<K, V> {
        let size = self.size_of(&element);
        let pinned = self.pinned_keys.contains(key);

        let outcome = self.participant.add(size, 1);
        if outcome.soft_overflow {
            debug!(tier = %self.name, key = ?key, size, "Installed into an overflowing pool");
        }
        if pinned {
            self.participant.pin(size);
        }

        let installed = match self.map.get_mut(key) {
            Some(mut slot) => match &*slot {
                Slot::Loading { generation: current, .. } if *current == generation => {
                    let tick = self.tick();
                    *slot = Slot::Resident(Resident {
                        element: element.clone(),
                        size,
                        generation,
                        inserted: tick,
                        last_access: tick,
                        pinned,
                    });
                    true
                }
                _ => false,
            },
            None => false,
        };

        if !installed {
            self.participant.remove(size, 1);
            if pinned {
                self.participant.unpin(size);
            }
            debug!(tier = %self.name, key = ?key, "Slot invalidated during load");
            return Fetch::Uncached(element);
        }

        self.enforce_entry_bound();
        Fetch::Loaded(element)
    }

    fn clear_loading(&self, key: &K, generation: u64) {
        self.map.remove_if(key, |_, slot| {
            matches!(slot, Slot::Loading { generation: current, .. } if *current == generation)
        });
    }

    fn release(&self, resident: &Resident<K, V>) {
        self.participant.remove(resident.size, 1);
        if resident.pinned {
            self.participant.unpin(resident.size);
        }
    }

    fn enforce_entry_bound(&self) {
        if self.max_entries == 0 {
            return;
        }
        for _ in 0..4 {
            let count = usize::try_from(self.participant.count()).unwrap_or(usize::MAX);
            let excess = count.saturating_sub(self.max_entries);
            if excess == 0 {
                break;
            }
            let victims = self.select_victims(excess, &HashSet::new());
            if victims.is_empty() {
                break;
            }
            let mut evicted = 0usize;
            for key in victims {
                if self.evict_entry(&key) > 0 {
                    evicted += 1;
                }
            }
            if evicted > 0 {
                self.update_gauge_metrics();
            }
        }
    }

    /// Up to `count` unpinned residents in policy order, skipping `tried`.
    fn select_victims(&self, count: usize, tried: &HashSet<K>) -> Vec<K> {
        let mut selector = self.policy.selector(count);
        for entry in self.map.iter() {
            if let Slot::Resident(resident) = entry.value() {
                if tried.contains(entry.key()) {
                    continue;
                }
                selector.offer(EvictionCandidate {
                    key: entry.key(),
                    inserted: resident.inserted,
                    last_access: resident.last_access,
                    hits: resident.element.hit_count(),
                    pinned: resident.pinned,
                });
            }
        }
        selector.into_victims()
    }

    /// Victims expected to free `bytes`, from the average resident size.
    fn batch_for(&self, bytes: u64) -> usize {
        let count = self.participant.count().max(1);
        let average = (self.participant.size_in_bytes() / count).max(1);
        usize::try_from(bytes.div_ceil(average)).unwrap_or(usize::MAX).max(1)
    }

    /// Notify listeners, then drop the entry if it is still the same
    /// resident. Returns the bytes released.
    fn evict_entry(&self, key: &K) -> u64 {
        let (element, generation) = match self.map.get(key) {
            Some(slot) => match &*slot {
                Slot::Resident(resident) if !resident.pinned => {
                    (resident.element.clone(), resident.generation)
                }
                _ => return 0,
            },
            None => return 0,
        };

        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            if let Err(err) = listener.on_evicted(key, &element) {
                self.counters.write_back_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    tier = %self.name,
                    key = ?key,
                    error = %err,
                    "Eviction write-back failed; entry kept (retryable)"
                );
                metrics::record_write_back_failure(&self.name);
                return 0;
            }
        }

        let removed = self.map.remove_if(key, |_, slot| {
            matches!(slot, Slot::Resident(r) if r.generation == generation && !r.pinned)
        });
        match removed {
            Some((_, Slot::Resident(resident))) => {
                self.release(&resident);
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                self.counters.evicted_bytes.fetch_add(resident.size, Ordering::Relaxed);
                debug!(tier = %self.name, key = ?key, bytes = resident.size, "Evicted");
                metrics::record_eviction(&self.name, 1, resident.size);
                resident.size
            }
            _ => 0,
        }
    }

    fn ensure_live(&self) -> StoreResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(StoreError::Disposed(self.name.clone()));
        }
        Ok(())
    }

    /// Push occupancy gauges for this tier and its pool.
    fn update_gauge_metrics(&self) {
        metrics::set_store_entries(
            &self.name,
            self.participant.count() as usize,
            self.participant.size_in_bytes(),
        );
        self.participant.pool().update_gauge_metrics();
    }
}

impl<K: CacheKey, V: CacheValue> PoolOwner for OnHeapCachingTier<K, V> {
    fn evict(&self, bytes: u64) -> u64 {
        // A vetoed write-back keeps its entry; later batches move past it.
        let mut tried = HashSet::new();
        let mut freed = 0u64;
        while freed < bytes {
            let victims = self.select_victims(self.batch_for(bytes - freed), &tried);
            if victims.is_empty() {
                break;
            }
            for key in victims {
                if freed >= bytes {
                    break;
                }
                freed = freed.saturating_add(self.evict_entry(&key));
                tried.insert(key);
            }
        }
        debug!(tier = %self.name, requested = bytes, freed, tried = tried.len(), "Pool-driven eviction");
        if freed > 0 {
            self.update_gauge_metrics();
        }
        freed
    }
}

impl<K: CacheKey, V: CacheValue> CachingTier<K, V> for OnHeapCachingTier<K, V> {
    fn get(&self, key: &K, loader: Loader<'_, K, V>, update_stats: bool) -> StoreResult<Fetch<K, V>> {
        self.ensure_live()?;
        loop {
            match self.lookup(key, update_stats) {
                Lookup::Hit(element) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Fetch::Hit(element));
                }
                Lookup::Wait(fault) => {
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    metrics::record_fault_wait(&self.name);
                    return fault.wait();
                }
                Lookup::Lead(fault, generation) => {
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    return self.lead(key, fault, generation, loader);
                }
                Lookup::Expired(resident) => {
                    debug!(tier = %self.name, key = ?key, "Expired on read");
                    self.release(&resident);
                }
            }
        }
    }

    fn remove(&self, key: &K) -> Option<Element<K, V>> {
        match self.map.remove(key) {
            Some((_, Slot::Resident(resident))) => {
                self.release(&resident);
                Some(resident.element)
            }
            _ => None,
        }
    }

    fn clear(&self) {
        let mut bytes = 0u64;
        let mut count = 0u64;
        let mut pinned = 0u64;
        self.map.retain(|_, slot| {
            if let Slot::Resident(resident) = slot {
                bytes += resident.size;
                count += 1;
                if resident.pinned {
                    pinned += resident.size;
                }
            }
            false
        });
        self.participant.remove(bytes, count);
        self.participant.unpin(pinned);
        debug!(tier = %self.name, entries = count, bytes, "Cleared");
    }

    fn add_eviction_listener(&self, listener: Arc<dyn EvictionListener<K, V>>) {
        self.listeners.write().push(listener);
    }

    fn contains(&self, key: &K) -> bool {
        self.map
            .get(key)
            .is_some_and(|slot| matches!(&*slot, Slot::Resident(_)))
    }

    fn len(&self) -> usize {
        self.participant.count() as usize
    }

    fn size_in_bytes(&self) -> u64 {
        self.participant.size_in_bytes()
    }

    fn elements(&self) -> Vec<Element<K, V>> {
        self.map
            .iter()
            .filter_map(|entry| match entry.value() {
                Slot::Resident(resident) => Some(resident.element.clone()),
                Slot::Loading { .. } => None,
            })
            .collect()
    }

    fn recalculate_size(&self, key: &K) {
        let delta = match self.map.get_mut(key) {
            Some(mut slot) => match &mut *slot {
                Slot::Resident(resident) => {
                    let size = self.size_of(&resident.element);
                    let old = std::mem::replace(&mut resident.size, size);
                    Some((old, size, resident.pinned))
                }
                Slot::Loading { .. } => None,
            },
            None => None,
        };

        let Some((old, new, pinned)) = delta else {
            return;
        };
        if new > old {
            if pinned {
                self.participant.pin(new - old);
            }
            let _ = self.participant.add(new - old, 0);
        } else if old > new {
            self.participant.remove(old - new, 0);
            if pinned {
                self.participant.unpin(old - new);
            }
        }
    }

    fn set_pinned(&self, key: &K, pinned: bool) {
        if pinned {
            self.pinned_keys.insert(key.clone());
        } else {
            self.pinned_keys.remove(key);
        }

        let changed = match self.map.get_mut(key) {
            Some(mut slot) => match &mut *slot {
                Slot::Resident(resident) if resident.pinned != pinned => {
                    resident.pinned = pinned;
                    Some(resident.size)
                }
                _ => None,
            },
            None => None,
        };

        match changed {
            Some(size) if pinned => self.participant.pin(size),
            Some(size) => self.participant.unpin(size),
            None => {}
        }
    }

    fn is_pinned(&self, key: &K) -> bool {
        self.pinned_keys.contains(key)
    }

    fn unpin_all(&self) {
        self.pinned_keys.clear();
        let mut unpinned = 0u64;
        for mut entry in self.map.iter_mut() {
            if let Slot::Resident(resident) = entry.value_mut() {
                if resident.pinned {
                    resident.pinned = false;
                    unpinned += resident.size;
                }
            }
        }
        self.participant.unpin(unpinned);
    }

    fn stats(&self) -> TierStats {
        let c = &self.counters;
        TierStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            faults: c.faults.load(Ordering::Relaxed),
            fault_failures: c.fault_failures.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            evicted_bytes: c.evicted_bytes.load(Ordering::Relaxed),
            write_back_failures: c.write_back_failures.load(Ordering::Relaxed),
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.clear();
        self.update_gauge_metrics();
        self.participant.pool().unregister(&self.participant);
        info!(tier = %self.name, "Caching tier disposed");
    }
}

impl<K: CacheKey, V: CacheValue> std::fmt::Debug for OnHeapCachingTier<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnHeapCachingTier")
            .field("name", &self.name)
            .field("entries", &self.participant.count())
            .field("bytes", &self.participant.size_in_bytes())
            .field("policy", &self.policy)
            .finish()
    }
}
