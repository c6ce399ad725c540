// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Property-based tests for memory pools.
//!
//! Random add/remove sequences run against bare pool owners, and random
//! operation sequences against two stores on one bounded pool with a plain
//! `HashMap` model. After every step the pool must agree with
//! the participants and stay within capacity, and reads must agree with
//! the model.
//!
//! Run with: `cargo test --test proptest_pool`

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use proptest::prelude::*;

use tiered_store::{
    Element, EntryPolicy, EvictorKind, FixedSizeEstimator, InMemoryAuthority, MemoryPool, OnHeapCachingTier,
    PoolConfig, PoolOwner, PoolParticipant, StoreConfig, TieredStore,
};

const ENTRY: u64 = 100;
const CAPACITY: u64 = 5 * ENTRY;
const KEYS: u8 = 12;
/// Only keys below this may be pinned, so pins alone never fill the pool.
const PINNABLE: u8 = 2;

// =============================================================================
// Strategies
// =============================================================================

#[derive(Debug, Clone)]
enum Op {
    Get { store: usize, key: u8 },
    Put { store: usize, key: u8, value: u64 },
    Remove { store: usize, key: u8 },
    Pin { store: usize, key: u8, pinned: bool },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let store = 0..2usize;
    let key = 0..KEYS;
    prop_oneof![
        4 => (store.clone(), key.clone()).prop_map(|(store, key)| Op::Get { store, key }),
        3 => (store.clone(), key.clone(), any::<u64>())
            .prop_map(|(store, key, value)| Op::Put { store, key, value }),
        1 => (store.clone(), key).prop_map(|(store, key)| Op::Remove { store, key }),
        1 => (store, 0..PINNABLE, any::<bool>())
            .prop_map(|(store, key, pinned)| Op::Pin { store, key, pinned }),
    ]
}

fn policy_strategy() -> impl Strategy<Value = EntryPolicy> {
    prop_oneof![Just(EntryPolicy::Lru), Just(EntryPolicy::Lfu), Just(EntryPolicy::Fifo)]
}

fn evictor_strategy() -> impl Strategy<Value = EvictorKind> {
    prop_oneof![Just(EvictorKind::FromLargest), Just(EvictorKind::Proportional)]
}

// =============================================================================
// Harness
// =============================================================================

fn build(policy: EntryPolicy, evictor: EvictorKind) -> (Arc<MemoryPool>, Vec<TieredStore<String, u64>>) {
    let pool = MemoryPool::from_config(&PoolConfig {
        evictor,
        ..PoolConfig::named("prop", CAPACITY)
    });
    let config = StoreConfig {
        eviction_policy: policy,
        ..Default::default()
    };
    let stores = (0..2)
        .map(|i| {
            let name = format!("store{i}");
            let caching: Arc<OnHeapCachingTier<String, u64>> =
                OnHeapCachingTier::with_estimator(name.clone(), &pool, &config, FixedSizeEstimator(ENTRY));
            let authority = Arc::new(InMemoryAuthority::new(format!("{name}.authority")));
            TieredStore::<String, u64>::new(name, caching, authority, config.clone()).unwrap()
        })
        .collect();
    (pool, stores)
}

fn key(k: u8) -> String {
    format!("k{k}")
}

/// A bare pool owner holding opaque blocks, oldest evicted first.
struct Blocks {
    participant: PoolParticipant,
    blocks: Mutex<Vec<u64>>,
}

impl Blocks {
    fn register(pool: &Arc<MemoryPool>, name: &str) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let owner: Weak<dyn PoolOwner> = weak.clone();
            Self {
                participant: pool.register(name, owner),
                blocks: Mutex::new(Vec::new()),
            }
        })
    }

    /// Charge first, then record: the block is not evictable while its own
    /// charge is being reclaimed.
    fn add(&self, bytes: u64) -> bool {
        let outcome = self.participant.add(bytes, 1);
        self.blocks.lock().push(bytes);
        outcome.soft_overflow
    }

    fn remove_oldest(&self) {
        let block = {
            let mut blocks = self.blocks.lock();
            if blocks.is_empty() {
                return;
            }
            blocks.remove(0)
        };
        self.participant.remove(block, 1);
    }
}

impl PoolOwner for Blocks {
    fn evict(&self, bytes: u64) -> u64 {
        let mut freed = 0;
        while freed < bytes {
            let next = {
                let mut blocks = self.blocks.lock();
                (!blocks.is_empty()).then(|| blocks.remove(0))
            };
            let Some(block) = next else {
                break;
            };
            self.participant.remove(block, 1);
            freed += block;
        }
        freed
    }
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// After any add returns, the pool is within capacity unless the add
    /// was flagged as a soft overflow.
    #[test]
    fn pool_bound_holds_for_raw_participants(
        evictor in evictor_strategy(),
        ops in prop::collection::vec((0..3usize, any::<bool>(), 1..300u64), 1..300),
    ) {
        let pool = MemoryPool::from_config(&PoolConfig {
            evictor,
            ..PoolConfig::named("raw", 1_000)
        });
        let owners: Vec<_> = (0..3).map(|i| Blocks::register(&pool, &format!("owner{i}"))).collect();

        for (owner, add, bytes) in ops {
            if add {
                let soft_overflow = owners[owner].add(bytes);
                if !soft_overflow {
                    prop_assert!(pool.consumed() <= pool.capacity());
                }
            } else {
                owners[owner].remove_oldest();
            }

            let charged: u64 = owners.iter().map(|o| o.participant.size_in_bytes()).sum();
            prop_assert_eq!(charged, pool.consumed());
        }

        drop(owners);
        prop_assert_eq!(pool.consumed(), 0);
        prop_assert_eq!(pool.participant_count(), 0);
    }

    /// The pool never exceeds capacity while pins leave room to evict, and
    /// its consumed bytes always equal the sum of its participants.
    #[test]
    fn pool_accounting_holds(
        policy in policy_strategy(),
        evictor in evictor_strategy(),
        ops in prop::collection::vec(op_strategy(), 1..200),
    ) {
        let (pool, stores) = build(policy, evictor);
        let mut model: Vec<HashMap<u8, u64>> = vec![HashMap::new(), HashMap::new()];

        for op in ops {
            match op {
                Op::Get { store, key: k } => {
                    let got = stores[store].get(&key(k)).unwrap().map(|e| *e.value());
                    prop_assert_eq!(got, model[store].get(&k).copied());
                }
                Op::Put { store, key: k, value } => {
                    let overwrote = stores[store].put(Element::new(key(k), value)).unwrap();
                    prop_assert_eq!(overwrote, model[store].insert(k, value).is_some());
                    prop_assert!(!stores[store].contains_key_in_memory(&key(k)).unwrap());
                }
                Op::Remove { store, key: k } => {
                    let removed = stores[store].remove(&key(k)).unwrap().map(|e| *e.value());
                    prop_assert_eq!(removed, model[store].remove(&k));
                }
                Op::Pin { store, key: k, pinned } => {
                    stores[store].set_pinned(&key(k), pinned).unwrap();
                }
            }

            let charged: u64 = stores.iter().map(|s| s.in_memory_size_in_bytes().unwrap()).sum();
            prop_assert_eq!(charged, pool.consumed());
            prop_assert!(pool.consumed() <= CAPACITY, "consumed {} > {}", pool.consumed(), CAPACITY);
            prop_assert_eq!(pool.soft_overflow_count(), 0);
            for store in &stores {
                prop_assert_eq!(store.in_memory_size_in_bytes().unwrap(), store.in_memory_len().unwrap() as u64 * ENTRY);
            }
        }

        for store in &stores {
            store.dispose();
        }
        prop_assert_eq!(pool.consumed(), 0);
        prop_assert_eq!(pool.participant_count(), 0);
    }

    /// Reads never lose data: whatever was evicted is faulted back in.
    #[test]
    fn eviction_never_loses_values(
        policy in policy_strategy(),
        values in prop::collection::vec(any::<u64>(), 1..40),
    ) {
        let (_pool, stores) = build(policy, EvictorKind::FromLargest);
        let store = &stores[0];

        for (i, value) in values.iter().enumerate() {
            store.put(Element::new(format!("v{i}"), *value)).unwrap();
            store.get(&format!("v{i}")).unwrap();
        }
        for (i, value) in values.iter().enumerate() {
            let got = store.get(&format!("v{i}")).unwrap().map(|e| *e.value());
            prop_assert_eq!(got, Some(*value));
        }
        prop_assert!(store.in_memory_len().unwrap() as u64 * ENTRY <= CAPACITY);
    }
}
