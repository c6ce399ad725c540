// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Shared, byte-bounded memory pools.
//!
//! A [`MemoryPool`] is one budget shared by any number of cache instances.
//! Each instance registers once and receives a [`PoolParticipant`] through
//! which it reports every byte it adds or removes. When an add pushes the
//! pool over capacity, the pool's [`PoolEvictor`] runs on the adding thread
//! and asks participants (through their [`PoolOwner`]) to shed bytes.
//!
//! If nothing more can be evicted, the add still succeeds: the pool is left
//! in *soft overflow* and the outcome is flagged.
//!
//! # Example
//!
//! ```
//! use std::sync::Weak;
//! use tiered_store::{FromLargestEvictor, MemoryPool, PoolOwner};
//!
//! struct NoEvict;
//! impl PoolOwner for NoEvict {
//!     fn evict(&self, _bytes: u64) -> u64 { 0 }
//! }
//!
//! let pool = MemoryPool::new("shared", 1024, FromLargestEvictor);
//! let owner: Weak<dyn PoolOwner> = Weak::<NoEvict>::new();
//! let participant = pool.register("users", owner);
//!
//! assert!(!participant.add(512, 1).soft_overflow);
//! assert!(participant.add(1024, 1).soft_overflow);
//! assert_eq!(pool.soft_overflow_count(), 1);
//! ```

mod evictor;
mod participant;
mod pressure;

pub use evictor::{FromLargestEvictor, PoolEvictor, ProportionalEvictor};
pub use participant::{AddOutcome, PoolMember, PoolOwner, PoolParticipant};
pub use pressure::PoolPressure;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::config::{EvictorKind, PoolConfig};
use crate::metrics;
use participant::ParticipantState;

/// A capacity-bounded byte budget shared across cache instances.
pub struct MemoryPool {
    name: String,
    /// Capacity in bytes (0 = unbounded)
    capacity: u64,
    consumed: AtomicU64,
    members: DashMap<u64, Weak<ParticipantState>>,
    evictor: Box<dyn PoolEvictor>,
    next_id: AtomicU64,
    soft_overflows: AtomicU64,
}

impl MemoryPool {
    pub fn new(
        name: impl Into<String>,
        capacity: u64,
        evictor: impl PoolEvictor + 'static,
    ) -> Arc<Self> {
        Self::with_boxed_evictor(name.into(), capacity, Box::new(evictor))
    }

    /// A pool that never evicts.
    pub fn unbounded(name: impl Into<String>) -> Arc<Self> {
        Self::new(name, 0, FromLargestEvictor)
    }

    pub fn from_config(config: &PoolConfig) -> Arc<Self> {
        let evictor: Box<dyn PoolEvictor> = match config.evictor {
            EvictorKind::FromLargest => Box::new(FromLargestEvictor),
            EvictorKind::Proportional => Box::new(ProportionalEvictor),
        };
        Self::with_boxed_evictor(config.name.clone(), config.max_bytes.as_u64(), evictor)
    }

    fn with_boxed_evictor(name: String, capacity: u64, evictor: Box<dyn PoolEvictor>) -> Arc<Self> {
        info!(
            pool = %name,
            capacity_bytes = capacity,
            evictor = evictor.name(),
            "Memory pool created"
        );
        Arc::new(Self {
            name,
            capacity,
            consumed: AtomicU64::new(0),
            members: DashMap::new(),
            evictor,
            next_id: AtomicU64::new(1),
            soft_overflows: AtomicU64::new(0),
        })
    }

    /// Register a cache instance. The pool only keeps a weak reference to
    /// the owner, so registration never extends its lifetime.
    pub fn register(self: &Arc<Self>, name: impl Into<String>, owner: Weak<dyn PoolOwner>) -> PoolParticipant {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(ParticipantState {
            id,
            name: name.into(),
            bytes: AtomicU64::new(0),
            count: AtomicU64::new(0),
            pinned_bytes: AtomicU64::new(0),
            detached: AtomicBool::new(false),
            owner,
        });
        self.members.insert(id, Arc::downgrade(&state));
        info!(pool = %self.name, participant = %state.name, id, "Participant registered");
        metrics::set_pool_participants(&self.name, self.members.len());

        PoolParticipant {
            state,
            pool: Arc::clone(self),
        }
    }

    /// Unregister ahead of drop. Returns the participant's bytes to the pool;
    /// later adds and removes through it are ignored.
    pub fn unregister(&self, participant: &PoolParticipant) {
        self.detach(&participant.state);
    }

    pub(crate) fn detach(&self, state: &ParticipantState) {
        if state.detached.swap(true, Ordering::AcqRel) {
            return;
        }
        let bytes = state.bytes.swap(0, Ordering::AcqRel);
        state.count.store(0, Ordering::Release);
        state.pinned_bytes.store(0, Ordering::Release);
        self.release(bytes);
        self.members.remove(&state.id);
        debug!(
            pool = %self.name,
            participant = %state.name,
            released_bytes = bytes,
            "Participant unregistered"
        );
        metrics::set_pool_participants(&self.name, self.members.len());
    }

    pub(crate) fn charge(&self, bytes: u64) -> AddOutcome {
        let total = self.consumed.fetch_add(bytes, Ordering::AcqRel) + bytes;
        if self.capacity == 0 || total <= self.capacity {
            return AddOutcome { bytes, soft_overflow: false };
        }
        let soft_overflow = !self.reclaim();
        AddOutcome { bytes, soft_overflow }
    }

    pub(crate) fn release(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }
        let _ = self
            .consumed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    /// Run the evictor until the pool is back under capacity. Returns
    /// `false` when the overflow could not be cleared.
    fn reclaim(&self) -> bool {
        let overflow = self.consumed().saturating_sub(self.capacity);
        if overflow == 0 {
            return true;
        }

        let members = self.members();
        let freed = self.evictor.free_space(&members, overflow);
        debug!(
            pool = %self.name,
            overflow,
            freed,
            participants = members.len(),
            "Pool eviction pass"
        );
        metrics::record_pool_reclaim(&self.name, overflow, freed);

        let consumed = self.consumed();
        if consumed <= self.capacity {
            return true;
        }

        self.soft_overflows.fetch_add(1, Ordering::Relaxed);
        warn!(
            pool = %self.name,
            consumed_bytes = consumed,
            capacity_bytes = self.capacity,
            "Pool over capacity with nothing left to evict (soft overflow)"
        );
        metrics::record_soft_overflow(&self.name);
        false
    }

    /// Live participants ordered by registration.
    pub fn members(&self) -> Vec<PoolMember> {
        let mut members: Vec<PoolMember> = self
            .members
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .filter(|state| !state.detached.load(Ordering::Acquire))
            .map(|state| PoolMember { state })
            .collect();
        members.sort_by_key(PoolMember::id);
        members
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn is_unbounded(&self) -> bool {
        self.capacity == 0
    }

    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Acquire)
    }

    /// Bytes left before eviction triggers (`u64::MAX` when unbounded).
    pub fn headroom(&self) -> u64 {
        if self.is_unbounded() {
            return u64::MAX;
        }
        self.capacity.saturating_sub(self.consumed())
    }

    pub fn participant_count(&self) -> usize {
        self.members.len()
    }

    /// Number of adds that left the pool over capacity.
    pub fn soft_overflow_count(&self) -> u64 {
        self.soft_overflows.load(Ordering::Relaxed)
    }

    pub fn pressure(&self) -> PoolPressure {
        PoolPressure::from_bytes(self.consumed(), self.capacity)
    }

    /// Push current pool gauges to the metrics recorder.
    pub fn update_gauge_metrics(&self) {
        metrics::set_pool_bytes(&self.name, self.consumed(), self.capacity);
        metrics::set_pool_pressure(&self.name, self.pressure() as u8);
        metrics::set_pool_participants(&self.name, self.members.len());
    }

    #[cfg(test)]
    pub(crate) fn register_detached_owner(self: &Arc<Self>, name: &str) -> PoolParticipant {
        struct Orphan;
        impl PoolOwner for Orphan {
            fn evict(&self, _bytes: u64) -> u64 {
                0
            }
        }
        let owner: Weak<dyn PoolOwner> = Weak::<Orphan>::new();
        self.register(name, owner)
    }
}

impl std::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPool")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("consumed", &self.consumed())
            .field("participants", &self.members.len())
            .field("evictor", &self.evictor.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ByteSize;

    #[test]
    fn test_add_and_remove_track_consumed() {
        let pool = MemoryPool::new("test", 1_000, FromLargestEvictor);
        let a = pool.register_detached_owner("a");
        let b = pool.register_detached_owner("b");

        a.add(300, 3);
        b.add(200, 1);
        assert_eq!(pool.consumed(), 500);
        assert_eq!(pool.headroom(), 500);

        a.remove(100, 1);
        assert_eq!(pool.consumed(), 400);
        assert_eq!(a.size_in_bytes(), 200);
        assert_eq!(a.count(), 2);
    }

    #[test]
    fn test_unbounded_never_overflows() {
        let pool = MemoryPool::unbounded("test");
        let a = pool.register_detached_owner("a");
        let outcome = a.add(u64::MAX / 2, 1);
        assert!(!outcome.soft_overflow);
        assert_eq!(pool.pressure(), PoolPressure::Normal);
        assert_eq!(pool.headroom(), u64::MAX);
    }

    #[test]
    fn test_soft_overflow_when_nothing_evictable() {
        let pool = MemoryPool::new("test", 100, FromLargestEvictor);
        let a = pool.register_detached_owner("a");

        assert!(!a.add(100, 1).soft_overflow);
        let outcome = a.add(1, 1);
        assert!(outcome.soft_overflow);
        assert_eq!(outcome.bytes, 1);
        assert_eq!(pool.consumed(), 101);
        assert_eq!(pool.soft_overflow_count(), 1);
        assert!(pool.pressure().is_over_capacity());
    }

    #[test]
    fn test_drop_returns_bytes() {
        let pool = MemoryPool::new("test", 1_000, FromLargestEvictor);
        let a = pool.register_detached_owner("a");
        let b = pool.register_detached_owner("b");
        a.add(400, 1);
        b.add(100, 1);
        assert_eq!(pool.participant_count(), 2);

        drop(a);
        assert_eq!(pool.consumed(), 100);
        assert_eq!(pool.participant_count(), 1);
        assert_eq!(pool.members().len(), 1);
    }

    #[test]
    fn test_unregister_then_drop_releases_once() {
        let pool = MemoryPool::new("test", 1_000, FromLargestEvictor);
        let a = pool.register_detached_owner("a");
        let b = pool.register_detached_owner("b");
        a.add(400, 1);
        b.add(100, 1);

        pool.unregister(&a);
        assert!(!a.is_registered());
        assert_eq!(pool.consumed(), 100);

        // Ignored once unregistered.
        a.add(50, 1);
        a.remove(10, 1);
        drop(a);
        assert_eq!(pool.consumed(), 100);
    }

    #[test]
    fn test_from_config() {
        let config = PoolConfig {
            name: "shared".into(),
            max_bytes: ByteSize(64 * 1024),
            evictor: EvictorKind::Proportional,
        };
        let pool = MemoryPool::from_config(&config);
        assert_eq!(pool.name(), "shared");
        assert_eq!(pool.capacity(), 64 * 1024);
        assert!(format!("{pool:?}").contains("proportional"));
    }
}
