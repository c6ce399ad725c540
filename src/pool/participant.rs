// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-cache accounting handles into a [`MemoryPool`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::MemoryPool;

/// The cache instance behind a participant. The pool calls back into it
/// when the budget is exceeded.
pub trait PoolOwner: Send + Sync {
    /// Evict entries until at least `bytes` have been released or nothing
    /// evictable remains. Returns the bytes actually released.
    ///
    /// Implementations report what they free through
    /// [`PoolParticipant::remove`] and must not hold locks while invoking
    /// eviction listeners.
    fn evict(&self, bytes: u64) -> u64;
}

pub(crate) struct ParticipantState {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) bytes: AtomicU64,
    pub(crate) count: AtomicU64,
    pub(crate) pinned_bytes: AtomicU64,
    pub(crate) detached: AtomicBool,
    pub(crate) owner: Weak<dyn PoolOwner>,
}

impl ParticipantState {
    fn evictable_bytes(&self) -> u64 {
        self.bytes
            .load(Ordering::Acquire)
            .saturating_sub(self.pinned_bytes.load(Ordering::Acquire))
    }
}

/// Atomically subtract, clamping at zero. Returns the amount actually removed.
fn saturating_fetch_sub(counter: &AtomicU64, amount: u64) -> u64 {
    let previous = counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            Some(current.saturating_sub(amount))
        })
        .unwrap_or_default();
    previous.min(amount)
}

/// Result of [`PoolParticipant::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOutcome {
    /// Bytes charged to the pool
    pub bytes: u64,
    /// Eviction could not bring the pool back under capacity
    pub soft_overflow: bool,
}

/// A cache instance's handle into a shared pool.
///
/// Dropping the participant unregisters it and returns its bytes to the pool.
pub struct PoolParticipant {
    pub(crate) state: Arc<ParticipantState>,
    pub(crate) pool: Arc<MemoryPool>,
}

impl PoolParticipant {
    pub fn id(&self) -> u64 {
        self.state.id
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn pool(&self) -> &Arc<MemoryPool> {
        &self.pool
    }

    /// Charge `bytes`/`count` to this participant and the pool.
    ///
    /// When the pool goes over capacity the evictor runs on the calling
    /// thread before this returns.
    pub fn add(&self, bytes: u64, count: u64) -> AddOutcome {
        if self.state.detached.load(Ordering::Acquire) {
            return AddOutcome { bytes: 0, soft_overflow: false };
        }
        self.state.bytes.fetch_add(bytes, Ordering::AcqRel);
        self.state.count.fetch_add(count, Ordering::AcqRel);
        self.pool.charge(bytes)
    }

    /// Release `bytes`/`count` previously added.
    pub fn remove(&self, bytes: u64, count: u64) {
        if self.state.detached.load(Ordering::Acquire) {
            return;
        }
        let released = saturating_fetch_sub(&self.state.bytes, bytes);
        saturating_fetch_sub(&self.state.count, count);
        self.pool.release(released);
    }

    /// Move `bytes` from evictable to pinned. Pinned bytes still count
    /// against the pool.
    pub fn pin(&self, bytes: u64) {
        self.state.pinned_bytes.fetch_add(bytes, Ordering::AcqRel);
    }

    pub fn unpin(&self, bytes: u64) {
        saturating_fetch_sub(&self.state.pinned_bytes, bytes);
    }

    pub fn size_in_bytes(&self) -> u64 {
        self.state.bytes.load(Ordering::Acquire)
    }

    pub fn count(&self) -> u64 {
        self.state.count.load(Ordering::Acquire)
    }

    pub fn pinned_bytes(&self) -> u64 {
        self.state.pinned_bytes.load(Ordering::Acquire)
    }

    /// Bytes the evictor may ask this participant to shed.
    pub fn evictable_bytes(&self) -> u64 {
        self.state.evictable_bytes()
    }

    pub fn is_registered(&self) -> bool {
        !self.state.detached.load(Ordering::Acquire)
    }
}

impl Drop for PoolParticipant {
    fn drop(&mut self) {
        self.pool.detach(&self.state);
    }
}

impl std::fmt::Debug for PoolParticipant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolParticipant")
            .field("id", &self.state.id)
            .field("name", &self.state.name)
            .field("bytes", &self.size_in_bytes())
            .field("count", &self.count())
            .field("pinned_bytes", &self.pinned_bytes())
            .finish()
    }
}

/// A live participant as seen by a [`PoolEvictor`](super::PoolEvictor)
/// during one eviction pass.
#[derive(Clone)]
pub struct PoolMember {
    pub(crate) state: Arc<ParticipantState>,
}

impl PoolMember {
    pub fn id(&self) -> u64 {
        self.state.id
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn size_in_bytes(&self) -> u64 {
        self.state.bytes.load(Ordering::Acquire)
    }

    pub fn count(&self) -> u64 {
        self.state.count.load(Ordering::Acquire)
    }

    pub fn evictable_bytes(&self) -> u64 {
        self.state.evictable_bytes()
    }

    /// Ask the owning cache to shed `bytes`. Returns what it released;
    /// 0 when the owner is gone or has nothing evictable.
    pub fn evict(&self, bytes: u64) -> u64 {
        if self.state.detached.load(Ordering::Acquire) {
            return 0;
        }
        match self.state.owner.upgrade() {
            Some(owner) => owner.evict(bytes),
            None => 0,
        }
    }
}

impl std::fmt::Debug for PoolMember {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolMember")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("bytes", &self.size_in_bytes())
            .field("evictable_bytes", &self.evictable_bytes())
            .finish()
    }
}
