// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Victim selection across pool participants.
//!
//! When a pool is over capacity its evictor decides which participants give
//! up bytes and how many. Participants then pick their own victim entries
//! (see [`EntryPolicy`](crate::EntryPolicy)).

use tracing::trace;

use super::participant::PoolMember;

/// Chooses which participants shed bytes when a pool overflows.
pub trait PoolEvictor: Send + Sync {
    /// Try to free `bytes` across `members`. Returns the bytes actually freed,
    /// which may be less (soft overflow) or more (entry granularity).
    fn free_space(&self, members: &[PoolMember], bytes: u64) -> u64;

    fn name(&self) -> &'static str;
}

/// Repeatedly asks the participant with the largest evictable contribution
/// to shed the remaining overflow.
///
/// A participant that frees less than it was asked for is considered
/// exhausted for the rest of the pass. Ties go to the oldest registration.
#[derive(Debug, Clone, Copy, Default)]
pub struct FromLargestEvictor;

impl PoolEvictor for FromLargestEvictor {
    fn free_space(&self, members: &[PoolMember], bytes: u64) -> u64 {
        let mut exhausted = vec![false; members.len()];
        let mut remaining = bytes;
        let mut freed_total = 0u64;

        while remaining > 0 {
            let candidate = members
                .iter()
                .enumerate()
                .filter(|(idx, member)| !exhausted[*idx] && member.evictable_bytes() > 0)
                .max_by(|(_, a), (_, b)| {
                    a.evictable_bytes()
                        .cmp(&b.evictable_bytes())
                        .then_with(|| b.id().cmp(&a.id()))
                });

            let Some((idx, member)) = candidate else {
                break;
            };

            let freed = member.evict(remaining);
            trace!(
                participant = %member.name(),
                requested = remaining,
                freed,
                "Participant shed bytes"
            );

            if freed < remaining {
                exhausted[idx] = true;
            }
            freed_total = freed_total.saturating_add(freed);
            remaining = remaining.saturating_sub(freed);
        }

        freed_total
    }

    fn name(&self) -> &'static str {
        "from_largest"
    }
}

/// Splits the overflow across participants in proportion to their evictable
/// contribution, then lets [`FromLargestEvictor`] mop up any remainder.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProportionalEvictor;

impl PoolEvictor for ProportionalEvictor {
    fn free_space(&self, members: &[PoolMember], bytes: u64) -> u64 {
        let total: u64 = members.iter().map(PoolMember::evictable_bytes).sum();
        if total == 0 || bytes == 0 {
            return 0;
        }

        let mut freed_total = 0u64;
        for member in members {
            let evictable = member.evictable_bytes();
            if evictable == 0 {
                continue;
            }
            // Round up so the shares cover the whole overflow.
            let share = ((u128::from(bytes) * u128::from(evictable)).div_ceil(u128::from(total)))
                as u64;
            let freed = member.evict(share.min(evictable));
            trace!(participant = %member.name(), share, freed, "Participant shed share");
            freed_total = freed_total.saturating_add(freed);
        }

        if freed_total < bytes {
            freed_total += FromLargestEvictor.free_space(members, bytes - freed_total);
        }
        freed_total
    }

    fn name(&self) -> &'static str {
        "proportional"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{MemoryPool, PoolOwner, PoolParticipant};
    use parking_lot::Mutex;
    use std::sync::{Arc, Weak};

    /// Owner that sheds up to `limit` bytes in total and records every request.
    struct MockOwner {
        participant: Mutex<Option<PoolParticipant>>,
        limit: Mutex<u64>,
        requests: Arc<Mutex<Vec<(String, u64)>>>,
        label: String,
    }

    impl PoolOwner for MockOwner {
        fn evict(&self, bytes: u64) -> u64 {
            self.requests.lock().push((self.label.clone(), bytes));
            let mut limit = self.limit.lock();
            let freed = bytes.min(*limit);
            *limit -= freed;
            if let Some(participant) = self.participant.lock().as_ref() {
                participant.remove(freed, 0);
            }
            freed
        }
    }

    fn owner(
        pool: &Arc<MemoryPool>,
        label: &str,
        bytes: u64,
        limit: u64,
        requests: &Arc<Mutex<Vec<(String, u64)>>>,
    ) -> Arc<MockOwner> {
        let owner = Arc::new(MockOwner {
            participant: Mutex::new(None),
            limit: Mutex::new(limit),
            requests: Arc::clone(requests),
            label: label.to_string(),
        });
        let weak: Weak<dyn PoolOwner> = Arc::downgrade(&owner) as Weak<dyn PoolOwner>;
        let participant = pool.register(label, weak);
        participant.add(bytes, 1);
        *owner.participant.lock() = Some(participant);
        owner
    }

    #[test]
    fn test_largest_asked_first() {
        let pool = MemoryPool::unbounded("test");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let _a = owner(&pool, "a", 100, 100, &requests);
        let _b = owner(&pool, "b", 50, 50, &requests);
        let _c = owner(&pool, "c", 30, 30, &requests);

        let freed = FromLargestEvictor.free_space(&pool.members(), 40);

        assert_eq!(freed, 40);
        assert_eq!(*requests.lock(), vec![("a".to_string(), 40)]);
    }

    #[test]
    fn test_partial_shed_moves_to_next_largest() {
        let pool = MemoryPool::unbounded("test");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let _a = owner(&pool, "a", 100, 20, &requests);
        let _b = owner(&pool, "b", 50, 50, &requests);
        let _c = owner(&pool, "c", 30, 30, &requests);

        let freed = FromLargestEvictor.free_space(&pool.members(), 40);

        assert_eq!(freed, 40);
        assert_eq!(
            *requests.lock(),
            vec![("a".to_string(), 40), ("b".to_string(), 20)]
        );
    }

    #[test]
    fn test_stops_when_nothing_evictable() {
        let pool = MemoryPool::unbounded("test");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let _a = owner(&pool, "a", 100, 10, &requests);
        let _b = owner(&pool, "b", 50, 0, &requests);

        let freed = FromLargestEvictor.free_space(&pool.members(), 80);

        assert_eq!(freed, 10);
        assert_eq!(requests.lock().len(), 2);
    }

    #[test]
    fn test_pinned_bytes_reduce_contribution() {
        let pool = MemoryPool::unbounded("test");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let a = owner(&pool, "a", 100, 100, &requests);
        let _b = owner(&pool, "b", 60, 60, &requests);

        if let Some(participant) = a.participant.lock().as_ref() {
            participant.pin(90);
        }

        FromLargestEvictor.free_space(&pool.members(), 30);
        assert_eq!(requests.lock()[0].0, "b");
    }

    #[test]
    fn test_proportional_shares() {
        let pool = MemoryPool::unbounded("test");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let _a = owner(&pool, "a", 300, 300, &requests);
        let _b = owner(&pool, "b", 100, 100, &requests);

        let freed = ProportionalEvictor.free_space(&pool.members(), 40);

        assert_eq!(freed, 40);
        assert_eq!(
            *requests.lock(),
            vec![("a".to_string(), 30), ("b".to_string(), 10)]
        );
    }

    #[test]
    fn test_empty_pool_frees_nothing() {
        assert_eq!(FromLargestEvictor.free_space(&[], 100), 0);
        assert_eq!(ProportionalEvictor.free_space(&[], 100), 0);
    }
}
