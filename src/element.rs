// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache element: key, value and access/expiry metadata.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tiered_store::{Element, Expiry};
//!
//! let element = Element::new("session.1234", vec![1u8, 2, 3])
//!     .with_expiry(Expiry::ttl(Duration::from_secs(60)));
//!
//! assert_eq!(*element.key(), "session.1234");
//! assert_eq!(element.hit_count(), 0);
//! assert!(!element.is_expired());
//! ```

use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

/// Bounds every cache key satisfies.
pub trait CacheKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// Bounds every cache value satisfies.
pub trait CacheValue: Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Send + Sync + 'static {}

/// Current wall-clock time in epoch millis.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Expiry policy carried by an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    /// Use the store's configured expiry.
    #[default]
    Default,
    /// Never expires.
    Eternal,
    /// Time-to-live from creation and/or time-to-idle since last access.
    Timed {
        ttl: Option<Duration>,
        tti: Option<Duration>,
    },
}

impl Expiry {
    #[must_use]
    pub fn ttl(ttl: Duration) -> Self {
        Self::Timed { ttl: Some(ttl), tti: None }
    }

    #[must_use]
    pub fn tti(tti: Duration) -> Self {
        Self::Timed { ttl: None, tti: Some(tti) }
    }

    /// Build from config seconds, where 0 means "not set".
    #[must_use]
    pub fn from_secs(ttl_secs: u64, tti_secs: u64) -> Self {
        if ttl_secs == 0 && tti_secs == 0 {
            return Self::Eternal;
        }
        Self::Timed {
            ttl: (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs)),
            tti: (tti_secs > 0).then(|| Duration::from_secs(tti_secs)),
        }
    }
}

/// A key/value pair plus the metadata the tiers need.
///
/// Tiers never hand out references into their maps: callers receive clones,
/// so an element is owned by exactly one tier at a time.
#[derive(Debug, Clone)]
pub struct Element<K, V> {
    key: K,
    value: V,
    version: u64,
    /// Creation timestamp (epoch millis)
    created_at: u64,
    /// Last access timestamp (epoch millis, 0 = never accessed)
    last_accessed: u64,
    hit_count: u64,
    expiry: Expiry,
}

impl<K, V> Element<K, V> {
    pub fn new(key: K, value: V) -> Self {
        Self {
            key,
            value,
            version: 1,
            created_at: now_millis(),
            last_accessed: 0,
            hit_count: 0,
            expiry: Expiry::Default,
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn with_expiry(mut self, expiry: Expiry) -> Self {
        self.expiry = expiry;
        self
    }

    /// Override the creation timestamp (epoch millis).
    #[must_use]
    pub fn with_created_at(mut self, created_at: u64) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn into_value(self) -> V {
        self.value
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn last_accessed(&self) -> u64 {
        self.last_accessed
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }

    pub fn expiry(&self) -> Expiry {
        self.expiry
    }

    pub fn record_access(&mut self) {
        self.record_access_at(now_millis());
    }

    pub fn record_access_at(&mut self, now: u64) {
        self.last_accessed = now.max(self.last_accessed);
        self.hit_count = self.hit_count.saturating_add(1);
    }

    /// Replace `Expiry::Default` with the store-wide policy.
    pub fn resolve_expiry(&mut self, default: Expiry) {
        if self.expiry == Expiry::Default {
            self.expiry = default;
        }
    }

    /// Fold access statistics gathered elsewhere (e.g. in the near tier)
    /// into this element. Never moves statistics backwards.
    pub fn merge_access(&mut self, other: &Element<K, V>) {
        self.last_accessed = self.last_accessed.max(other.last_accessed);
        self.hit_count = self.hit_count.max(other.hit_count);
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        let Expiry::Timed { ttl, tti } = self.expiry else {
            return false;
        };
        if let Some(ttl) = ttl {
            if now >= self.created_at.saturating_add(ttl.as_millis() as u64) {
                return true;
            }
        }
        if let Some(tti) = tti {
            let idle_since = if self.last_accessed > 0 {
                self.last_accessed
            } else {
                self.created_at
            };
            if now >= idle_since.saturating_add(tti.as_millis() as u64) {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_element_defaults() {
        let element = Element::new("k", 1u32);
        assert_eq!(element.version(), 1);
        assert_eq!(element.hit_count(), 0);
        assert_eq!(element.last_accessed(), 0);
        assert_eq!(element.expiry(), Expiry::Default);
        assert!(element.created_at() > 0);
    }

    #[test]
    fn test_default_and_eternal_never_expire() {
        let element = Element::new("k", 1u32).with_created_at(0);
        assert!(!element.is_expired_at(u64::MAX));

        let element = element.with_expiry(Expiry::Eternal);
        assert!(!element.is_expired_at(u64::MAX));
    }

    #[test]
    fn test_ttl_measured_from_creation() {
        let element = Element::new("k", 1u32)
            .with_created_at(1_000)
            .with_expiry(Expiry::ttl(Duration::from_secs(2)));

        assert!(!element.is_expired_at(2_999));
        assert!(element.is_expired_at(3_000));
    }

    #[test]
    fn test_tti_measured_from_last_access() {
        let mut element = Element::new("k", 1u32)
            .with_created_at(1_000)
            .with_expiry(Expiry::tti(Duration::from_secs(1)));

        assert!(element.is_expired_at(2_000));

        element.record_access_at(5_000);
        assert!(!element.is_expired_at(5_999));
        assert!(element.is_expired_at(6_000));
    }

    #[test]
    fn test_record_access_counts_hits() {
        let mut element = Element::new("k", 1u32);
        element.record_access_at(10);
        element.record_access_at(5); // clock skew must not rewind
        assert_eq!(element.hit_count(), 2);
        assert_eq!(element.last_accessed(), 10);
    }

    #[test]
    fn test_resolve_expiry_only_replaces_default() {
        let mut defaulted = Element::new("k", 1u32);
        defaulted.resolve_expiry(Expiry::ttl(Duration::from_secs(5)));
        assert_eq!(defaulted.expiry(), Expiry::ttl(Duration::from_secs(5)));

        let mut eternal = Element::new("k", 1u32).with_expiry(Expiry::Eternal);
        eternal.resolve_expiry(Expiry::ttl(Duration::from_secs(5)));
        assert_eq!(eternal.expiry(), Expiry::Eternal);
    }

    #[test]
    fn test_merge_access_keeps_maximum() {
        let mut stored = Element::new("k", 1u32);
        stored.record_access_at(100);

        let mut near = stored.clone();
        near.record_access_at(200);
        near.record_access_at(300);

        stored.merge_access(&near);
        assert_eq!(stored.hit_count(), 3);
        assert_eq!(stored.last_accessed(), 300);
    }

    #[test]
    fn test_expiry_from_secs() {
        assert_eq!(Expiry::from_secs(0, 0), Expiry::Eternal);
        assert_eq!(
            Expiry::from_secs(10, 0),
            Expiry::Timed { ttl: Some(Duration::from_secs(10)), tti: None }
        );
    }
}
