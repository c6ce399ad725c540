// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::{AuthoritativeTier, ElementComparator};
use crate::element::{now_millis, CacheKey, CacheValue, Element};
use crate::error::{StoreError, StoreResult};

/// Reference [`AuthoritativeTier`] holding every element in a `DashMap`.
///
/// An expired element is absent to every operation. It stays in the map
/// until a fault, a write or [`expire_elements`](AuthoritativeTier::expire_elements)
/// touches it.
pub struct InMemoryAuthority<K: CacheKey, V: CacheValue> {
    name: String,
    data: DashMap<K, Element<K, V>>,
    disposed: AtomicBool,
}

impl<K: CacheKey, V: CacheValue> InMemoryAuthority<K, V> {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: DashMap::new(),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read without touching access statistics or expiring.
    pub fn peek(&self, key: &K) -> Option<Element<K, V>> {
        self.data.get(key).map(|e| e.value().clone())
    }

    fn ensure_live(&self) -> StoreResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(StoreError::Disposed(self.name.clone()));
        }
        Ok(())
    }
}

impl<K: CacheKey, V: CacheValue> Default for InMemoryAuthority<K, V> {
    fn default() -> Self {
        Self::new("authority")
    }
}

impl<K: CacheKey, V: CacheValue> AuthoritativeTier<K, V> for InMemoryAuthority<K, V> {
    fn fault(&self, key: &K, update_stats: bool) -> StoreResult<Option<Element<K, V>>> {
        self.ensure_live()?;
        match self.data.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.remove();
                    debug!(tier = %self.name, key = ?key, "Expired on fault");
                    return Ok(None);
                }
                if update_stats {
                    occupied.get_mut().record_access();
                }
                Ok(Some(occupied.get().clone()))
            }
            Entry::Vacant(_) => Ok(None),
        }
    }

    fn write_back(&self, element: &Element<K, V>) -> StoreResult<()> {
        self.ensure_live()?;
        if let Some(mut stored) = self.data.get_mut(element.key()) {
            stored.merge_access(element);
        }
        Ok(())
    }

    fn put(&self, element: Element<K, V>) -> StoreResult<bool> {
        self.ensure_live()?;
        Ok(self
            .data
            .insert(element.key().clone(), element)
            .is_some_and(|previous| !previous.is_expired()))
    }

    fn put_if_absent(&self, element: Element<K, V>) -> StoreResult<Option<Element<K, V>>> {
        self.ensure_live()?;
        match self.data.entry(element.key().clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(element);
                    return Ok(None);
                }
                Ok(Some(occupied.get().clone()))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(element);
                Ok(None)
            }
        }
    }

    fn remove(&self, key: &K) -> StoreResult<Option<Element<K, V>>> {
        self.ensure_live()?;
        Ok(self
            .data
            .remove(key)
            .map(|(_, element)| element)
            .filter(|element| !element.is_expired()))
    }

    fn remove_element(
        &self,
        element: &Element<K, V>,
        comparator: &dyn ElementComparator<K, V>,
    ) -> StoreResult<Option<Element<K, V>>> {
        self.ensure_live()?;
        Ok(self
            .data
            .remove_if(element.key(), |_, current| {
                !current.is_expired() && comparator.equals(current, element)
            })
            .map(|(_, removed)| removed))
    }

    fn replace_if(
        &self,
        old: &Element<K, V>,
        new: Element<K, V>,
        comparator: &dyn ElementComparator<K, V>,
    ) -> StoreResult<bool> {
        self.ensure_live()?;
        match self.data.entry(old.key().clone()) {
            Entry::Occupied(occupied) if occupied.get().is_expired() => {
                occupied.remove();
                Ok(false)
            }
            Entry::Occupied(mut occupied) if comparator.equals(occupied.get(), old) => {
                occupied.insert(new);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn replace(&self, element: Element<K, V>) -> StoreResult<Option<Element<K, V>>> {
        self.ensure_live()?;
        match self.data.entry(element.key().clone()) {
            Entry::Occupied(occupied) if occupied.get().is_expired() => {
                occupied.remove();
                Ok(None)
            }
            Entry::Occupied(mut occupied) => Ok(Some(occupied.insert(element))),
            Entry::Vacant(_) => Ok(None),
        }
    }

    fn remove_all(&self) -> StoreResult<()> {
        self.ensure_live()?;
        self.data.clear();
        Ok(())
    }

    fn flush(&self) -> StoreResult<()> {
        self.ensure_live()?;
        debug!(tier = %self.name, entries = self.data.len(), "Flush (nothing buffered)");
        Ok(())
    }

    fn dispose(&self) -> StoreResult<()> {
        self.disposed.store(true, Ordering::Release);
        Ok(())
    }

    fn len(&self) -> usize {
        let now = now_millis();
        self.data.iter().filter(|e| !e.is_expired_at(now)).count()
    }

    fn contains_key(&self, key: &K) -> bool {
        self.data.get(key).is_some_and(|e| !e.is_expired())
    }

    fn keys(&self) -> Vec<K> {
        let now = now_millis();
        self.data
            .iter()
            .filter(|e| !e.is_expired_at(now))
            .map(|e| e.key().clone())
            .collect()
    }

    fn expire_elements(&self) -> Vec<K> {
        let now = now_millis();
        let mut expired = Vec::new();
        self.data.retain(|key, element| {
            if element.is_expired_at(now) {
                expired.push(key.clone());
                return false;
            }
            true
        });
        if !expired.is_empty() {
            debug!(tier = %self.name, expired = expired.len(), "Expired elements");
        }
        expired
    }
}
