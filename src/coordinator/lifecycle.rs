// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bulk operations and lifecycle: `remove_all`, `flush`, `expire_elements`,
//! `dispose`.

use std::sync::atomic::Ordering;

use tracing::{debug, error, info, warn};

use crate::element::{CacheKey, CacheValue};
use crate::error::StoreResult;
use crate::metrics;

use super::{StoreStatus, TieredStore};

impl<K: CacheKey, V: CacheValue> TieredStore<K, V> {
    #[must_use]
    pub fn status(&self) -> StoreStatus {
        if self.disposed.load(Ordering::Acquire) {
            StoreStatus::Disposed
        } else {
            StoreStatus::Alive
        }
    }

    /// Clear both tiers. Runs exclusively: no fault is in flight while the
    /// tiers are cleared. The near tier is cleared even if the authoritative
    /// tier fails.
    #[tracing::instrument(skip(self), fields(store = %self.name))]
    pub fn remove_all(&self) -> StoreResult<()> {
        let _tiers = self.tier_lock.write();
        self.ensure_live()?;

        let result = self.authority.remove_all();
        self.caching.clear();
        info!(store = %self.name, ok = result.is_ok(), "All entries removed");
        result
    }

    /// Flush the authoritative tier, clearing the near tier first when
    /// `clear_on_flush` is set.
    #[tracing::instrument(skip(self), fields(store = %self.name))]
    pub fn flush(&self) -> StoreResult<()> {
        let _tiers = self.live_tiers()?;

        if self.config.clear_on_flush {
            self.caching.clear();
        }
        self.authority.flush()
    }

    /// Drop expired elements from both tiers. Returns how many the
    /// authoritative tier dropped.
    ///
    /// Near-tier hits only reach the authoritative tier on write-back, so
    /// live near-tier access times are written back first. Whatever the
    /// authoritative tier still expires is then invalidated in the near tier.
    pub fn expire_elements(&self) -> StoreResult<usize> {
        let _tiers = self.live_tiers()?;

        let mut near_expired = 0usize;
        for element in self.caching.elements() {
            if element.is_expired() {
                self.caching.remove(element.key());
                near_expired += 1;
            } else if let Err(err) = self.authority.write_back(&element) {
                warn!(store = %self.name, key = ?element.key(), error = %err, "Access write-back before expiry failed");
            }
        }

        let expired = self.authority.expire_elements();
        for key in &expired {
            self.invalidate(key);
        }
        debug!(store = %self.name, near = near_expired, authority = expired.len(), "Expired elements");
        Ok(expired.len())
    }

    /// Shut the store down. Idempotent.
    ///
    /// With `write_back_on_dispose`, every near-tier element is written back
    /// first. The caching tier is then cleared and disposed (releasing its
    /// pool participant), then the authoritative tier is disposed.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _tiers = self.tier_lock.write();

        if self.config.write_back_on_dispose {
            let mut failed = 0usize;
            let elements = self.caching.elements();
            for element in &elements {
                if let Err(err) = self.authority.write_back(element) {
                    failed += 1;
                    warn!(store = %self.name, key = ?element.key(), error = %err, "Write-back on dispose failed");
                }
            }
            debug!(store = %self.name, written = elements.len() - failed, failed, "Near tier written back");
        }

        self.caching.clear();
        self.caching.dispose();

        if let Err(err) = self.authority.dispose() {
            error!(store = %self.name, error = %err, "Authoritative tier dispose failed");
            metrics::record_error("authority", "dispose", err.kind());
        }

        metrics::set_store_status(&self.name, "disposed");
        info!(store = %self.name, "Tiered store disposed");
    }
}
