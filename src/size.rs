// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Byte-cost estimation for pooled entries.
//!
//! Estimates are O(1): strings and vectors are sized by length/capacity,
//! never by walking an object graph. Per-entry floors and ceilings come from
//! configuration and are applied through [`SizeBounds`].
//!
//! # Example
//!
//! ```
//! use tiered_store::{Element, HeapSizeEstimator, SizeEstimator, SizeBounds};
//!
//! let estimator = HeapSizeEstimator;
//! let element = Element::new("user.1".to_string(), vec![0u8; 1000]);
//! let raw = SizeEstimator::size_of(&estimator, &element);
//! assert!(raw > 1000);
//!
//! let bounds = SizeBounds::new(0, 512);
//! assert_eq!(bounds.clamp(raw), 512);
//! ```

use std::mem;
use std::sync::Arc;

use crate::element::Element;

/// Fixed bookkeeping cost charged per entry (map slot, metadata, slot state).
pub const ENTRY_OVERHEAD_BYTES: u64 = 96;

/// Shallow, constant-time size of a value in bytes.
pub trait SizeOf {
    fn size_of(&self) -> usize;
}

macro_rules! impl_size_of_primitive {
    ($($t:ty),*) => {
        $(impl SizeOf for $t {
            #[inline]
            fn size_of(&self) -> usize {
                mem::size_of::<$t>()
            }
        })*
    };
}

impl_size_of_primitive!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, bool, char, ());

impl SizeOf for String {
    fn size_of(&self) -> usize {
        mem::size_of::<String>() + self.capacity()
    }
}

impl SizeOf for &str {
    fn size_of(&self) -> usize {
        mem::size_of::<&str>() + self.len()
    }
}

impl<T> SizeOf for Vec<T> {
    fn size_of(&self) -> usize {
        mem::size_of::<Vec<T>>() + self.capacity() * mem::size_of::<T>()
    }
}

impl<T> SizeOf for Box<[T]> {
    fn size_of(&self) -> usize {
        mem::size_of::<Box<[T]>>() + self.len() * mem::size_of::<T>()
    }
}

impl<T: SizeOf> SizeOf for Option<T> {
    fn size_of(&self) -> usize {
        mem::size_of::<Option<T>>() + self.as_ref().map_or(0, SizeOf::size_of)
    }
}

impl<T: SizeOf> SizeOf for Arc<T> {
    fn size_of(&self) -> usize {
        mem::size_of::<Arc<T>>() + SizeOf::size_of(self.as_ref())
    }
}

impl<A: SizeOf, B: SizeOf> SizeOf for (A, B) {
    fn size_of(&self) -> usize {
        SizeOf::size_of(&self.0) + SizeOf::size_of(&self.1)
    }
}

/// Computes the marginal byte cost of storing an element.
pub trait SizeEstimator<K, V>: Send + Sync {
    fn size_of(&self, element: &Element<K, V>) -> u64;
}

/// Sizes key and value through [`SizeOf`] plus [`ENTRY_OVERHEAD_BYTES`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapSizeEstimator;

impl<K: SizeOf, V: SizeOf> SizeEstimator<K, V> for HeapSizeEstimator {
    fn size_of(&self, element: &Element<K, V>) -> u64 {
        ENTRY_OVERHEAD_BYTES
            + SizeOf::size_of(element.key()) as u64
            + SizeOf::size_of(element.value()) as u64
    }
}

/// Charges the same cost for every entry. Useful with precomputed schemas.
#[derive(Debug, Clone, Copy)]
pub struct FixedSizeEstimator(pub u64);

impl<K, V> SizeEstimator<K, V> for FixedSizeEstimator {
    fn size_of(&self, _element: &Element<K, V>) -> u64 {
        self.0
    }
}

impl<K, V, F> SizeEstimator<K, V> for F
where
    F: Fn(&Element<K, V>) -> u64 + Send + Sync,
{
    fn size_of(&self, element: &Element<K, V>) -> u64 {
        self(element)
    }
}

/// Per-entry floor and ceiling applied to raw estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SizeBounds {
    /// Minimum charge per entry
    pub min: u64,
    /// Maximum charge per entry (0 = no ceiling)
    pub max: u64,
}

impl SizeBounds {
    #[must_use]
    pub fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn clamp(&self, raw: u64) -> u64 {
        let floored = raw.max(self.min);
        if self.max > 0 {
            floored.min(self.max)
        } else {
            floored
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_sized_by_capacity() {
        let mut s = String::with_capacity(100);
        s.push_str("abc");
        assert_eq!(SizeOf::size_of(&s), mem::size_of::<String>() + 100);
    }

    #[test]
    fn test_vec_sized_by_element_width() {
        let v: Vec<u32> = vec![0; 10];
        assert_eq!(SizeOf::size_of(&v), mem::size_of::<Vec<u32>>() + 40);
    }

    #[test]
    fn test_heap_estimator_includes_overhead() {
        let element = Element::new(1u64, 2u64);
        let size = SizeEstimator::size_of(&HeapSizeEstimator, &element);
        assert_eq!(size, ENTRY_OVERHEAD_BYTES + 16);
    }

    #[test]
    fn test_heap_estimator_grows_with_value() {
        let small = Element::new("k", vec![0u8; 10]);
        let large = Element::new("k", vec![0u8; 10_000]);
        assert!(
            SizeEstimator::size_of(&HeapSizeEstimator, &large)
                > SizeEstimator::size_of(&HeapSizeEstimator, &small)
        );
    }

    #[test]
    fn test_fixed_and_closure_estimators() {
        let element = Element::new(3u32, 4u32);
        assert_eq!(SizeEstimator::size_of(&FixedSizeEstimator(42), &element), 42);

        let by_key = |e: &Element<u32, u32>| u64::from(*e.key()) * 10;
        assert_eq!(SizeEstimator::size_of(&by_key, &element), 30);
    }

    #[test]
    fn test_bounds_clamp() {
        let bounds = SizeBounds::new(100, 1_000);
        assert_eq!(bounds.clamp(1), 100);
        assert_eq!(bounds.clamp(500), 500);
        assert_eq!(bounds.clamp(5_000), 1_000);

        let unbounded = SizeBounds::default();
        assert_eq!(unbounded.clamp(u64::MAX), u64::MAX);
    }
}
