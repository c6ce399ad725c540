// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Pool occupancy levels.
//!
//! # Example
//!
//! ```
//! use tiered_store::PoolPressure;
//!
//! assert_eq!(PoolPressure::from_ratio(0.5), PoolPressure::Normal);
//! assert_eq!(PoolPressure::from_ratio(0.95), PoolPressure::Critical);
//! assert!(PoolPressure::from_ratio(1.2).is_over_capacity());
//! ```

/// Occupancy of a [`MemoryPool`](crate::MemoryPool) relative to its capacity.
///
/// - **Normal** (< 75%)
/// - **Elevated** (75-90%)
/// - **Critical** (90-100%): the next inserts will likely evict
/// - **Overflow** (> 100%): soft overflow, nothing left to evict
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PoolPressure {
    Normal = 0,
    Elevated = 1,
    Critical = 2,
    Overflow = 3,
}

impl PoolPressure {
    /// Level for a consumed/capacity ratio.
    #[must_use]
    pub fn from_ratio(ratio: f64) -> Self {
        match ratio {
            r if r < 0.75 => Self::Normal,
            r if r < 0.90 => Self::Elevated,
            r if r <= 1.0 => Self::Critical,
            _ => Self::Overflow,
        }
    }

    /// Level for raw byte counts. Unbounded pools (capacity 0) are always normal.
    #[must_use]
    pub fn from_bytes(consumed: u64, capacity: u64) -> Self {
        if capacity == 0 {
            return Self::Normal;
        }
        Self::from_ratio(consumed as f64 / capacity as f64)
    }

    #[must_use]
    pub fn is_over_capacity(&self) -> bool {
        matches!(self, Self::Overflow)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Normal => "Normal operation",
            Self::Elevated => "Elevated - pool filling up",
            Self::Critical => "Critical - inserts are evicting",
            Self::Overflow => "Overflow - capacity exceeded, nothing evictable",
        }
    }
}

impl std::fmt::Display for PoolPressure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pressure_thresholds() {
        assert_eq!(PoolPressure::from_ratio(0.0), PoolPressure::Normal);
        assert_eq!(PoolPressure::from_ratio(0.74), PoolPressure::Normal);
        assert_eq!(PoolPressure::from_ratio(0.75), PoolPressure::Elevated);
        assert_eq!(PoolPressure::from_ratio(0.89), PoolPressure::Elevated);
        assert_eq!(PoolPressure::from_ratio(0.90), PoolPressure::Critical);
        assert_eq!(PoolPressure::from_ratio(1.0), PoolPressure::Critical);
        assert_eq!(PoolPressure::from_ratio(1.01), PoolPressure::Overflow);
    }

    #[test]
    fn test_unbounded_pool_is_normal() {
        assert_eq!(PoolPressure::from_bytes(u64::MAX, 0), PoolPressure::Normal);
    }

    #[test]
    fn test_from_bytes() {
        assert_eq!(PoolPressure::from_bytes(50, 100), PoolPressure::Normal);
        assert_eq!(PoolPressure::from_bytes(100, 100), PoolPressure::Critical);
        assert_eq!(PoolPressure::from_bytes(101, 100), PoolPressure::Overflow);
    }

    #[test]
    fn test_level_ordering() {
        assert!(PoolPressure::Normal < PoolPressure::Elevated);
        assert!(PoolPressure::Elevated < PoolPressure::Critical);
        assert!(PoolPressure::Critical < PoolPressure::Overflow);
        assert!(!PoolPressure::Critical.is_over_capacity());
    }

    #[test]
    fn test_display() {
        assert_eq!(PoolPressure::Overflow.to_string(), "Overflow");
    }
}
