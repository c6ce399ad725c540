// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for tiered stores and memory pools.
//!
//! # Example
//!
//! ```
//! use tiered_store::{EntryPolicy, PoolConfig, StoreConfig};
//!
//! // Minimal config (uses defaults)
//! let config = StoreConfig::default();
//! assert!(config.write_back_on_dispose);
//! assert_eq!(config.eviction_policy, EntryPolicy::Lru);
//!
//! // Full config
//! let config = StoreConfig {
//!     max_entries_local_heap: 10_000,
//!     eviction_policy: EntryPolicy::Lfu,
//!     time_to_live_secs: 300,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//!
//! let pool = PoolConfig::named("shared", 64 * 1024 * 1024);
//! assert_eq!(pool.max_bytes.as_u64(), 64 * 1024 * 1024);
//! ```

use serde::Deserialize;

use crate::element::Expiry;
use crate::error::ConfigError;
use crate::eviction::EntryPolicy;
use crate::size::SizeBounds;

/// Configuration for one [`TieredStore`](crate::TieredStore).
///
/// All fields have sensible defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Near-tier entry bound (0 = bounded by the pool only)
    #[serde(default)]
    pub max_entries_local_heap: usize,

    /// Near-tier victim ordering
    #[serde(default)]
    pub eviction_policy: EntryPolicy,

    /// Per-entry size floor and ceiling (0 = none)
    #[serde(default)]
    pub min_entry_bytes: u64,
    #[serde(default)]
    pub max_entry_bytes: u64,

    /// Write every near-tier element back to the authoritative tier on dispose
    #[serde(default = "default_write_back_on_dispose")]
    pub write_back_on_dispose: bool,

    /// Clear the near tier before flushing the authoritative tier
    #[serde(default)]
    pub clear_on_flush: bool,

    /// Expiry applied to elements that carry `Expiry::Default` (0 = none)
    #[serde(default)]
    pub time_to_live_secs: u64,
    #[serde(default)]
    pub time_to_idle_secs: u64,
}

fn default_write_back_on_dispose() -> bool { true }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_entries_local_heap: 0,
            eviction_policy: EntryPolicy::default(),
            min_entry_bytes: 0,
            max_entry_bytes: 0,
            write_back_on_dispose: default_write_back_on_dispose(),
            clear_on_flush: false,
            time_to_live_secs: 0,
            time_to_idle_secs: 0,
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entry_bytes > 0 && self.min_entry_bytes > self.max_entry_bytes {
            return Err(ConfigError::InvertedEntryBounds {
                min: self.min_entry_bytes,
                max: self.max_entry_bytes,
            });
        }
        Ok(())
    }

    pub fn size_bounds(&self) -> SizeBounds {
        SizeBounds::new(self.min_entry_bytes, self.max_entry_bytes)
    }

    pub fn default_expiry(&self) -> Expiry {
        Expiry::from_secs(self.time_to_live_secs, self.time_to_idle_secs)
    }
}

/// Which [`PoolEvictor`](crate::PoolEvictor) a configured pool uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictorKind {
    #[default]
    FromLargest,
    Proportional,
}

/// Configuration for one [`MemoryPool`](crate::MemoryPool).
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_pool_name")]
    pub name: String,

    /// Capacity: bytes or a size string such as "64m" (default: 256 MB, 0 = unbounded)
    #[serde(default = "default_pool_max_bytes")]
    pub max_bytes: ByteSize,

    #[serde(default)]
    pub evictor: EvictorKind,
}

fn default_pool_name() -> String { "default".to_string() }
fn default_pool_max_bytes() -> ByteSize { ByteSize(256 * 1024 * 1024) } // 256 MB

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: default_pool_name(),
            max_bytes: default_pool_max_bytes(),
            evictor: EvictorKind::default(),
        }
    }
}

impl PoolConfig {
    pub fn named(name: impl Into<String>, max_bytes: u64) -> Self {
        Self {
            name: name.into(),
            max_bytes: ByteSize(max_bytes),
            ..Default::default()
        }
    }
}

/// A byte count that deserializes from an integer or a size string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::str::FromStr for ByteSize {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_byte_size(s).map(ByteSize)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum SizeValue {
            Number(u64),
            String(String),
        }

        match SizeValue::deserialize(deserializer)? {
            SizeValue::Number(n) => Ok(ByteSize(n)),
            SizeValue::String(s) => parse_byte_size(&s).map(ByteSize).map_err(D::Error::custom),
        }
    }
}

/// Parse a size string like "512k", "64m", "1g" or "4096" into bytes.
/// Suffixes are binary and case-insensitive; a trailing "b" is optional.
pub fn parse_byte_size(s: &str) -> Result<u64, ConfigError> {
    let invalid = || ConfigError::InvalidByteSize(s.to_string());
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let (num_str, suffix) = match trimmed.find(|c: char| c.is_alphabetic()) {
        Some(idx) => (&trimmed[..idx], trimmed[idx..].to_lowercase()),
        None => (trimmed, String::new()),
    };

    let num: u64 = num_str.trim().parse().map_err(|_| invalid())?;

    let multiplier: u64 = match suffix.as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1024,
        "m" | "mb" | "mib" => 1024 * 1024,
        "g" | "gb" | "gib" => 1024 * 1024 * 1024,
        "t" | "tb" | "tib" => 1024 * 1024 * 1024 * 1024,
        _ => return Err(invalid()),
    };

    num.checked_mul(multiplier).ok_or_else(invalid)
}
