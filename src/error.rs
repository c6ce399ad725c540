// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use thiserror::Error;

/// Errors surfaced by tiers and by the [`TieredStore`](crate::TieredStore).
///
/// `Clone` so that a single failed load can be handed to every thread
/// waiting on the same fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The authoritative tier failed while faulting a key in.
    #[error("loading '{key}' from the authoritative tier failed: {source}")]
    LoadFailure {
        key: String,
        #[source]
        source: Box<StoreError>,
    },
    /// The store (or tier) was used after `dispose()`.
    #[error("store '{0}' has been disposed")]
    Disposed(String),
    /// `replace_if` was called with elements for different keys.
    #[error("old and replacement elements have different keys")]
    KeyMismatch,
    /// Tier-level backend failure.
    #[error("tier backend error: {0}")]
    Backend(String),
    /// An evicted entry could not be written back to the authoritative tier.
    #[error("write-back of '{key}' failed: {reason}")]
    WriteBack { key: String, reason: String },
    /// The store was built from an invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl StoreError {
    /// Wrap a fault error for `key`.
    pub fn load_failure(key: &impl std::fmt::Debug, source: StoreError) -> Self {
        Self::LoadFailure {
            key: format!("{key:?}"),
            source: Box::new(source),
        }
    }

    /// Short label used for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LoadFailure { .. } => "load_failure",
            Self::Disposed(_) => "disposed",
            Self::KeyMismatch => "key_mismatch",
            Self::Backend(_) => "backend",
            Self::WriteBack { .. } => "write_back",
            Self::Config(_) => "config",
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Invalid configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid byte size '{0}' (expected e.g. 1024, \"512k\", \"64m\", \"1g\")")]
    InvalidByteSize(String),
    #[error("min_entry_bytes ({min}) exceeds max_entry_bytes ({max})")]
    InvertedEntryBounds { min: u64, max: u64 },
}
