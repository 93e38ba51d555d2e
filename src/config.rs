// src/config.rs

//! Runtime tunables for the coordinator. Loaded from TOML the same way a
//! sentinel config file is loaded elsewhere in this codebase: a typed
//! `serde::Deserialize` struct with per-field defaults, parsed with
//! `toml::from_str`.
//!
//! This module intentionally does not expose a knob for the RO/RW default of
//! dynamically added channels: that conditional default must be preserved,
//! not tunable. It also owns no CLI or environment variable parsing; both are
//! out of scope for this crate.

use serde::Deserialize;
use std::time::Duration;

/// Coordinator-wide tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    /// Capacity of the internal channel used to relay newly-discovered
    /// PChannel names from a [`crate::provider::ChannelProvider`].
    #[serde(default = "default_incoming_channel_capacity")]
    pub incoming_channel_capacity: usize,

    /// Retry policy applied around catalog calls made by the reference
    /// in-memory catalog's retry helper.
    #[serde(default)]
    pub catalog_retry: CatalogRetryConfig,

    /// If a watcher has not observed a new epoch for longer than this, a
    /// warning is logged noting the watcher may be stalled. Purely
    /// diagnostic; it does not affect delivery semantics.
    #[serde(with = "humantime_serde", default = "default_watch_lag_warn_after")]
    pub watch_lag_warn_after: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            incoming_channel_capacity: default_incoming_channel_capacity(),
            catalog_retry: CatalogRetryConfig::default(),
            watch_lag_warn_after: default_watch_lag_warn_after(),
        }
    }
}

impl CoordinatorConfig {
    /// Loads configuration from a TOML file, falling back to built-in
    /// defaults for any field the file omits.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Backoff policy for transient catalog failures encountered outside the
/// manager's mutation path (e.g. a standalone recovery retry helper). The
/// manager itself never retries a mutation-path catalog call. A write
/// failure there is surfaced to the caller immediately, per spec.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogRetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(with = "humantime_serde", default = "default_initial_backoff")]
    pub initial_backoff: Duration,
}

impl Default for CatalogRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
        }
    }
}

fn default_incoming_channel_capacity() -> usize {
    128
}

fn default_watch_lag_warn_after() -> Duration {
    Duration::from_secs(30)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let cfg = CoordinatorConfig::default();
        assert_eq!(cfg.incoming_channel_capacity, 128);
        assert_eq!(cfg.catalog_retry.max_attempts, 3);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let cfg: CoordinatorConfig = toml::from_str("incoming_channel_capacity = 64").unwrap();
        assert_eq!(cfg.incoming_channel_capacity, 64);
        assert_eq!(cfg.watch_lag_warn_after, Duration::from_secs(30));
    }
}
