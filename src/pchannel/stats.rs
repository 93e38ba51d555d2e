// src/pchannel/stats.rs

//! `PChannelStatsRegistry`: a process-wide, thread-safe map from PChannel
//! name to load statistics, consulted by the allocator.
//!
//! Writers are the streaming data paths that add/remove VChannels; the
//! allocator is the sole reader. The allocator tolerates stale reads, so
//! this is backed by a plain `DashMap` rather than anything coordinated with
//! the manager's mutex. The same tradeoff is used elsewhere in this codebase
//! for a process-wide cluster node registry.

use dashmap::DashMap;
use once_cell::sync::Lazy;

/// Load counters tracked per PChannel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PChannelLoad {
    pub vchannel_count: u64,
    pub collection_count: u64,
}

impl PChannelLoad {
    fn total(&self) -> u64 {
        self.vchannel_count + self.collection_count
    }
}

/// The process-wide stats registry singleton.
#[derive(Debug, Default)]
pub struct PChannelStatsRegistry {
    loads: DashMap<String, PChannelLoad>,
}

static GLOBAL: Lazy<PChannelStatsRegistry> = Lazy::new(PChannelStatsRegistry::default);

/// Returns the process-global stats registry.
pub fn global() -> &'static PChannelStatsRegistry {
    &GLOBAL
}

impl PChannelStatsRegistry {
    /// Registers `vchannel_count` more VChannels against each named
    /// PChannel.
    pub fn add_vchannel(&self, names: impl IntoIterator<Item = impl AsRef<str>>) {
        for name in names {
            self.loads.entry(name.as_ref().to_string()).or_default().vchannel_count += 1;
        }
    }

    /// Removes one VChannel's worth of load from each named PChannel.
    /// Saturates at zero rather than underflowing.
    pub fn remove_vchannel(&self, names: impl IntoIterator<Item = impl AsRef<str>>) {
        for name in names {
            if let Some(mut entry) = self.loads.get_mut(name.as_ref()) {
                entry.vchannel_count = entry.vchannel_count.saturating_sub(1);
            }
        }
    }

    /// Resets all tracked load to zero, without forgetting which names are
    /// known. Used by tests and on process (re)initialization.
    pub fn reset(&self) {
        self.loads.clear();
    }

    /// Seeds the registry with a set of known PChannel names at zero load,
    /// without disturbing any counters already present for those names.
    pub fn recover(&self, names: impl IntoIterator<Item = impl AsRef<str>>) {
        for name in names {
            self.loads.entry(name.as_ref().to_string()).or_default();
        }
    }

    /// Returns the eligible PChannel names from `eligible`, sorted ascending
    /// by current load. Names present in `eligible` but unknown to this
    /// registry are treated as zero-load. This is the single-call-
    /// consistent snapshot the allocator consumes.
    pub fn snapshot_for(&self, eligible: &[String]) -> Vec<String> {
        let mut ordered: Vec<(String, u64)> = eligible
            .iter()
            .map(|name| {
                let load = self
                    .loads
                    .get(name)
                    .map(|entry| entry.total())
                    .unwrap_or_default();
                (name.clone(), load)
            })
            .collect();
        ordered.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        ordered.into_iter().map(|(name, _)| name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_orders_by_ascending_load() {
        let reg = PChannelStatsRegistry::default();
        reg.add_vchannel(["a", "a", "a"]);
        reg.add_vchannel(["b"]);
        reg.recover(["c"]);
        let eligible = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(reg.snapshot_for(&eligible), vec!["c", "b", "a"]);
    }

    #[test]
    fn remove_vchannel_saturates_at_zero() {
        let reg = PChannelStatsRegistry::default();
        reg.remove_vchannel(["a"]);
        reg.add_vchannel(["a"]);
        reg.remove_vchannel(["a", "a"]);
        let eligible = vec!["a".to_string()];
        assert_eq!(reg.snapshot_for(&eligible), vec!["a"]);
    }
}
