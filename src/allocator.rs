// src/allocator.rs

//! A pure function over an already-load-ordered slice of eligible PChannel
//! names, producing `n`
//! VChannel names for a collection. Holds no lock and performs no I/O; the
//! manager is responsible for computing eligibility and load order via
//! [`crate::pchannel::PChannelStatsRegistry::snapshot_for`] before calling
//! this.

use crate::error::{CoordinatorError, Result};

/// Synthesizes `n` VChannel names for `collection_id`, drawing from the
/// first `n` entries of `eligible_by_load` (ascending load order).
///
/// Name format is bit-exact for compatibility with external consumers:
/// `<pchannel_name>_<collection_id>v<index>`, `index` zero-based within this
/// call.
///
/// Fails with [`CoordinatorError::AllocationShortfall`] if `n` exceeds the
/// number of eligible channels. No partial list is ever returned.
pub fn allocate_vchannels(
    eligible_by_load: &[String],
    collection_id: i64,
    n: usize,
) -> Result<Vec<String>> {
    if n > eligible_by_load.len() {
        return Err(CoordinatorError::AllocationShortfall {
            requested: n,
            available: eligible_by_load.len(),
        });
    }
    Ok(eligible_by_load[..n]
        .iter()
        .enumerate()
        .map(|(index, pchannel_name)| format!("{pchannel_name}_{collection_id}v{index}"))
        .collect())
}
