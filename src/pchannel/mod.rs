// src/pchannel/mod.rs

//! The PChannel value object and its process-wide load-stats registry.

pub mod meta;
pub mod stats;

pub use meta::{AccessMode, AssignHistoryEntry, ChannelState, NodeId, PChannelAssigned, PChannelMeta};
pub use stats::{PChannelLoad, PChannelStatsRegistry};
