// src/view.rs

//! Read-only snapshot types returned by the manager's query operations and
//! delivered to watchers.

use crate::pchannel::{PChannelAssigned, PChannelMeta};
use crate::replication::ReplicateConfiguration;
use std::collections::HashMap;

/// Every known channel plus the local epoch at the moment the snapshot was
/// taken.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterView {
    pub channels: HashMap<String, PChannelMeta>,
    pub epoch: u64,
}

/// The snapshot delivered to [`crate::watch`] subscribers and returned by
/// `getLatestChannelAssignment`: a `ClusterView` plus the replication
/// configuration in effect.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentSnapshot {
    pub view: ClusterView,
    pub replicate_configuration: ReplicateConfiguration,
}

/// The result of `getClusterChannels`: the control-channel marker plus the
/// (possibly replication-filtered) list of channel assignments.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterChannelsView {
    pub control_channel: Option<String>,
    pub channels: Vec<PChannelAssigned>,
}
