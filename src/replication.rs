// src/replication.rs

//! A stateless module of pure functions deriving, from a local cluster id
//! and a proposed
//! `ReplicateConfiguration`, the local replication role, per-channel
//! replication availability, and the set of replicating tasks to
//! materialize.

use crate::catalog::{Checkpoint, ReplicatingTask};
use crate::error::{CoordinatorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use strum_macros::Display;

/// This process's role under a given replication configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ReplicationRole {
    /// A source of at least one cross-cluster replication edge.
    Primary,
    /// A target of at least one cross-cluster replication edge.
    Secondary,
    /// Participates in no edges and the configuration declares no topology
    /// at all.
    Standalone,
}

/// One cluster's declared membership: the PChannels it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMembership {
    pub cluster_id: String,
    pub pchannels: Vec<String>,
}

/// A directed replication edge: `source` replicates to `target`, and
/// `pchannel_mapping` gives the source→target PChannel-name mapping for
/// every channel pair replicated along this edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyEdge {
    pub source_cluster_id: String,
    pub target_cluster_id: String,
    pub pchannel_mapping: Vec<(String, String)>,
}

/// The full cross-cluster replication topology proposed to the manager via
/// `updateReplicateConfiguration`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicateConfiguration {
    pub clusters: Vec<ClusterMembership>,
    pub edges: Vec<TopologyEdge>,
}

impl ReplicateConfiguration {
    fn has_topology(&self) -> bool {
        !self.clusters.is_empty() || !self.edges.is_empty()
    }

    fn membership_of(&self, cluster_id: &str) -> Option<&ClusterMembership> {
        self.clusters.iter().find(|c| c.cluster_id == cluster_id)
    }

    /// Validates that every edge references clusters declared in
    /// `clusters`, and that every mapped source channel actually belongs to
    /// the edge's source cluster. Call before trusting a proposed
    /// configuration.
    pub fn validate(&self) -> Result<()> {
        let known: HashSet<&str> = self.clusters.iter().map(|c| c.cluster_id.as_str()).collect();
        for edge in &self.edges {
            if !known.contains(edge.source_cluster_id.as_str()) {
                return Err(CoordinatorError::ReplicationConfigInvalid(format!(
                    "edge references unknown source cluster {}",
                    edge.source_cluster_id
                )));
            }
            if !known.contains(edge.target_cluster_id.as_str()) {
                return Err(CoordinatorError::ReplicationConfigInvalid(format!(
                    "edge references unknown target cluster {}",
                    edge.target_cluster_id
                )));
            }
            let source_membership = self.membership_of(&edge.source_cluster_id).expect("checked above");
            for (source_channel, _target_channel) in &edge.pchannel_mapping {
                if !source_membership.pchannels.iter().any(|p| p == source_channel) {
                    return Err(CoordinatorError::ReplicationConfigInvalid(format!(
                        "edge maps channel {source_channel} which cluster {} does not own",
                        edge.source_cluster_id
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Per-channel append result broadcast alongside a replicate-configuration
/// update, used as the initialized checkpoint for any replicating task
/// derived for that channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendResult {
    pub message_id: i64,
    pub last_confirmed_message_id: i64,
    pub time_tick: u64,
}

/// The broadcast envelope driving `updateReplicateConfiguration`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicateConfigurationBroadcast {
    pub configuration: ReplicateConfiguration,
    /// Append result per local PChannel, keyed by PChannel name.
    pub append_results: HashMap<String, AppendResult>,
}

/// Determines this process's role under `configuration`.
pub fn role(local_cluster_id: &str, configuration: &ReplicateConfiguration) -> ReplicationRole {
    let is_source = configuration
        .edges
        .iter()
        .any(|e| e.source_cluster_id == local_cluster_id);
    if is_source {
        return ReplicationRole::Primary;
    }
    let is_target = configuration
        .edges
        .iter()
        .any(|e| e.target_cluster_id == local_cluster_id);
    if is_target {
        return ReplicationRole::Secondary;
    }
    ReplicationRole::Standalone
}

/// Whether `pchannel_name` should be available for allocation/default views
/// under `configuration`, for the given local cluster.
///
/// A configuration with no topology at all leaves every channel available;
/// otherwise a channel is available iff it is declared in the local
/// cluster's membership list.
pub fn available_in_replication(
    local_cluster_id: &str,
    pchannel_name: &str,
    configuration: &ReplicateConfiguration,
) -> bool {
    if !configuration.has_topology() {
        return true;
    }
    match configuration.membership_of(local_cluster_id) {
        Some(membership) => membership.pchannels.iter().any(|p| p == pchannel_name),
        None => false,
    }
}

/// Enumerates the replicating tasks this process must materialize under
/// `configuration`: one task per (edge, source-owned pchannel) pair whose
/// edge originates at the local cluster, carrying the broadcast append
/// result for that pchannel as its initialized checkpoint. Tasks already
/// present in `already_persisted` (matched by source+target+target cluster)
/// are excluded. Only tasks not already persisted are included.
pub fn replicating_tasks_for(
    local_cluster_id: &str,
    broadcast: &ReplicateConfigurationBroadcast,
    already_persisted: &[ReplicatingTask],
) -> Vec<ReplicatingTask> {
    let mut tasks = Vec::new();
    for edge in &broadcast.configuration.edges {
        if edge.source_cluster_id != local_cluster_id {
            continue;
        }
        for (source_channel, target_channel) in &edge.pchannel_mapping {
            let Some(append_result) = broadcast.append_results.get(source_channel) else {
                continue;
            };
            let already_there = already_persisted.iter().any(|t| {
                t.source_channel_name == *source_channel
                    && t.target_channel_name == *target_channel
                    && t.target_cluster_id == edge.target_cluster_id
            });
            if already_there {
                continue;
            }
            tasks.push(ReplicatingTask {
                source_channel_name: source_channel.clone(),
                target_channel_name: target_channel.clone(),
                target_cluster_id: edge.target_cluster_id.clone(),
                initialized_checkpoint: Checkpoint {
                    message_id: append_result.message_id,
                    time_tick: append_result.time_tick,
                },
            });
        }
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology() -> ReplicateConfiguration {
        ReplicateConfiguration {
            clusters: vec![
                ClusterMembership {
                    cluster_id: "by-dev".into(),
                    pchannels: vec!["ch1".into(), "ch2".into()],
                },
                ClusterMembership {
                    cluster_id: "by-dev2".into(),
                    pchannels: vec!["ch4".into(), "ch5".into()],
                },
            ],
            edges: vec![TopologyEdge {
                source_cluster_id: "by-dev".into(),
                target_cluster_id: "by-dev2".into(),
                pchannel_mapping: vec![
                    ("ch1".into(), "ch1-replica".into()),
                    ("ch2".into(), "ch2-replica".into()),
                ],
            }],
        }
    }

    #[test]
    fn no_topology_means_everything_available() {
        let cfg = ReplicateConfiguration::default();
        assert!(available_in_replication("by-dev", "anything", &cfg));
    }

    #[test]
    fn availability_follows_local_membership() {
        let cfg = topology();
        assert!(available_in_replication("by-dev", "ch1", &cfg));
        assert!(!available_in_replication("by-dev", "ch3", &cfg));
    }

    #[test]
    fn role_is_primary_for_source_cluster() {
        let cfg = topology();
        assert_eq!(role("by-dev", &cfg), ReplicationRole::Primary);
        assert_eq!(role("by-dev2", &cfg), ReplicationRole::Secondary);
        assert_eq!(role("by-dev3", &cfg), ReplicationRole::Standalone);
    }

    #[test]
    fn role_flips_when_topology_flips() {
        let flipped = ReplicateConfiguration {
            clusters: vec![
                ClusterMembership {
                    cluster_id: "by-dev".into(),
                    pchannels: vec!["ch1".into(), "ch2".into()],
                },
                ClusterMembership {
                    cluster_id: "by-dev2".into(),
                    pchannels: vec!["ch4".into(), "ch5".into()],
                },
                ClusterMembership {
                    cluster_id: "by-dev3".into(),
                    pchannels: vec![],
                },
            ],
            edges: vec![
                TopologyEdge {
                    source_cluster_id: "by-dev2".into(),
                    target_cluster_id: "by-dev".into(),
                    pchannel_mapping: vec![],
                },
                TopologyEdge {
                    source_cluster_id: "by-dev2".into(),
                    target_cluster_id: "by-dev3".into(),
                    pchannel_mapping: vec![],
                },
            ],
        };
        assert_eq!(role("by-dev", &flipped), ReplicationRole::Secondary);

        let broadcast = ReplicateConfigurationBroadcast {
            configuration: flipped,
            append_results: HashMap::new(),
        };
        assert!(replicating_tasks_for("by-dev", &broadcast, &[]).is_empty());
    }

    #[test]
    fn replicating_tasks_exclude_already_persisted() {
        let cfg = topology();
        let mut append_results = HashMap::new();
        append_results.insert(
            "ch1".to_string(),
            AppendResult {
                message_id: 10,
                last_confirmed_message_id: 9,
                time_tick: 100,
            },
        );
        append_results.insert(
            "ch2".to_string(),
            AppendResult {
                message_id: 20,
                last_confirmed_message_id: 19,
                time_tick: 200,
            },
        );
        let broadcast = ReplicateConfigurationBroadcast {
            configuration: cfg,
            append_results,
        };
        let already = vec![ReplicatingTask {
            source_channel_name: "ch1".into(),
            target_channel_name: "ch1-replica".into(),
            target_cluster_id: "by-dev2".into(),
            initialized_checkpoint: Checkpoint {
                message_id: 1,
                time_tick: 1,
            },
        }];
        let tasks = replicating_tasks_for("by-dev", &broadcast, &already);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].source_channel_name, "ch2");
    }

    #[test]
    fn validate_rejects_unknown_cluster_reference() {
        let mut cfg = topology();
        cfg.edges.push(TopologyEdge {
            source_cluster_id: "ghost".into(),
            target_cluster_id: "by-dev2".into(),
            pchannel_mapping: vec![],
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_mapping_channel_cluster_does_not_own() {
        let mut cfg = topology();
        cfg.edges[0].pchannel_mapping.push(("ch9".into(), "ch9-replica".into()));
        assert!(cfg.validate().is_err());
    }
}
