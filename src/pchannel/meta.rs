// src/pchannel/meta.rs

//! `PChannelMeta`: the value object for one physical channel, and its
//! copy-for-write transitions.
//!
//! `PChannelMeta` is logically immutable. Callers (in practice, only
//! [`crate::manager::ChannelManager`]) obtain an owned clone, apply one of
//! the transitions below, persist the clone, and only then replace the
//! registry's copy. This is the same clone-mutate-commit shape used
//! elsewhere in this codebase for cluster node state.

use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// A worker node identity. `0` means "no node" in an uninitialized channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct NodeId(pub i64);

impl NodeId {
    pub const NONE: NodeId = NodeId(0);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

/// Whether a channel currently accepts writes or is read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum AccessMode {
    Rw,
    Ro,
}

/// The lifecycle state of a PChannel. See [`PChannelMeta`] for the transition
/// diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ChannelState {
    Uninitialized,
    Assigning,
    Assigned,
    Unavailable,
}

/// A single `{term, node}` entry retained in a channel's assignment history
/// until superseded by `assign_to_server_done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignHistoryEntry {
    pub term: i64,
    pub node: NodeId,
}

/// The unit exposed to watchers and persisted by the catalog: the current
/// assignment of one channel, stripped of history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PChannelAssigned {
    pub name: String,
    pub term: i64,
    pub access_mode: AccessMode,
    pub node: NodeId,
}

/// One physical channel and all manager-owned metadata about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PChannelMeta {
    pub name: String,
    pub term: i64,
    pub node: NodeId,
    pub state: ChannelState,
    pub access_mode: AccessMode,
    pub assign_histories: Vec<AssignHistoryEntry>,
    /// Derived from the replication configuration; see
    /// [`crate::replication::available_in_replication`].
    pub available_in_replication: bool,
}

impl PChannelMeta {
    /// Creates a brand-new, never-assigned channel. `access_mode` follows
    /// the conditional default: RO if streaming has never been enabled on
    /// this cluster, RW otherwise. `available_in_replication` should be
    /// computed by the
    /// caller via [`crate::replication::available_in_replication`] before
    /// the channel is inserted into the registry.
    pub fn new(name: impl Into<String>, access_mode: AccessMode) -> Self {
        Self {
            name: name.into(),
            term: 1,
            node: NodeId::NONE,
            state: ChannelState::Uninitialized,
            access_mode,
            assign_histories: Vec::new(),
            available_in_replication: true,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.state == ChannelState::Assigned
    }

    /// A snapshot of the channel's current assignment.
    pub fn current_assignment(&self) -> PChannelAssigned {
        PChannelAssigned {
            name: self.name.clone(),
            term: self.term,
            access_mode: self.access_mode,
            node: self.node,
        }
    }

    /// Attempts to assign this channel to `node` under `access_mode`.
    ///
    /// Returns `false` (no-op) iff the channel is already `Assigned` to this
    /// exact `node`, the "same-node reassignment is a no-op" rule. Any
    /// other transition (including from `Uninitialized` or `Unavailable`, or
    /// to a *different* node while `Assigned`) increments `term` by exactly
    /// one and moves to `Assigning`. Reassigning to a node already present
    /// in history is allowed and appends a second identical entry. This
    /// mirrors the source system's behavior and is preserved deliberately.
    pub fn try_assign_to_server_id(&mut self, access_mode: AccessMode, node: NodeId) -> bool {
        if self.node == node && self.state == ChannelState::Assigned {
            return false;
        }
        if self.state == ChannelState::Assigned {
            self.assign_histories.push(AssignHistoryEntry {
                term: self.term,
                node: self.node,
            });
        }
        self.node = node;
        self.access_mode = access_mode;
        self.term += 1;
        self.state = ChannelState::Assigning;
        true
    }

    /// Confirms an in-flight assignment. Clears every history entry whose
    /// term is strictly less than the current term (invariant 3: no history
    /// entry may carry the current term).
    pub fn assign_to_server_done(&mut self) {
        self.state = ChannelState::Assigned;
        let current_term = self.term;
        self.assign_histories.retain(|e| e.term >= current_term);
    }

    /// Marks the channel unavailable if `term` is not stale. A `term` older
    /// than the channel's current term is a silent no-op; `term ==
    /// current_term` or newer both transition.
    pub fn mark_as_unavailable(&mut self, term: i64) {
        if term < self.term {
            return;
        }
        self.state = ChannelState::Unavailable;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> PChannelMeta {
        PChannelMeta::new("ch-1", AccessMode::Rw)
    }

    #[test]
    fn assign_from_uninitialized_bumps_term_and_moves_to_assigning() {
        let mut ch = fresh();
        assert!(ch.try_assign_to_server_id(AccessMode::Rw, NodeId(1)));
        assert_eq!(ch.term, 2);
        assert_eq!(ch.state, ChannelState::Assigning);
        assert_eq!(ch.node, NodeId(1));
        assert!(ch.assign_histories.is_empty());
    }

    #[test]
    fn reassign_to_same_node_while_assigned_is_noop() {
        let mut ch = fresh();
        ch.try_assign_to_server_id(AccessMode::Rw, NodeId(1));
        ch.assign_to_server_done();
        let term_before = ch.term;
        assert!(!ch.try_assign_to_server_id(AccessMode::Rw, NodeId(1)));
        assert_eq!(ch.term, term_before);
        assert_eq!(ch.state, ChannelState::Assigned);
    }

    #[test]
    fn reassign_to_different_node_pushes_history_and_bumps_term() {
        let mut ch = fresh();
        ch.try_assign_to_server_id(AccessMode::Rw, NodeId(1));
        ch.assign_to_server_done();
        assert!(ch.try_assign_to_server_id(AccessMode::Rw, NodeId(2)));
        assert_eq!(ch.term, 3);
        assert_eq!(ch.node, NodeId(2));
        assert_eq!(ch.state, ChannelState::Assigning);
        assert_eq!(
            ch.assign_histories,
            vec![AssignHistoryEntry {
                term: 2,
                node: NodeId(1)
            }]
        );
    }

    #[test]
    fn repeated_reassignment_to_known_node_duplicates_history_entry() {
        let mut ch = fresh();
        ch.try_assign_to_server_id(AccessMode::Rw, NodeId(1));
        ch.assign_to_server_done();
        ch.try_assign_to_server_id(AccessMode::Rw, NodeId(2));
        ch.assign_to_server_done();
        ch.try_assign_to_server_id(AccessMode::Rw, NodeId(1));
        assert_eq!(
            ch.assign_histories,
            vec![
                AssignHistoryEntry {
                    term: 2,
                    node: NodeId(1)
                },
                AssignHistoryEntry {
                    term: 3,
                    node: NodeId(2)
                },
            ]
        );
    }

    #[test]
    fn assign_done_clears_stale_history_only() {
        let mut ch = fresh();
        ch.try_assign_to_server_id(AccessMode::Rw, NodeId(1));
        ch.assign_to_server_done();
        ch.try_assign_to_server_id(AccessMode::Rw, NodeId(2));
        assert_eq!(ch.assign_histories.len(), 1);
        ch.assign_to_server_done();
        assert!(
            ch.assign_histories
                .iter()
                .all(|e| e.term != ch.term)
        );
    }

    #[test]
    fn mark_unavailable_ignores_stale_term() {
        let mut ch = fresh();
        ch.try_assign_to_server_id(AccessMode::Rw, NodeId(1));
        ch.assign_to_server_done();
        let term = ch.term;
        ch.mark_as_unavailable(term - 1);
        assert_eq!(ch.state, ChannelState::Assigned);
        ch.mark_as_unavailable(term);
        assert_eq!(ch.state, ChannelState::Unavailable);
    }

    #[test]
    fn reassignment_resumes_from_unavailable() {
        let mut ch = fresh();
        ch.try_assign_to_server_id(AccessMode::Rw, NodeId(1));
        ch.assign_to_server_done();
        ch.mark_as_unavailable(ch.term);
        assert!(ch.try_assign_to_server_id(AccessMode::Rw, NodeId(3)));
        assert_eq!(ch.state, ChannelState::Assigning);
    }
}
