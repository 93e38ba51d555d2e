// src/catalog/mod.rs

//! A typed facade over a linearizable transactional KV store, treated as an
//! opaque external collaborator. The manager is the adapter's sole writer;
//! other subsystems must not write channel meta directly.

pub mod memory;

use crate::error::Result;
use crate::pchannel::PChannelMeta;
use crate::replication::ReplicateConfiguration;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Marker that streaming has been enabled at some point on this cluster.
/// Its mere presence in the catalog is the signal; the value is otherwise
/// unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingVersion {
    pub version: i64,
}

/// The control-channel marker seeding the cluster view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlChannelMeta {
    pub pchannel_name: String,
}

/// A materialized cross-cluster replicating task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicatingTask {
    pub source_channel_name: String,
    pub target_channel_name: String,
    pub target_cluster_id: String,
    pub initialized_checkpoint: Checkpoint,
}

/// A WAL position used as the starting point for a replicating task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub message_id: i64,
    pub time_tick: u64,
}

/// The persisted replicate-configuration record plus the tasks derived from
/// it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicateConfigurationRecord {
    pub configuration: ReplicateConfiguration,
    pub tasks: Vec<ReplicatingTask>,
}

/// The transactional KV facade required by the manager. All operations are
/// fallible; concurrent callers may race, the manager serializes through its
/// own mutation path.
#[async_trait]
pub trait MetadataCatalog: Send + Sync {
    /// Whether streaming has ever been enabled on this cluster.
    async fn get_version(&self) -> Result<Option<StreamingVersion>>;

    /// Idempotently records that streaming has been enabled.
    async fn save_version(&self, version: StreamingVersion) -> Result<()>;

    /// Lists every persisted PChannel's metadata.
    async fn list_pchannel(&self) -> Result<Vec<PChannelMeta>>;

    /// Atomically persists the given list of PChannel metadata records.
    /// Either every record in `metas` is durably written, or none are.
    async fn save_pchannels(&self, metas: Vec<PChannelMeta>) -> Result<()>;

    /// The control-channel marker, if one has been recorded.
    async fn get_cchannel(&self) -> Result<Option<ControlChannelMeta>>;

    /// The current replicate configuration and its derived tasks, if any
    /// configuration has ever been saved.
    async fn get_replicate_configuration(&self) -> Result<Option<ReplicateConfigurationRecord>>;

    /// Atomically persists a new replicate configuration together with the
    /// replicating tasks derived from it.
    async fn save_replicate_configuration(
        &self,
        config: ReplicateConfiguration,
        tasks: Vec<ReplicatingTask>,
    ) -> Result<()>;
}
