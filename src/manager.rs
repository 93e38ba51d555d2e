// src/manager.rs

//! `ChannelManager`: the core. Owns the authoritative
//! in-memory channel registry, serializes every mutation through one lock,
//! persists each transition via the catalog before it becomes visible, and
//! publishes committed snapshots to watchers.
//!
//! The mutation lock is a `tokio::sync::Mutex`, not `parking_lot`: every
//! mutating operation holds it across an `.await` on the catalog, which
//! `parking_lot::MutexGuard` cannot survive. Reads that don't need to
//! observe a mutation in flight take the same lock briefly and release it
//! before returning. There is no separate fast-path reader lock, since the
//! registry is small and catalog calls dominate any contention this would
//! save.

use crate::catalog::{MetadataCatalog, StreamingVersion};
use crate::error::{CoordinatorError, Result};
use crate::pchannel::{self, AccessMode, NodeId, PChannelMeta};
use crate::provider::ChannelProvider;
use crate::replication::{
    available_in_replication, replicating_tasks_for, ReplicateConfiguration,
    ReplicateConfigurationBroadcast, ReplicationRole,
};
use crate::view::{AssignmentSnapshot, ClusterChannelsView, ClusterView};
use crate::watch::{AssignmentPublisher, AssignmentWatch};
use crate::{allocator, replication};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Input to [`ChannelManager::assign_pchannels`]. `term` mirrors the
/// source system's `PChannelInfoAssigned` shape but is not validated:
/// `PChannelMeta::try_assign_to_server_id` always transitions from the
/// channel's actual current term, never the caller's claimed one.
#[derive(Debug, Clone, Copy)]
pub struct PChannelAssignRequest {
    pub term: i64,
    pub access_mode: AccessMode,
    pub node: NodeId,
}

struct ManagerInner {
    channels: HashMap<String, PChannelMeta>,
    epoch: u64,
    streaming_enabled: bool,
    control_channel: Option<String>,
    replicate_configuration: ReplicateConfiguration,
    replicating_tasks: Vec<crate::catalog::ReplicatingTask>,
}

pub struct ChannelManager {
    local_cluster_id: String,
    catalog: Arc<dyn MetadataCatalog>,
    inner: Mutex<ManagerInner>,
    publisher: AssignmentPublisher,
    streaming_notify: Notify,
}

fn default_access_mode(streaming_enabled: bool) -> AccessMode {
    if streaming_enabled {
        AccessMode::Rw
    } else {
        AccessMode::Ro
    }
}

impl ChannelManager {
    /// Recovers manager state from the catalog plus the provider's initial
    /// channel set. Fails, with no partial state retained, if any catalog
    /// read (or the persist of newly-discovered initial channels) fails.
    /// Does not register into the process-wide singleton; see
    /// [`ChannelManager::recover_and_register`].
    pub async fn recover(
        local_cluster_id: impl Into<String>,
        catalog: Arc<dyn MetadataCatalog>,
        provider: &dyn ChannelProvider,
    ) -> Result<Arc<ChannelManager>> {
        let local_cluster_id = local_cluster_id.into();

        let streaming_enabled = catalog.get_version().await?.is_some();
        let persisted = catalog.list_pchannel().await?;
        let cchannel = catalog.get_cchannel().await?;
        let replicate_record = catalog.get_replicate_configuration().await?;
        let (replicate_configuration, replicating_tasks) = match replicate_record {
            Some(record) => (record.configuration, record.tasks),
            None => (ReplicateConfiguration::default(), Vec::new()),
        };

        let mut channels: HashMap<String, PChannelMeta> = HashMap::new();
        for mut meta in persisted {
            meta.available_in_replication =
                available_in_replication(&local_cluster_id, &meta.name, &replicate_configuration);
            channels.insert(meta.name.clone(), meta);
        }

        let initial_from_provider = provider.initial_channels().await?;
        let mut newly_created = Vec::new();
        for name in &initial_from_provider {
            if channels.contains_key(name) {
                continue;
            }
            let mut meta = PChannelMeta::new(name.clone(), default_access_mode(streaming_enabled));
            meta.available_in_replication =
                available_in_replication(&local_cluster_id, name, &replicate_configuration);
            newly_created.push(meta);
        }
        if !newly_created.is_empty() {
            catalog.save_pchannels(newly_created.clone()).await?;
            for meta in newly_created {
                channels.insert(meta.name.clone(), meta);
            }
        }

        pchannel::stats::global().recover(channels.keys().cloned().collect::<Vec<_>>());

        let replicate_configuration_for_snapshot = replicate_configuration.clone();
        let initial_snapshot = AssignmentSnapshot {
            view: ClusterView {
                channels: channels.clone(),
                epoch: 0,
            },
            replicate_configuration: replicate_configuration_for_snapshot,
        };
        let (publisher, _initial_watch) = AssignmentPublisher::new(initial_snapshot);

        info!(
            cluster = %local_cluster_id,
            channel_count = channels.len(),
            streaming_enabled,
            "channel manager recovered"
        );

        Ok(Arc::new(ChannelManager {
            local_cluster_id,
            catalog,
            inner: Mutex::new(ManagerInner {
                channels,
                epoch: 0,
                streaming_enabled,
                control_channel: cchannel.map(|c| c.pchannel_name),
                replicate_configuration,
                replicating_tasks,
            }),
            publisher,
            streaming_notify: Notify::new(),
        }))
    }

    /// Recovers, then registers the result into the process-wide singleton
    /// Intended for the one production call site per process;
    /// tests generally use [`ChannelManager::recover`] directly so that
    /// multiple independent managers can coexist within one test binary.
    pub async fn recover_and_register(
        local_cluster_id: impl Into<String>,
        catalog: Arc<dyn MetadataCatalog>,
        provider: &dyn ChannelProvider,
    ) -> Result<Arc<ChannelManager>> {
        let manager = Self::recover(local_cluster_id, catalog, provider).await?;
        crate::singleton::register(manager.clone())?;
        Ok(manager)
    }

    fn snapshot_locked(&self, inner: &ManagerInner) -> AssignmentSnapshot {
        AssignmentSnapshot {
            view: ClusterView {
                channels: inner.channels.clone(),
                epoch: inner.epoch,
            },
            replicate_configuration: inner.replicate_configuration.clone(),
        }
    }

    /// Adds any names not already in the registry. Idempotent
    /// on already-known names. On catalog failure the registry is left
    /// exactly as it was. New metas are only constructed, never inserted,
    /// until persistence succeeds.
    pub async fn add_pchannels(&self, names: Vec<String>) -> Result<()> {
        let mut inner = self.inner.lock().await;

        let mut created = Vec::new();
        for name in names {
            if inner.channels.contains_key(&name) {
                continue;
            }
            let mut meta = PChannelMeta::new(name.clone(), default_access_mode(inner.streaming_enabled));
            meta.available_in_replication =
                available_in_replication(&self.local_cluster_id, &name, &inner.replicate_configuration);
            created.push(meta);
        }
        if created.is_empty() {
            return Ok(());
        }

        self.catalog.save_pchannels(created.clone()).await?;

        let names_for_stats: Vec<String> = created.iter().map(|m| m.name.clone()).collect();
        for meta in created {
            inner.channels.insert(meta.name.clone(), meta);
        }
        inner.epoch += 1;
        let snapshot = self.snapshot_locked(&inner);
        drop(inner);

        pchannel::stats::global().recover(names_for_stats);
        self.publisher.publish(snapshot);
        Ok(())
    }

    /// Attempts to assign each requested channel to its requested node.
    /// Entries whose transition is a no-op ("same-node reassignment")
    /// are silently excluded from both persistence and the returned list.
    /// Any unknown channel fails the whole call before anything mutates.
    pub async fn assign_pchannels(
        &self,
        requests: HashMap<String, PChannelAssignRequest>,
    ) -> Result<Vec<String>> {
        let mut inner = self.inner.lock().await;

        for name in requests.keys() {
            if !inner.channels.contains_key(name) {
                return Err(CoordinatorError::ChannelNotExist(name.clone()));
            }
        }

        let mut modified = Vec::new();
        let mut to_persist = Vec::new();
        for (name, request) in &requests {
            let mut clone = inner.channels[name].clone();
            if clone.try_assign_to_server_id(request.access_mode, request.node) {
                modified.push(name.clone());
                to_persist.push(clone);
            }
        }
        if to_persist.is_empty() {
            return Ok(Vec::new());
        }

        self.catalog.save_pchannels(to_persist.clone()).await?;

        for meta in to_persist {
            inner.channels.insert(meta.name.clone(), meta);
        }
        inner.epoch += 1;
        let snapshot = self.snapshot_locked(&inner);
        drop(inner);

        self.publisher.publish(snapshot);
        modified.sort();
        Ok(modified)
    }

    /// Confirms in-flight assignments, transitioning to `ASSIGNED` and
    /// clearing superseded history entries.
    pub async fn assign_pchannels_done(&self, names: Vec<String>) -> Result<()> {
        let mut inner = self.inner.lock().await;

        for name in &names {
            if !inner.channels.contains_key(name) {
                return Err(CoordinatorError::ChannelNotExist(name.clone()));
            }
        }
        if names.is_empty() {
            return Ok(());
        }

        let mut to_persist = Vec::with_capacity(names.len());
        for name in &names {
            let mut clone = inner.channels[name].clone();
            clone.assign_to_server_done();
            to_persist.push(clone);
        }

        self.catalog.save_pchannels(to_persist.clone()).await?;

        for meta in to_persist {
            inner.channels.insert(meta.name.clone(), meta);
        }
        inner.epoch += 1;
        let snapshot = self.snapshot_locked(&inner);
        drop(inner);

        self.publisher.publish(snapshot);
        Ok(())
    }

    /// Marks each `(name, term)` entry unavailable unless its term is stale,
    /// in which case that entry is silently skipped.
    pub async fn mark_as_unavailable(&self, entries: Vec<(String, i64)>) -> Result<()> {
        let mut inner = self.inner.lock().await;

        for (name, _) in &entries {
            if !inner.channels.contains_key(name) {
                return Err(CoordinatorError::ChannelNotExist(name.clone()));
            }
        }

        let mut to_persist = Vec::new();
        for (name, term) in &entries {
            let mut clone = inner.channels[name].clone();
            let state_before = clone.state;
            clone.mark_as_unavailable(*term);
            if clone.state != state_before {
                to_persist.push(clone);
            }
        }
        if to_persist.is_empty() {
            return Ok(());
        }

        self.catalog.save_pchannels(to_persist.clone()).await?;

        for meta in to_persist {
            inner.channels.insert(meta.name.clone(), meta);
        }
        inner.epoch += 1;
        let snapshot = self.snapshot_locked(&inner);
        drop(inner);

        self.publisher.publish(snapshot);
        Ok(())
    }

    /// Allocates `num` VChannel names for `collection_id`, drawn from
    /// replication-eligible PChannels in ascending load order. Performs no
    /// persistence and does not itself update the stats registry. That
    /// remains the responsibility of the external streaming paths that
    /// actually place the new VChannels.
    pub async fn alloc_virtual_channels(&self, collection_id: i64, num: usize) -> Result<Vec<String>> {
        let eligible: Vec<String> = {
            let inner = self.inner.lock().await;
            inner
                .channels
                .values()
                .filter(|meta| meta.available_in_replication)
                .map(|meta| meta.name.clone())
                .collect()
        };
        let ordered = pchannel::stats::global().snapshot_for(&eligible);
        allocator::allocate_vchannels(&ordered, collection_id, num)
    }

    /// Returns `(node, true)` if `pchannel_name` is currently `ASSIGNED`,
    /// else `(NodeId::NONE, false)`.
    pub async fn get_latest_wal_located(&self, pchannel_name: &str) -> (NodeId, bool) {
        let inner = self.inner.lock().await;
        match inner.channels.get(pchannel_name) {
            Some(meta) if meta.is_assigned() => (meta.node, true),
            _ => (NodeId::NONE, false),
        }
    }

    /// A point-in-time snapshot of every known channel plus the local epoch.
    pub async fn current_pchannels_view(&self) -> ClusterView {
        let inner = self.inner.lock().await;
        ClusterView {
            channels: inner.channels.clone(),
            epoch: inner.epoch,
        }
    }

    /// As [`ChannelManager::current_pchannels_view`], plus the replication
    /// configuration presently in effect.
    pub async fn get_latest_channel_assignment(&self) -> AssignmentSnapshot {
        let inner = self.inner.lock().await;
        self.snapshot_locked(&inner)
    }

    /// The control-channel marker plus every channel assignment, filtered to
    /// replication-available channels unless `include_unavailable_in_replication`.
    pub async fn get_cluster_channels(&self, include_unavailable_in_replication: bool) -> ClusterChannelsView {
        let inner = self.inner.lock().await;
        let channels = inner
            .channels
            .values()
            .filter(|meta| include_unavailable_in_replication || meta.available_in_replication)
            .map(|meta| meta.current_assignment())
            .collect();
        ClusterChannelsView {
            control_channel: inner.control_channel.clone(),
            channels,
        }
    }

    /// Subscribes a new [`AssignmentWatch`], independent of any single
    /// `watch_assignment_result` call's lifetime.
    pub fn subscribe_assignment_watch(&self) -> AssignmentWatch {
        self.publisher.subscribe()
    }

    /// Runs `callback` with the current snapshot, then again on every
    /// subsequent epoch bump, until `cancel` fires.
    pub async fn watch_assignment_result<F>(&self, cancel: CancellationToken, callback: F) -> Result<()>
    where
        F: FnMut(&AssignmentSnapshot) + Send,
    {
        self.subscribe_assignment_watch().watch(cancel, callback).await
    }

    /// Whether streaming has ever been enabled on this cluster, without
    /// waiting.
    pub async fn is_streaming_enabled_once(&self) -> bool {
        self.inner.lock().await.streaming_enabled
    }

    /// Resolves once streaming has been enabled, immediately if it already
    /// has been. Registering the wait before checking the flag (rather than
    /// after) avoids missing a transition that happens in between. The
    /// transition fires its notification exactly once, ever.
    pub async fn register_streaming_enabled_notifier(&self, cancel: CancellationToken) -> Result<()> {
        loop {
            let notified = self.streaming_notify.notified();
            if self.is_streaming_enabled_once().await {
                return Ok(());
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CoordinatorError::Cancelled),
                _ = notified => {}
            }
        }
    }

    /// Idempotently records that streaming has been enabled. On the
    /// transition from never-enabled, wakes every registered notifier.
    pub async fn mark_streaming_has_enabled(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.streaming_enabled {
            return Ok(());
        }
        self.catalog.save_version(StreamingVersion { version: 1 }).await?;
        inner.streaming_enabled = true;
        drop(inner);
        self.streaming_notify.notify_waiters();
        Ok(())
    }

    /// This process's role under the currently effective replication
    /// configuration.
    pub async fn replication_role(&self) -> ReplicationRole {
        let inner = self.inner.lock().await;
        replication::role(&self.local_cluster_id, &inner.replicate_configuration)
    }

    /// Applies a replicate-configuration update. Persists
    /// unconditionally, including the no-op case where the proposed
    /// configuration is unchanged, but bumps the epoch and notifies
    /// watchers only when the configuration actually changes.
    pub async fn update_replicate_configuration(
        &self,
        broadcast: ReplicateConfigurationBroadcast,
    ) -> Result<()> {
        broadcast.configuration.validate()?;
        let mut inner = self.inner.lock().await;

        let config_changed = inner.replicate_configuration != broadcast.configuration;
        let new_tasks = replicating_tasks_for(&self.local_cluster_id, &broadcast, &inner.replicating_tasks);
        let mut all_tasks = inner.replicating_tasks.clone();
        all_tasks.extend(new_tasks);

        self.catalog
            .save_replicate_configuration(broadcast.configuration.clone(), all_tasks.clone())
            .await?;

        if config_changed {
            for meta in inner.channels.values_mut() {
                meta.available_in_replication =
                    available_in_replication(&self.local_cluster_id, &meta.name, &broadcast.configuration);
            }
        }
        inner.replicate_configuration = broadcast.configuration;
        inner.replicating_tasks = all_tasks;

        if config_changed {
            inner.epoch += 1;
            let snapshot = self.snapshot_locked(&inner);
            drop(inner);
            self.publisher.publish(snapshot);
        }
        Ok(())
    }

    /// Drains `provider` until it closes or `cancel` fires, folding each
    /// batch of newly-discovered names into the registry via
    /// [`ChannelManager::add_pchannels`]. A batch that fails to persist is
    /// logged and skipped rather than ending the loop. A transient catalog
    /// failure should not permanently stop ingestion of later batches.
    pub async fn run_provider_ingestion(self: Arc<Self>, provider: Arc<dyn ChannelProvider>, cancel: CancellationToken) {
        loop {
            let batch = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                batch = provider.next_incoming() => batch,
            };
            match batch {
                Some(names) => {
                    if let Err(err) = self.add_pchannels(names).await {
                        warn!(error = %err, "failed to ingest dynamically discovered pchannels");
                    }
                }
                None => return,
            }
        }
    }
}
