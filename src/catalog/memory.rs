// src/catalog/memory.rs

//! `InMemoryCatalog`: a reference [`MetadataCatalog`] implementation backed
//! by `parking_lot`-guarded in-memory maps. Used by the manager's own tests
//! and as a template for a real transactional-KV-store-backed adapter.
//!
//! It can optionally be wired to fail the next N writes, which is how the
//! persist-failure-rollback scenario is exercised without a real backing
//! store.

use crate::catalog::{
    ControlChannelMeta, MetadataCatalog, ReplicateConfigurationRecord, ReplicatingTask,
    StreamingVersion,
};
use crate::error::{CoordinatorError, Result};
use crate::pchannel::PChannelMeta;
use crate::replication::ReplicateConfiguration;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Default)]
struct Inner {
    version: Option<StreamingVersion>,
    pchannels: HashMap<String, PChannelMeta>,
    cchannel: Option<ControlChannelMeta>,
    replicate: Option<ReplicateConfigurationRecord>,
}

/// An in-process `MetadataCatalog`. Not durable across process restarts;
/// appropriate for tests, or as scaffolding before wiring in a real
/// transactional KV store.
pub struct InMemoryCatalog {
    inner: Mutex<Inner>,
    fail_next_writes: AtomicU32,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            fail_next_writes: AtomicU32::new(0),
        }
    }

    /// Seeds the catalog with a control-channel marker, as if it had been
    /// persisted by an earlier process.
    pub fn with_cchannel(self, name: impl Into<String>) -> Self {
        self.inner.lock().cchannel = Some(ControlChannelMeta {
            pchannel_name: name.into(),
        });
        self
    }

    /// Seeds the catalog with already-persisted PChannel records.
    pub fn with_pchannels(self, metas: Vec<PChannelMeta>) -> Self {
        let mut inner = self.inner.lock();
        for meta in metas {
            inner.pchannels.insert(meta.name.clone(), meta);
        }
        drop(inner);
        self
    }

    /// Makes the next `count` write operations (`save_pchannels`,
    /// `save_version`, `save_replicate_configuration`) fail with
    /// [`CoordinatorError::Catalog`], to exercise rollback behavior.
    pub fn fail_next_writes(&self, count: u32) {
        self.fail_next_writes.store(count, Ordering::SeqCst);
    }

    fn take_failure(&self) -> Result<()> {
        loop {
            let current = self.fail_next_writes.load(Ordering::SeqCst);
            if current == 0 {
                return Ok(());
            }
            if self
                .fail_next_writes
                .compare_exchange(current, current - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Err(CoordinatorError::Catalog(
                    "injected catalog failure".to_string(),
                ));
            }
        }
    }
}

#[async_trait]
impl MetadataCatalog for InMemoryCatalog {
    async fn get_version(&self) -> Result<Option<StreamingVersion>> {
        Ok(self.inner.lock().version)
    }

    async fn save_version(&self, version: StreamingVersion) -> Result<()> {
        self.take_failure()?;
        self.inner.lock().version = Some(version);
        Ok(())
    }

    async fn list_pchannel(&self) -> Result<Vec<PChannelMeta>> {
        Ok(self.inner.lock().pchannels.values().cloned().collect())
    }

    async fn save_pchannels(&self, metas: Vec<PChannelMeta>) -> Result<()> {
        self.take_failure()?;
        let mut inner = self.inner.lock();
        for meta in metas {
            inner.pchannels.insert(meta.name.clone(), meta);
        }
        Ok(())
    }

    async fn get_cchannel(&self) -> Result<Option<ControlChannelMeta>> {
        Ok(self.inner.lock().cchannel.clone())
    }

    async fn get_replicate_configuration(&self) -> Result<Option<ReplicateConfigurationRecord>> {
        Ok(self.inner.lock().replicate.clone())
    }

    async fn save_replicate_configuration(
        &self,
        config: ReplicateConfiguration,
        tasks: Vec<ReplicatingTask>,
    ) -> Result<()> {
        self.take_failure()?;
        self.inner.lock().replicate = Some(ReplicateConfigurationRecord {
            configuration: config,
            tasks,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pchannel::AccessMode;

    #[tokio::test]
    async fn save_and_list_round_trips() {
        let catalog = InMemoryCatalog::new();
        let meta = PChannelMeta::new("ch1", AccessMode::Rw);
        catalog.save_pchannels(vec![meta.clone()]).await.unwrap();
        let listed = catalog.list_pchannel().await.unwrap();
        assert_eq!(listed, vec![meta]);
    }

    #[tokio::test]
    async fn injected_failure_surfaces_once() {
        let catalog = InMemoryCatalog::new();
        catalog.fail_next_writes(1);
        let meta = PChannelMeta::new("ch1", AccessMode::Rw);
        assert!(catalog.save_pchannels(vec![meta.clone()]).await.is_err());
        assert!(catalog.save_pchannels(vec![meta]).await.is_ok());
    }
}
