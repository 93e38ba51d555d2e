// src/provider.rs

//! An external source of PChannel names, fed to the manager at recovery and
//! afterwards as a lazy stream of dynamically discovered names.
//!
//! Modeled as an `#[async_trait]` trait, the same shape used for
//! dyn-dispatched command traits elsewhere in this codebase. This decouples
//! the manager from any particular configuration-watching mechanism (etcd
//! watch, CRD controller, static file). The manager depends only on this
//! trait.

use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A source of PChannel names, external to the coordinator.
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    /// Returns the full set of PChannel names known at manager-recovery
    /// time. Called exactly once, during [`crate::manager::ChannelManager::recover`].
    async fn initial_channels(&self) -> Result<Vec<String>>;

    /// Returns the next batch of newly-discovered channel names not
    /// previously reported by either `initial_channels` or a prior call to
    /// this method. Deduplication across calls is this provider's
    /// responsibility. Returns `None` once the provider has been closed and
    /// its stream drained.
    async fn next_incoming(&self) -> Option<Vec<String>>;

    /// Idempotently closes the provider. Must not deadlock even if nothing
    /// is calling `next_incoming`, and must unblock any producer currently
    /// blocked trying to send into the incoming stream.
    fn close(&self);
}

/// A `ChannelProvider` over a fixed initial set plus an externally-fed
/// `mpsc` channel of subsequent batches. The reference implementation used
/// by tests and a reasonable starting point for a real implementation
/// backed by a configuration watcher.
pub struct StaticChannelProvider {
    initial: Vec<String>,
    incoming_rx: tokio::sync::Mutex<mpsc::Receiver<Vec<String>>>,
    cancel: CancellationToken,
}

impl StaticChannelProvider {
    /// Builds a provider with a fixed `initial` set. Returns the provider
    /// alongside an [`IncomingChannelSender`] that test/production code uses
    /// to push newly discovered channel names; dropping the sender (or
    /// calling [`ChannelProvider::close`]) ends the incoming stream.
    pub fn new(initial: Vec<String>, capacity: usize) -> (Self, IncomingChannelSender) {
        let (tx, rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();
        let provider = Self {
            initial,
            incoming_rx: tokio::sync::Mutex::new(rx),
            cancel: cancel.clone(),
        };
        (provider, IncomingChannelSender { tx, cancel })
    }
}

#[async_trait]
impl ChannelProvider for StaticChannelProvider {
    async fn initial_channels(&self) -> Result<Vec<String>> {
        Ok(self.initial.clone())
    }

    async fn next_incoming(&self) -> Option<Vec<String>> {
        let mut rx = self.incoming_rx.lock().await;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            batch = rx.recv() => batch,
        }
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

/// The producer half paired with a [`StaticChannelProvider`].
#[derive(Clone)]
pub struct IncomingChannelSender {
    tx: mpsc::Sender<Vec<String>>,
    cancel: CancellationToken,
}

impl IncomingChannelSender {
    /// Sends a batch of newly-discovered names. Abandons the send rather
    /// than blocking forever if the provider is closed while this call is
    /// in flight.
    pub async fn send(&self, names: Vec<String>) {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {}
            _ = self.tx.send(names) => {}
        }
    }
}
