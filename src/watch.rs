// src/watch.rs

//! Publish/subscribe delivery of assignment snapshots to external consumers
//! on each local-epoch bump.
//!
//! Built directly on `tokio::sync::watch`, whose single-slot-latest-value
//! semantics are exactly the needed contract: at-least-one notification per
//! observed epoch increase, coalescing of missed intermediate epochs
//! allowed, and a callback that never sees a snapshot older than one it
//! already received. No custom fan-out broadcaster is needed: this is the
//! same choice made elsewhere in this codebase for single-value state
//! signals like a replication offset receiver.

use crate::error::{CoordinatorError, Result};
use crate::view::AssignmentSnapshot;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The publishing half, held by [`crate::manager::ChannelManager`].
#[derive(Debug, Clone)]
pub struct AssignmentPublisher {
    tx: watch::Sender<AssignmentSnapshot>,
}

impl AssignmentPublisher {
    pub fn new(initial: AssignmentSnapshot) -> (Self, AssignmentWatch) {
        let (tx, rx) = watch::channel(initial);
        (Self { tx }, AssignmentWatch { rx })
    }

    /// Publishes a new snapshot. Never fails even with zero subscribers;
    /// watchers that subscribe later still observe this as their first
    /// value.
    pub fn publish(&self, snapshot: AssignmentSnapshot) {
        // `send` only errors when every receiver (including the one this
        // sender was constructed with) has been dropped, which cannot
        // happen here since `ChannelManager` retains one permanently.
        let _ = self.tx.send(snapshot);
    }

    /// Creates a new subscriber observing every snapshot published from now
    /// on (plus the current one, on first poll).
    pub fn subscribe(&self) -> AssignmentWatch {
        AssignmentWatch {
            rx: self.tx.subscribe(),
        }
    }
}

/// The subscribing half. Each call to [`AssignmentWatch::watch`] drives one
/// long-running consumer loop.
pub struct AssignmentWatch {
    rx: watch::Receiver<AssignmentSnapshot>,
}

impl AssignmentWatch {
    /// Runs `callback` once immediately with the latest snapshot, then once
    /// more for every subsequent distinct snapshot, until `cancel` fires.
    /// Intermediate snapshots may be coalesced if the callback falls behind.
    /// `watch::Receiver::changed` guarantees the next value observed is
    /// never older than the last.
    pub async fn watch<F>(&mut self, cancel: CancellationToken, mut callback: F) -> Result<()>
    where
        F: FnMut(&AssignmentSnapshot) + Send,
    {
        callback(&self.rx.borrow_and_update());
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CoordinatorError::Cancelled),
                changed = self.rx.changed() => {
                    match changed {
                        Ok(()) => callback(&self.rx.borrow_and_update()),
                        Err(_) => {
                            debug!("assignment publisher dropped; ending watch");
                            return Err(CoordinatorError::Cancelled);
                        }
                    }
                }
            }
        }
    }
}
