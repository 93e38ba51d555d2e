// src/singleton.rs

//! Process-global, one-shot exposure of the [`ChannelManager`].
//!
//! The manager is registered exactly once, at recovery; callers that ask for
//! it before registration block until it exists. This mirrors the
//! `Notify`-style one-shot signaling used elsewhere in this codebase for
//! single-fire readiness handoffs, rather than replicating the channel
//! registry itself.

use crate::error::{CoordinatorError, Result};
use crate::manager::ChannelManager;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

struct Registry {
    manager: Mutex<Option<Arc<ChannelManager>>>,
    notify: Notify,
}

static REGISTRY: Lazy<Registry> = Lazy::new(|| Registry {
    manager: Mutex::new(None),
    notify: Notify::new(),
});

/// Registers the process-wide manager. Fails if a manager is already
/// registered: recovery happens exactly once per process.
pub fn register(manager: Arc<ChannelManager>) -> Result<()> {
    let mut slot = REGISTRY.manager.lock();
    if slot.is_some() {
        return Err(CoordinatorError::AlreadyRegistered);
    }
    *slot = Some(manager);
    drop(slot);
    REGISTRY.notify.notify_waiters();
    Ok(())
}

/// Returns the process-wide manager, blocking until [`register`] has been
/// called.
pub async fn get() -> Arc<ChannelManager> {
    loop {
        let notified = REGISTRY.notify.notified();
        if let Some(manager) = REGISTRY.manager.lock().clone() {
            return manager;
        }
        notified.await;
    }
}

/// Returns the process-wide manager if already registered, without waiting.
pub fn try_get() -> Option<Arc<ChannelManager>> {
    REGISTRY.manager.lock().clone()
}

#[cfg(test)]
pub(crate) fn reset_for_test() {
    *REGISTRY.manager.lock() = None;
}
