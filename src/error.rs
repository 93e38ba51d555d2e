// src/error.rs

//! Defines the primary error type returned by every public operation of the
//! coordinator.

use thiserror::Error;

/// The error type shared by every fallible operation on the coordinator.
///
/// Using `thiserror` keeps the mapping from the abstract error taxonomy in
/// the external-interfaces section to concrete Rust variants mechanical and
/// lets callers `match` on the taxonomy instead of string-sniffing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinatorError {
    #[error("channel does not exist: {0}")]
    ChannelNotExist(String),

    #[error("replication configuration invalid: {0}")]
    ReplicationConfigInvalid(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("allocation shortfall: requested {requested} vchannels but only {available} eligible pchannels")]
    AllocationShortfall { requested: usize, available: usize },

    #[error("manager already registered")]
    AlreadyRegistered,
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
