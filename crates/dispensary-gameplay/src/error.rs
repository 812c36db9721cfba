//! Error types for NPC population operations.
//!
//! Only caller-visible refusals live here. Mapping gaps, failed resource
//! claims and integrity repairs are logged and resolved by fallback instead.

use dispensary_common::{ActorHandle, DispensaryError, NpcId};
use thiserror::Error;

use crate::state::{CheapState, RichState};

/// Error types for NPC operations.
#[derive(Debug, Error)]
pub enum NpcError {
    /// No record with this id
    #[error("NPC not found: {0}")]
    NotFound(NpcId),
    /// A record with this id already exists
    #[error("NPC already registered: {0}")]
    AlreadyRegistered(NpcId),
    /// Activation requested for a record that already owns an actor
    #[error("NPC already active: {0}")]
    AlreadyActive(NpcId),
    /// Deactivation requested for a record without an actor
    #[error("NPC not active: {0}")]
    NotActive(NpcId),
    /// The actor's current state may not be interrupted; retry later
    #[error("NPC {id} is in non-interruptible state {state}")]
    NotInterruptible {
        /// Record id
        id: NpcId,
        /// Blocking rich state
        state: RichState,
    },
    /// The record's actor handle no longer resolves in the pool
    #[error("Actor {handle} for NPC {id} is missing from the pool")]
    ActorMissing {
        /// Record id
        id: NpcId,
        /// Dangling handle
        handle: ActorHandle,
    },
    /// The actor pool refused to spawn
    #[error("No actor available to activate NPC {0}")]
    PoolExhausted(NpcId),
    /// A cheap state reachable from the rich side has no way back
    #[error("Cheap state {0} has no rich mapping")]
    AsymmetricMapping(CheapState),
    /// Referenced path does not exist
    #[error("Unknown path: {0}")]
    UnknownPath(String),
    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// Persistence or IO failure
    #[error(transparent)]
    Persistence(#[from] DispensaryError),
}

impl From<serde_json::Error> for NpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(DispensaryError::from(err))
    }
}

/// Result type for NPC operations.
pub type NpcResult<T> = Result<T, NpcError>;
