//! ID types for NPC identities and pooled actors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a persistent NPC.
///
/// Assigned once when the NPC is created and never changed afterwards. The
/// same id survives every activation, deactivation, save and load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NpcId(String);

impl NpcId {
    /// Creates an NPC id from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks if this id is usable (non-empty).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
    }
}

impl fmt::Display for NpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NpcId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NpcId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Handle to a pooled rich actor.
///
/// The generation is bumped every time a pool slot is recycled, so a stale
/// handle kept past recycling never resolves to the slot's next occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorHandle {
    index: u32,
    generation: u32,
}

impl ActorHandle {
    /// Creates a handle from a slot index and generation.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns the pool slot index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the slot generation this handle was issued for.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ActorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}v{}", self.index, self.generation)
    }
}

/// Opaque reference to the asset or profile used to materialize a rich actor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ProfileRef(String);

impl ProfileRef {
    /// Creates a profile reference.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the raw reference string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
