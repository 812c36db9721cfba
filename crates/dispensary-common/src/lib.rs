//! # Dispensary Common
//!
//! Common types, utilities, and shared abstractions for Dispensary.
//!
//! This crate provides foundational types used by the NPC population layer:
//! - ID types (NpcId, ActorHandle, ProfileRef)
//! - Floor-plane geometry (Vec2, Rect, stepping helpers)
//! - Version information for save schemas
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod geometry;
pub mod ids;
pub mod version;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::geometry::*;
    pub use crate::ids::*;
    pub use crate::version::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_npc_id_roundtrip_json() {
        let id = NpcId::new("regular-07");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"regular-07\"");
        assert!(id.is_valid());
        assert!(!NpcId::new("").is_valid());
    }

    #[test]
    fn test_actor_handle_identity() {
        let a = ActorHandle::new(3, 1);
        let b = ActorHandle::new(3, 2);
        assert_ne!(a, b);
        assert_eq!(a.index(), b.index());
    }

    #[test]
    fn test_version_compatibility() {
        let v1 = SchemaVersion::new(1, 0, 0);
        let v2 = SchemaVersion::new(1, 1, 0);
        let v3 = SchemaVersion::new(2, 0, 0);

        assert!(v2.is_compatible_with(&v1));
        assert!(!v1.is_compatible_with(&v3));
        assert!(SchemaVersion::POPULATION_SAVE.can_read(&v1));
    }
}
