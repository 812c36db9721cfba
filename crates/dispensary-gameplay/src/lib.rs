//! # Dispensary Gameplay
//!
//! NPC population layer for the Dispensary store.
//!
//! Every NPC is a persistent [`NpcRecord`]. Near the player a record is
//! driven by a full [`RichActor`]; everywhere else a round-robin
//! [`SimulationScheduler`] advances it with cheap handlers. This crate
//! provides:
//! - Rich and cheap state sets and the mapping between them
//! - Record registry, spatial grid and load-priority persistence
//! - Cheap state handlers and the batched scheduler
//! - Rich actors, the actor pool and validated navigation
//! - Shared store resources (queues, counter, register)
//! - Activation/deactivation resolvers and the population director
//! - Event bus for population changes

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod activation;
pub mod actor;
pub mod config;
pub mod deactivation;
pub mod director;
pub mod error;
pub mod events;
pub mod handlers;
pub mod mapping;
pub mod navigation;
pub mod paths;
pub mod persistence;
pub mod pool;
pub mod record;
pub mod registry;
pub mod resources;
pub mod scheduler;
pub mod shopping;
pub mod spatial;
pub mod state;
pub mod time;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::activation::*;
    pub use crate::actor::*;
    pub use crate::config::*;
    pub use crate::deactivation::*;
    pub use crate::director::*;
    pub use crate::error::*;
    pub use crate::events::*;
    pub use crate::handlers::*;
    pub use crate::mapping::*;
    pub use crate::navigation::*;
    pub use crate::paths::*;
    pub use crate::persistence::*;
    pub use crate::pool::*;
    pub use crate::record::*;
    pub use crate::registry::*;
    pub use crate::resources::*;
    pub use crate::scheduler::*;
    pub use crate::shopping::*;
    pub use crate::spatial::*;
    pub use crate::state::*;
    pub use crate::time::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use dispensary_common::Vec2;

    #[test]
    fn test_every_cheap_state_has_a_handler() {
        let handlers = BasicStateHandlerSet::standard();
        for state in CheapState::ALL {
            assert!(handlers.contains(state), "{state} has no handler");
        }
    }

    #[test]
    fn test_standard_mapping_is_symmetric() {
        assert!(StateMappingTable::standard().validate().is_ok());
    }

    #[test]
    fn test_record_defaults_dormant() {
        let record = NpcRecord::new("regular-01", Vec2::new(3.0, 4.0));
        assert!(!record.is_active());
        assert_eq!(record.cheap_state(), Some(CheapState::IdleAtHome));
        assert_eq!(record.position(), record.home_position());
    }
}
