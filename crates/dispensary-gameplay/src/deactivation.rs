//! Rich → cheap conversion.
//!
//! Runs while the actor still exists: in-flight path progress is snapshotted
//! from the actor before it is recycled, then the cheap state's `on_enter`
//! runs inline because no later tick will signal the switch.

use tracing::debug;

use crate::actor::RichActor;
use crate::handlers::{BasicStateHandlerSet, SimContext};
use crate::mapping::StateMappingTable;
use crate::record::NpcRecord;
use crate::state::{CheapState, RichState, StateTag};

/// Resolves the cheap state for a record whose actor is being torn down.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeactivationTransitionResolver;

impl DeactivationTransitionResolver {
    /// Writes the actor's state back into `record` and returns the cheap tag.
    ///
    /// Never fails: unmapped rich states fall back to the default cheap tag.
    /// The caller checks interruptibility and releases the actor afterwards.
    pub fn resolve(
        &self,
        record: &mut NpcRecord,
        actor: &mut RichActor,
        mapping: &StateMappingTable,
        handlers: &BasicStateHandlerSet,
        ctx: &mut SimContext<'_>,
    ) -> CheapState {
        let mut cheap = mapping.to_cheap(actor.state());

        if let Some(interrupted) = actor.take_interrupted_path() {
            debug!(
                "NPC {} deactivated mid-interruption, saving path {} at {}",
                record.id(),
                interrupted.path_id,
                interrupted.waypoint_index
            );
            record.simulated_path = Some(interrupted);
            cheap = CheapState::PathFollow;
        } else if let (RichState::FollowPath, Some(live)) = (actor.state(), actor.live_path()) {
            record.simulated_path = Some(live.clone());
        } else {
            record.clear_path_scratch();
        }

        record.set_pose(actor.position(), actor.rotation());
        record.clear_movement_scratch();
        record.set_state(Some(StateTag::Cheap(cheap)));

        let resolved = handlers.enter_now(record, ctx).unwrap_or(cheap);
        debug!(
            "NPC {} deactivated from {} into {resolved}",
            record.id(),
            actor.state()
        );
        resolved
    }
}
