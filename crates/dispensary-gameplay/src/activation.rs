//! Cheap → rich conversion.
//!
//! The mapping table only knows a canonical rich entry state per cheap tag,
//! so activation re-derives the precise state from live resource occupancy.
//! Every acquisition may fail; failure sends the NPC to
//! [`RichState::Exiting`], which always admits.

use dispensary_common::ActorHandle;
use tracing::debug;

use crate::mapping::StateMappingTable;
use crate::navigation::Navigation;
use crate::paths::PathRegistry;
use crate::record::{NpcRecord, PathProgress};
use crate::resources::{Assignment, ResourceHub, ResourceKind, ResourceManager};
use crate::shopping::{BrowseDestination, ShoppingLocationProvider};
use crate::state::{CheapState, RichState, StateTag};
use crate::time::GameClock;

/// Collaborators consulted while resolving an activation.
pub struct ActivationServices<'a> {
    /// Rich/cheap mapping.
    pub mapping: &'a StateMappingTable,
    /// Path registry, for validating saved progress.
    pub paths: &'a PathRegistry,
    /// Shared queues and spots.
    pub resources: &'a mut ResourceHub,
    /// Browse destinations.
    pub shopping: &'a mut dyn ShoppingLocationProvider,
    /// Validated warp into fixed spots.
    pub navigation: &'a mut dyn Navigation,
}

/// Rich starting point for a freshly spawned actor.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationOutcome {
    /// State to enter.
    pub state: RichState,
    /// Resource slot already claimed for the actor.
    pub assignment: Option<Assignment>,
    /// Shelf already reserved for the actor.
    pub browse_destination: Option<BrowseDestination>,
    /// Resource the caller should claim before entering `state`.
    pub pending_claim: Option<ResourceKind>,
    /// Path progress for [`RichState::FollowPath`].
    pub live_path: Option<PathProgress>,
    /// An acquisition failed and the NPC gave up its goal.
    pub gave_up: bool,
}

impl ActivationOutcome {
    fn enter(state: RichState) -> Self {
        Self {
            state,
            assignment: None,
            browse_destination: None,
            pending_claim: None,
            live_path: None,
            gave_up: false,
        }
    }

    fn give_up() -> Self {
        Self {
            gave_up: true,
            ..Self::enter(RichState::Exiting)
        }
    }

    fn holding(state: RichState, assignment: Assignment) -> Self {
        Self {
            assignment: Some(assignment),
            ..Self::enter(state)
        }
    }
}

/// Resolves the rich starting state for a record about to be activated.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivationTransitionResolver;

impl ActivationTransitionResolver {
    /// Resolves `record` into a rich starting state for `actor`.
    ///
    /// Returns `None` when the record has no saved tag; the caller then uses
    /// the NPC's default start. Scratch fields are cleared afterwards unless
    /// the result is [`RichState::FollowPath`].
    pub fn resolve(
        &self,
        record: &mut NpcRecord,
        clock: GameClock,
        actor: ActorHandle,
        services: &mut ActivationServices<'_>,
    ) -> Option<ActivationOutcome> {
        let saved = match record.state()? {
            StateTag::Cheap(cheap) => cheap,
            StateTag::Rich(rich) => services.mapping.to_cheap(rich),
        };
        let outcome = self.dispatch(saved, record, clock, actor, services);

        if outcome.state == RichState::FollowPath {
            record.clear_movement_scratch();
            record.pending_enter = false;
        } else {
            record.clear_all_scratch();
        }
        if outcome.gave_up {
            debug!("NPC {} gave up {saved} on activation", record.id());
        }
        Some(outcome)
    }

    fn dispatch(
        &self,
        saved: CheapState,
        record: &mut NpcRecord,
        clock: GameClock,
        actor: ActorHandle,
        services: &mut ActivationServices<'_>,
    ) -> ActivationOutcome {
        let id = record.id().clone();
        match saved {
            CheapState::IdleAtHome => {
                record.clear_movement_scratch();
                if !record.should_start_day(clock) {
                    return ActivationOutcome::enter(RichState::Idle);
                }
                if record.prime_day_start_path() {
                    return resume_path(record, services);
                }
                ActivationOutcome::enter(record.day_start_rich_state())
            },
            CheapState::WaitForCashier => {
                if services.resources.register.is_available() {
                    return ActivationOutcome {
                        pending_claim: Some(ResourceKind::Register),
                        ..ActivationOutcome::enter(RichState::MovingToRegister)
                    };
                }
                match services.resources.checkout_queue.try_acquire(&id) {
                    Some(slot) => ActivationOutcome::holding(RichState::InQueue, slot),
                    None => ActivationOutcome::give_up(),
                }
            },
            CheapState::Browse => match services.shopping.request_destination(&id) {
                Some(destination) => ActivationOutcome {
                    browse_destination: Some(destination),
                    ..ActivationOutcome::enter(RichState::Browsing)
                },
                None => ActivationOutcome::give_up(),
            },
            CheapState::PathFollow => resume_path(record, services),
            CheapState::WaitForPrescriptionQueue => {
                match services.resources.prescription_queue.try_acquire(&id) {
                    Some(slot) => ActivationOutcome::holding(RichState::InPrescriptionQueue, slot),
                    None => ActivationOutcome::give_up(),
                }
            },
            CheapState::WaitAtPrescriptionSpot => claim_and_warp(
                ResourceKind::PrescriptionCounter,
                RichState::WaitingAtPrescriptionSpot,
                record,
                actor,
                services,
            ),
            CheapState::WaitForDelivery => claim_and_warp(
                ResourceKind::DeliverySpot,
                RichState::WaitingForDelivery,
                record,
                actor,
                services,
            ),
            CheapState::CashierAtRegister => claim_and_warp(
                ResourceKind::CashierPost,
                RichState::CashierAtRegister,
                record,
                actor,
                services,
            ),
            CheapState::Patrol | CheapState::Exiting => {
                ActivationOutcome::enter(services.mapping.to_rich(saved))
            },
        }
    }
}

/// Resumes saved path progress, or falls back when it no longer resolves.
fn resume_path(record: &mut NpcRecord, services: &ActivationServices<'_>) -> ActivationOutcome {
    match record.simulated_path() {
        Some(progress) if services.paths.validate(progress) => ActivationOutcome {
            live_path: Some(progress.clone()),
            ..ActivationOutcome::enter(RichState::FollowPath)
        },
        stale => {
            debug!(
                "NPC {} cannot resume path {:?}, falling back",
                record.id(),
                stale
            );
            record.clear_path_scratch();
            ActivationOutcome::enter(services.mapping.to_rich(CheapState::DEFAULT))
        },
    }
}

/// Claims a fixed spot and warps the actor onto it. Any failure gives up.
fn claim_and_warp(
    kind: ResourceKind,
    state: RichState,
    record: &NpcRecord,
    actor: ActorHandle,
    services: &mut ActivationServices<'_>,
) -> ActivationOutcome {
    let id = record.id();
    let Some(assignment) = services.resources.try_acquire(kind, id) else {
        return ActivationOutcome::give_up();
    };
    if !services.navigation.warp(actor, assignment.position) {
        services.resources.release(kind, id);
        return ActivationOutcome::give_up();
    }
    ActivationOutcome::holding(state, assignment)
}
