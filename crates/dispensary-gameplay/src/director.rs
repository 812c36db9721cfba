//! Population director: owns every record and both of its drivers.
//!
//! Records live in one arena. While `is_active` a record belongs to its rich
//! actor and is only touched by [`PopulationDirector::update_actors`];
//! otherwise it belongs to the batched scheduler. Only
//! [`PopulationDirector::activate`] and [`PopulationDirector::deactivate`]
//! flip ownership, each within a single call.

use dispensary_common::{ActorHandle, NpcId, Vec2};
use tracing::{debug, error, info, warn};

use crate::activation::{ActivationServices, ActivationTransitionResolver};
use crate::actor::RichActor;
use crate::config::SimulationConfig;
use crate::deactivation::DeactivationTransitionResolver;
use crate::error::{NpcError, NpcResult};
use crate::events::{EventBus, PopulationEvent};
use crate::handlers::{BasicStateHandlerSet, SimContext};
use crate::mapping::StateMappingTable;
use crate::navigation::{NavMesh, PoolNavigator};
use crate::paths::PathRegistry;
use crate::persistence::{self, PopulationSave};
use crate::pool::{ActorPool, SpawnPose};
use crate::record::NpcRecord;
use crate::registry::{IntegrityRepair, NpcRegistry, RecordIndex};
use crate::resources::{ResourceHub, ResourceKind, ResourceManager};
use crate::scheduler::{SimulationScheduler, TickEnv, TickOutcome};
use crate::shopping::ShoppingLocationProvider;
use crate::spatial::{SpatialGrid, SpatialIndex};
use crate::state::{CheapState, RichState, StateTag};
use crate::time::{GameTime, TimeEvent};

/// World-side collaborators the director is built with.
pub struct StoreServices {
    /// Shared queues and spots.
    pub resources: ResourceHub,
    /// Waypoint paths.
    pub paths: PathRegistry,
    /// Browse destinations.
    pub shopping: Box<dyn ShoppingLocationProvider>,
    /// Walkable floor for validated warps.
    pub navmesh: NavMesh,
    /// Game clock.
    pub time: GameTime,
}

/// What one proximity pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProximityReport {
    /// Records that got an actor, in activation order.
    pub activated: Vec<NpcId>,
    /// Records whose actor was torn down.
    pub deactivated: Vec<NpcId>,
    /// Records that should have been deactivated but could not be interrupted.
    pub refused: Vec<NpcId>,
}

/// Composition root of the population layer.
pub struct PopulationDirector {
    config: SimulationConfig,
    registry: NpcRegistry,
    spatial: SpatialGrid,
    scheduler: SimulationScheduler,
    mapping: StateMappingTable,
    handlers: BasicStateHandlerSet,
    activation: ActivationTransitionResolver,
    deactivation: DeactivationTransitionResolver,
    pool: ActorPool,
    resources: ResourceHub,
    paths: PathRegistry,
    shopping: Box<dyn ShoppingLocationProvider>,
    navmesh: NavMesh,
    time: GameTime,
    events: EventBus,
    player_position: Option<Vec2>,
}

impl PopulationDirector {
    /// Wires the population layer with the standard mapping and handlers.
    pub fn new(config: SimulationConfig, services: StoreServices) -> NpcResult<Self> {
        config.validate()?;
        let mapping = StateMappingTable::standard();
        mapping.validate()?;

        info!(
            "Population director ready: activation {} / deactivation {}, {} per tick",
            config.activation_radius, config.deactivation_radius, config.max_per_tick
        );
        Ok(Self {
            registry: NpcRegistry::new(),
            spatial: SpatialGrid::new(config.spatial_cell_size),
            scheduler: SimulationScheduler::new(&config),
            mapping,
            handlers: BasicStateHandlerSet::standard(),
            activation: ActivationTransitionResolver,
            deactivation: DeactivationTransitionResolver,
            pool: ActorPool::new(),
            resources: services.resources,
            paths: services.paths,
            shopping: services.shopping,
            navmesh: services.navmesh,
            time: services.time,
            events: EventBus::default(),
            player_position: None,
            config,
        })
    }

    /// Replaces the mapping table. Asymmetric tables are rejected.
    pub fn with_mapping(mut self, mapping: StateMappingTable) -> NpcResult<Self> {
        mapping.validate()?;
        self.mapping = mapping;
        Ok(self)
    }

    /// Replaces the cheap handler set.
    #[must_use]
    pub fn with_handlers(mut self, handlers: BasicStateHandlerSet) -> Self {
        self.handlers = handlers;
        self
    }

    /// Caps the number of simultaneously live actors.
    #[must_use]
    pub fn with_actor_limit(mut self, max_live: usize) -> Self {
        self.pool = ActorPool::with_limit(max_live);
        self
    }

    /// Active tunables.
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Record arena.
    #[must_use]
    pub fn registry(&self) -> &NpcRegistry {
        &self.registry
    }

    /// Record by id.
    #[must_use]
    pub fn record(&self, id: &NpcId) -> Option<&NpcRecord> {
        self.registry.by_id(id)
    }

    /// Live actor of a record.
    #[must_use]
    pub fn actor(&self, id: &NpcId) -> Option<&RichActor> {
        let handle = self.record(id)?.actor_handle()?;
        self.pool.get(handle)
    }

    /// Mutable live actor of a record.
    pub fn actor_mut(&mut self, id: &NpcId) -> Option<&mut RichActor> {
        let handle = self.registry.by_id(id)?.actor_handle()?;
        self.pool.get_mut(handle)
    }

    /// Actor pool.
    #[must_use]
    pub fn pool(&self) -> &ActorPool {
        &self.pool
    }

    /// Shared resources.
    #[must_use]
    pub fn resources(&self) -> &ResourceHub {
        &self.resources
    }

    /// Scheduler state.
    #[must_use]
    pub fn scheduler(&self) -> &SimulationScheduler {
        &self.scheduler
    }

    /// Game clock.
    #[must_use]
    pub fn time(&self) -> &GameTime {
        &self.time
    }

    /// Mutable game clock.
    pub fn time_mut(&mut self) -> &mut GameTime {
        &mut self.time
    }

    /// Advances the game clock by real seconds.
    pub fn advance_time(&mut self, dt: f32) -> Option<TimeEvent> {
        self.time.update(dt)
    }

    /// Last known player position.
    #[must_use]
    pub fn player_position(&self) -> Option<Vec2> {
        self.player_position
    }

    /// Sets or forgets the player position. Without one the scheduler idles.
    pub fn set_player_position(&mut self, position: Option<Vec2>) {
        self.player_position = position;
    }

    /// Takes every pending event.
    pub fn drain_events(&self) -> Vec<PopulationEvent> {
        self.events.drain()
    }

    /// Registers a record. It always starts inactive.
    pub fn add_record(&mut self, mut record: NpcRecord) -> NpcResult<RecordIndex> {
        record.unlink_actor();
        let position = record.position();
        let index = self.registry.insert(record)?;
        self.spatial.add_record(index, position);
        Ok(index)
    }

    /// Opens or closes a record's external day-start gate.
    pub fn set_can_start_day(&mut self, id: &NpcId, can_start: bool) -> NpcResult<()> {
        let index = self.index_of(id)?;
        if let Some(record) = self.registry.get_mut(index) {
            record.set_can_start_day(can_start);
        }
        Ok(())
    }

    /// Gives a record a rich actor.
    pub fn activate(&mut self, id: &NpcId) -> NpcResult<ActorHandle> {
        let index = self.index_of(id)?;
        let record = self
            .registry
            .get_mut(index)
            .ok_or_else(|| NpcError::NotFound(id.clone()))?;
        if record.is_active() {
            return Err(NpcError::AlreadyActive(id.clone()));
        }

        let pose = SpawnPose {
            home: record.home_position(),
            position: record.position(),
            rotation: record.rotation(),
        };
        let handle = self
            .pool
            .spawn(record.profile(), id, pose)
            .ok_or_else(|| NpcError::PoolExhausted(id.clone()))?;
        let saved = record.state();

        let mut navigation = PoolNavigator {
            pool: &mut self.pool,
            mesh: &self.navmesh,
        };
        let mut services = ActivationServices {
            mapping: &self.mapping,
            paths: &self.paths,
            resources: &mut self.resources,
            shopping: self.shopping.as_mut(),
            navigation: &mut navigation,
        };
        let outcome = self
            .activation
            .resolve(record, self.time.clock(), handle, &mut services);

        let (mut state, mut assignment, destination, live_path, pending_claim, mut gave_up) = match outcome {
            Some(o) => (
                o.state,
                o.assignment,
                o.browse_destination,
                o.live_path,
                o.pending_claim,
                o.gave_up,
            ),
            None => (RichState::DEFAULT, None, None, None, None, false),
        };
        if let Some(kind) = pending_claim {
            match self.resources.try_acquire(kind, id) {
                Some(spot) => assignment = Some(spot),
                None => {
                    state = RichState::Exiting;
                    gave_up = true;
                },
            }
        }

        let Some(actor) = self.pool.get_mut(handle) else {
            error!("Actor {handle} vanished while activating {id}");
            return Err(NpcError::ActorMissing {
                id: id.clone(),
                handle,
            });
        };
        actor.set_live_path(live_path);
        actor.set_assignment(assignment);
        actor.set_browse_destination(destination);
        actor.enter_state(state, &self.config);

        record.link_actor(handle);
        record.set_state(Some(StateTag::Rich(state)));
        debug!("Activated {id} as {state} on actor {handle}");

        if gave_up {
            let from = match saved {
                Some(StateTag::Cheap(cheap)) => cheap,
                Some(StateTag::Rich(rich)) => self.mapping.to_cheap(rich),
                None => CheapState::DEFAULT,
            };
            self.events.publish(PopulationEvent::GaveUp {
                id: id.clone(),
                from,
            });
        }
        self.events.publish(PopulationEvent::Activated {
            id: id.clone(),
            handle,
            state,
        });
        Ok(handle)
    }

    /// Tears down a record's actor and hands the record to the scheduler.
    ///
    /// Refused with [`NpcError::NotInterruptible`] while the actor is in a
    /// state that cannot be interrupted; retry later.
    pub fn deactivate(&mut self, id: &NpcId) -> NpcResult<CheapState> {
        let index = self.index_of(id)?;
        let record = self
            .registry
            .get_mut(index)
            .ok_or_else(|| NpcError::NotFound(id.clone()))?;
        if !record.is_active() {
            return Err(NpcError::NotActive(id.clone()));
        }
        let Some(handle) = record.actor_handle() else {
            return Err(NpcError::NotActive(id.clone()));
        };
        if !self.pool.contains(handle) {
            self.repair_missing_actor(index, handle);
            return Err(NpcError::ActorMissing {
                id: id.clone(),
                handle,
            });
        }
        let Some(actor) = self.pool.get_mut(handle) else {
            return Err(NpcError::ActorMissing {
                id: id.clone(),
                handle,
            });
        };
        if !actor.is_interruptible() {
            let state = actor.state();
            debug!("Deactivation of {id} refused in {state}");
            self.events.publish(PopulationEvent::DeactivationRefused {
                id: id.clone(),
                state,
            });
            return Err(NpcError::NotInterruptible {
                id: id.clone(),
                state,
            });
        }

        let old_position = record.position();
        let mut ctx = SimContext {
            config: &self.config,
            clock: self.time.clock(),
            paths: &self.paths,
            rng: self.scheduler.rng_mut(),
        };
        let cheap = self
            .deactivation
            .resolve(record, actor, &self.mapping, &self.handlers, &mut ctx);

        self.resources.release_all(id);
        self.shopping.release_destination(id);
        self.pool.recycle(handle);
        record.unlink_actor();

        let new_position = record.position();
        if new_position != old_position {
            self.spatial.update_position(index, old_position, new_position);
        }
        debug!("Deactivated {id} into {cheap}");
        self.events.publish(PopulationEvent::Deactivated {
            id: id.clone(),
            state: cheap,
        });
        Ok(cheap)
    }

    /// Switches records between fidelities around the player.
    ///
    /// Active records beyond the outer radius are deactivated first, then
    /// inactive records inside the inner radius are activated in registry
    /// order. Between the radii nothing changes.
    pub fn update_proximity(&mut self, player: Vec2) -> ProximityReport {
        self.player_position = Some(player);
        let mut report = ProximityReport::default();

        let leaving: Vec<NpcId> = self
            .registry
            .iter()
            .filter(|(_, r)| r.is_active() && r.position().distance(player) > self.config.deactivation_radius)
            .map(|(_, r)| r.id().clone())
            .collect();
        for id in leaving {
            match self.deactivate(&id) {
                Ok(_) => report.deactivated.push(id),
                Err(NpcError::NotInterruptible { .. }) => report.refused.push(id),
                Err(err) => warn!("Could not deactivate {id}: {err}"),
            }
        }

        let arriving: Vec<NpcId> = self
            .spatial
            .query_in_radius(player, self.config.activation_radius)
            .into_iter()
            .filter_map(|index| self.registry.get(index))
            .filter(|r| !r.is_active())
            .map(|r| r.id().clone())
            .collect();
        for id in arriving {
            match self.activate(&id) {
                Ok(_) => report.activated.push(id),
                Err(NpcError::PoolExhausted(_)) => {
                    warn!("Actor pool exhausted, {id} stays simulated");
                    break;
                },
                Err(err) => warn!("Could not activate {id}: {err}"),
            }
        }
        report
    }

    /// Runs the batched scheduler for inactive records.
    pub fn simulation_update(&mut self, dt: f32) -> Option<TickOutcome> {
        let env = TickEnv {
            registry: &mut self.registry,
            handlers: &self.handlers,
            mapping: &self.mapping,
            config: &self.config,
            paths: &self.paths,
            spatial: Some(&mut self.spatial),
            time: Some(&self.time),
            player_position: self.player_position,
        };
        let outcome = self.scheduler.update(dt, env)?;
        if let Some(report) = outcome.report() {
            for change in &report.transitions {
                if let Some(record) = self.registry.get(change.index) {
                    self.events.publish(PopulationEvent::CheapStateChanged {
                        id: record.id().clone(),
                        from: change.from,
                        to: change.to,
                    });
                }
            }
        }
        Some(outcome)
    }

    /// Per-frame driver for active records.
    ///
    /// Advances every live actor and writes its pose and state back to the
    /// record and the spatial index.
    pub fn update_actors(&mut self, dt: f32) {
        let active: Vec<(RecordIndex, ActorHandle)> = self
            .registry
            .iter()
            .filter(|(_, r)| r.is_active())
            .filter_map(|(index, r)| r.actor_handle().map(|handle| (index, handle)))
            .collect();

        for (index, handle) in active {
            if !self.pool.contains(handle) {
                self.repair_missing_actor(index, handle);
                continue;
            }
            let Some(actor) = self.pool.get_mut(handle) else {
                continue;
            };
            if let Some(next) = actor.update(dt, &self.paths, &self.config) {
                let from = actor.state();
                let gave_up = apply_rich_transition(
                    actor,
                    next,
                    &mut self.resources,
                    self.shopping.as_mut(),
                    &self.config,
                );
                if gave_up {
                    self.events.publish(PopulationEvent::GaveUp {
                        id: actor.npc_id().clone(),
                        from: self.mapping.to_cheap(from),
                    });
                }
            }

            let (position, rotation, state) = (actor.position(), actor.rotation(), actor.state());
            let Some(record) = self.registry.get_mut(index) else {
                continue;
            };
            let old_position = record.position();
            record.set_pose(position, rotation);
            record.set_state(Some(StateTag::Rich(state)));
            if old_position != position {
                self.spatial.update_position(index, old_position, position);
            }
        }
    }

    /// Leaves a path walk to react to something, keeping the walk for later.
    pub fn interrupt_path(&mut self, id: &NpcId) -> NpcResult<bool> {
        let config = self.config.clone();
        let actor = self
            .actor_mut(id)
            .ok_or_else(|| NpcError::NotActive(id.clone()))?;
        Ok(actor.interrupt_path(RichState::Reacting, &config))
    }

    /// Snapshot of every record. Live records are not mutated.
    #[must_use]
    pub fn export_all(&self) -> Vec<NpcRecord> {
        self.registry
            .iter()
            .map(|(_, record)| {
                let actor = record
                    .actor_handle()
                    .filter(|_| record.is_active())
                    .and_then(|handle| self.pool.get(handle));
                match actor {
                    Some(actor) => persistence::snapshot_active(record, actor, &self.mapping),
                    None => record.clone(),
                }
            })
            .collect()
    }

    /// [`Self::export_all`] wrapped in a versioned save.
    #[must_use]
    pub fn export_save(&self) -> PopulationSave {
        PopulationSave::new(self.export_all())
    }

    /// Replaces the whole population with loaded records.
    ///
    /// Every live actor is torn down and every claim released. Records come
    /// back inactive and ordered by load priority. Duplicate ids reject the
    /// import before anything is touched.
    pub fn import_all(&mut self, records: Vec<NpcRecord>) -> NpcResult<usize> {
        let mut seen = ahash::AHashSet::with_capacity(records.len());
        for record in &records {
            if !seen.insert(record.id().clone()) {
                return Err(NpcError::AlreadyRegistered(record.id().clone()));
            }
        }

        let previous: Vec<NpcId> = self.registry.iter().map(|(_, r)| r.id().clone()).collect();
        for id in &previous {
            self.resources.release_all(id);
            self.shopping.release_destination(id);
        }
        self.pool.clear();
        self.registry.clear();
        self.spatial.clear();

        let prepared = persistence::prepare_import(records, &self.mapping);
        let count = prepared.len();
        for record in prepared {
            self.add_record(record)?;
        }
        info!("Imported {count} NPC records");
        Ok(count)
    }

    /// Repairs records whose ownership markers disagree.
    ///
    /// Covers records flagged active without a handle, inactive records
    /// still holding one and active records whose actor no longer exists.
    /// Afterwards every pooled actor not linked from an active record is
    /// recycled and its claims released, so no id keeps a second actor.
    /// Repaired records are re-tracked spatially.
    pub fn verify_integrity(&mut self) -> Vec<IntegrityRepair> {
        let dangling: Vec<(RecordIndex, ActorHandle)> = self
            .registry
            .iter()
            .filter(|(_, r)| r.is_active())
            .filter_map(|(index, r)| r.actor_handle().map(|handle| (index, handle)))
            .filter(|(_, handle)| !self.pool.contains(*handle))
            .collect();

        let mut repairs = self.registry.verify_integrity();
        for (index, handle) in dangling {
            if let Some(repair) = self.repair_missing_actor(index, handle) {
                repairs.push(repair);
            }
        }
        self.recycle_stray_actors();

        for repair in &repairs {
            if let Some(record) = self.registry.get(repair.index) {
                let position = record.position();
                self.spatial.update_position(repair.index, position, position);
            }
            self.events.publish(PopulationEvent::IntegrityCorrected {
                id: repair.id.clone(),
            });
        }
        repairs
    }

    /// Recycles pooled actors that no active record links to.
    fn recycle_stray_actors(&mut self) {
        let linked: ahash::AHashSet<ActorHandle> = self
            .registry
            .iter()
            .filter(|(_, r)| r.is_active())
            .filter_map(|(_, r)| r.actor_handle())
            .collect();
        let strays: Vec<(ActorHandle, NpcId)> = self
            .pool
            .iter()
            .filter(|actor| !linked.contains(&actor.handle()))
            .map(|actor| (actor.handle(), actor.npc_id().clone()))
            .collect();

        for (handle, id) in &strays {
            error!("Actor {handle} of NPC {id} is not linked to an active record, recycling");
            self.pool.recycle(*handle);
            self.resources.release_all(id);
            self.shopping.release_destination(id);
        }
    }

    fn index_of(&self, id: &NpcId) -> NpcResult<RecordIndex> {
        self.registry
            .index_of(id)
            .ok_or_else(|| NpcError::NotFound(id.clone()))
    }

    fn cheap_of(&self, tag: StateTag) -> CheapState {
        match tag {
            StateTag::Cheap(cheap) => cheap,
            StateTag::Rich(rich) => self.mapping.to_cheap(rich),
        }
    }

    /// Unlinks an active record whose actor is gone and resumes it cheaply.
    fn repair_missing_actor(&mut self, index: RecordIndex, handle: ActorHandle) -> Option<IntegrityRepair> {
        let cheap = self.registry.get(index)?.state().map(|tag| self.cheap_of(tag));
        let record = self.registry.get_mut(index)?;
        error!(
            "NPC {} is active but actor {handle} is gone, unlinking",
            record.id()
        );
        record.unlink_actor();
        record.set_state(Some(StateTag::Cheap(cheap.unwrap_or(CheapState::DEFAULT))));
        record.pending_enter = true;
        let id = record.id().clone();
        self.resources.release_all(&id);
        self.shopping.release_destination(&id);
        Some(IntegrityRepair {
            index,
            id,
            was_flagged_active: true,
        })
    }
}

/// Applies a rich state change requested by the actor itself.
///
/// Returns true when a claim failed and the actor was sent to the exit.
fn apply_rich_transition(
    actor: &mut RichActor,
    next: RichState,
    resources: &mut ResourceHub,
    shopping: &mut dyn ShoppingLocationProvider,
    config: &SimulationConfig,
) -> bool {
    let id = actor.npc_id().clone();
    match next {
        RichState::FollowPath => {
            if !actor.resume_interrupted_path(config) {
                actor.enter_state(RichState::Wandering, config);
            }
            false
        },
        RichState::MovingToCheckout => {
            shopping.release_destination(&id);
            actor.set_browse_destination(None);
            let claim = resources
                .register
                .try_acquire(&id)
                .map(|spot| (RichState::MovingToRegister, spot))
                .or_else(|| {
                    resources
                        .checkout_queue
                        .try_acquire(&id)
                        .map(|slot| (RichState::InQueue, slot))
                });
            match claim {
                Some((state, assignment)) => {
                    actor.set_assignment(Some(assignment));
                    actor.enter_state(state, config);
                    false
                },
                None => {
                    actor.set_assignment(None);
                    actor.enter_state(RichState::Exiting, config);
                    true
                },
            }
        },
        RichState::WaitingAtPrescriptionSpot => {
            resources.release(ResourceKind::PrescriptionQueue, &id);
            match resources.prescription_counter.try_acquire(&id) {
                Some(spot) => {
                    actor.set_assignment(Some(spot));
                    actor.enter_state(next, config);
                    false
                },
                None => {
                    actor.set_assignment(None);
                    actor.enter_state(RichState::Exiting, config);
                    true
                },
            }
        },
        RichState::Exiting | RichState::Idle | RichState::Wandering => {
            resources.release_all(&id);
            shopping.release_destination(&id);
            actor.set_assignment(None);
            actor.set_browse_destination(None);
            actor.enter_state(next, config);
            false
        },
        _ => {
            actor.enter_state(next, config);
            false
        },
    }
}
