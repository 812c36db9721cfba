//! Batched low-frequency simulation of inactive records.
//!
//! Every tick interval the scheduler builds a candidate set (records near the
//! player plus records that must keep progressing anywhere), then visits up
//! to `max_per_tick` of them starting at a persistent round-robin cursor.
//!
//! A missing spatial index, time source or player position is a soft outage:
//! the tick is skipped and retried after a backoff.

use std::collections::BTreeSet;

use dispensary_common::Vec2;
use tracing::{debug, error, trace, warn};

use crate::config::SimulationConfig;
use crate::handlers::{BasicStateHandlerSet, SimContext};
use crate::mapping::StateMappingTable;
use crate::paths::PathRegistry;
use crate::record::NpcRecord;
use crate::registry::{NpcRegistry, RecordIndex};
use crate::spatial::SpatialIndex;
use crate::state::{CheapState, StateTag};
use crate::time::{GameClock, TimeSource};

/// Everything one scheduler tick reads or mutates.
pub struct TickEnv<'a> {
    /// Record arena.
    pub registry: &'a mut NpcRegistry,
    /// Cheap-state handlers.
    pub handlers: &'a BasicStateHandlerSet,
    /// Rich/cheap mapping, used to recover stale tags.
    pub mapping: &'a StateMappingTable,
    /// Tunables.
    pub config: &'a SimulationConfig,
    /// Path registry.
    pub paths: &'a PathRegistry,
    /// Spatial index, if available.
    pub spatial: Option<&'a mut dyn SpatialIndex>,
    /// Game clock, if available.
    pub time: Option<&'a dyn TimeSource>,
    /// Player position, if known.
    pub player_position: Option<Vec2>,
}

/// A cheap tag change applied during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheapTransition {
    /// Record that changed.
    pub index: RecordIndex,
    /// Tag before the change.
    pub from: Option<StateTag>,
    /// Tag after the change.
    pub to: CheapState,
}

/// Summary of one tick that ran.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Size of the candidate set, computed before batching.
    pub candidate_count: usize,
    /// Records visited, in visit order.
    pub processed: Vec<RecordIndex>,
    /// Tag changes, in visit order.
    pub transitions: Vec<CheapTransition>,
    /// Records whose stale or missing tag was replaced.
    pub recovered: Vec<RecordIndex>,
    /// Cursor after the tick.
    pub cursor: usize,
}

/// Why a tick was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outage {
    /// No spatial index.
    SpatialIndex,
    /// No game clock.
    TimeSource,
    /// No player position.
    PlayerPosition,
}

/// Result of a tick attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The tick visited records.
    Ran(TickReport),
    /// Nothing needed simulating.
    Idle,
    /// A dependency was missing.
    Skipped(Outage),
}

impl TickOutcome {
    /// Wait before the next tick after this outcome.
    #[must_use]
    pub fn backoff(&self, config: &SimulationConfig) -> f32 {
        match self {
            Self::Ran(_) => config.tick_interval,
            Self::Idle => config.idle_backoff_interval,
            Self::Skipped(_) => config.outage_backoff_interval,
        }
    }

    /// The report, if the tick ran.
    #[must_use]
    pub fn report(&self) -> Option<&TickReport> {
        match self {
            Self::Ran(report) => Some(report),
            Self::Idle | Self::Skipped(_) => None,
        }
    }
}

/// Read-only inputs shared by every visit of one tick.
struct Visit<'a> {
    handlers: &'a BasicStateHandlerSet,
    mapping: &'a StateMappingTable,
    config: &'a SimulationConfig,
    paths: &'a PathRegistry,
    clock: GameClock,
}

/// Round-robin scheduler for inactive records.
#[derive(Debug)]
pub struct SimulationScheduler {
    /// Scheduler time in seconds, advanced by `update`.
    clock: f64,
    /// Seconds until the next tick.
    wait: f32,
    cursor: usize,
    ticks: u64,
    rng: fastrand::Rng,
}

impl SimulationScheduler {
    /// Creates a scheduler. The first `update` ticks immediately.
    #[must_use]
    pub fn new(config: &SimulationConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        Self {
            clock: 0.0,
            wait: 0.0,
            cursor: 0,
            ticks: 0,
            rng,
        }
    }

    /// Round-robin cursor.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Scheduler time in seconds.
    #[must_use]
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Ticks attempted so far, skipped ones included.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Seconds until the next tick.
    #[must_use]
    pub fn time_until_tick(&self) -> f32 {
        self.wait.max(0.0)
    }

    /// RNG used for `on_enter` choices.
    pub fn rng_mut(&mut self) -> &mut fastrand::Rng {
        &mut self.rng
    }

    /// Advances scheduler time and ticks once the wait has elapsed.
    pub fn update(&mut self, dt: f32, env: TickEnv<'_>) -> Option<TickOutcome> {
        self.clock += f64::from(dt);
        self.wait -= dt;
        if self.wait > 0.0 {
            return None;
        }
        Some(self.tick(env))
    }

    /// Runs one tick now and schedules the next one.
    pub fn tick(&mut self, env: TickEnv<'_>) -> TickOutcome {
        let config = env.config;
        self.ticks += 1;
        let outcome = self.run_tick(env);
        self.wait = outcome.backoff(config);
        outcome
    }

    fn run_tick(&mut self, env: TickEnv<'_>) -> TickOutcome {
        let TickEnv {
            registry,
            handlers,
            mapping,
            config,
            paths,
            spatial,
            time,
            player_position,
        } = env;

        let Some(spatial) = spatial else {
            return self.skip(Outage::SpatialIndex);
        };
        let Some(clock) = time.and_then(|source| source.current_game_time()) else {
            return self.skip(Outage::TimeSource);
        };
        let Some(player) = player_position else {
            return self.skip(Outage::PlayerPosition);
        };

        let candidates = collect_candidates(registry, &*spatial, config, player);
        let count = candidates.len();
        if count == 0 {
            trace!("Scheduler tick {}: no candidates", self.ticks);
            return TickOutcome::Idle;
        }

        let batch = config.max_per_tick.min(count);
        let start = self.cursor % count;
        let visit = Visit {
            handlers,
            mapping,
            config,
            paths,
            clock,
        };
        let mut report = TickReport {
            candidate_count: count,
            ..Default::default()
        };

        for offset in 0..batch {
            let index = candidates[(start + offset) % count];
            self.visit(index, registry, &mut *spatial, &visit, &mut report);
        }

        // Modulo the size computed before batching.
        self.cursor = (start + batch) % count;
        report.cursor = self.cursor;
        trace!(
            "Scheduler tick {}: visited {} of {} candidates, {} transitions, cursor {}",
            self.ticks,
            report.processed.len(),
            count,
            report.transitions.len(),
            self.cursor
        );
        TickOutcome::Ran(report)
    }

    fn skip(&self, outage: Outage) -> TickOutcome {
        debug!("Scheduler tick {} skipped: {outage:?} unavailable", self.ticks);
        TickOutcome::Skipped(outage)
    }

    fn visit(
        &mut self,
        index: RecordIndex,
        registry: &mut NpcRegistry,
        spatial: &mut dyn SpatialIndex,
        visit: &Visit<'_>,
        report: &mut TickReport,
    ) {
        let Some(record) = registry.get_mut(index) else {
            error!("Scheduler candidate {index:?} is not in the registry");
            return;
        };
        if record.is_active() {
            error!("Scheduler asked to simulate active NPC {}, skipping", record.id());
            return;
        }
        if !record.is_consistent() {
            error!(
                "NPC {} is inactive but still holds actor {:?}, unlinking",
                record.id(),
                record.actor_handle()
            );
            record.unlink_actor();
        }

        report.processed.push(index);
        let old_position = record.position();
        let dt = self.record_dt(record, visit.config);
        record.last_simulated_at = Some(self.clock);
        let mut ctx = SimContext {
            config: visit.config,
            clock: visit.clock,
            paths: visit.paths,
            rng: &mut self.rng,
        };

        let before = record.state();
        let state = match before {
            Some(StateTag::Cheap(state)) if visit.handlers.contains(state) => state,
            stale => {
                let recovered = recover_tag(stale, visit.mapping, visit.handlers);
                warn!(
                    "NPC {} had no cheap handler for {:?}, recovered to {recovered}",
                    record.id(),
                    stale
                );
                visit.handlers.transition(record, recovered);
                report.recovered.push(index);
                report.transitions.push(CheapTransition {
                    index,
                    from: stale,
                    to: recovered,
                });
                return;
            },
        };

        if record.pending_enter() {
            visit.handlers.enter_now(record, &mut ctx);
            // A home arrival may already be due to leave again.
            if record.cheap_state() == Some(CheapState::IdleAtHome) && record.should_start_day(visit.clock) {
                start_day(record, visit);
            }
            push_if_changed(report, index, before, record);
        } else if state == CheapState::IdleAtHome && record.should_start_day(visit.clock) {
            start_day(record, visit);
            push_if_changed(report, index, before, record);
        } else if let Some(handler) = visit.handlers.get(state) {
            if let Some(next) = handler.tick(record, dt, &ctx) {
                visit.handlers.transition(record, next);
                push_if_changed(report, index, before, record);
            }
        }

        let new_position = record.position();
        if new_position != old_position {
            spatial.update_position(index, old_position, new_position);
        }
    }

    /// Seconds since the record was last visited, capped.
    fn record_dt(&self, record: &NpcRecord, config: &SimulationConfig) -> f32 {
        let elapsed = match record.last_simulated_at {
            Some(last) => (self.clock - last).max(0.0) as f32,
            None => config.tick_interval,
        };
        elapsed.min(config.max_sim_step)
    }
}

/// Switches an idle-at-home record into its day-start cheap state.
fn start_day(record: &mut NpcRecord, visit: &Visit<'_>) {
    let start_rich = record.day_start_rich_state();
    let mut target = visit.mapping.to_cheap(start_rich);
    if !visit.handlers.contains(target) {
        target = CheapState::DEFAULT;
    }
    visit.handlers.transition(record, target);
    if target == CheapState::PathFollow {
        record.prime_day_start_path();
    }
    debug!("NPC {} starts its day as {target}", record.id());
}

fn recover_tag(
    stale: Option<StateTag>,
    mapping: &StateMappingTable,
    handlers: &BasicStateHandlerSet,
) -> CheapState {
    let mapped = match stale {
        Some(StateTag::Rich(rich)) => mapping.to_cheap(rich),
        Some(StateTag::Cheap(_)) | None => CheapState::DEFAULT,
    };
    if handlers.contains(mapped) {
        mapped
    } else {
        CheapState::DEFAULT
    }
}

fn push_if_changed(
    report: &mut TickReport,
    index: RecordIndex,
    before: Option<StateTag>,
    record: &NpcRecord,
) {
    if let Some(to) = record.cheap_state() {
        if before != Some(StateTag::Cheap(to)) || record.pending_enter() {
            report.transitions.push(CheapTransition {
                index,
                from: before,
                to,
            });
        }
    }
}

/// Inactive records near the player plus must-run records, deduplicated
/// and in stable index order.
fn collect_candidates(
    registry: &NpcRegistry,
    spatial: &dyn SpatialIndex,
    config: &SimulationConfig,
    player: Vec2,
) -> Vec<RecordIndex> {
    let mut candidates = BTreeSet::new();
    for index in spatial.query_in_radius(player, config.candidate_radius()) {
        if registry.get(index).is_some_and(|r| !r.is_active()) {
            candidates.insert(index);
        }
    }
    for (index, record) in registry.iter() {
        if record.is_active() {
            continue;
        }
        let mid_movement = record.simulated_target_position().is_some();
        let must_run = record
            .cheap_state()
            .is_some_and(|state| config.must_simulate.contains(&state));
        if mid_movement || must_run {
            candidates.insert(index);
        }
    }
    candidates.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::SpatialGrid;
    use proptest::prelude::*;

    struct World {
        registry: NpcRegistry,
        grid: SpatialGrid,
        handlers: BasicStateHandlerSet,
        mapping: StateMappingTable,
        config: SimulationConfig,
        paths: PathRegistry,
        clock: GameClock,
    }

    impl World {
        fn new(config: SimulationConfig) -> Self {
            Self {
                registry: NpcRegistry::new(),
                grid: SpatialGrid::new(config.spatial_cell_size),
                handlers: BasicStateHandlerSet::standard(),
                mapping: StateMappingTable::standard(),
                config,
                paths: PathRegistry::new(),
                clock: GameClock::at_hour(12.0),
            }
        }

        fn add(&mut self, record: NpcRecord) -> RecordIndex {
            let position = record.position();
            let index = self.registry.insert(record).expect("insert");
            self.grid.add_record(index, position);
            index
        }

        fn env(&mut self) -> TickEnv<'_> {
            TickEnv {
                registry: &mut self.registry,
                handlers: &self.handlers,
                mapping: &self.mapping,
                config: &self.config,
                paths: &self.paths,
                spatial: Some(&mut self.grid),
                time: Some(&self.clock),
                player_position: Some(Vec2::ZERO),
            }
        }
    }

    fn seeded(max_per_tick: usize) -> SimulationConfig {
        SimulationConfig {
            max_per_tick,
            rng_seed: Some(11),
            ..Default::default()
        }
    }

    /// Dormant record near the origin that never leaves home.
    fn gated(i: usize) -> NpcRecord {
        NpcRecord::new(format!("npc-{i}"), Vec2::new(i as f32 * 0.1, 0.0)).with_can_start_day(false)
    }

    #[test]
    fn test_round_robin_batches_wrap() {
        let mut world = World::new(seeded(10));
        for i in 0..25 {
            world.add(gated(i));
        }
        let mut scheduler = SimulationScheduler::new(&world.config);

        let expected: [Vec<u32>; 3] = [
            (0..10).collect(),
            (10..20).collect(),
            (20..25).chain(0..5).collect(),
        ];
        for batch in expected {
            let outcome = scheduler.tick(world.env());
            let report = outcome.report().expect("tick ran");
            let visited: Vec<u32> = report.processed.iter().map(|i| i.raw()).collect();
            assert_eq!(visited, batch);
            assert_eq!(report.candidate_count, 25);
        }
        assert_eq!(scheduler.cursor(), 5);
    }

    proptest! {
        #[test]
        fn prop_every_candidate_visited(n in 1usize..80, max_per_tick in 1usize..16) {
            let mut world = World::new(seeded(max_per_tick));
            for i in 0..n {
                world.add(gated(i));
            }
            let mut scheduler = SimulationScheduler::new(&world.config);
            let mut seen = BTreeSet::new();
            for _ in 0..n.div_ceil(max_per_tick) {
                let outcome = scheduler.tick(world.env());
                let report = outcome.report().expect("tick ran");
                seen.extend(report.processed.iter().copied());
            }
            prop_assert_eq!(seen.len(), n);
        }
    }

    #[test]
    fn test_gate_holds_until_can_start_day() {
        let mut world = World::new(seeded(10));
        let index = world.add(gated(0));
        let mut scheduler = SimulationScheduler::new(&world.config);

        for _ in 0..200 {
            let dt = world.config.tick_interval;
            scheduler.update(dt, world.env());
        }
        let record = world.registry.get(index).expect("record");
        assert_eq!(record.cheap_state(), Some(CheapState::IdleAtHome));

        world
            .registry
            .get_mut(index)
            .expect("record")
            .set_can_start_day(true);
        let outcome = scheduler.tick(world.env());
        let report = outcome.report().expect("tick ran");
        assert_eq!(report.transitions.len(), 1);
        let record = world.registry.get(index).expect("record");
        assert_eq!(record.cheap_state(), Some(CheapState::Patrol));
        assert!(record.pending_enter());
    }

    #[test]
    fn test_pending_home_entry_still_starts_day() {
        let mut world = World::new(seeded(10));
        let mut record = gated(0).with_can_start_day(true);
        record.pending_enter = true;
        let index = world.add(record);
        let mut scheduler = SimulationScheduler::new(&world.config);

        let outcome = scheduler.tick(world.env());
        let report = outcome.report().expect("tick ran");
        assert_eq!(report.transitions.len(), 1);
        let record = world.registry.get(index).expect("record");
        assert_eq!(record.cheap_state(), Some(CheapState::Patrol));
        assert!(record.pending_enter());
    }

    #[test]
    fn test_day_start_on_path_primes_scratch() {
        use crate::paths::{PathMode, WaypointPath};
        use crate::record::{DayStartBehavior, PathProgress};

        let mut world = World::new(seeded(10));
        world
            .paths
            .insert("route", WaypointPath::new(vec![Vec2::ZERO, Vec2::X], PathMode::Loop))
            .expect("path");
        let index = world.add(
            NpcRecord::new("walker", Vec2::ZERO)
                .with_day_start(DayStartBehavior::FollowPath(PathProgress::new("route", 1, false))),
        );
        let mut scheduler = SimulationScheduler::new(&world.config);
        scheduler.tick(world.env());

        let record = world.registry.get(index).expect("record");
        assert_eq!(record.cheap_state(), Some(CheapState::PathFollow));
        assert_eq!(record.simulated_path(), Some(&PathProgress::new("route", 1, false)));

        // Deferred enter runs on the next visit.
        scheduler.tick(world.env());
        let record = world.registry.get(index).expect("record");
        assert!(!record.pending_enter());
        assert_eq!(record.simulated_target_position(), Some(Vec2::X));
    }

    #[test]
    fn test_missing_dependencies_back_off() {
        let mut world = World::new(seeded(10));
        world.add(gated(0));
        let mut scheduler = SimulationScheduler::new(&world.config);

        let mut env = world.env();
        env.spatial = None;
        assert_eq!(scheduler.tick(env), TickOutcome::Skipped(Outage::SpatialIndex));
        assert!((scheduler.time_until_tick() - world.config.outage_backoff_interval).abs() < 1e-6);

        let mut env = world.env();
        env.time = None;
        assert_eq!(scheduler.tick(env), TickOutcome::Skipped(Outage::TimeSource));

        let mut env = world.env();
        env.player_position = None;
        assert_eq!(scheduler.tick(env), TickOutcome::Skipped(Outage::PlayerPosition));

        // Recovers once everything is back.
        assert!(scheduler.tick(world.env()).report().is_some());
    }

    #[test]
    fn test_empty_candidate_set_idles() {
        let mut world = World::new(seeded(10));
        world.add(NpcRecord::new("far", Vec2::new(500.0, 500.0)));
        let mut scheduler = SimulationScheduler::new(&world.config);

        assert_eq!(scheduler.tick(world.env()), TickOutcome::Idle);
        assert!((scheduler.time_until_tick() - world.config.idle_backoff_interval).abs() < 1e-6);
        assert!(scheduler.update(0.1, world.env()).is_none());
    }

    #[test]
    fn test_far_must_run_records_are_candidates() {
        let mut world = World::new(seeded(10));
        let cashier = world.add(
            NpcRecord::new("cashier", Vec2::new(400.0, 0.0))
                .with_state(Some(StateTag::Cheap(CheapState::CashierAtRegister))),
        );
        let mut walker = NpcRecord::new("walker", Vec2::new(-400.0, 0.0))
            .with_state(Some(StateTag::Cheap(CheapState::Exiting)))
            .with_position(Vec2::new(-380.0, 0.0));
        walker.simulated_target_position = Some(Vec2::new(-400.0, 0.0));
        let walker = world.add(walker);
        world.add(NpcRecord::new("sleeper", Vec2::new(0.0, 400.0)));

        let mut scheduler = SimulationScheduler::new(&world.config);
        let outcome = scheduler.tick(world.env());
        let report = outcome.report().expect("tick ran");
        assert_eq!(report.processed, vec![cashier, walker]);
    }

    #[test]
    fn test_stale_rich_tag_recovered() {
        let mut world = World::new(seeded(10));
        let index = world.add(
            NpcRecord::new("stale", Vec2::ZERO).with_state(Some(StateTag::Rich(
                crate::state::RichState::InQueue,
            ))),
        );
        let mut scheduler = SimulationScheduler::new(&world.config);
        let outcome = scheduler.tick(world.env());
        let report = outcome.report().expect("tick ran");

        assert_eq!(report.recovered, vec![index]);
        let record = world.registry.get(index).expect("record");
        assert_eq!(record.cheap_state(), Some(CheapState::WaitForCashier));
        assert!(record.pending_enter());
    }

    #[test]
    fn test_missing_handler_forces_patrol() {
        let mut world = World::new(seeded(10));
        world.handlers.unregister(CheapState::Browse);
        let index = world.add(
            NpcRecord::new("orphan", Vec2::ZERO).with_state(Some(StateTag::Cheap(CheapState::Browse))),
        );
        let mut scheduler = SimulationScheduler::new(&world.config);
        scheduler.tick(world.env());

        let record = world.registry.get(index).expect("record");
        assert_eq!(record.cheap_state(), Some(CheapState::Patrol));
    }

    #[test]
    fn test_movement_updates_spatial_index() {
        let mut world = World::new(seeded(10));
        let mut record = NpcRecord::new("walker", Vec2::ZERO)
            .with_state(Some(StateTag::Cheap(CheapState::Exiting)))
            .with_position(Vec2::new(5.0, 0.0));
        record.simulated_target_position = Some(Vec2::ZERO);
        let index = world.registry.insert(record).expect("insert");
        world.grid.add_record(index, Vec2::new(5.0, 0.0));

        let mut scheduler = SimulationScheduler::new(&world.config);
        scheduler.tick(world.env());

        let moved = world.registry.get(index).expect("record").position();
        assert!(moved.x < 5.0);
        assert_eq!(world.grid.position_of(index), Some(moved));
    }

    #[test]
    fn test_record_dt_is_capped() {
        let config = seeded(10);
        let mut scheduler = SimulationScheduler::new(&config);
        let mut record = NpcRecord::new("r", Vec2::ZERO);
        assert!((scheduler.record_dt(&record, &config) - config.tick_interval).abs() < 1e-6);

        record.last_simulated_at = Some(0.0);
        scheduler.clock = 100.0;
        assert!((scheduler.record_dt(&record, &config) - config.max_sim_step).abs() < 1e-6);
    }
}
