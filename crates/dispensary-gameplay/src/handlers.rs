//! Cheap-state handlers that advance a record without a spawned actor.
//!
//! Each [`CheapState`] has one handler with three hooks. `on_enter` prepares
//! scratch fields and may use randomness; `tick` advances purely from `dt`,
//! the scratch fields and the read-only queries in [`SimContext`]. A hook
//! returns `Some(next)` to ask for a transition, which the caller applies
//! after the hook returns.

use ahash::AHashMap;
use dispensary_common::{geometry, Vec2};
use tracing::{debug, warn};

use crate::config::SimulationConfig;
use crate::paths::{PathRegistry, PathStep};
use crate::record::NpcRecord;
use crate::state::{CheapState, StateTag};
use crate::time::GameClock;

/// Read-only world queries a cheap handler may use, plus the wander RNG.
pub struct SimContext<'a> {
    /// Active tunables.
    pub config: &'a SimulationConfig,
    /// Current game time.
    pub clock: GameClock,
    /// Path registry.
    pub paths: &'a PathRegistry,
    /// Randomness for `on_enter` choices.
    pub rng: &'a mut fastrand::Rng,
}

/// Behavior of one cheap state.
pub trait BasicStateHandler {
    /// The state this handler drives.
    fn state(&self) -> CheapState;

    /// Prepares scratch fields. May ask for a fallback transition.
    fn on_enter(&self, record: &mut NpcRecord, ctx: &mut SimContext<'_>) -> Option<CheapState> {
        let _ = (record, ctx);
        None
    }

    /// Advances the record by `dt` seconds. May ask for a transition.
    fn tick(&self, record: &mut NpcRecord, dt: f32, ctx: &SimContext<'_>) -> Option<CheapState>;

    /// Cleans up before the record leaves this state.
    fn on_exit(&self, record: &mut NpcRecord) {
        let _ = record;
    }
}

/// Moves the record towards `target`. Returns whether it arrived.
fn walk(record: &mut NpcRecord, target: Vec2, dt: f32, config: &SimulationConfig) -> bool {
    if record.position.distance(target) <= config.arrival_tolerance {
        return true;
    }
    let (next, arrived) = geometry::step_towards(record.position, target, config.walk_speed * dt);
    if let Some(heading) = geometry::heading(record.position, next) {
        record.rotation = heading;
    }
    record.position = next;
    arrived || next.distance(target) <= config.arrival_tolerance
}

fn count_down(record: &mut NpcRecord, dt: f32) -> bool {
    record.simulated_state_timer -= dt;
    record.simulated_state_timer <= 0.0
}

/// Dormant at home until the scheduler starts the day.
#[derive(Debug, Default)]
pub struct IdleAtHomeHandler;

impl BasicStateHandler for IdleAtHomeHandler {
    fn state(&self) -> CheapState {
        CheapState::IdleAtHome
    }

    fn on_enter(&self, record: &mut NpcRecord, _ctx: &mut SimContext<'_>) -> Option<CheapState> {
        let (home, facing) = (record.home_position, record.home_rotation);
        record.set_pose(home, facing);
        record.clear_movement_scratch();
        record.clear_path_scratch();
        None
    }

    fn tick(&self, _record: &mut NpcRecord, _dt: f32, _ctx: &SimContext<'_>) -> Option<CheapState> {
        None
    }
}

/// Wander between random points around home, pausing in between.
#[derive(Debug, Default)]
pub struct PatrolHandler;

impl BasicStateHandler for PatrolHandler {
    fn state(&self) -> CheapState {
        CheapState::Patrol
    }

    fn on_enter(&self, record: &mut NpcRecord, ctx: &mut SimContext<'_>) -> Option<CheapState> {
        let angle = ctx.rng.f32() * std::f32::consts::TAU;
        let distance = ctx.rng.f32() * ctx.config.wander_radius;
        let offset = Vec2::new(angle.cos(), angle.sin()) * distance;
        let pause_span = ctx.config.wander_pause_max - ctx.config.wander_pause_min;

        record.simulated_target_position = Some(record.home_position + offset);
        record.simulated_state_timer = ctx.config.wander_pause_min + ctx.rng.f32() * pause_span;
        None
    }

    fn tick(&self, record: &mut NpcRecord, dt: f32, ctx: &SimContext<'_>) -> Option<CheapState> {
        if !record.schedule.is_day_active(ctx.clock) {
            return Some(CheapState::Exiting);
        }
        if let Some(target) = record.simulated_target_position {
            if walk(record, target, dt, ctx.config) {
                record.simulated_target_position = None;
            }
            return None;
        }
        // Re-entering picks the next wander leg.
        count_down(record, dt).then_some(CheapState::Patrol)
    }
}

/// Walk the saved waypoint path.
#[derive(Debug, Default)]
pub struct PathFollowHandler;

impl BasicStateHandler for PathFollowHandler {
    fn state(&self) -> CheapState {
        CheapState::PathFollow
    }

    fn on_enter(&self, record: &mut NpcRecord, ctx: &mut SimContext<'_>) -> Option<CheapState> {
        let waypoint = record
            .simulated_path
            .as_ref()
            .and_then(|progress| ctx.paths.waypoint(progress));
        match waypoint {
            Some(target) => {
                record.simulated_target_position = Some(target);
                None
            },
            None => {
                warn!(
                    "NPC {} entered path-follow with invalid path {:?}, falling back",
                    record.id(),
                    record.simulated_path
                );
                record.clear_path_scratch();
                record.clear_movement_scratch();
                Some(CheapState::DEFAULT)
            },
        }
    }

    fn tick(&self, record: &mut NpcRecord, dt: f32, ctx: &SimContext<'_>) -> Option<CheapState> {
        let Some(progress) = record.simulated_path.clone() else {
            return Some(CheapState::DEFAULT);
        };
        let Some(target) = record.simulated_target_position.or_else(|| ctx.paths.waypoint(&progress))
        else {
            record.clear_path_scratch();
            return Some(CheapState::DEFAULT);
        };
        record.simulated_target_position = Some(target);
        if !walk(record, target, dt, ctx.config) {
            return None;
        }

        match ctx.paths.advance(&progress) {
            PathStep::Next(next) => {
                record.simulated_target_position = ctx.paths.waypoint(&next);
                record.simulated_path = Some(next);
                None
            },
            PathStep::Finished => {
                debug!("NPC {} finished path {}", record.id(), progress.path_id);
                record.clear_path_scratch();
                record.simulated_target_position = None;
                Some(CheapState::Patrol)
            },
        }
    }
}

/// Stand somewhere for a configured time, then move on.
pub struct TimedErrandHandler {
    state: CheapState,
    duration: fn(&SimulationConfig) -> f32,
    next: CheapState,
}

impl TimedErrandHandler {
    /// Creates an errand that lasts `duration(config)` seconds then asks for `next`.
    #[must_use]
    pub fn new(state: CheapState, duration: fn(&SimulationConfig) -> f32, next: CheapState) -> Self {
        Self {
            state,
            duration,
            next,
        }
    }
}

impl BasicStateHandler for TimedErrandHandler {
    fn state(&self) -> CheapState {
        self.state
    }

    fn on_enter(&self, record: &mut NpcRecord, ctx: &mut SimContext<'_>) -> Option<CheapState> {
        record.simulated_target_position = None;
        record.simulated_state_timer = (self.duration)(ctx.config);
        None
    }

    fn tick(&self, record: &mut NpcRecord, dt: f32, _ctx: &SimContext<'_>) -> Option<CheapState> {
        count_down(record, dt).then_some(self.next)
    }
}

/// Staff serving the register until the end of their day.
#[derive(Debug, Default)]
pub struct CashierAtRegisterHandler;

impl BasicStateHandler for CashierAtRegisterHandler {
    fn state(&self) -> CheapState {
        CheapState::CashierAtRegister
    }

    fn on_enter(&self, record: &mut NpcRecord, _ctx: &mut SimContext<'_>) -> Option<CheapState> {
        record.simulated_target_position = None;
        record.simulated_state_timer = 0.0;
        None
    }

    fn tick(&self, record: &mut NpcRecord, dt: f32, ctx: &SimContext<'_>) -> Option<CheapState> {
        if !record.schedule.is_day_active(ctx.clock) {
            return Some(CheapState::Exiting);
        }
        // Time on shift, counted up.
        record.simulated_state_timer += dt;
        None
    }
}

/// Walk home, then go dormant.
#[derive(Debug, Default)]
pub struct ExitingHandler;

impl BasicStateHandler for ExitingHandler {
    fn state(&self) -> CheapState {
        CheapState::Exiting
    }

    fn on_enter(&self, record: &mut NpcRecord, _ctx: &mut SimContext<'_>) -> Option<CheapState> {
        record.clear_path_scratch();
        record.simulated_target_position = Some(record.home_position);
        None
    }

    fn tick(&self, record: &mut NpcRecord, dt: f32, ctx: &SimContext<'_>) -> Option<CheapState> {
        let home = record.home_position;
        walk(record, home, dt, ctx.config).then_some(CheapState::IdleAtHome)
    }
}

/// Registered handlers by cheap state.
pub struct BasicStateHandlerSet {
    handlers: AHashMap<CheapState, Box<dyn BasicStateHandler>>,
}

impl Default for BasicStateHandlerSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for BasicStateHandlerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut states: Vec<_> = self.handlers.keys().collect();
        states.sort_unstable();
        f.debug_struct("BasicStateHandlerSet")
            .field("states", &states)
            .finish()
    }
}

impl BasicStateHandlerSet {
    /// A set with no handlers.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            handlers: AHashMap::new(),
        }
    }

    /// Handlers for every cheap state.
    #[must_use]
    pub fn standard() -> Self {
        let mut set = Self::empty();
        set.register(Box::new(IdleAtHomeHandler));
        set.register(Box::new(PatrolHandler));
        set.register(Box::new(PathFollowHandler));
        set.register(Box::new(TimedErrandHandler::new(
            CheapState::Browse,
            |c| c.browse_duration,
            CheapState::WaitForCashier,
        )));
        set.register(Box::new(TimedErrandHandler::new(
            CheapState::WaitForCashier,
            |c| c.checkout_duration,
            CheapState::Exiting,
        )));
        set.register(Box::new(TimedErrandHandler::new(
            CheapState::WaitForPrescriptionQueue,
            |c| c.prescription_wait,
            CheapState::WaitAtPrescriptionSpot,
        )));
        set.register(Box::new(TimedErrandHandler::new(
            CheapState::WaitAtPrescriptionSpot,
            |c| c.counter_wait,
            CheapState::Exiting,
        )));
        set.register(Box::new(TimedErrandHandler::new(
            CheapState::WaitForDelivery,
            |c| c.counter_wait,
            CheapState::Exiting,
        )));
        set.register(Box::new(CashierAtRegisterHandler));
        set.register(Box::new(ExitingHandler));
        set
    }

    /// Registers or replaces the handler for its state.
    pub fn register(&mut self, handler: Box<dyn BasicStateHandler>) {
        self.handlers.insert(handler.state(), handler);
    }

    /// Removes the handler for a state.
    pub fn unregister(&mut self, state: CheapState) {
        self.handlers.remove(&state);
    }

    /// Handler for a state.
    #[must_use]
    pub fn get(&self, state: CheapState) -> Option<&dyn BasicStateHandler> {
        self.handlers.get(&state).map(AsRef::as_ref)
    }

    /// Whether a state has a handler.
    #[must_use]
    pub fn contains(&self, state: CheapState) -> bool {
        self.handlers.contains_key(&state)
    }

    /// Switches the record to `next`, deferring `on_enter` to the next visit.
    pub fn transition(&self, record: &mut NpcRecord, next: CheapState) {
        if let Some(current) = record.cheap_state() {
            if let Some(handler) = self.get(current) {
                handler.on_exit(record);
            }
        }
        debug!(
            "NPC {} cheap transition {:?} -> {next}",
            record.id(),
            record.state()
        );
        record.simulated_target_position = None;
        record.set_state(Some(StateTag::Cheap(next)));
        record.pending_enter = true;
    }

    /// Runs `on_enter` for the record's current state right now.
    ///
    /// A fallback requested by `on_enter` is applied with a deferred enter.
    /// Returns the state the record ends up in.
    pub fn enter_now(&self, record: &mut NpcRecord, ctx: &mut SimContext<'_>) -> Option<CheapState> {
        let state = record.cheap_state()?;
        record.pending_enter = false;
        let fallback = self.get(state).and_then(|handler| handler.on_enter(record, ctx));
        if let Some(next) = fallback {
            self.transition(record, next);
        }
        record.cheap_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::{PathMode, WaypointPath};
    use crate::record::PathProgress;

    fn paths() -> PathRegistry {
        let mut paths = PathRegistry::new();
        paths
            .insert(
                "aisle",
                WaypointPath::new(vec![Vec2::ZERO, Vec2::new(2.0, 0.0)], PathMode::Once),
            )
            .expect("insert");
        paths
    }

    fn record_in(state: CheapState) -> NpcRecord {
        NpcRecord::new("r", Vec2::ZERO).with_state(Some(StateTag::Cheap(state)))
    }

    #[test]
    fn test_standard_covers_every_state() {
        let set = BasicStateHandlerSet::standard();
        for state in CheapState::ALL {
            assert!(set.contains(state), "missing handler for {state}");
        }
    }

    #[test]
    fn test_patrol_enter_picks_target_within_radius() {
        let config = SimulationConfig::default();
        let paths = paths();
        let mut rng = fastrand::Rng::with_seed(3);
        let mut ctx = SimContext {
            config: &config,
            clock: GameClock::at_hour(12.0),
            paths: &paths,
            rng: &mut rng,
        };
        let mut record = record_in(CheapState::Patrol);
        assert!(PatrolHandler.on_enter(&mut record, &mut ctx).is_none());

        let target = record.simulated_target_position().expect("target");
        assert!(target.distance(record.home_position()) <= config.wander_radius + 1e-4);
        assert!(record.simulated_state_timer() >= config.wander_pause_min);
    }

    #[test]
    fn test_patrol_heads_home_after_day_ends() {
        let config = SimulationConfig::default();
        let paths = paths();
        let mut rng = fastrand::Rng::with_seed(1);
        let ctx = SimContext {
            config: &config,
            clock: GameClock::at_hour(21.0),
            paths: &paths,
            rng: &mut rng,
        };
        let mut record = record_in(CheapState::Patrol);
        assert_eq!(
            PatrolHandler.tick(&mut record, 1.0, &ctx),
            Some(CheapState::Exiting)
        );
    }

    #[test]
    fn test_path_follow_enter_with_unknown_path_falls_back() {
        let config = SimulationConfig::default();
        let paths = paths();
        let mut rng = fastrand::Rng::with_seed(1);
        let mut ctx = SimContext {
            config: &config,
            clock: GameClock::at_hour(12.0),
            paths: &paths,
            rng: &mut rng,
        };
        let mut record = record_in(CheapState::PathFollow).with_path(PathProgress::new("nope", 0, false));
        assert_eq!(
            PathFollowHandler.on_enter(&mut record, &mut ctx),
            Some(CheapState::DEFAULT)
        );
        assert!(!record.is_following_path_basic());
    }

    #[test]
    fn test_path_follow_advances_and_finishes() {
        let config = SimulationConfig::default();
        let paths = paths();
        let mut rng = fastrand::Rng::with_seed(1);
        let mut ctx = SimContext {
            config: &config,
            clock: GameClock::at_hour(12.0),
            paths: &paths,
            rng: &mut rng,
        };
        let mut record =
            record_in(CheapState::PathFollow).with_path(PathProgress::new("aisle", 0, false));
        assert!(PathFollowHandler.on_enter(&mut record, &mut ctx).is_none());

        // Already standing on waypoint 0.
        assert!(PathFollowHandler.tick(&mut record, 0.1, &ctx).is_none());
        assert_eq!(record.simulated_path().map(|p| p.waypoint_index), Some(1));

        // Two units at 1.4/s needs two seconds.
        assert!(PathFollowHandler.tick(&mut record, 1.0, &ctx).is_none());
        assert_eq!(
            PathFollowHandler.tick(&mut record, 1.0, &ctx),
            Some(CheapState::Patrol)
        );
        assert!(!record.is_following_path_basic());
    }

    #[test]
    fn test_timed_errand_counts_down() {
        let config = SimulationConfig {
            browse_duration: 3.0,
            ..Default::default()
        };
        let paths = paths();
        let mut rng = fastrand::Rng::with_seed(1);
        let mut ctx = SimContext {
            config: &config,
            clock: GameClock::at_hour(12.0),
            paths: &paths,
            rng: &mut rng,
        };
        let set = BasicStateHandlerSet::standard();
        let handler = set.get(CheapState::Browse).expect("browse handler");
        let mut record = record_in(CheapState::Browse);
        handler.on_enter(&mut record, &mut ctx);

        assert!(handler.tick(&mut record, 2.0, &ctx).is_none());
        assert_eq!(
            handler.tick(&mut record, 1.5, &ctx),
            Some(CheapState::WaitForCashier)
        );
    }

    #[test]
    fn test_exiting_reaches_home_and_goes_dormant() {
        let config = SimulationConfig::default();
        let paths = paths();
        let mut rng = fastrand::Rng::with_seed(1);
        let mut ctx = SimContext {
            config: &config,
            clock: GameClock::at_hour(19.0),
            paths: &paths,
            rng: &mut rng,
        };
        let mut record = record_in(CheapState::Exiting).with_position(Vec2::new(1.0, 0.0));
        ExitingHandler.on_enter(&mut record, &mut ctx);
        assert_eq!(
            ExitingHandler.tick(&mut record, 1.0, &ctx),
            Some(CheapState::IdleAtHome)
        );
        assert_eq!(record.position(), record.home_position());
    }

    #[test]
    fn test_transition_defers_enter() {
        let set = BasicStateHandlerSet::standard();
        let mut record = record_in(CheapState::Patrol);
        record.simulated_target_position = Some(Vec2::ONE);
        set.transition(&mut record, CheapState::Browse);

        assert_eq!(record.cheap_state(), Some(CheapState::Browse));
        assert!(record.pending_enter());
        assert!(record.simulated_target_position().is_none());
    }
}
