//! Rich actor: the expensive, spawned representation of an NPC.
//!
//! Timed behaviour uses explicit state-entry timestamps. Every state entry
//! bumps a [`StateToken`]; a [`PendingWait`] only fires while the token it
//! was scheduled under is still current, so a wait whose state was
//! superseded is dropped without publishing anything.

use dispensary_common::{geometry, ActorHandle, NpcId, ProfileRef, Vec2};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::SimulationConfig;
use crate::paths::{PathRegistry, PathStep};
use crate::record::PathProgress;
use crate::resources::Assignment;
use crate::shopping::BrowseDestination;
use crate::state::RichState;

/// Generation of an actor's current state. Changes on every state entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StateToken(u64);

impl StateToken {
    /// Raw generation.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// "Wait, then switch state", bound to the state it was scheduled in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingWait {
    /// State generation that owns the wait.
    pub token: StateToken,
    /// Actor clock time at which the wait is due.
    pub due_at: f64,
    /// State to enter when due.
    pub then: RichState,
}

/// A spawned NPC.
#[derive(Debug, Clone)]
pub struct RichActor {
    handle: ActorHandle,
    npc_id: NpcId,
    profile: ProfileRef,
    home: Vec2,

    state: RichState,
    token: StateToken,
    clock: f64,
    state_entered_at: f64,
    waits: Vec<PendingWait>,

    position: Vec2,
    rotation: f32,
    move_target: Option<Vec2>,

    live_path: Option<PathProgress>,
    interrupted_path: Option<PathProgress>,
    assignment: Option<Assignment>,
    browse_destination: Option<BrowseDestination>,
}

impl RichActor {
    /// Creates an idle actor at `position`.
    #[must_use]
    pub fn new(
        handle: ActorHandle,
        npc_id: NpcId,
        profile: ProfileRef,
        home: Vec2,
        position: Vec2,
        rotation: f32,
    ) -> Self {
        Self {
            handle,
            npc_id,
            profile,
            home,
            state: RichState::DEFAULT,
            token: StateToken::default(),
            clock: 0.0,
            state_entered_at: 0.0,
            waits: Vec::new(),
            position,
            rotation,
            move_target: None,
            live_path: None,
            interrupted_path: None,
            assignment: None,
            browse_destination: None,
        }
    }

    /// Pool handle.
    #[must_use]
    pub fn handle(&self) -> ActorHandle {
        self.handle
    }

    /// NPC this actor represents.
    #[must_use]
    pub fn npc_id(&self) -> &NpcId {
        &self.npc_id
    }

    /// Asset profile the actor was spawned from.
    #[must_use]
    pub fn profile(&self) -> &ProfileRef {
        &self.profile
    }

    /// Current rich state.
    #[must_use]
    pub fn state(&self) -> RichState {
        self.state
    }

    /// Generation of the current state.
    #[must_use]
    pub fn token(&self) -> StateToken {
        self.token
    }

    /// Seconds spent in the current state.
    #[must_use]
    pub fn time_in_state(&self) -> f32 {
        (self.clock - self.state_entered_at) as f32
    }

    /// Whether the actor may be torn down right now.
    #[must_use]
    pub fn is_interruptible(&self) -> bool {
        self.state.is_interruptible()
    }

    /// Current position.
    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Current facing in radians.
    #[must_use]
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    /// Point the actor is walking to.
    #[must_use]
    pub fn move_target(&self) -> Option<Vec2> {
        self.move_target
    }

    /// Path progress while walking a path.
    #[must_use]
    pub fn live_path(&self) -> Option<&PathProgress> {
        self.live_path.as_ref()
    }

    /// Path progress saved when a path walk was interrupted.
    #[must_use]
    pub fn interrupted_path(&self) -> Option<&PathProgress> {
        self.interrupted_path.as_ref()
    }

    /// Resource slot the actor holds.
    #[must_use]
    pub fn assignment(&self) -> Option<&Assignment> {
        self.assignment.as_ref()
    }

    /// Shelf the actor is browsing.
    #[must_use]
    pub fn browse_destination(&self) -> Option<&BrowseDestination> {
        self.browse_destination.as_ref()
    }

    /// Waits scheduled and not yet fired or dropped.
    #[must_use]
    pub fn pending_waits(&self) -> &[PendingWait] {
        &self.waits
    }

    /// Places the actor without walking.
    pub fn warp_to(&mut self, position: Vec2) {
        self.position = position;
        self.move_target = None;
    }

    /// Sets path progress before entering [`RichState::FollowPath`].
    pub fn set_live_path(&mut self, progress: Option<PathProgress>) {
        self.live_path = progress;
    }

    /// Wires a claimed resource slot; the actor walks to it.
    pub fn set_assignment(&mut self, assignment: Option<Assignment>) {
        self.move_target = assignment.map(|a| a.position);
        self.assignment = assignment;
    }

    /// Wires a browse destination; the actor walks to it.
    pub fn set_browse_destination(&mut self, destination: Option<BrowseDestination>) {
        if let Some(destination) = destination {
            self.move_target = Some(destination.position);
        }
        self.browse_destination = destination;
    }

    /// Takes the interrupted-path holder, leaving it empty.
    pub fn take_interrupted_path(&mut self) -> Option<PathProgress> {
        self.interrupted_path.take()
    }

    /// Enters `state`, superseding any wait scheduled in the previous one.
    ///
    /// Durations of timed states come from `config`.
    pub fn enter_state(&mut self, state: RichState, config: &SimulationConfig) -> StateToken {
        trace!("Actor {} {} -> {}", self.handle, self.state, state);
        self.state = state;
        self.token = self.token.next();
        self.state_entered_at = self.clock;

        match state {
            RichState::Browsing => {
                self.schedule_wait(config.browse_duration, RichState::MovingToCheckout);
            },
            RichState::MovingToCheckout
            | RichState::MovingToRegister
            | RichState::InQueue
            | RichState::WaitingAtRegister => {
                self.schedule_wait(config.checkout_duration, RichState::Exiting);
            },
            RichState::MovingToPrescriptionQueue | RichState::InPrescriptionQueue => {
                self.schedule_wait(config.prescription_wait, RichState::WaitingAtPrescriptionSpot);
            },
            RichState::WaitingAtPrescriptionSpot | RichState::WaitingForDelivery => {
                self.schedule_wait(config.counter_wait, RichState::Exiting);
            },
            RichState::Reacting => {
                self.schedule_wait(config.wander_pause_min, RichState::FollowPath);
            },
            RichState::Exiting => {
                self.move_target = Some(self.home);
            },
            RichState::Idle
            | RichState::Wandering
            | RichState::FollowPath
            | RichState::CashierMovingToRegister
            | RichState::CashierAtRegister
            | RichState::Combat => {},
        }
        self.token
    }

    /// Schedules a wait bound to the current state.
    pub fn schedule_wait(&mut self, seconds: f32, then: RichState) -> PendingWait {
        let wait = PendingWait {
            token: self.token,
            due_at: self.clock + f64::from(seconds.max(0.0)),
            then,
        };
        self.waits.push(wait);
        wait
    }

    /// Leaves a path walk for `state`, remembering where the walk stopped.
    ///
    /// Does nothing unless the actor is walking a path.
    pub fn interrupt_path(&mut self, state: RichState, config: &SimulationConfig) -> bool {
        if self.state != RichState::FollowPath {
            return false;
        }
        let Some(progress) = self.live_path.take() else {
            return false;
        };
        debug!(
            "Actor {} interrupted on path {} at waypoint {}",
            self.handle, progress.path_id, progress.waypoint_index
        );
        self.interrupted_path = Some(progress);
        self.move_target = None;
        self.enter_state(state, config);
        true
    }

    /// Returns to the interrupted path walk, if there is one.
    pub fn resume_interrupted_path(&mut self, config: &SimulationConfig) -> bool {
        let Some(progress) = self.interrupted_path.take() else {
            return false;
        };
        self.live_path = Some(progress);
        self.move_target = None;
        self.enter_state(RichState::FollowPath, config);
        true
    }

    /// Advances one frame. Returns a state the actor asks to enter.
    ///
    /// The caller applies the request so it can release or claim resources
    /// around the switch.
    pub fn update(
        &mut self,
        dt: f32,
        paths: &PathRegistry,
        config: &SimulationConfig,
    ) -> Option<RichState> {
        self.clock += f64::from(dt);

        if let Some(next) = self.poll_waits() {
            return Some(next);
        }

        if self.state == RichState::FollowPath {
            return self.walk_path(dt, paths, config);
        }

        let target = self.move_target?;
        if self.step(target, dt, config) {
            self.move_target = None;
            if self.state == RichState::Exiting {
                return Some(RichState::Idle);
            }
        }
        None
    }

    /// Drops superseded waits and fires the first due one.
    fn poll_waits(&mut self) -> Option<RichState> {
        let token = self.token;
        self.waits.retain(|wait| wait.token == token);
        let due = self.waits.iter().position(|wait| wait.due_at <= self.clock)?;
        Some(self.waits.remove(due).then)
    }

    fn walk_path(&mut self, dt: f32, paths: &PathRegistry, config: &SimulationConfig) -> Option<RichState> {
        let Some(progress) = self.live_path.clone() else {
            return Some(RichState::Wandering);
        };
        let Some(target) = paths.waypoint(&progress) else {
            self.live_path = None;
            return Some(RichState::Wandering);
        };
        if !self.step(target, dt, config) {
            return None;
        }
        match paths.advance(&progress) {
            PathStep::Next(next) => {
                self.live_path = Some(next);
                None
            },
            PathStep::Finished => {
                self.live_path = None;
                Some(RichState::Wandering)
            },
        }
    }

    fn step(&mut self, target: Vec2, dt: f32, config: &SimulationConfig) -> bool {
        let (next, arrived) = geometry::step_towards(self.position, target, config.walk_speed * dt);
        if let Some(heading) = geometry::heading(self.position, next) {
            self.rotation = heading;
        }
        self.position = next;
        arrived || next.distance(target) <= config.arrival_tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::{PathMode, WaypointPath};

    fn actor() -> RichActor {
        RichActor::new(
            ActorHandle::new(0, 1),
            NpcId::new("a"),
            ProfileRef::default(),
            Vec2::ZERO,
            Vec2::ZERO,
            0.0,
        )
    }

    fn paths() -> PathRegistry {
        let mut paths = PathRegistry::new();
        paths
            .insert(
                "A",
                WaypointPath::new(
                    vec![Vec2::ZERO, Vec2::X, Vec2::new(2.0, 0.0), Vec2::new(3.0, 0.0), Vec2::new(4.0, 0.0)],
                    PathMode::Once,
                ),
            )
            .expect("path");
        paths
    }

    #[test]
    fn test_wait_fires_when_due() {
        let config = SimulationConfig {
            browse_duration: 1.0,
            ..Default::default()
        };
        let paths = paths();
        let mut actor = actor();
        actor.enter_state(RichState::Browsing, &config);

        assert_eq!(actor.update(0.5, &paths, &config), None);
        assert_eq!(actor.update(0.6, &paths, &config), Some(RichState::MovingToCheckout));
        assert!(actor.pending_waits().is_empty());
    }

    #[test]
    fn test_superseded_wait_is_dropped() {
        let config = SimulationConfig {
            browse_duration: 1.0,
            ..Default::default()
        };
        let paths = paths();
        let mut actor = actor();
        let first = actor.enter_state(RichState::Browsing, &config);
        let second = actor.enter_state(RichState::Wandering, &config);
        assert_ne!(first, second);

        assert_eq!(actor.update(5.0, &paths, &config), None);
        assert!(actor.pending_waits().is_empty());
        assert_eq!(actor.state(), RichState::Wandering);
    }

    #[test]
    fn test_interrupt_and_resume_path() {
        let config = SimulationConfig::default();
        let mut actor = actor();
        actor.set_live_path(Some(PathProgress::new("A", 3, false)));
        actor.enter_state(RichState::FollowPath, &config);

        assert!(actor.interrupt_path(RichState::Reacting, &config));
        assert_eq!(actor.state(), RichState::Reacting);
        assert!(actor.live_path().is_none());
        assert_eq!(actor.interrupted_path(), Some(&PathProgress::new("A", 3, false)));

        assert!(actor.resume_interrupted_path(&config));
        assert_eq!(actor.state(), RichState::FollowPath);
        assert_eq!(actor.live_path(), Some(&PathProgress::new("A", 3, false)));
        assert!(actor.interrupted_path().is_none());
    }

    #[test]
    fn test_interrupt_requires_path_walk() {
        let config = SimulationConfig::default();
        let mut actor = actor();
        actor.enter_state(RichState::Wandering, &config);
        assert!(!actor.interrupt_path(RichState::Reacting, &config));
        assert!(actor.interrupted_path().is_none());
    }

    #[test]
    fn test_path_walk_advances_waypoints() {
        let config = SimulationConfig::default();
        let paths = paths();
        let mut actor = actor();
        actor.set_live_path(Some(PathProgress::new("A", 0, false)));
        actor.enter_state(RichState::FollowPath, &config);

        // Standing on waypoint 0.
        assert_eq!(actor.update(0.1, &paths, &config), None);
        assert_eq!(actor.live_path().map(|p| p.waypoint_index), Some(1));
    }

    #[test]
    fn test_exiting_walks_home_then_idles() {
        let config = SimulationConfig::default();
        let paths = paths();
        let mut actor = actor();
        actor.warp_to(Vec2::new(1.0, 0.0));
        actor.enter_state(RichState::Exiting, &config);
        assert_eq!(actor.update(1.0, &paths, &config), Some(RichState::Idle));
        assert_eq!(actor.position(), Vec2::ZERO);
    }

    #[test]
    fn test_combat_blocks_interruption() {
        let config = SimulationConfig::default();
        let mut actor = actor();
        actor.enter_state(RichState::Combat, &config);
        assert!(!actor.is_interruptible());
    }
}
