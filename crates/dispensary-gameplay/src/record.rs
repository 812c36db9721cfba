//! Persistent NPC record, independent of how the NPC is currently driven.
//!
//! One record exists per NPC identity for the whole session. It is mutated
//! in place by whichever representation owns it: the rich actor while
//! `is_active`, the batched simulation otherwise. Ownership flips happen only
//! inside the activation and deactivation paths of the director.

use dispensary_common::{ActorHandle, NpcId, ProfileRef, Vec2};
use serde::{Deserialize, Serialize};

use crate::state::{CheapState, RichState, StateTag};
use crate::time::{DailySchedule, GameClock};

/// Progress along a named waypoint path.
///
/// The three fields are kept together so they can only be set or cleared as
/// a unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathProgress {
    /// Path id in the path registry.
    pub path_id: String,
    /// Index of the waypoint currently being walked to.
    pub waypoint_index: usize,
    /// Walking the path back to front.
    pub reverse: bool,
}

impl PathProgress {
    /// Creates path progress.
    #[must_use]
    pub fn new(path_id: impl Into<String>, waypoint_index: usize, reverse: bool) -> Self {
        Self {
            path_id: path_id.into(),
            waypoint_index,
            reverse,
        }
    }
}

/// What a record does when its day starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStartBehavior {
    /// Start walking a path from the given progress.
    FollowPath(PathProgress),
    /// Start in a rich state directly.
    Enter(RichState),
}

impl Default for DayStartBehavior {
    fn default() -> Self {
        Self::Enter(RichState::Wandering)
    }
}

/// Persistent record of one NPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcRecord {
    id: NpcId,
    pub(crate) home_position: Vec2,
    pub(crate) home_rotation: f32,
    pub(crate) position: Vec2,
    pub(crate) rotation: f32,
    pub(crate) state: Option<StateTag>,
    pub(crate) is_active: bool,
    pub(crate) actor_handle: Option<ActorHandle>,

    pub(crate) simulated_target_position: Option<Vec2>,
    pub(crate) simulated_state_timer: f32,
    pub(crate) simulated_path: Option<PathProgress>,
    /// Tag was switched; its `on_enter` runs at the next visit.
    #[serde(default)]
    pub(crate) pending_enter: bool,
    /// Scheduler clock of the last visit, used to derive per-record dt.
    #[serde(default)]
    pub(crate) last_simulated_at: Option<f64>,

    pub(crate) schedule: DailySchedule,
    pub(crate) day_start: DayStartBehavior,
    pub(crate) can_start_day: bool,
    pub(crate) profile: ProfileRef,
}

impl NpcRecord {
    /// Creates a dormant record at its home pose.
    #[must_use]
    pub fn new(id: impl Into<NpcId>, home_position: Vec2) -> Self {
        Self {
            id: id.into(),
            home_position,
            home_rotation: 0.0,
            position: home_position,
            rotation: 0.0,
            state: Some(StateTag::Cheap(CheapState::IdleAtHome)),
            is_active: false,
            actor_handle: None,
            simulated_target_position: None,
            simulated_state_timer: 0.0,
            simulated_path: None,
            pending_enter: false,
            last_simulated_at: None,
            schedule: DailySchedule::default(),
            day_start: DayStartBehavior::default(),
            can_start_day: true,
            profile: ProfileRef::default(),
        }
    }

    /// Sets the home facing; the current facing follows.
    #[must_use]
    pub fn with_home_rotation(mut self, rotation: f32) -> Self {
        self.home_rotation = rotation;
        self.rotation = rotation;
        self
    }

    /// Places the record somewhere other than home.
    #[must_use]
    pub fn with_position(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    /// Sets the daily schedule.
    #[must_use]
    pub fn with_schedule(mut self, schedule: DailySchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Sets the day-start behavior.
    #[must_use]
    pub fn with_day_start(mut self, behavior: DayStartBehavior) -> Self {
        self.day_start = behavior;
        self
    }

    /// Sets the external day-start gate.
    #[must_use]
    pub fn with_can_start_day(mut self, can_start: bool) -> Self {
        self.can_start_day = can_start;
        self
    }

    /// Sets the profile used to materialize an actor.
    #[must_use]
    pub fn with_profile(mut self, profile: ProfileRef) -> Self {
        self.profile = profile;
        self
    }

    /// Sets the initial tag.
    #[must_use]
    pub fn with_state(mut self, tag: Option<StateTag>) -> Self {
        self.state = tag;
        self
    }

    /// Sets saved path progress.
    #[must_use]
    pub fn with_path(mut self, progress: PathProgress) -> Self {
        self.simulated_path = Some(progress);
        self
    }

    /// Stable identity.
    #[must_use]
    pub fn id(&self) -> &NpcId {
        &self.id
    }

    /// Home position.
    #[must_use]
    pub fn home_position(&self) -> Vec2 {
        self.home_position
    }

    /// Home facing in radians.
    #[must_use]
    pub fn home_rotation(&self) -> f32 {
        self.home_rotation
    }

    /// Current authoritative position.
    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Current facing in radians.
    #[must_use]
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    /// Current state tag.
    #[must_use]
    pub fn state(&self) -> Option<StateTag> {
        self.state
    }

    /// Current cheap state, if the tag is a cheap one.
    #[must_use]
    pub fn cheap_state(&self) -> Option<CheapState> {
        self.state.and_then(StateTag::cheap)
    }

    /// Whether a rich actor currently owns this record.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Back-reference to the owning actor, if any.
    #[must_use]
    pub fn actor_handle(&self) -> Option<ActorHandle> {
        self.actor_handle
    }

    /// Simulated movement target, if the record is mid-movement.
    #[must_use]
    pub fn simulated_target_position(&self) -> Option<Vec2> {
        self.simulated_target_position
    }

    /// Countdown used by the current cheap state.
    #[must_use]
    pub fn simulated_state_timer(&self) -> f32 {
        self.simulated_state_timer
    }

    /// Saved path progress.
    #[must_use]
    pub fn simulated_path(&self) -> Option<&PathProgress> {
        self.simulated_path.as_ref()
    }

    /// Whether path scratch is populated.
    #[must_use]
    pub fn is_following_path_basic(&self) -> bool {
        self.simulated_path.is_some()
    }

    /// Whether the record is waiting for its deferred `on_enter`.
    #[must_use]
    pub fn pending_enter(&self) -> bool {
        self.pending_enter
    }

    /// Daily schedule.
    #[must_use]
    pub fn schedule(&self) -> &DailySchedule {
        &self.schedule
    }

    /// Day-start behavior.
    #[must_use]
    pub fn day_start(&self) -> &DayStartBehavior {
        &self.day_start
    }

    /// External day-start gate.
    #[must_use]
    pub fn can_start_day(&self) -> bool {
        self.can_start_day
    }

    /// Asset profile reference.
    #[must_use]
    pub fn profile(&self) -> &ProfileRef {
        &self.profile
    }

    /// The rich state the record begins its day in.
    #[must_use]
    pub fn day_start_rich_state(&self) -> RichState {
        match &self.day_start {
            DayStartBehavior::FollowPath(_) => RichState::FollowPath,
            DayStartBehavior::Enter(state) => *state,
        }
    }

    /// Whether both the schedule and the external gate allow the day to start.
    #[must_use]
    pub fn should_start_day(&self, clock: GameClock) -> bool {
        self.can_start_day && self.schedule.is_day_active(clock)
    }

    /// Whether active flag and actor handle agree.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.is_active == self.actor_handle.is_some()
    }

    /// Copies the day-start path into path scratch, if the day starts on a path.
    pub(crate) fn prime_day_start_path(&mut self) -> bool {
        match &self.day_start {
            DayStartBehavior::FollowPath(progress) => {
                self.simulated_path = Some(progress.clone());
                true
            },
            DayStartBehavior::Enter(_) => false,
        }
    }

    pub(crate) fn set_state(&mut self, tag: Option<StateTag>) {
        self.state = tag;
    }

    pub(crate) fn set_pose(&mut self, position: Vec2, rotation: f32) {
        self.position = position;
        self.rotation = rotation;
    }

    pub(crate) fn clear_movement_scratch(&mut self) {
        self.simulated_target_position = None;
        self.simulated_state_timer = 0.0;
    }

    pub(crate) fn clear_path_scratch(&mut self) {
        self.simulated_path = None;
    }

    pub(crate) fn clear_all_scratch(&mut self) {
        self.clear_movement_scratch();
        self.clear_path_scratch();
        self.pending_enter = false;
    }

    pub(crate) fn link_actor(&mut self, handle: ActorHandle) {
        self.is_active = true;
        self.actor_handle = Some(handle);
        self.pending_enter = false;
        self.last_simulated_at = None;
    }

    pub(crate) fn unlink_actor(&mut self) {
        self.is_active = false;
        self.actor_handle = None;
    }

    pub(crate) fn set_can_start_day(&mut self, can_start: bool) {
        self.can_start_day = can_start;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::TimeWindow;

    #[test]
    fn test_new_record_is_dormant() {
        let record = NpcRecord::new("r1", Vec2::new(1.0, 2.0));
        assert_eq!(record.position(), record.home_position());
        assert_eq!(record.cheap_state(), Some(CheapState::IdleAtHome));
        assert!(!record.is_active());
        assert!(record.actor_handle().is_none());
        assert!(record.is_consistent());
    }

    #[test]
    fn test_day_start_accessor() {
        let record = NpcRecord::new("r1", Vec2::ZERO)
            .with_day_start(DayStartBehavior::FollowPath(PathProgress::new("loop", 0, false)));
        assert_eq!(record.day_start_rich_state(), RichState::FollowPath);

        let record = record.with_day_start(DayStartBehavior::Enter(RichState::Browsing));
        assert_eq!(record.day_start_rich_state(), RichState::Browsing);
    }

    #[test]
    fn test_prime_day_start_path() {
        let mut record = NpcRecord::new("r1", Vec2::ZERO)
            .with_day_start(DayStartBehavior::FollowPath(PathProgress::new("loop", 2, true)));
        assert!(record.prime_day_start_path());
        assert_eq!(record.simulated_path(), Some(&PathProgress::new("loop", 2, true)));
        assert!(record.is_following_path_basic());

        record.clear_path_scratch();
        assert!(!record.is_following_path_basic());
    }

    #[test]
    fn test_should_start_day_requires_gate() {
        let record = NpcRecord::new("r1", Vec2::ZERO)
            .with_schedule(DailySchedule::new(
                TimeWindow::new(8.0, 9.0),
                TimeWindow::new(17.0, 18.0),
            ))
            .with_can_start_day(false);
        assert!(!record.should_start_day(GameClock::at_hour(10.0)));

        let record = record.with_can_start_day(true);
        assert!(record.should_start_day(GameClock::at_hour(10.0)));
        assert!(!record.should_start_day(GameClock::at_hour(7.0)));
    }

    #[test]
    fn test_link_and_unlink_actor() {
        let mut record = NpcRecord::new("r1", Vec2::ZERO);
        record.link_actor(ActorHandle::new(0, 1));
        assert!(record.is_active());
        assert!(record.is_consistent());
        record.unlink_actor();
        assert!(!record.is_active());
        assert!(record.actor_handle().is_none());
    }
}
