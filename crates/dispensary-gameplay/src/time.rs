//! Game clock and the time-source seam used by schedules.
//!
//! This module provides game time management:
//! - Day cycle with configurable time scale
//! - Hour and day rollover events
//! - The [`TimeSource`] trait consulted by schedule checks

use serde::{Deserialize, Serialize};

/// Default starting hour (6:00 AM).
const DEFAULT_START_HOUR: u32 = 6;
/// Default real seconds per game minute.
const DEFAULT_REAL_SECONDS_PER_MINUTE: f32 = 1.0;
/// Minutes in a game day.
const MINUTES_PER_DAY: f32 = 24.0 * 60.0;
/// Minutes in a game hour.
const MINUTES_PER_HOUR: f32 = 60.0;
/// Hours in a game day.
const HOURS_PER_DAY: f32 = 24.0;

/// A point in game time as seen by schedule checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GameClock {
    /// Number of complete days elapsed.
    pub day: u32,
    /// Fractional hour of the day in `[0, 24)`.
    pub hour: f32,
}

impl GameClock {
    /// Creates a clock reading, wrapping the hour into `[0, 24)`.
    #[must_use]
    pub fn new(day: u32, hour: f32) -> Self {
        Self {
            day,
            hour: hour.rem_euclid(24.0),
        }
    }

    /// Clock reading at a whole hour of day 0.
    #[must_use]
    pub fn at_hour(hour: f32) -> Self {
        Self::new(0, hour)
    }
}

/// Provider of the current game time.
///
/// Returns `None` while the clock is unavailable (for example during scene
/// load); callers treat that as a soft outage.
pub trait TimeSource {
    /// Current game time, if the clock is running.
    fn current_game_time(&self) -> Option<GameClock>;
}

impl TimeSource for GameClock {
    fn current_game_time(&self) -> Option<GameClock> {
        Some(*self)
    }
}

/// Represents game time with a day cycle.
///
/// Time is represented as:
/// - `time_of_day`: Normalized value from 0.0 (midnight) to 1.0 (next midnight)
/// - `day_count`: Number of complete days elapsed
///
/// By default, 1 real second = 1 game minute (configurable).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameTime {
    /// Current time of day (0.0 = midnight, 0.5 = noon, 1.0 = next midnight).
    time_of_day: f32,
    /// Number of complete days that have passed.
    day_count: u32,
    /// Real seconds per game minute.
    real_seconds_per_game_minute: f32,
    /// Total elapsed game time in game minutes.
    total_game_minutes: f64,
}

impl Default for GameTime {
    fn default() -> Self {
        Self::new()
    }
}

impl GameTime {
    /// Create a new game time starting at 6:00 AM.
    #[must_use]
    pub fn new() -> Self {
        Self::with_time(DEFAULT_START_HOUR, 0, 0)
    }

    /// Create with a specific starting time.
    ///
    /// # Arguments
    /// * `hour` - Starting hour (0-23)
    /// * `minute` - Starting minute (0-59)
    /// * `day` - Starting day number
    #[must_use]
    pub fn with_time(hour: u32, minute: u32, day: u32) -> Self {
        let hour = hour.min(23);
        let minute = minute.min(59);
        let minutes_today = hour as f32 * MINUTES_PER_HOUR + minute as f32;

        Self {
            time_of_day: minutes_today / MINUTES_PER_DAY,
            day_count: day,
            real_seconds_per_game_minute: DEFAULT_REAL_SECONDS_PER_MINUTE,
            total_game_minutes: day as f64 * MINUTES_PER_DAY as f64 + minutes_today as f64,
        }
    }

    /// Set the time scale (real seconds per game minute).
    pub fn set_time_scale(&mut self, seconds_per_minute: f32) {
        self.real_seconds_per_game_minute = seconds_per_minute.max(0.01);
    }

    /// Get the time scale.
    #[must_use]
    pub fn time_scale(&self) -> f32 {
        self.real_seconds_per_game_minute
    }

    /// Get the current time of day (0.0 to 1.0).
    #[must_use]
    pub fn time_of_day(&self) -> f32 {
        self.time_of_day
    }

    /// Get the current day count.
    #[must_use]
    pub fn day_count(&self) -> u32 {
        self.day_count
    }

    /// Get the current hour (0-23).
    #[must_use]
    pub fn hour(&self) -> u32 {
        self.hour_f32() as u32 % 24
    }

    /// Get the current fractional hour (0.0 to 24.0).
    #[must_use]
    pub fn hour_f32(&self) -> f32 {
        self.time_of_day * 24.0
    }

    /// Get the current minute (0-59).
    #[must_use]
    pub fn minute(&self) -> u32 {
        let minutes_today = self.time_of_day * MINUTES_PER_DAY;
        (minutes_today % MINUTES_PER_HOUR).round() as u32 % 60
    }

    /// Get the total elapsed game minutes.
    #[must_use]
    pub fn total_game_minutes(&self) -> f64 {
        self.total_game_minutes
    }

    /// Snapshot for schedule checks.
    #[must_use]
    pub fn clock(&self) -> GameClock {
        GameClock::new(self.day_count, self.hour_f32())
    }

    /// Format time as HH:MM.
    #[must_use]
    pub fn format_time(&self) -> String {
        format!("{:02}:{:02}", self.hour(), self.minute())
    }

    /// Update game time based on real elapsed time.
    ///
    /// Returns `Some(event)` if a day or hour boundary was crossed.
    pub fn update(&mut self, dt_real_seconds: f32) -> Option<TimeEvent> {
        let game_minutes = dt_real_seconds / self.real_seconds_per_game_minute;
        self.total_game_minutes += game_minutes as f64;

        let old_hour = self.hour();
        self.time_of_day += game_minutes / MINUTES_PER_DAY;

        let mut event = None;
        while self.time_of_day >= 1.0 {
            self.time_of_day -= 1.0;
            self.day_count += 1;
            event = Some(TimeEvent::NewDay(self.day_count));
        }

        let new_hour = self.hour();
        if event.is_none() && old_hour != new_hour {
            event = Some(TimeEvent::HourChanged(new_hour));
        }

        event
    }

    /// Set the time to a specific hour and minute.
    pub fn set_time(&mut self, hour: u32, minute: u32) {
        let hour = hour.min(23);
        let minute = minute.min(59);
        let minutes_today = hour as f32 * MINUTES_PER_HOUR + minute as f32;
        self.time_of_day = minutes_today / MINUTES_PER_DAY;
    }

    /// Advance time by a specific number of game hours.
    pub fn advance_hours(&mut self, hours: f32) {
        let minutes = hours * MINUTES_PER_HOUR;
        self.total_game_minutes += minutes as f64;
        self.time_of_day += minutes / MINUTES_PER_DAY;

        while self.time_of_day >= 1.0 {
            self.time_of_day -= 1.0;
            self.day_count += 1;
        }
    }
}

impl TimeSource for GameTime {
    fn current_game_time(&self) -> Option<GameClock> {
        Some(self.clock())
    }
}

/// Boundary crossed by a [`GameTime::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeEvent {
    /// A new day started; carries the new day count.
    NewDay(u32),
    /// The hour changed; carries the new hour.
    HourChanged(u32),
}

/// A range of game hours, `[start, end)`, that may wrap past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// First hour inside the window.
    pub start: f32,
    /// First hour after the window.
    pub end: f32,
}

impl TimeWindow {
    /// Creates a window from start and end hours.
    #[must_use]
    pub const fn new(start: f32, end: f32) -> Self {
        Self { start, end }
    }

    /// Checks if an hour falls inside the window.
    #[must_use]
    pub fn contains(&self, hour: f32) -> bool {
        contains_wrapping(self.start, self.end, hour)
    }

    /// Length of the window in hours, following a wrap past midnight.
    #[must_use]
    pub fn span(&self) -> f32 {
        (self.end - self.start).rem_euclid(HOURS_PER_DAY)
    }

    /// The hour a `fraction` of the way through the window.
    #[must_use]
    pub fn at(&self, fraction: f32) -> f32 {
        (self.start + self.span() * fraction.clamp(0.0, 1.0)).rem_euclid(HOURS_PER_DAY)
    }
}

/// Daily routine of a record.
///
/// Each NPC picks its own moment inside both windows through `stagger`, a
/// fraction in `[0, 1]`, so a crowd sharing one schedule does not leave home
/// or head back on the same tick. The day is active from that point in
/// `start_day` until the same point in `end_day`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailySchedule {
    /// Window in which the NPC begins its day.
    pub start_day: TimeWindow,
    /// Window in which the NPC wraps up its day.
    pub end_day: TimeWindow,
    /// Position inside each window, `0.0` at its opening.
    #[serde(default)]
    pub stagger: f32,
}

impl Default for DailySchedule {
    fn default() -> Self {
        Self::new(TimeWindow::new(8.0, 10.0), TimeWindow::new(18.0, 20.0))
    }
}

impl DailySchedule {
    /// Creates a schedule from its two windows, starting at their openings.
    #[must_use]
    pub const fn new(start_day: TimeWindow, end_day: TimeWindow) -> Self {
        Self {
            start_day,
            end_day,
            stagger: 0.0,
        }
    }

    /// Sets the position inside both windows, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_stagger(mut self, stagger: f32) -> Self {
        self.stagger = if stagger.is_finite() {
            stagger.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Hour at which this NPC starts its day.
    #[must_use]
    pub fn start_hour(&self) -> f32 {
        self.start_day.at(self.stagger)
    }

    /// Hour at which this NPC ends its day.
    #[must_use]
    pub fn end_hour(&self) -> f32 {
        self.end_day.at(self.stagger)
    }

    /// Whether the NPC's day is under way at `clock`.
    #[must_use]
    pub fn is_day_active(&self, clock: GameClock) -> bool {
        contains_wrapping(self.start_hour(), self.end_hour(), clock.hour)
    }
}

fn contains_wrapping(start: f32, end: f32, hour: f32) -> bool {
    if start <= end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_time_creation() {
        let time = GameTime::new();
        assert_eq!(time.hour(), 6);
        assert_eq!(time.minute(), 0);
        assert_eq!(time.day_count(), 0);
    }

    #[test]
    fn test_game_time_with_time() {
        let time = GameTime::with_time(14, 30, 5);
        assert_eq!(time.hour(), 14);
        assert_eq!(time.minute(), 30);
        assert_eq!(time.day_count(), 5);
        assert_eq!(time.format_time(), "14:30");
    }

    #[test]
    fn test_update_rolls_over_day() {
        let mut time = GameTime::with_time(23, 59, 0);
        let event = time.update(2.0);
        assert_eq!(event, Some(TimeEvent::NewDay(1)));
        assert_eq!(time.hour(), 0);
    }

    #[test]
    fn test_update_reports_hour_change() {
        let mut time = GameTime::with_time(9, 59, 0);
        assert_eq!(time.update(1.5), Some(TimeEvent::HourChanged(10)));
        assert_eq!(time.update(1.0), None);
    }

    #[test]
    fn test_time_scale_is_clamped() {
        let mut time = GameTime::new();
        time.set_time_scale(0.0);
        assert!((time.time_scale() - 0.01).abs() < f32::EPSILON);
    }

    #[test]
    fn test_clock_snapshot() {
        let clock = GameTime::with_time(12, 30, 2).clock();
        assert_eq!(clock.day, 2);
        assert!((clock.hour - 12.5).abs() < 0.01);
    }

    #[test]
    fn test_schedule_day_active() {
        let schedule = DailySchedule::default();
        assert!(!schedule.is_day_active(GameClock::at_hour(7.5)));
        assert!(schedule.is_day_active(GameClock::at_hour(8.0)));
        assert!(schedule.is_day_active(GameClock::at_hour(17.9)));
        assert!(!schedule.is_day_active(GameClock::at_hour(18.0)));
    }

    #[test]
    fn test_night_shift_wraps_midnight() {
        let schedule = DailySchedule::new(TimeWindow::new(22.0, 23.0), TimeWindow::new(6.0, 7.0));
        assert!(schedule.is_day_active(GameClock::at_hour(23.5)));
        assert!(schedule.is_day_active(GameClock::at_hour(2.0)));
        assert!(!schedule.is_day_active(GameClock::at_hour(12.0)));
        assert!(schedule.start_day.contains(22.5));
    }

    #[test]
    fn test_stagger_moves_day_inside_windows() {
        let schedule = DailySchedule::default().with_stagger(0.5);
        assert!((schedule.start_hour() - 9.0).abs() < 1e-4);
        assert!((schedule.end_hour() - 19.0).abs() < 1e-4);
        assert!(!schedule.is_day_active(GameClock::at_hour(8.5)));
        assert!(schedule.is_day_active(GameClock::at_hour(9.5)));
        assert!(schedule.is_day_active(GameClock::at_hour(18.5)));
        assert!(!schedule.is_day_active(GameClock::at_hour(19.5)));
    }

    #[test]
    fn test_stagger_follows_wrapping_window() {
        let schedule = DailySchedule::new(TimeWindow::new(23.0, 1.0), TimeWindow::new(5.0, 7.0))
            .with_stagger(0.75);
        assert!((schedule.start_hour() - 0.5).abs() < 1e-4);
        assert!((schedule.end_hour() - 6.5).abs() < 1e-4);
        assert!(!schedule.is_day_active(GameClock::at_hour(23.5)));
        assert!(schedule.is_day_active(GameClock::at_hour(3.0)));
        assert!(!schedule.is_day_active(GameClock::at_hour(6.75)));
    }

    #[test]
    fn test_stagger_is_clamped() {
        assert_eq!(DailySchedule::default().with_stagger(4.0).stagger, 1.0);
        assert_eq!(DailySchedule::default().with_stagger(f32::NAN).stagger, 0.0);
    }
}
