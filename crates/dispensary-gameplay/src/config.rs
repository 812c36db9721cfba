//! Tunables for the population layer.

use serde::{Deserialize, Serialize};

use crate::error::{NpcError, NpcResult};
use crate::state::CheapState;

/// Simulation and transition parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    // === Scheduler ===
    /// Seconds between scheduler ticks
    pub tick_interval: f32,
    /// Wait after a tick with no candidates
    pub idle_backoff_interval: f32,
    /// Wait after a tick skipped for a missing dependency
    pub outage_backoff_interval: f32,
    /// Upper bound on records visited per tick
    pub max_per_tick: usize,
    /// Largest dt handed to a single handler tick
    pub max_sim_step: f32,
    /// Cheap states simulated regardless of player distance
    pub must_simulate: Vec<CheapState>,

    // === Fidelity thresholds ===
    /// Records closer than this get a rich actor
    pub activation_radius: f32,
    /// Active records farther than this lose their actor
    pub deactivation_radius: f32,
    /// Spatial grid cell width
    pub spatial_cell_size: f32,

    // === Basic movement ===
    /// Walking speed in units per second
    pub walk_speed: f32,
    /// Distance at which a target counts as reached
    pub arrival_tolerance: f32,
    /// Patrol wander distance around home
    pub wander_radius: f32,
    /// Shortest pause between wander legs
    pub wander_pause_min: f32,
    /// Longest pause between wander legs
    pub wander_pause_max: f32,

    // === Errand durations ===
    /// Seconds spent browsing before heading to checkout
    pub browse_duration: f32,
    /// Seconds spent in the checkout flow
    pub checkout_duration: f32,
    /// Seconds spent in the prescription queue
    pub prescription_wait: f32,
    /// Seconds spent at the prescription counter or delivery spot
    pub counter_wait: f32,

    /// Seed for wander and shelf choices (None = random)
    pub rng_seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval: 0.25,
            idle_backoff_interval: 1.0,
            outage_backoff_interval: 2.0,
            max_per_tick: 10,
            max_sim_step: 5.0,
            must_simulate: vec![CheapState::CashierAtRegister],

            activation_radius: 18.0,
            deactivation_radius: 24.0,
            spatial_cell_size: 8.0,

            walk_speed: 1.4,
            arrival_tolerance: 0.3,
            wander_radius: 6.0,
            wander_pause_min: 2.0,
            wander_pause_max: 6.0,

            browse_duration: 20.0,
            checkout_duration: 12.0,
            prescription_wait: 25.0,
            counter_wait: 15.0,

            rng_seed: None,
        }
    }
}

impl SimulationConfig {
    /// Radius of the proximity query: outer threshold plus one cell.
    #[must_use]
    pub fn candidate_radius(&self) -> f32 {
        self.deactivation_radius + self.spatial_cell_size
    }

    /// Parses a TOML document, filling missing keys with defaults.
    pub fn from_toml_str(contents: &str) -> NpcResult<Self> {
        let config: Self =
            toml::from_str(contents).map_err(|e| NpcError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges and threshold ordering.
    pub fn validate(&self) -> NpcResult<()> {
        let positive = [
            ("tick_interval", self.tick_interval),
            ("idle_backoff_interval", self.idle_backoff_interval),
            ("outage_backoff_interval", self.outage_backoff_interval),
            ("max_sim_step", self.max_sim_step),
            ("spatial_cell_size", self.spatial_cell_size),
            ("walk_speed", self.walk_speed),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(NpcError::InvalidConfig(format!("{name} must be positive, got {value}")));
            }
        }
        let non_negative = [
            ("activation_radius", self.activation_radius),
            ("arrival_tolerance", self.arrival_tolerance),
            ("wander_radius", self.wander_radius),
            ("wander_pause_min", self.wander_pause_min),
            ("browse_duration", self.browse_duration),
            ("checkout_duration", self.checkout_duration),
            ("prescription_wait", self.prescription_wait),
            ("counter_wait", self.counter_wait),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0) {
                return Err(NpcError::InvalidConfig(format!("{name} must not be negative, got {value}")));
            }
        }
        if self.max_per_tick == 0 {
            return Err(NpcError::InvalidConfig("max_per_tick must be at least 1".into()));
        }
        if self.deactivation_radius < self.activation_radius {
            return Err(NpcError::InvalidConfig(format!(
                "deactivation_radius ({}) must not be below activation_radius ({})",
                self.deactivation_radius, self.activation_radius
            )));
        }
        if self.wander_pause_max < self.wander_pause_min {
            return Err(NpcError::InvalidConfig(
                "wander_pause_max must not be below wander_pause_min".into(),
            ));
        }
        Ok(())
    }
}
