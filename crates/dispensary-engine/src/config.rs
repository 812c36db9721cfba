//! Engine configuration.
//!
//! Run length, store size and the population tunables. Configuration can be
//! loaded from and saved to a TOML file.

use dispensary_gameplay::SimulationConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Configuration file name.
pub const CONFIG_FILE: &str = "dispensary.toml";

/// Engine configuration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // === Run ===
    /// Number of frames to run
    pub frames: u32,
    /// Seconds per frame
    pub frame_dt: f32,
    /// Frames between progress log lines (0 = never)
    pub log_every: u32,

    // === Store ===
    /// NPCs in the demo population
    pub npc_count: usize,
    /// Opening hour of the run
    pub start_hour: u32,
    /// Real seconds per game minute
    pub time_scale: f32,
    /// Seed for the demo population (None = random)
    pub population_seed: Option<u64>,

    // === Persistence ===
    /// Where to write the population at shutdown (None = no save)
    pub save_path: Option<PathBuf>,

    /// Population tunables
    pub simulation: SimulationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frames: 3600,
            frame_dt: 1.0 / 30.0,
            log_every: 600,

            npc_count: 48,
            start_hour: 8,
            time_scale: 0.5,
            population_seed: None,

            save_path: None,

            simulation: SimulationConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Failed to read config file: {e}");
                return Self::default();
            },
        };

        match toml::from_str::<Self>(&contents) {
            Ok(mut config) => {
                config.validate();
                info!("Loaded config from {}", path.display());
                config
            },
            Err(e) => {
                warn!("Failed to parse config file: {e}");
                Self::default()
            },
        }
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, contents)?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Clamp run values to sensible ranges and reset broken tunables.
    pub fn validate(&mut self) {
        self.frame_dt = self.frame_dt.clamp(0.001, 0.25);
        self.start_hour = self.start_hour.min(23);
        self.time_scale = self.time_scale.clamp(0.01, 60.0);
        self.npc_count = self.npc_count.min(10_000);

        if let Err(e) = self.simulation.validate() {
            warn!("Invalid simulation settings ({e}), using defaults");
            self.simulation = SimulationConfig::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.npc_count, 48);
        assert_eq!(config.start_hour, 8);
        assert!(config.save_path.is_none());
        assert!(config.simulation.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        config.frame_dt = 5.0;
        config.start_hour = 40;
        config.simulation.activation_radius = 50.0;

        config.validate();

        assert!((config.frame_dt - 0.25).abs() < f32::EPSILON);
        assert_eq!(config.start_hour, 23);
        assert_eq!(config.simulation, SimulationConfig::default());
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("dispensary.toml");

        let mut config = EngineConfig::default();
        config.npc_count = 12;
        config.population_seed = Some(99);
        config.simulation.max_per_tick = 4;
        config.save_path = Some(temp_dir.path().join("population.json"));

        config.save_to(&config_path).expect("Failed to save config");

        let loaded = EngineConfig::load_from(&config_path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = EngineConfig::load_from("/nonexistent/path/dispensary.toml");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("dispensary.toml");
        fs::write(&config_path, "npc_count = 5\n\n[simulation]\nmax_per_tick = 3\n").expect("write");

        let loaded = EngineConfig::load_from(&config_path);
        assert_eq!(loaded.npc_count, 5);
        assert_eq!(loaded.simulation.max_per_tick, 3);
        assert_eq!(loaded.frames, EngineConfig::default().frames);
    }

    #[test]
    fn test_garbage_file_falls_back() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("dispensary.toml");
        fs::write(&config_path, "npc_count = [").expect("write");

        assert_eq!(EngineConfig::load_from(&config_path), EngineConfig::default());
    }
}
