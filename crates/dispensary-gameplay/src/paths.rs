//! Named waypoint paths shared by rich actors and the batched simulation.

use ahash::AHashMap;
use dispensary_common::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::{NpcError, NpcResult};
use crate::record::PathProgress;

/// What happens when a walker reaches the last waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathMode {
    /// Stop at the end.
    #[default]
    Once,
    /// Wrap around to the other end.
    Loop,
    /// Turn around and walk back.
    PingPong,
}

/// A waypoint path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaypointPath {
    /// Waypoints in forward order.
    pub waypoints: Vec<Vec2>,
    /// End-of-path behavior.
    #[serde(default)]
    pub mode: PathMode,
}

impl WaypointPath {
    /// Creates a path.
    #[must_use]
    pub fn new(waypoints: Vec<Vec2>, mode: PathMode) -> Self {
        Self { waypoints, mode }
    }

    /// Number of waypoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Returns whether the path has no waypoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }
}

/// Result of stepping past a reached waypoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    /// Walk to this waypoint next.
    Next(PathProgress),
    /// The path is finished.
    Finished,
}

/// Lookup of paths by id.
#[derive(Debug, Clone, Default)]
pub struct PathRegistry {
    paths: AHashMap<String, WaypointPath>,
}

impl PathRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a path. Empty paths are rejected.
    pub fn insert(&mut self, id: impl Into<String>, path: WaypointPath) -> NpcResult<()> {
        let id = id.into();
        if path.is_empty() {
            return Err(NpcError::InvalidConfig(format!("path '{id}' has no waypoints")));
        }
        self.paths.insert(id, path);
        Ok(())
    }

    /// Path by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&WaypointPath> {
        self.paths.get(id)
    }

    /// Number of registered paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Returns whether no paths are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Whether progress points at an existing path and waypoint.
    #[must_use]
    pub fn validate(&self, progress: &PathProgress) -> bool {
        self.waypoint(progress).is_some()
    }

    /// Position of the waypoint progress points at.
    #[must_use]
    pub fn waypoint(&self, progress: &PathProgress) -> Option<Vec2> {
        self.paths
            .get(&progress.path_id)
            .and_then(|path| path.waypoints.get(progress.waypoint_index))
            .copied()
    }

    /// Steps past the current waypoint.
    ///
    /// Unknown paths report [`PathStep::Finished`].
    #[must_use]
    pub fn advance(&self, progress: &PathProgress) -> PathStep {
        let Some(path) = self.paths.get(&progress.path_id) else {
            return PathStep::Finished;
        };
        let last = path.len().saturating_sub(1);
        let at_end = if progress.reverse {
            progress.waypoint_index == 0
        } else {
            progress.waypoint_index >= last
        };

        if !at_end {
            let waypoint_index = if progress.reverse {
                progress.waypoint_index - 1
            } else {
                progress.waypoint_index + 1
            };
            return PathStep::Next(PathProgress {
                waypoint_index,
                ..progress.clone()
            });
        }

        match path.mode {
            PathMode::Once => PathStep::Finished,
            PathMode::Loop => PathStep::Next(PathProgress {
                waypoint_index: if progress.reverse { last } else { 0 },
                ..progress.clone()
            }),
            PathMode::PingPong if last == 0 => PathStep::Finished,
            PathMode::PingPong => PathStep::Next(PathProgress {
                waypoint_index: if progress.reverse { 1 } else { last - 1 },
                reverse: !progress.reverse,
                path_id: progress.path_id.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PathRegistry {
        let mut paths = PathRegistry::new();
        let points = vec![Vec2::ZERO, Vec2::X, Vec2::new(2.0, 0.0)];
        paths
            .insert("once", WaypointPath::new(points.clone(), PathMode::Once))
            .expect("insert once");
        paths
            .insert("loop", WaypointPath::new(points.clone(), PathMode::Loop))
            .expect("insert loop");
        paths
            .insert("pingpong", WaypointPath::new(points, PathMode::PingPong))
            .expect("insert pingpong");
        paths
    }

    #[test]
    fn test_validate() {
        let paths = registry();
        assert!(paths.validate(&PathProgress::new("once", 2, false)));
        assert!(!paths.validate(&PathProgress::new("once", 3, false)));
        assert!(!paths.validate(&PathProgress::new("missing", 0, false)));
    }

    #[test]
    fn test_empty_path_rejected() {
        let mut paths = PathRegistry::new();
        assert!(paths
            .insert("empty", WaypointPath::new(Vec::new(), PathMode::Loop))
            .is_err());
    }

    #[test]
    fn test_advance_forward_and_reverse() {
        let paths = registry();
        assert_eq!(
            paths.advance(&PathProgress::new("once", 0, false)),
            PathStep::Next(PathProgress::new("once", 1, false))
        );
        assert_eq!(
            paths.advance(&PathProgress::new("once", 1, true)),
            PathStep::Next(PathProgress::new("once", 0, true))
        );
        assert_eq!(
            paths.advance(&PathProgress::new("once", 2, false)),
            PathStep::Finished
        );
    }

    #[test]
    fn test_advance_at_ends() {
        let paths = registry();
        assert_eq!(
            paths.advance(&PathProgress::new("loop", 2, false)),
            PathStep::Next(PathProgress::new("loop", 0, false))
        );
        assert_eq!(
            paths.advance(&PathProgress::new("loop", 0, true)),
            PathStep::Next(PathProgress::new("loop", 2, true))
        );
        assert_eq!(
            paths.advance(&PathProgress::new("pingpong", 2, false)),
            PathStep::Next(PathProgress::new("pingpong", 1, true))
        );
        assert_eq!(
            paths.advance(&PathProgress::new("missing", 0, false)),
            PathStep::Finished
        );
    }
}
