//! Validated placement of actors on the walkable floor.

use dispensary_common::{ActorHandle, Rect, Vec2};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::pool::ActorPool;

/// Places a spawned actor at a fixed spot.
pub trait Navigation {
    /// Moves the actor to `position`. Returns false if the spot is not
    /// walkable or the actor does not exist.
    fn warp(&mut self, handle: ActorHandle, position: Vec2) -> bool;
}

/// Walkable floor as a union of rectangles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavMesh {
    walkable: Vec<Rect>,
}

impl NavMesh {
    /// Creates a mesh from walkable areas.
    #[must_use]
    pub fn new(walkable: Vec<Rect>) -> Self {
        Self { walkable }
    }

    /// Adds a walkable area.
    pub fn add_area(&mut self, area: Rect) {
        self.walkable.push(area);
    }

    /// Whether a point lies on the mesh.
    #[must_use]
    pub fn is_walkable(&self, point: Vec2) -> bool {
        self.walkable.iter().any(|area| area.contains_point(point))
    }

    /// Walkable areas.
    #[must_use]
    pub fn areas(&self) -> &[Rect] {
        &self.walkable
    }
}

/// [`Navigation`] over the actor pool, checked against a [`NavMesh`].
pub struct PoolNavigator<'a> {
    /// Actors to move.
    pub pool: &'a mut ActorPool,
    /// Floor to validate against.
    pub mesh: &'a NavMesh,
}

impl Navigation for PoolNavigator<'_> {
    fn warp(&mut self, handle: ActorHandle, position: Vec2) -> bool {
        if !self.mesh.is_walkable(position) {
            warn!("Warp of actor {handle} to {position} rejected: off the nav mesh");
            return false;
        }
        match self.pool.get_mut(handle) {
            Some(actor) => {
                actor.warp_to(position);
                true
            },
            None => {
                warn!("Warp of actor {handle} rejected: no such actor");
                false
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::SpawnPose;
    use dispensary_common::{NpcId, ProfileRef};

    #[test]
    fn test_walkable_union() {
        let mesh = NavMesh::new(vec![
            Rect::new(0.0, 0.0, 4.0, 4.0),
            Rect::new(10.0, 0.0, 2.0, 2.0),
        ]);
        assert!(mesh.is_walkable(Vec2::new(1.0, 1.0)));
        assert!(mesh.is_walkable(Vec2::new(11.0, 1.0)));
        assert!(!mesh.is_walkable(Vec2::new(7.0, 1.0)));
    }

    #[test]
    fn test_warp_validates_target_and_handle() {
        let mut pool = ActorPool::new();
        let handle = pool
            .spawn(
                &ProfileRef::default(),
                &NpcId::new("a"),
                SpawnPose {
                    home: Vec2::ZERO,
                    position: Vec2::ZERO,
                    rotation: 0.0,
                },
            )
            .expect("spawn");
        let mesh = NavMesh::new(vec![Rect::new(0.0, 0.0, 4.0, 4.0)]);
        let mut nav = PoolNavigator {
            pool: &mut pool,
            mesh: &mesh,
        };

        assert!(nav.warp(handle, Vec2::new(2.0, 2.0)));
        assert!(!nav.warp(handle, Vec2::new(20.0, 2.0)));
        assert!(!nav.warp(ActorHandle::new(9, 0), Vec2::new(1.0, 1.0)));
        assert_eq!(pool.get(handle).map(|a| a.position()), Some(Vec2::new(2.0, 2.0)));
    }
}
