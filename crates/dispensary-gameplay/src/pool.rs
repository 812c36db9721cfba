//! Pool of rich actors with generational handles.
//!
//! Slots are reused through a free list. Recycling bumps the slot
//! generation so stale handles held elsewhere stop resolving.

use dispensary_common::{ActorHandle, NpcId, ProfileRef, Vec2};
use tracing::{debug, warn};

use crate::actor::RichActor;

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    actor: Option<RichActor>,
}

/// Where a freshly spawned actor starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPose {
    /// Home used by the exit walk.
    pub home: Vec2,
    /// Initial position.
    pub position: Vec2,
    /// Initial facing.
    pub rotation: f32,
}

/// Rich actor storage.
#[derive(Debug, Default)]
pub struct ActorPool {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    /// Upper bound on live actors (None = unbounded)
    max_live: Option<usize>,
    live: usize,
}

impl ActorPool {
    /// Creates an unbounded pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pool that refuses spawns past `max_live` actors.
    #[must_use]
    pub fn with_limit(max_live: usize) -> Self {
        Self {
            slots: Vec::with_capacity(max_live),
            max_live: Some(max_live),
            ..Self::default()
        }
    }

    /// Number of live actors.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Total slots, free ones included.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Spawns an actor for `npc_id`. Returns `None` when the pool is full.
    pub fn spawn(&mut self, profile: &ProfileRef, npc_id: &NpcId, pose: SpawnPose) -> Option<ActorHandle> {
        if self.max_live.is_some_and(|max| self.live >= max) {
            warn!("Actor pool full ({} live), cannot spawn {npc_id}", self.live);
            return None;
        }

        let index = match self.free_list.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            },
        };
        let slot = &mut self.slots[index as usize];
        let handle = ActorHandle::new(index, slot.generation);
        slot.actor = Some(RichActor::new(
            handle,
            npc_id.clone(),
            profile.clone(),
            pose.home,
            pose.position,
            pose.rotation,
        ));
        self.live += 1;
        debug!("Spawned actor {handle} for {npc_id}");
        Some(handle)
    }

    /// Returns an actor to the pool. Stale handles return `None`.
    pub fn recycle(&mut self, handle: ActorHandle) -> Option<RichActor> {
        let slot = self.slot_mut(handle)?;
        let actor = slot.actor.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index());
        self.live -= 1;
        debug!("Recycled actor {handle}");
        Some(actor)
    }

    /// Actor by handle.
    #[must_use]
    pub fn get(&self, handle: ActorHandle) -> Option<&RichActor> {
        self.slots
            .get(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.actor.as_ref())
    }

    /// Mutable actor by handle.
    pub fn get_mut(&mut self, handle: ActorHandle) -> Option<&mut RichActor> {
        self.slot_mut(handle).and_then(|slot| slot.actor.as_mut())
    }

    /// Whether the handle refers to a live actor.
    #[must_use]
    pub fn contains(&self, handle: ActorHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Handles of all live actors, in slot order.
    #[must_use]
    pub fn handles(&self) -> Vec<ActorHandle> {
        self.iter().map(RichActor::handle).collect()
    }

    /// Iterates live actors.
    pub fn iter(&self) -> impl Iterator<Item = &RichActor> {
        self.slots.iter().filter_map(|slot| slot.actor.as_ref())
    }

    /// Drops every actor. Outstanding handles become stale.
    pub fn clear(&mut self) {
        self.free_list.clear();
        for (i, slot) in self.slots.iter_mut().enumerate() {
            slot.actor = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free_list.push(i as u32);
        }
        self.live = 0;
    }

    fn slot_mut(&mut self, handle: ActorHandle) -> Option<&mut Slot> {
        self.slots
            .get_mut(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation())
    }
}
