//! Population events for systems outside the core (UI, audio, analytics).

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use dispensary_common::{ActorHandle, NpcId};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::state::{CheapState, RichState, StateTag};

/// Something that happened to the population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PopulationEvent {
    /// A record got a rich actor
    Activated {
        /// NPC id
        id: NpcId,
        /// Actor that now owns the record
        handle: ActorHandle,
        /// Starting rich state
        state: RichState,
    },
    /// A rich actor was torn down
    Deactivated {
        /// NPC id
        id: NpcId,
        /// Cheap state the record continues in
        state: CheapState,
    },
    /// A resource was unavailable and the NPC headed for the exit
    GaveUp {
        /// NPC id
        id: NpcId,
        /// Cheap state it was trying to resume
        from: CheapState,
    },
    /// The batched simulation switched a record's cheap state
    CheapStateChanged {
        /// NPC id
        id: NpcId,
        /// Previous tag
        from: Option<StateTag>,
        /// New cheap state
        to: CheapState,
    },
    /// A record with a disagreeing active flag and handle was repaired
    IntegrityCorrected {
        /// NPC id
        id: NpcId,
    },
    /// Deactivation was refused because the actor cannot be interrupted
    DeactivationRefused {
        /// NPC id
        id: NpcId,
        /// Rich state that blocked it
        state: RichState,
    },
}

/// Bounded event queue. Events published while full are dropped.
#[derive(Debug)]
pub struct EventBus {
    sender: Sender<PopulationEvent>,
    receiver: Receiver<PopulationEvent>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBus {
    /// Creates a bus holding at most `capacity` undrained events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Publishes without blocking.
    pub fn publish(&self, event: PopulationEvent) {
        if let Err(TrySendError::Full(event)) = self.sender.try_send(event) {
            trace!("Event bus full, dropping {event:?}");
        }
    }

    /// Takes every pending event.
    pub fn drain(&self) -> Vec<PopulationEvent> {
        self.receiver.try_iter().collect()
    }

    /// Number of undrained events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Channel capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Extra sender for publishing from elsewhere.
    #[must_use]
    pub fn sender(&self) -> Sender<PopulationEvent> {
        self.sender.clone()
    }
}
