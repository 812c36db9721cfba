//! State tags for both fidelity levels.
//!
//! A record is driven either by a spawned actor running a [`RichState`], or
//! by the batched simulation running a [`CheapState`]. The two enums are
//! closed: adding a state is a compile-time change that the mapping table
//! and the handler set must account for.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a spawned actor with full navigation and interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RichState {
    /// Standing still.
    Idle,
    /// Free wandering around the neighbourhood.
    Wandering,
    /// Walking a named waypoint path.
    FollowPath,
    /// Briefly reacting to the player (greeting, glance). Interrupts paths.
    Reacting,
    /// Looking at a shelf inside the store.
    Browsing,
    /// Walking towards the checkout area.
    MovingToCheckout,
    /// Walking to a free register.
    MovingToRegister,
    /// Standing in the checkout queue.
    InQueue,
    /// Being served at the register.
    WaitingAtRegister,
    /// Walking to the prescription queue.
    MovingToPrescriptionQueue,
    /// Standing in the prescription queue.
    InPrescriptionQueue,
    /// Standing at the prescription counter.
    WaitingAtPrescriptionSpot,
    /// Waiting for a delivery hand-off.
    WaitingForDelivery,
    /// Staff walking to their register post.
    CashierMovingToRegister,
    /// Staff serving at their register post.
    CashierAtRegister,
    /// Leaving the store on the way home. Terminal for the visit.
    Exiting,
    /// Fighting. Never interruptible.
    Combat,
}

impl RichState {
    /// Every rich state, in declaration order.
    pub const ALL: [RichState; 17] = [
        RichState::Idle,
        RichState::Wandering,
        RichState::FollowPath,
        RichState::Reacting,
        RichState::Browsing,
        RichState::MovingToCheckout,
        RichState::MovingToRegister,
        RichState::InQueue,
        RichState::WaitingAtRegister,
        RichState::MovingToPrescriptionQueue,
        RichState::InPrescriptionQueue,
        RichState::WaitingAtPrescriptionSpot,
        RichState::WaitingForDelivery,
        RichState::CashierMovingToRegister,
        RichState::CashierAtRegister,
        RichState::Exiting,
        RichState::Combat,
    ];

    /// The rich state used when nothing better can be derived.
    pub const DEFAULT: RichState = RichState::Idle;

    /// Whether an actor in this state may be torn down and simulated cheaply.
    #[must_use]
    pub const fn is_interruptible(self) -> bool {
        !matches!(self, RichState::Combat)
    }

    /// Stable snake_case name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            RichState::Idle => "idle",
            RichState::Wandering => "wandering",
            RichState::FollowPath => "follow_path",
            RichState::Reacting => "reacting",
            RichState::Browsing => "browsing",
            RichState::MovingToCheckout => "moving_to_checkout",
            RichState::MovingToRegister => "moving_to_register",
            RichState::InQueue => "in_queue",
            RichState::WaitingAtRegister => "waiting_at_register",
            RichState::MovingToPrescriptionQueue => "moving_to_prescription_queue",
            RichState::InPrescriptionQueue => "in_prescription_queue",
            RichState::WaitingAtPrescriptionSpot => "waiting_at_prescription_spot",
            RichState::WaitingForDelivery => "waiting_for_delivery",
            RichState::CashierMovingToRegister => "cashier_moving_to_register",
            RichState::CashierAtRegister => "cashier_at_register",
            RichState::Exiting => "exiting",
            RichState::Combat => "combat",
        }
    }
}

impl fmt::Display for RichState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State of a record advanced only by the batched simulation tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheapState {
    /// Dormant at the home pose until the day starts.
    IdleAtHome,
    /// Wandering between random points near home.
    Patrol,
    /// Advancing along a saved waypoint path.
    PathFollow,
    /// Shopping inside the store.
    Browse,
    /// Anywhere in the checkout flow.
    WaitForCashier,
    /// Anywhere in the prescription queue flow.
    WaitForPrescriptionQueue,
    /// Holding the prescription counter spot.
    WaitAtPrescriptionSpot,
    /// Holding the delivery spot.
    WaitForDelivery,
    /// Staff working a register.
    CashierAtRegister,
    /// Walking home.
    Exiting,
}

impl CheapState {
    /// Every cheap state, in declaration order.
    pub const ALL: [CheapState; 10] = [
        CheapState::IdleAtHome,
        CheapState::Patrol,
        CheapState::PathFollow,
        CheapState::Browse,
        CheapState::WaitForCashier,
        CheapState::WaitForPrescriptionQueue,
        CheapState::WaitAtPrescriptionSpot,
        CheapState::WaitForDelivery,
        CheapState::CashierAtRegister,
        CheapState::Exiting,
    ];

    /// Fallback for unmapped or unrecoverable tags.
    pub const DEFAULT: CheapState = CheapState::Patrol;

    /// Stable snake_case name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            CheapState::IdleAtHome => "idle_at_home",
            CheapState::Patrol => "patrol",
            CheapState::PathFollow => "path_follow",
            CheapState::Browse => "browse",
            CheapState::WaitForCashier => "wait_for_cashier",
            CheapState::WaitForPrescriptionQueue => "wait_for_prescription_queue",
            CheapState::WaitAtPrescriptionSpot => "wait_at_prescription_spot",
            CheapState::WaitForDelivery => "wait_for_delivery",
            CheapState::CashierAtRegister => "cashier_at_register",
            CheapState::Exiting => "exiting",
        }
    }
}

impl fmt::Display for CheapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The tag a record currently occupies.
///
/// While the record is active the tag is `Rich`; while inactive it should be
/// `Cheap`. A `Rich` tag on an inactive record is stale and gets recovered by
/// the scheduler through the mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "fidelity", content = "state", rename_all = "snake_case")]
pub enum StateTag {
    /// Owned by a rich actor.
    Rich(RichState),
    /// Owned by the batched simulation.
    Cheap(CheapState),
}

impl StateTag {
    /// Returns the cheap state, if this is a cheap tag.
    #[must_use]
    pub const fn cheap(self) -> Option<CheapState> {
        match self {
            StateTag::Cheap(state) => Some(state),
            StateTag::Rich(_) => None,
        }
    }

    /// Returns the rich state, if this is a rich tag.
    #[must_use]
    pub const fn rich(self) -> Option<RichState> {
        match self {
            StateTag::Rich(state) => Some(state),
            StateTag::Cheap(_) => None,
        }
    }
}

impl fmt::Display for StateTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateTag::Rich(state) => write!(f, "rich:{state}"),
            StateTag::Cheap(state) => write!(f, "cheap:{state}"),
        }
    }
}
