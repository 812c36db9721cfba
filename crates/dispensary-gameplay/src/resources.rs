//! Shared physical resources of the store: queues, the register, counters.
//!
//! Resources are owned here, never by a record. Every acquire may fail and
//! callers always carry a fallback; nothing in this module blocks or retries.

use dispensary_common::{NpcId, Vec2};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

/// Which shared resource an assignment refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Customer line in front of the register.
    CheckoutQueue,
    /// Customer spot at the register.
    Register,
    /// Line in front of the prescription counter.
    PrescriptionQueue,
    /// Customer spot at the prescription counter.
    PrescriptionCounter,
    /// Hand-off spot for deliveries.
    DeliverySpot,
    /// Staff post behind the register.
    CashierPost,
}

impl ResourceKind {
    /// Every resource kind.
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::CheckoutQueue,
        ResourceKind::Register,
        ResourceKind::PrescriptionQueue,
        ResourceKind::PrescriptionCounter,
        ResourceKind::DeliverySpot,
        ResourceKind::CashierPost,
    ];
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::CheckoutQueue => "checkout_queue",
            ResourceKind::Register => "register",
            ResourceKind::PrescriptionQueue => "prescription_queue",
            ResourceKind::PrescriptionCounter => "prescription_counter",
            ResourceKind::DeliverySpot => "delivery_spot",
            ResourceKind::CashierPost => "cashier_post",
        };
        f.write_str(name)
    }
}

/// A granted claim on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Resource the claim is on.
    pub resource: ResourceKind,
    /// Slot inside the resource (0 for single spots).
    pub slot_index: usize,
    /// Where the claimant should stand.
    pub position: Vec2,
}

/// Acquire/release contract of a shared resource.
pub trait ResourceManager {
    /// Which resource this is.
    fn kind(&self) -> ResourceKind;
    /// Claims a slot. Re-acquiring by the current holder returns its slot.
    fn try_acquire(&mut self, requester: &NpcId) -> Option<Assignment>;
    /// Gives a claim back. Returns whether the requester held anything.
    fn release(&mut self, requester: &NpcId) -> bool;
    /// The requester's current assignment, if any.
    fn assignment_of(&self, requester: &NpcId) -> Option<Assignment>;
    /// Number of occupied slots.
    fn occupancy(&self) -> usize;
    /// Total number of slots.
    fn capacity(&self) -> usize;

    /// Whether a new claimant could acquire right now.
    fn is_available(&self) -> bool {
        self.occupancy() < self.capacity()
    }
}

/// Capacity-bounded ordered line.
///
/// Slot 0 is the front. When someone leaves, everybody behind moves up.
#[derive(Debug, Clone)]
pub struct SlotQueue {
    kind: ResourceKind,
    slots: Vec<Vec2>,
    occupants: Vec<NpcId>,
}

impl SlotQueue {
    /// Creates a queue with one slot per position.
    #[must_use]
    pub fn new(kind: ResourceKind, slots: Vec<Vec2>) -> Self {
        Self {
            kind,
            slots,
            occupants: Vec::new(),
        }
    }

    /// Who stands at the front.
    #[must_use]
    pub fn front(&self) -> Option<&NpcId> {
        self.occupants.first()
    }

    /// Occupants from front to back.
    #[must_use]
    pub fn occupants(&self) -> &[NpcId] {
        &self.occupants
    }

    fn assignment_at(&self, slot_index: usize) -> Option<Assignment> {
        self.slots.get(slot_index).map(|position| Assignment {
            resource: self.kind,
            slot_index,
            position: *position,
        })
    }
}

impl ResourceManager for SlotQueue {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn try_acquire(&mut self, requester: &NpcId) -> Option<Assignment> {
        if let Some(existing) = self.assignment_of(requester) {
            return Some(existing);
        }
        if !self.is_available() {
            trace!("{} full, refusing {requester}", self.kind);
            return None;
        }
        self.occupants.push(requester.clone());
        self.assignment_at(self.occupants.len() - 1)
    }

    fn release(&mut self, requester: &NpcId) -> bool {
        let before = self.occupants.len();
        self.occupants.retain(|id| id != requester);
        before != self.occupants.len()
    }

    fn assignment_of(&self, requester: &NpcId) -> Option<Assignment> {
        self.occupants
            .iter()
            .position(|id| id == requester)
            .and_then(|slot| self.assignment_at(slot))
    }

    fn occupancy(&self) -> usize {
        self.occupants.len()
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/// Single-occupant spot.
#[derive(Debug, Clone)]
pub struct FixedSpot {
    kind: ResourceKind,
    position: Vec2,
    occupant: Option<NpcId>,
}

impl FixedSpot {
    /// Creates an empty spot.
    #[must_use]
    pub fn new(kind: ResourceKind, position: Vec2) -> Self {
        Self {
            kind,
            position,
            occupant: None,
        }
    }

    /// Where the occupant stands.
    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Current occupant.
    #[must_use]
    pub fn occupant(&self) -> Option<&NpcId> {
        self.occupant.as_ref()
    }
}

impl ResourceManager for FixedSpot {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn try_acquire(&mut self, requester: &NpcId) -> Option<Assignment> {
        match &self.occupant {
            Some(current) if current != requester => {
                trace!("{} held by {current}, refusing {requester}", self.kind);
                None
            },
            _ => {
                self.occupant = Some(requester.clone());
                self.assignment_of(requester)
            },
        }
    }

    fn release(&mut self, requester: &NpcId) -> bool {
        if self.occupant.as_ref() == Some(requester) {
            self.occupant = None;
            true
        } else {
            false
        }
    }

    fn assignment_of(&self, requester: &NpcId) -> Option<Assignment> {
        (self.occupant.as_ref() == Some(requester)).then_some(Assignment {
            resource: self.kind,
            slot_index: 0,
            position: self.position,
        })
    }

    fn occupancy(&self) -> usize {
        usize::from(self.occupant.is_some())
    }

    fn capacity(&self) -> usize {
        1
    }
}

/// All shared resources of one store.
#[derive(Debug, Clone)]
pub struct ResourceHub {
    /// Customer line in front of the register.
    pub checkout_queue: SlotQueue,
    /// Customer spot at the register.
    pub register: FixedSpot,
    /// Line in front of the prescription counter.
    pub prescription_queue: SlotQueue,
    /// Customer spot at the prescription counter.
    pub prescription_counter: FixedSpot,
    /// Delivery hand-off spot.
    pub delivery_spot: FixedSpot,
    /// Staff post behind the register.
    pub cashier_post: FixedSpot,
}

impl ResourceHub {
    /// Builds a hub from slot and spot positions.
    #[must_use]
    pub fn new(
        checkout_slots: Vec<Vec2>,
        register: Vec2,
        prescription_slots: Vec<Vec2>,
        prescription_counter: Vec2,
        delivery_spot: Vec2,
        cashier_post: Vec2,
    ) -> Self {
        Self {
            checkout_queue: SlotQueue::new(ResourceKind::CheckoutQueue, checkout_slots),
            register: FixedSpot::new(ResourceKind::Register, register),
            prescription_queue: SlotQueue::new(ResourceKind::PrescriptionQueue, prescription_slots),
            prescription_counter: FixedSpot::new(
                ResourceKind::PrescriptionCounter,
                prescription_counter,
            ),
            delivery_spot: FixedSpot::new(ResourceKind::DeliverySpot, delivery_spot),
            cashier_post: FixedSpot::new(ResourceKind::CashierPost, cashier_post),
        }
    }

    /// Mutable access by kind.
    pub fn manager_mut(&mut self, kind: ResourceKind) -> &mut dyn ResourceManager {
        match kind {
            ResourceKind::CheckoutQueue => &mut self.checkout_queue,
            ResourceKind::Register => &mut self.register,
            ResourceKind::PrescriptionQueue => &mut self.prescription_queue,
            ResourceKind::PrescriptionCounter => &mut self.prescription_counter,
            ResourceKind::DeliverySpot => &mut self.delivery_spot,
            ResourceKind::CashierPost => &mut self.cashier_post,
        }
    }

    /// Shared access by kind.
    #[must_use]
    pub fn manager(&self, kind: ResourceKind) -> &dyn ResourceManager {
        match kind {
            ResourceKind::CheckoutQueue => &self.checkout_queue,
            ResourceKind::Register => &self.register,
            ResourceKind::PrescriptionQueue => &self.prescription_queue,
            ResourceKind::PrescriptionCounter => &self.prescription_counter,
            ResourceKind::DeliverySpot => &self.delivery_spot,
            ResourceKind::CashierPost => &self.cashier_post,
        }
    }

    /// Claims a resource on behalf of `requester`.
    pub fn try_acquire(&mut self, kind: ResourceKind, requester: &NpcId) -> Option<Assignment> {
        self.manager_mut(kind).try_acquire(requester)
    }

    /// Gives back a claim.
    pub fn release(&mut self, kind: ResourceKind, requester: &NpcId) -> bool {
        self.manager_mut(kind).release(requester)
    }

    /// Every resource `requester` currently holds.
    #[must_use]
    pub fn holdings(&self, requester: &NpcId) -> Vec<Assignment> {
        ResourceKind::ALL
            .iter()
            .filter_map(|kind| self.manager(*kind).assignment_of(requester))
            .collect()
    }

    /// Releases everything `requester` holds. Returns how many claims were dropped.
    pub fn release_all(&mut self, requester: &NpcId) -> usize {
        let mut dropped = 0;
        for kind in ResourceKind::ALL {
            if self.release(kind, requester) {
                dropped += 1;
            }
        }
        dropped
    }
}
