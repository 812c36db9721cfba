//! Persistence bridge for the population.
//!
//! Export never mutates live records. Import never restores a live actor:
//! every record comes back inactive, and records are ordered so that the
//! most resource-dependent ones are activated (and claim capacity) first.

use std::path::Path;

use dispensary_common::{DispensaryError, SchemaVersion};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::actor::RichActor;
use crate::error::NpcResult;
use crate::mapping::StateMappingTable;
use crate::record::NpcRecord;
use crate::state::{CheapState, RichState, StateTag};

/// Import order class. Lower loads first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LoadPriority {
    /// Holds a single fixed spot (counter, delivery, cashier post)
    CriticalResource,
    /// Holds a queue slot
    QueueOccupant,
    /// Out and about without a claim
    FreeRoaming,
    /// At home, or no saved state
    Dormant,
}

impl LoadPriority {
    /// Priority of a cheap state.
    #[must_use]
    pub fn of_cheap(state: CheapState) -> Self {
        match state {
            CheapState::CashierAtRegister
            | CheapState::WaitAtPrescriptionSpot
            | CheapState::WaitForDelivery => Self::CriticalResource,
            CheapState::WaitForCashier | CheapState::WaitForPrescriptionQueue => Self::QueueOccupant,
            CheapState::Patrol | CheapState::PathFollow | CheapState::Browse | CheapState::Exiting => {
                Self::FreeRoaming
            },
            CheapState::IdleAtHome => Self::Dormant,
        }
    }

    /// Priority of a saved tag. Rich tags are collapsed first.
    #[must_use]
    pub fn of_tag(tag: Option<StateTag>, mapping: &StateMappingTable) -> Self {
        match tag {
            Some(StateTag::Cheap(cheap)) => Self::of_cheap(cheap),
            Some(StateTag::Rich(rich)) => Self::of_cheap(mapping.to_cheap(rich)),
            None => Self::Dormant,
        }
    }
}

/// Snapshot of an active record as the cheap state it would deactivate into.
///
/// Path progress comes from the actor: an interrupted walk first, then a
/// live one. The live record is left untouched.
#[must_use]
pub fn snapshot_active(record: &NpcRecord, actor: &RichActor, mapping: &StateMappingTable) -> NpcRecord {
    let mut snapshot = record.clone();
    let mut cheap = mapping.to_cheap(actor.state());
    snapshot.simulated_path = match (actor.interrupted_path(), actor.live_path()) {
        (Some(interrupted), _) => {
            cheap = CheapState::PathFollow;
            Some(interrupted.clone())
        },
        (None, Some(live)) if actor.state() == RichState::FollowPath => Some(live.clone()),
        _ => None,
    };
    snapshot.set_pose(actor.position(), actor.rotation());
    snapshot.set_state(Some(StateTag::Cheap(cheap)));
    snapshot.clear_movement_scratch();
    snapshot.unlink_actor();
    snapshot.pending_enter = true;
    snapshot.last_simulated_at = None;
    snapshot
}

/// Makes loaded records safe to register and orders them for activation.
///
/// The sort is stable, so records of equal priority keep their saved order.
#[must_use]
pub fn prepare_import(mut records: Vec<NpcRecord>, mapping: &StateMappingTable) -> Vec<NpcRecord> {
    for record in &mut records {
        record.unlink_actor();
        record.last_simulated_at = None;
    }
    records.sort_by_key(|record| LoadPriority::of_tag(record.state(), mapping));
    records
}

/// Serialized population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSave {
    /// Schema version the save was written with.
    pub version: SchemaVersion,
    /// Every record, active ones snapshotted.
    pub records: Vec<NpcRecord>,
}

impl PopulationSave {
    /// Wraps records in a save at the current schema version.
    #[must_use]
    pub fn new(records: Vec<NpcRecord>) -> Self {
        Self {
            version: SchemaVersion::POPULATION_SAVE,
            records,
        }
    }

    /// Serializes to pretty JSON.
    pub fn to_json(&self) -> NpcResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses JSON, rejecting saves from an incompatible schema.
    pub fn from_json(json: &str) -> NpcResult<Self> {
        let save: Self = serde_json::from_str(json)?;
        if !SchemaVersion::POPULATION_SAVE.can_read(&save.version) {
            return Err(DispensaryError::VersionMismatch {
                expected: SchemaVersion::POPULATION_SAVE.to_string(),
                actual: save.version.to_string(),
            }
            .into());
        }
        Ok(save)
    }

    /// Writes the save to disk.
    pub fn save_to(&self, path: &Path) -> NpcResult<()> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(DispensaryError::from)?;
        info!("Saved {} NPC records to {}", self.records.len(), path.display());
        Ok(())
    }

    /// Reads a save from disk.
    pub fn load_from(path: &Path) -> NpcResult<Self> {
        let json = std::fs::read_to_string(path).map_err(DispensaryError::from)?;
        let save = Self::from_json(&json)?;
        info!("Loaded {} NPC records from {}", save.records.len(), path.display());
        Ok(save)
    }
}
