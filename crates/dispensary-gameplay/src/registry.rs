//! Arena of NPC records indexed by stable id.

use ahash::AHashMap;
use dispensary_common::NpcId;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{NpcError, NpcResult};
use crate::record::NpcRecord;

/// Position of a record in the arena. Stable for the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordIndex(pub(crate) u32);

impl RecordIndex {
    /// Returns the raw index.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    fn slot(self) -> usize {
        self.0 as usize
    }
}

/// Record whose active flag and actor handle disagreed and was repaired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityRepair {
    /// Repaired record.
    pub index: RecordIndex,
    /// Its id.
    pub id: NpcId,
    /// The flag claimed active without a handle (true) or the reverse (false).
    pub was_flagged_active: bool,
}

/// Session-long arena of records. Records are never removed.
#[derive(Debug, Default)]
pub struct NpcRegistry {
    records: Vec<NpcRecord>,
    by_id: AHashMap<NpcId, RecordIndex>,
}

impl NpcRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record. Ids must be unique.
    pub fn insert(&mut self, record: NpcRecord) -> NpcResult<RecordIndex> {
        if self.by_id.contains_key(record.id()) {
            return Err(NpcError::AlreadyRegistered(record.id().clone()));
        }
        let index = RecordIndex(self.records.len() as u32);
        self.by_id.insert(record.id().clone(), index);
        self.records.push(record);
        Ok(index)
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns whether there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Looks up the index for an id.
    #[must_use]
    pub fn index_of(&self, id: &NpcId) -> Option<RecordIndex> {
        self.by_id.get(id).copied()
    }

    /// Record at `index`.
    #[must_use]
    pub fn get(&self, index: RecordIndex) -> Option<&NpcRecord> {
        self.records.get(index.slot())
    }

    /// Mutable record at `index`.
    pub(crate) fn get_mut(&mut self, index: RecordIndex) -> Option<&mut NpcRecord> {
        self.records.get_mut(index.slot())
    }

    /// Record by id.
    #[must_use]
    pub fn by_id(&self, id: &NpcId) -> Option<&NpcRecord> {
        self.index_of(id).and_then(|index| self.get(index))
    }

    /// Iterates records with their indices, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (RecordIndex, &NpcRecord)> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, record)| (RecordIndex(i as u32), record))
    }

    /// Number of records currently owned by a rich actor.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_active()).count()
    }

    /// Drops every record. Only used when a save replaces the population.
    pub(crate) fn clear(&mut self) {
        self.records.clear();
        self.by_id.clear();
    }

    /// Repairs records whose active flag and handle disagree.
    ///
    /// A record claiming to be active without a handle, or holding a handle
    /// while inactive, is force-unlinked so the batched simulation owns it.
    pub fn verify_integrity(&mut self) -> Vec<IntegrityRepair> {
        let mut repairs = Vec::new();
        for (i, record) in self.records.iter_mut().enumerate() {
            if record.is_consistent() {
                continue;
            }
            let was_flagged_active = record.is_active();
            error!(
                "Integrity error on NPC {}: active={} handle={:?}, unlinking",
                record.id(),
                record.is_active(),
                record.actor_handle()
            );
            record.unlink_actor();
            repairs.push(IntegrityRepair {
                index: RecordIndex(i as u32),
                id: record.id().clone(),
                was_flagged_active,
            });
        }
        repairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispensary_common::{ActorHandle, Vec2};

    #[test]
    fn test_insert_and_lookup() {
        let mut registry = NpcRegistry::new();
        let a = registry.insert(NpcRecord::new("a", Vec2::ZERO)).expect("insert a");
        let b = registry.insert(NpcRecord::new("b", Vec2::ONE)).expect("insert b");

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.index_of(&NpcId::new("b")), Some(b));
        assert_eq!(registry.get(a).map(|r| r.id().as_str()), Some("a"));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut registry = NpcRegistry::new();
        assert!(registry.insert(NpcRecord::new("a", Vec2::ZERO)).is_ok());
        assert!(matches!(
            registry.insert(NpcRecord::new("a", Vec2::ONE)),
            Err(NpcError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn test_verify_integrity_unlinks_inconsistent_records() {
        let mut registry = NpcRegistry::new();
        let mut flagged = NpcRecord::new("flagged", Vec2::ZERO);
        flagged.is_active = true;
        let mut dangling = NpcRecord::new("dangling", Vec2::ZERO);
        dangling.actor_handle = Some(ActorHandle::new(4, 1));
        registry.insert(flagged).expect("insert");
        registry.insert(dangling).expect("insert");
        registry.insert(NpcRecord::new("fine", Vec2::ZERO)).expect("insert");

        let repairs = registry.verify_integrity();
        assert_eq!(repairs.len(), 2);
        assert!(repairs[0].was_flagged_active);
        assert!(!repairs[1].was_flagged_active);
        assert!(registry.iter().all(|(_, r)| r.is_consistent() && !r.is_active()));
    }
}
