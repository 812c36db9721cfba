//! Two-way mapping between rich and cheap state tags.
//!
//! The rich → cheap direction is lossy: several rich states collapse onto one
//! cheap state (everything in the checkout flow becomes
//! [`CheapState::WaitForCashier`]). The cheap → rich direction therefore only
//! yields a canonical entry state; activation re-derives the precise rich
//! state from live resource occupancy.
//!
//! The shipped mapping is two exhaustive functions, [`standard_to_cheap`] and
//! [`standard_to_rich`]. A [`StateMappingTable`] answers from them unless an
//! override entry says otherwise.

use ahash::AHashMap;
use tracing::{error, warn};

use crate::error::{NpcError, NpcResult};
use crate::state::{CheapState, RichState};

/// Shipped rich → cheap collapse.
///
/// [`RichState::Combat`] is deliberately unmapped: it is never
/// interruptible, so it never reaches deactivation.
#[must_use]
pub const fn standard_to_cheap(rich: RichState) -> Option<CheapState> {
    match rich {
        RichState::Idle => Some(CheapState::IdleAtHome),
        RichState::Wandering | RichState::Reacting => Some(CheapState::Patrol),
        RichState::FollowPath => Some(CheapState::PathFollow),
        RichState::Browsing => Some(CheapState::Browse),
        RichState::MovingToCheckout
        | RichState::MovingToRegister
        | RichState::InQueue
        | RichState::WaitingAtRegister => Some(CheapState::WaitForCashier),
        RichState::MovingToPrescriptionQueue | RichState::InPrescriptionQueue => {
            Some(CheapState::WaitForPrescriptionQueue)
        }
        RichState::WaitingAtPrescriptionSpot => Some(CheapState::WaitAtPrescriptionSpot),
        RichState::WaitingForDelivery => Some(CheapState::WaitForDelivery),
        RichState::CashierMovingToRegister | RichState::CashierAtRegister => {
            Some(CheapState::CashierAtRegister)
        }
        RichState::Exiting => Some(CheapState::Exiting),
        RichState::Combat => None,
    }
}

/// Shipped canonical rich entry state for every cheap state.
#[must_use]
pub const fn standard_to_rich(cheap: CheapState) -> RichState {
    match cheap {
        CheapState::IdleAtHome => RichState::Idle,
        CheapState::Patrol => RichState::Wandering,
        CheapState::PathFollow => RichState::FollowPath,
        CheapState::Browse => RichState::Browsing,
        CheapState::WaitForCashier => RichState::MovingToCheckout,
        CheapState::WaitForPrescriptionQueue => RichState::MovingToPrescriptionQueue,
        CheapState::WaitAtPrescriptionSpot => RichState::WaitingAtPrescriptionSpot,
        CheapState::WaitForDelivery => RichState::WaitingForDelivery,
        CheapState::CashierAtRegister => RichState::CashierMovingToRegister,
        CheapState::Exiting => RichState::Exiting,
    }
}

/// Lookup between rich and cheap tags with safe fallbacks.
///
/// Override entries hold `None` for a removed mapping.
#[derive(Debug, Clone)]
pub struct StateMappingTable {
    use_standard: bool,
    cheap_overrides: AHashMap<RichState, Option<CheapState>>,
    rich_overrides: AHashMap<CheapState, Option<RichState>>,
}

impl Default for StateMappingTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl StateMappingTable {
    /// The shipped mapping for customers and staff.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            use_standard: true,
            cheap_overrides: AHashMap::new(),
            rich_overrides: AHashMap::new(),
        }
    }

    /// A table with no entries. Every lookup falls back.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            use_standard: false,
            ..Self::standard()
        }
    }

    /// Adds or replaces a rich → cheap entry.
    #[must_use]
    pub fn with_mapping(mut self, rich: RichState, cheap: CheapState) -> Self {
        self.cheap_overrides.insert(rich, Some(cheap));
        self
    }

    /// Adds or replaces the canonical rich entry state for a cheap state.
    #[must_use]
    pub fn with_inverse(mut self, cheap: CheapState, rich: RichState) -> Self {
        self.rich_overrides.insert(cheap, Some(rich));
        self
    }

    /// Removes the rich → cheap entry for `rich`.
    #[must_use]
    pub fn without_mapping(mut self, rich: RichState) -> Self {
        self.cheap_overrides.insert(rich, None);
        self
    }

    /// Removes the cheap → rich entry for `cheap`.
    #[must_use]
    pub fn without_inverse(mut self, cheap: CheapState) -> Self {
        self.rich_overrides.insert(cheap, None);
        self
    }

    /// Looks up the cheap state without falling back.
    #[must_use]
    pub fn try_to_cheap(&self, rich: RichState) -> Option<CheapState> {
        match self.cheap_overrides.get(&rich) {
            Some(entry) => *entry,
            None if self.use_standard => standard_to_cheap(rich),
            None => None,
        }
    }

    /// Looks up the canonical rich state without falling back.
    #[must_use]
    pub fn try_to_rich(&self, cheap: CheapState) -> Option<RichState> {
        match self.rich_overrides.get(&cheap) {
            Some(entry) => *entry,
            None if self.use_standard => Some(standard_to_rich(cheap)),
            None => None,
        }
    }

    /// Maps a rich state to its cheap counterpart. Never fails.
    ///
    /// Unmapped states land on [`CheapState::DEFAULT`] with a warning.
    #[must_use]
    pub fn to_cheap(&self, rich: RichState) -> CheapState {
        self.try_to_cheap(rich).unwrap_or_else(|| {
            warn!(
                "No cheap mapping for rich state {rich}, falling back to {}",
                CheapState::DEFAULT
            );
            CheapState::DEFAULT
        })
    }

    /// Maps a cheap state to its canonical rich entry state.
    ///
    /// A miss means the table is asymmetric, which is a configuration error;
    /// it is logged and resolved to [`RichState::DEFAULT`].
    #[must_use]
    pub fn to_rich(&self, cheap: CheapState) -> RichState {
        self.try_to_rich(cheap).unwrap_or_else(|| {
            error!(
                "Asymmetric mapping table: cheap state {cheap} has no rich entry, using {}",
                RichState::DEFAULT
            );
            RichState::DEFAULT
        })
    }

    /// Every rich state that collapses onto `cheap`, sorted.
    #[must_use]
    pub fn collapsed_from(&self, cheap: CheapState) -> Vec<RichState> {
        let mut states: Vec<RichState> = RichState::ALL
            .into_iter()
            .filter(|rich| self.try_to_cheap(*rich) == Some(cheap))
            .collect();
        states.sort_unstable();
        states
    }

    /// Cheap states `to_cheap` can produce, including the fallback.
    #[must_use]
    pub fn reachable_cheap_states(&self) -> Vec<CheapState> {
        let mut states: Vec<CheapState> = RichState::ALL
            .into_iter()
            .filter_map(|rich| self.try_to_cheap(rich))
            .collect();
        states.push(CheapState::DEFAULT);
        states.sort_unstable();
        states.dedup();
        states
    }

    /// Checks that every cheap state reachable from the rich side maps back.
    pub fn validate(&self) -> NpcResult<()> {
        for cheap in self.reachable_cheap_states() {
            if self.try_to_rich(cheap).is_none() {
                return Err(NpcError::AsymmetricMapping(cheap));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_mapping_is_total(idx in 0usize..RichState::ALL.len()) {
            let table = StateMappingTable::standard();
            let rich = RichState::ALL[idx];
            let cheap = table.to_cheap(rich);
            prop_assert!(table.try_to_rich(cheap).is_some());
        }

        #[test]
        fn prop_empty_table_still_answers(idx in 0usize..RichState::ALL.len()) {
            let table = StateMappingTable::empty();
            prop_assert_eq!(table.to_cheap(RichState::ALL[idx]), CheapState::DEFAULT);
            prop_assert_eq!(table.to_rich(CheapState::DEFAULT), RichState::DEFAULT);
        }
    }

    #[test]
    fn test_standard_table_validates() {
        assert!(StateMappingTable::standard().validate().is_ok());
    }

    #[test]
    fn test_checkout_flow_collapses() {
        let table = StateMappingTable::standard();
        assert_eq!(
            table.collapsed_from(CheapState::WaitForCashier),
            vec![
                RichState::MovingToCheckout,
                RichState::MovingToRegister,
                RichState::InQueue,
                RichState::WaitingAtRegister,
            ]
        );
        assert_eq!(
            table.to_rich(CheapState::WaitForCashier),
            RichState::MovingToCheckout
        );
    }

    #[test]
    fn test_combat_falls_back_to_patrol() {
        let table = StateMappingTable::standard();
        assert_eq!(table.try_to_cheap(RichState::Combat), None);
        assert_eq!(table.to_cheap(RichState::Combat), CheapState::Patrol);
    }

    #[test]
    fn test_asymmetric_table_rejected() {
        let table = StateMappingTable::standard().without_inverse(CheapState::Browse);
        match table.validate() {
            Err(NpcError::AsymmetricMapping(state)) => assert_eq!(state, CheapState::Browse),
            other => panic!("expected asymmetric mapping error, got {other:?}"),
        }
        assert_eq!(table.to_rich(CheapState::Browse), RichState::Idle);
    }

    #[test]
    fn test_unreachable_gap_is_not_an_error() {
        let table = StateMappingTable::standard()
            .without_mapping(RichState::Browsing)
            .without_inverse(CheapState::Browse);
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_standard_functions_round_trip_every_cheap_state() {
        for cheap in CheapState::ALL {
            let rich = standard_to_rich(cheap);
            assert_eq!(standard_to_cheap(rich), Some(cheap), "{cheap} via {rich}");
        }
    }

    #[test]
    fn test_override_wins_over_standard() {
        let table = StateMappingTable::standard()
            .with_mapping(RichState::Combat, CheapState::Exiting)
            .with_inverse(CheapState::Patrol, RichState::Reacting);
        assert_eq!(table.try_to_cheap(RichState::Combat), Some(CheapState::Exiting));
        assert_eq!(table.to_rich(CheapState::Patrol), RichState::Reacting);
        assert_eq!(table.to_rich(CheapState::Browse), RichState::Browsing);
        assert!(table.validate().is_ok());
    }
}
