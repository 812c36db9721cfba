//! Browse destinations inside the store.

use ahash::AHashMap;
use dispensary_common::{NpcId, Vec2};
use serde::{Deserialize, Serialize};

/// A shelf a customer can browse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrowseDestination {
    /// Index of the shelf in the directory.
    pub shelf_index: usize,
    /// Where to stand while browsing.
    pub position: Vec2,
}

/// Hands out browse destinations.
pub trait ShoppingLocationProvider {
    /// Picks a destination for `requester`, or `None` if every shelf is busy.
    fn request_destination(&mut self, requester: &NpcId) -> Option<BrowseDestination>;
    /// Frees whatever shelf `requester` was browsing.
    fn release_destination(&mut self, requester: &NpcId);
}

/// Shelves with a per-shelf browser cap.
#[derive(Debug, Clone)]
pub struct ShelfDirectory {
    shelves: Vec<Vec2>,
    browsers_per_shelf: usize,
    assigned: AHashMap<NpcId, usize>,
    rng: fastrand::Rng,
}

impl ShelfDirectory {
    /// Creates a directory. A cap of 0 is treated as 1.
    #[must_use]
    pub fn new(shelves: Vec<Vec2>, browsers_per_shelf: usize, seed: u64) -> Self {
        Self {
            shelves,
            browsers_per_shelf: browsers_per_shelf.max(1),
            assigned: AHashMap::new(),
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    /// Number of shelves.
    #[must_use]
    pub fn shelf_count(&self) -> usize {
        self.shelves.len()
    }

    /// Number of customers browsing a given shelf.
    #[must_use]
    pub fn browsers_at(&self, shelf_index: usize) -> usize {
        self.assigned.values().filter(|s| **s == shelf_index).count()
    }
}

impl ShoppingLocationProvider for ShelfDirectory {
    fn request_destination(&mut self, requester: &NpcId) -> Option<BrowseDestination> {
        self.assigned.remove(requester);
        let open: Vec<usize> = (0..self.shelves.len())
            .filter(|i| self.browsers_at(*i) < self.browsers_per_shelf)
            .collect();
        if open.is_empty() {
            return None;
        }
        let shelf_index = open[self.rng.usize(..open.len())];
        self.assigned.insert(requester.clone(), shelf_index);
        Some(BrowseDestination {
            shelf_index,
            position: self.shelves[shelf_index],
        })
    }

    fn release_destination(&mut self, requester: &NpcId) {
        self.assigned.remove(requester);
    }
}
