//! Uniform-grid spatial index over record positions.

use ahash::AHashMap;
use dispensary_common::Vec2;

use crate::registry::RecordIndex;

/// Spatial lookup of records by position.
pub trait SpatialIndex {
    /// Starts tracking a record.
    fn add_record(&mut self, index: RecordIndex, position: Vec2);
    /// Stops tracking a record.
    fn remove_record(&mut self, index: RecordIndex);
    /// Moves a tracked record. Untracked records are added.
    fn update_position(&mut self, index: RecordIndex, old: Vec2, new: Vec2);
    /// All tracked records within `radius` of `point`, in ascending index order.
    fn query_in_radius(&self, point: Vec2, radius: f32) -> Vec<RecordIndex>;
    /// Width of one grid cell.
    fn cell_size(&self) -> f32;
}

type Cell = (i32, i32);

/// Hash grid with square cells.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f32,
    cells: AHashMap<Cell, Vec<RecordIndex>>,
    positions: AHashMap<RecordIndex, Vec2>,
}

impl SpatialGrid {
    /// Creates a grid. Cell sizes below 0.1 are clamped.
    #[must_use]
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(0.1),
            cells: AHashMap::new(),
            positions: AHashMap::new(),
        }
    }

    /// Number of tracked records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Tracked position of a record.
    #[must_use]
    pub fn position_of(&self, index: RecordIndex) -> Option<Vec2> {
        self.positions.get(&index).copied()
    }

    /// Forgets every record.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.positions.clear();
    }

    fn cell_of(&self, position: Vec2) -> Cell {
        (
            (position.x / self.cell_size).floor() as i32,
            (position.y / self.cell_size).floor() as i32,
        )
    }

    fn unlink(&mut self, index: RecordIndex, cell: Cell) {
        if let Some(bucket) = self.cells.get_mut(&cell) {
            bucket.retain(|i| *i != index);
            if bucket.is_empty() {
                self.cells.remove(&cell);
            }
        }
    }
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(8.0)
    }
}

impl SpatialIndex for SpatialGrid {
    fn add_record(&mut self, index: RecordIndex, position: Vec2) {
        if let Some(previous) = self.positions.insert(index, position) {
            let cell = self.cell_of(previous);
            self.unlink(index, cell);
        }
        let cell = self.cell_of(position);
        self.cells.entry(cell).or_default().push(index);
    }

    fn remove_record(&mut self, index: RecordIndex) {
        if let Some(position) = self.positions.remove(&index) {
            let cell = self.cell_of(position);
            self.unlink(index, cell);
        }
    }

    // The tracked position wins over the caller's idea of the old one.
    fn update_position(&mut self, index: RecordIndex, _old: Vec2, new: Vec2) {
        let Some(tracked) = self.positions.get(&index).copied() else {
            self.add_record(index, new);
            return;
        };
        let old_cell = self.cell_of(tracked);
        let new_cell = self.cell_of(new);
        if old_cell != new_cell {
            self.unlink(index, old_cell);
            self.cells.entry(new_cell).or_default().push(index);
        }
        self.positions.insert(index, new);
    }

    fn query_in_radius(&self, point: Vec2, radius: f32) -> Vec<RecordIndex> {
        let radius = radius.max(0.0);
        let min = self.cell_of(point - Vec2::splat(radius));
        let max = self.cell_of(point + Vec2::splat(radius));
        let radius_sq = radius * radius;

        let mut found = Vec::new();
        for cx in min.0..=max.0 {
            for cy in min.1..=max.1 {
                let Some(bucket) = self.cells.get(&(cx, cy)) else {
                    continue;
                };
                for index in bucket {
                    let inside = self
                        .positions
                        .get(index)
                        .is_some_and(|pos| pos.distance_squared(point) <= radius_sq);
                    if inside {
                        found.push(*index);
                    }
                }
            }
        }
        found.sort_unstable();
        found
    }

    fn cell_size(&self) -> f32 {
        self.cell_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(i: u32) -> RecordIndex {
        RecordIndex(i)
    }

    #[test]
    fn test_query_filters_by_distance() {
        let mut grid = SpatialGrid::new(4.0);
        grid.add_record(idx(0), Vec2::new(0.0, 0.0));
        grid.add_record(idx(1), Vec2::new(3.0, 0.0));
        grid.add_record(idx(2), Vec2::new(10.0, 10.0));

        assert_eq!(grid.query_in_radius(Vec2::ZERO, 3.5), vec![idx(0), idx(1)]);
        assert_eq!(grid.query_in_radius(Vec2::ZERO, 1.0), vec![idx(0)]);
        assert_eq!(grid.query_in_radius(Vec2::new(10.0, 9.0), 1.5), vec![idx(2)]);
    }

    #[test]
    fn test_update_position_moves_between_cells() {
        let mut grid = SpatialGrid::new(2.0);
        grid.add_record(idx(7), Vec2::ZERO);
        grid.update_position(idx(7), Vec2::ZERO, Vec2::new(20.0, 20.0));

        assert!(grid.query_in_radius(Vec2::ZERO, 5.0).is_empty());
        assert_eq!(grid.query_in_radius(Vec2::new(20.0, 20.0), 0.5), vec![idx(7)]);
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn test_update_untracked_adds() {
        let mut grid = SpatialGrid::default();
        grid.update_position(idx(3), Vec2::ZERO, Vec2::new(1.0, 1.0));
        assert_eq!(grid.position_of(idx(3)), Some(Vec2::new(1.0, 1.0)));
    }

    #[test]
    fn test_remove_record() {
        let mut grid = SpatialGrid::new(4.0);
        grid.add_record(idx(1), Vec2::new(-3.0, -3.0));
        grid.remove_record(idx(1));
        assert!(grid.is_empty());
        assert!(grid.query_in_radius(Vec2::new(-3.0, -3.0), 1.0).is_empty());
    }
}
