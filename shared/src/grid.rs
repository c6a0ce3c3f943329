//! Map geometry seen through the operations the simulation needs.
//!
//! [`Grid`] is the seam to the real map/pathfinding code. [`MapGrid`] is a
//! rectangular stand-in with blocked cells and a greedy line-stepping path
//! search, enough to drive the server and the tests.

use crate::entity::{Coordinate, Direction, EntityId, Path};
use std::collections::{HashMap, HashSet};

pub const MAX_PATH_LENGTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathResult {
    Found,
    AlreadyThere,
    NoPath,
    InvalidTarget,
}

pub trait Grid {
    fn name(&self) -> &str;

    fn are_coordinates_valid(&self, coordinate: Coordinate) -> bool;

    /// Finds a path from `from` to `to` and stores it in `path`. On failure
    /// `path` is left untouched.
    fn find_and_set_path(&self, path: &mut Path, from: Coordinate, to: Coordinate) -> PathResult;

    /// Moves an occupant between cells; `None` adds or removes it.
    fn move_occupant(&mut self, entity: EntityId, from: Option<Coordinate>, to: Option<Coordinate>);

    /// Occupants within Chebyshev `radius` of `center`, sorted by id.
    fn occupants_in_range(&self, center: Coordinate, radius: u32) -> Vec<EntityId>;
}

#[derive(Debug, Clone)]
pub struct MapGrid {
    name: String,
    width: i32,
    height: i32,
    blocked: HashSet<Coordinate>,
    occupants: HashMap<Coordinate, Vec<EntityId>>,
}

impl MapGrid {
    pub fn new(name: &str, width: i32, height: i32) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
            blocked: HashSet::new(),
            occupants: HashMap::new(),
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn block(&mut self, coordinate: Coordinate) {
        self.blocked.insert(coordinate);
    }

    pub fn is_walkable(&self, coordinate: Coordinate) -> bool {
        self.are_coordinates_valid(coordinate) && !self.blocked.contains(&coordinate)
    }

    pub fn occupants_at(&self, coordinate: Coordinate) -> &[EntityId] {
        self.occupants
            .get(&coordinate)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn next_step(&self, current: Coordinate, target: Coordinate) -> Option<Coordinate> {
        let direction = Direction::between(&current, &target)?;
        let straight = current.step(direction);
        if self.is_walkable(straight) {
            return Some(straight);
        }

        // Slide along an axis when the diagonal is blocked.
        let (dx, dy) = direction.delta();
        [
            Coordinate::new(current.x + dx, current.y),
            Coordinate::new(current.x, current.y + dy),
        ]
        .into_iter()
        .find(|c| *c != current && self.is_walkable(*c))
    }
}

impl Grid for MapGrid {
    fn name(&self) -> &str {
        &self.name
    }

    fn are_coordinates_valid(&self, coordinate: Coordinate) -> bool {
        coordinate.x >= 0 && coordinate.y >= 0 && coordinate.x < self.width && coordinate.y < self.height
    }

    fn find_and_set_path(&self, path: &mut Path, from: Coordinate, to: Coordinate) -> PathResult {
        if !self.is_walkable(to) {
            return PathResult::InvalidTarget;
        }
        if from == to {
            return PathResult::AlreadyThere;
        }

        let mut cells = vec![from];
        let mut visited = HashSet::from([from]);
        let mut current = from;

        while current != to {
            if cells.len() > MAX_PATH_LENGTH {
                return PathResult::NoPath;
            }
            match self.next_step(current, to) {
                Some(next) if visited.insert(next) => {
                    cells.push(next);
                    current = next;
                }
                _ => return PathResult::NoPath,
            }
        }

        *path = Path::new(cells);
        PathResult::Found
    }

    fn move_occupant(&mut self, entity: EntityId, from: Option<Coordinate>, to: Option<Coordinate>) {
        if let Some(from) = from {
            if let Some(ids) = self.occupants.get_mut(&from) {
                ids.retain(|id| *id != entity);
                if ids.is_empty() {
                    self.occupants.remove(&from);
                }
            }
        }
        if let Some(to) = to {
            self.occupants.entry(to).or_default().push(entity);
        }
    }

    fn occupants_in_range(&self, center: Coordinate, radius: u32) -> Vec<EntityId> {
        let mut found: Vec<EntityId> = self
            .occupants
            .iter()
            .filter(|(cell, _)| cell.in_range(&center, radius))
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect();
        found.sort_unstable();
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_validity() {
        let grid = MapGrid::new("prontera", 10, 10);
        assert!(grid.are_coordinates_valid(Coordinate::new(0, 0)));
        assert!(grid.are_coordinates_valid(Coordinate::new(9, 9)));
        assert!(!grid.are_coordinates_valid(Coordinate::new(10, 0)));
        assert!(!grid.are_coordinates_valid(Coordinate::new(0, -1)));
    }

    #[test]
    fn test_open_path_goes_diagonal_first() {
        let grid = MapGrid::new("prontera", 20, 20);
        let mut path = Path::empty();
        let result = grid.find_and_set_path(&mut path, Coordinate::new(0, 0), Coordinate::new(5, 2));

        assert_eq!(result, PathResult::Found);
        assert_eq!(path.cells().first(), Some(&Coordinate::new(0, 0)));
        assert_eq!(path.destination(), Some(Coordinate::new(5, 2)));
        assert_eq!(path.cells().len(), 6);
        assert_eq!(
            path.corners(),
            &[Coordinate::new(0, 0), Coordinate::new(2, 2), Coordinate::new(5, 2)]
        );
    }

    #[test]
    fn test_path_slides_around_blocked_diagonal() {
        let mut grid = MapGrid::new("prontera", 20, 20);
        grid.block(Coordinate::new(1, 1));
        let mut path = Path::empty();
        let result = grid.find_and_set_path(&mut path, Coordinate::new(0, 0), Coordinate::new(3, 3));

        assert_eq!(result, PathResult::Found);
        assert!(!path.cells().contains(&Coordinate::new(1, 1)));
    }

    #[test]
    fn test_blocked_target_is_invalid() {
        let mut grid = MapGrid::new("prontera", 20, 20);
        grid.block(Coordinate::new(4, 4));
        let mut path = Path::empty();
        assert_eq!(
            grid.find_and_set_path(&mut path, Coordinate::new(0, 0), Coordinate::new(4, 4)),
            PathResult::InvalidTarget
        );
        assert!(path.cells().is_empty());
    }

    #[test]
    fn test_too_long_path_is_rejected() {
        let grid = MapGrid::new("prontera", 100, 100);
        let mut path = Path::empty();
        assert_eq!(
            grid.find_and_set_path(&mut path, Coordinate::new(0, 0), Coordinate::new(60, 0)),
            PathResult::NoPath
        );
    }

    #[test]
    fn test_occupants_in_range() {
        let mut grid = MapGrid::new("prontera", 50, 50);
        grid.move_occupant(3, None, Some(Coordinate::new(10, 10)));
        grid.move_occupant(1, None, Some(Coordinate::new(12, 8)));
        grid.move_occupant(2, None, Some(Coordinate::new(30, 30)));

        assert_eq!(grid.occupants_in_range(Coordinate::new(10, 10), 2), vec![1, 3]);

        grid.move_occupant(1, Some(Coordinate::new(12, 8)), Some(Coordinate::new(40, 40)));
        assert_eq!(grid.occupants_in_range(Coordinate::new(10, 10), 2), vec![3]);
        assert!(grid.occupants_at(Coordinate::new(12, 8)).is_empty());

        grid.move_occupant(3, Some(Coordinate::new(10, 10)), None);
        assert!(grid.occupants_in_range(Coordinate::new(10, 10), 2).is_empty());
    }
}
