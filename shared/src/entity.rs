//! Entity data model shared by both ends of the connection.

use crate::stats::{StatType, StatValue};
use serde::{Deserialize, Serialize};

/// Positive, monotonically assigned, never reused within a session.
pub type EntityId = u32;

/// Grid cell on a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
}

impl Coordinate {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance, which is what range checks on an 8-way grid use.
    pub fn distance(&self, other: &Coordinate) -> u32 {
        let dx = (self.x - other.x).unsigned_abs();
        let dy = (self.y - other.y).unsigned_abs();
        dx.max(dy)
    }

    pub fn in_range(&self, other: &Coordinate, range: u32) -> bool {
        self.distance(other) <= range
    }

    pub fn step(&self, direction: Direction) -> Coordinate {
        let (dx, dy) = direction.delta();
        Coordinate::new(self.x + dx, self.y + dy)
    }
}

/// Eight-way facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Direction {
    #[default]
    South,
    SouthWest,
    West,
    NorthWest,
    North,
    NorthEast,
    East,
    SouthEast,
}

impl Direction {
    pub fn delta(&self) -> (i32, i32) {
        match self {
            Direction::South => (0, -1),
            Direction::SouthWest => (-1, -1),
            Direction::West => (-1, 0),
            Direction::NorthWest => (-1, 1),
            Direction::North => (0, 1),
            Direction::NorthEast => (1, 1),
            Direction::East => (1, 0),
            Direction::SouthEast => (1, -1),
        }
    }

    /// Facing from `from` towards `to`. Returns `None` for the same cell.
    pub fn between(from: &Coordinate, to: &Coordinate) -> Option<Direction> {
        let dx = (to.x - from.x).signum();
        let dy = (to.y - from.y).signum();
        let direction = match (dx, dy) {
            (0, -1) => Direction::South,
            (-1, -1) => Direction::SouthWest,
            (-1, 0) => Direction::West,
            (-1, 1) => Direction::NorthWest,
            (0, 1) => Direction::North,
            (1, 1) => Direction::NorthEast,
            (1, 0) => Direction::East,
            (1, -1) => Direction::SouthEast,
            _ => return None,
        };
        Some(direction)
    }

    pub fn is_diagonal(&self) -> bool {
        let (dx, dy) = self.delta();
        dx != 0 && dy != 0
    }
}

/// Diagonal steps cost this much more time than straight ones.
pub const DIAGONAL_STEP_FACTOR: f32 = 1.4;

/// A movement path.
///
/// `cells[0]` is the cell the entity stood on when the path was assigned and
/// `step` indexes the cell it currently occupies. `corners` is the subsequence
/// of cells where the heading changes, plus both endpoints, which is all
/// locomotion needs to interpolate between.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Path {
    cells: Vec<Coordinate>,
    corners: Vec<Coordinate>,
    step: usize,
    progress: f32,
}

impl Path {
    pub fn new(cells: Vec<Coordinate>) -> Self {
        let corners = Self::find_corners(&cells);
        Self {
            cells,
            corners,
            step: 0,
            progress: 0.0,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    fn find_corners(cells: &[Coordinate]) -> Vec<Coordinate> {
        let mut corners = Vec::new();
        let Some(first) = cells.first() else {
            return corners;
        };
        corners.push(*first);

        for window in cells.windows(3) {
            let incoming = Direction::between(&window[0], &window[1]);
            let outgoing = Direction::between(&window[1], &window[2]);
            if incoming != outgoing {
                corners.push(window[1]);
            }
        }

        if cells.len() > 1 {
            if let Some(last) = cells.last() {
                corners.push(*last);
            }
        }
        corners
    }

    pub fn cells(&self) -> &[Coordinate] {
        &self.cells
    }

    pub fn corners(&self) -> &[Coordinate] {
        &self.corners
    }

    /// Cells not yet walked, starting with the current one.
    pub fn remaining(&self) -> &[Coordinate] {
        if self.cells.is_empty() {
            return &self.cells;
        }
        &self.cells[self.step.min(self.cells.len() - 1)..]
    }

    pub fn current(&self) -> Option<Coordinate> {
        self.cells.get(self.step).copied()
    }

    pub fn destination(&self) -> Option<Coordinate> {
        self.cells.last().copied()
    }

    pub fn next_cell(&self) -> Option<Coordinate> {
        self.cells.get(self.step + 1).copied()
    }

    pub fn has_finished(&self) -> bool {
        self.cells.is_empty() || self.step + 1 >= self.cells.len()
    }

    /// Fraction of the current step that has been walked.
    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// Walks the path forward by `dt` seconds. Returns every cell entered,
    /// in order.
    pub fn advance(&mut self, dt: f32, seconds_per_cell: f32) -> Vec<Coordinate> {
        let mut entered = Vec::new();
        if self.has_finished() || seconds_per_cell <= 0.0 {
            return entered;
        }

        let mut budget = dt;
        while budget > 0.0 && !self.has_finished() {
            let from = self.cells[self.step];
            let to = self.cells[self.step + 1];
            let step_time = match Direction::between(&from, &to) {
                Some(direction) if direction.is_diagonal() => {
                    seconds_per_cell * DIAGONAL_STEP_FACTOR
                }
                _ => seconds_per_cell,
            };

            let needed = (1.0 - self.progress) * step_time;
            if budget >= needed {
                budget -= needed;
                self.step += 1;
                self.progress = 0.0;
                entered.push(to);
            } else {
                self.progress += budget / step_time;
                budget = 0.0;
            }
        }

        if self.has_finished() {
            self.progress = 0.0;
        }
        entered
    }

    /// Heading of the step being walked, if any.
    pub fn heading(&self) -> Option<Direction> {
        let from = self.cells.get(self.step)?;
        let to = self.cells.get(self.step + 1)?;
        Direction::between(from, to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    Monster,
    Pickup,
}

impl EntityKind {
    pub fn is_battle_capable(&self) -> bool {
        !matches!(self, EntityKind::Pickup)
    }
}

/// Everything an observer needs to create a mirror of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub kind: EntityKind,
    /// Monster class or item id; unused for players.
    pub class_id: u16,
    pub name: String,
    pub map: String,
    pub position: Coordinate,
    pub direction: Direction,
    /// Remaining cells of the current path, starting at `position`.
    pub path: Vec<Coordinate>,
    /// Seconds per cell.
    pub move_speed: f32,
    pub level: i32,
    pub hp: i32,
    pub max_hp: i32,
    pub sp: i32,
    pub max_sp: i32,
}

/// The richer snapshot only ever sent to the player who owns the entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalPlayerSnapshot {
    pub entity: EntitySnapshot,
    pub stats: Vec<(StatType, StatValue)>,
    pub stat_costs: Vec<(StatType, i32)>,
    pub status_points: i32,
    pub skill_points: i32,
    pub base_exp: u32,
    pub base_exp_next: u32,
    pub job_exp: u32,
    pub job_exp_next: u32,
    pub job_level: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemovalReason {
    OutOfSight,
    Died,
    LoggedOut,
    Despawned,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn line(from: (i32, i32), to: (i32, i32)) -> Vec<Coordinate> {
        let mut cells = vec![Coordinate::new(from.0, from.1)];
        let target = Coordinate::new(to.0, to.1);
        let mut current = cells[0];
        while let Some(direction) = Direction::between(&current, &target) {
            current = current.step(direction);
            cells.push(current);
        }
        cells
    }

    #[test]
    fn test_distance_is_chebyshev() {
        let a = Coordinate::new(0, 0);
        assert_eq!(a.distance(&Coordinate::new(3, -7)), 7);
        assert!(a.in_range(&Coordinate::new(5, 5), 5));
        assert!(!a.in_range(&Coordinate::new(6, 0), 5));
    }

    #[test]
    fn test_direction_between() {
        let origin = Coordinate::new(5, 5);
        assert_eq!(Direction::between(&origin, &Coordinate::new(9, 9)), Some(Direction::NorthEast));
        assert_eq!(Direction::between(&origin, &Coordinate::new(5, 0)), Some(Direction::South));
        assert_eq!(Direction::between(&origin, &origin), None);
    }

    #[test]
    fn test_path_corners() {
        let mut cells = line((0, 0), (3, 3));
        cells.extend(line((3, 3), (6, 3)).into_iter().skip(1));
        let path = Path::new(cells);

        assert_eq!(
            path.corners(),
            &[Coordinate::new(0, 0), Coordinate::new(3, 3), Coordinate::new(6, 3)]
        );
    }

    #[test]
    fn test_path_advance_straight() {
        let mut path = Path::new(line((0, 0), (3, 0)));
        assert!(!path.has_finished());

        let entered = path.advance(0.25, 0.1);
        assert_eq!(entered, vec![Coordinate::new(1, 0), Coordinate::new(2, 0)]);
        assert_approx_eq!(path.progress(), 0.5, 1e-4);
        assert_eq!(path.current(), Some(Coordinate::new(2, 0)));

        let entered = path.advance(1.0, 0.1);
        assert_eq!(entered, vec![Coordinate::new(3, 0)]);
        assert!(path.has_finished());
        assert_eq!(path.remaining(), &[Coordinate::new(3, 0)]);
    }

    #[test]
    fn test_path_diagonal_is_slower() {
        let mut path = Path::new(line((0, 0), (1, 1)));
        assert!(path.advance(0.1, 0.1).is_empty());
        assert_eq!(path.advance(0.05, 0.1), vec![Coordinate::new(1, 1)]);
    }

    #[test]
    fn test_empty_path_is_finished() {
        let mut path = Path::empty();
        assert!(path.has_finished());
        assert!(path.advance(1.0, 0.1).is_empty());
        assert!(path.corners().is_empty());
    }
}
