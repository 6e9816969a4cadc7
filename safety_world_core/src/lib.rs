use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub mod agent;
pub mod environment;
pub mod error;
pub mod layout;
pub mod map;
pub mod physics;
pub mod policy;
pub mod reversibility;
pub mod reward;
pub mod scenario;

pub use error::SimError;

/// Unique identifier for agents. Agents are numbered in map reading order.
pub type AgentId = usize;

/// Represents a 2D coordinate on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub const fn new(row: usize, col: usize) -> Self {
        Position { row, col }
    }

    /// Returns the position `distance` cells away in `direction`, or `None` if
    /// that would leave the non-negative quadrant.
    pub fn offset(self, direction: Direction, distance: usize) -> Option<Position> {
        let (dr, dc) = direction.delta();
        let distance = isize::try_from(distance).ok()?;
        Some(Position {
            row: self.row.checked_add_signed(dr * distance)?,
            col: self.col.checked_add_signed(dc * distance)?,
        })
    }

    /// Direction of a single-cell step from `self` to `other`, if they are adjacent.
    pub fn direction_to(self, other: Position) -> Option<Direction> {
        Direction::ALL
            .into_iter()
            .find(|dir| self.offset(*dir, 1) == Some(other))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// One of the four cardinal moves an agent can attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    /// Enumeration order used everywhere neighbours are listed.
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    /// Unit vector as `(row delta, col delta)`.
    #[inline]
    pub const fn delta(self) -> (isize, isize) {
        match self {
            Direction::North => (-1, 0),
            Direction::South => (1, 0),
            Direction::East => (0, 1),
            Direction::West => (0, -1),
        }
    }

    pub const fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Direction {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "north" | "n" => Ok(Direction::North),
            "south" | "s" => Ok(Direction::South),
            "east" | "e" => Ok(Direction::East),
            "west" | "w" => Ok(Direction::West),
            _ => Err(SimError::InvalidDirection(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_follows_unit_vectors() {
        let origin = Position::new(2, 2);
        assert_eq!(origin.offset(Direction::North, 1), Some(Position::new(1, 2)));
        assert_eq!(origin.offset(Direction::South, 2), Some(Position::new(4, 2)));
        assert_eq!(origin.offset(Direction::East, 1), Some(Position::new(2, 3)));
        assert_eq!(origin.offset(Direction::West, 2), Some(Position::new(2, 0)));
        assert_eq!(origin.offset(Direction::West, 3), None);
    }

    #[test]
    fn direction_parsing_rejects_unknown_names() {
        assert_eq!("North".parse::<Direction>(), Ok(Direction::North));
        assert_eq!(" w ".parse::<Direction>(), Ok(Direction::West));
        assert_eq!(
            "up".parse::<Direction>(),
            Err(SimError::InvalidDirection("up".to_string()))
        );
    }

    #[test]
    fn direction_to_adjacent_cells_only() {
        let a = Position::new(3, 3);
        assert_eq!(a.direction_to(Position::new(3, 4)), Some(Direction::East));
        assert_eq!(a.direction_to(Position::new(2, 3)), Some(Direction::North));
        assert_eq!(a.direction_to(Position::new(4, 4)), None);
        assert_eq!(a.direction_to(a), None);
    }
}
