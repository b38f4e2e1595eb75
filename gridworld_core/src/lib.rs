use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub mod agent;
pub mod environment;
pub mod map;

use environment::GridWorldError;

/// Unique identifier for agents driving an environment.
pub type EntityId = usize;

/// Glyph for an empty cell in a rendered snapshot.
pub const EMPTY: char = ' ';
/// Glyph for a wall cell.
pub const WALL: char = '#';
/// Glyph for the goal cell.
pub const GOAL: char = 'G';
/// Glyph for the agent ("car").
pub const AGENT: char = 'C';

/// Represents a 2D grid coordinate.
///
/// A plain value: moving produces a new `Position` rather than mutating one.
/// No bounds are enforced here, that is the environment's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: i64,
    pub col: i64,
}

impl Position {
    pub const fn new(row: i64, col: i64) -> Self {
        Position { row, col }
    }

    /// Returns the neighbouring position one unit away in `direction`.
    pub fn shifted(self, direction: Direction) -> Self {
        let (dr, dc) = direction.delta();
        Position {
            row: self.row + dr,
            col: self.col + dc,
        }
    }
}

impl From<(i64, i64)> for Position {
    fn from((row, col): (i64, i64)) -> Self {
        Position { row, col }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.row, self.col)
    }
}

/// The four moves available to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Left,
        Direction::Right,
        Direction::Up,
        Direction::Down,
    ];

    /// Returns the `(row, col)` offset of a single move.
    pub const fn delta(self) -> (i64, i64) {
        match self {
            Direction::Left => (0, -1),
            Direction::Right => (0, 1),
            Direction::Up => (-1, 0),
            Direction::Down => (1, 0),
        }
    }
}

/// Parses the driver's direction tokens: `l`, `r`, `u`, `d` or the full words.
impl FromStr for Direction {
    type Err = GridWorldError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token.trim().to_ascii_lowercase().as_str() {
            "l" | "left" => Ok(Direction::Left),
            "r" | "right" => Ok(Direction::Right),
            "u" | "up" => Ok(Direction::Up),
            "d" | "down" => Ok(Direction::Down),
            _ => Err(GridWorldError::InvalidDirection(token.to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Up => "up",
            Direction::Down => "down",
        };
        f.write_str(name)
    }
}
