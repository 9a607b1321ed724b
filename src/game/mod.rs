//! Game simulation modules

pub mod collector;
pub mod combat;
pub mod r#match;
pub mod physics;
pub mod snapshot;

pub use collector::ActionCollector;
pub use r#match::{GameMatch, MatchListener, MatchResult, MatchState, RunState};

use serde::{Deserialize, Serialize};

/// Cardinal facing / travel direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    N,
    E,
    S,
    W,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::N, Direction::E, Direction::S, Direction::W];

    /// Grid delta of one step; north is towards y = 0
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::N => (0, -1),
            Direction::E => (1, 0),
            Direction::S => (0, 1),
            Direction::W => (-1, 0),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "N" => Some(Direction::N),
            "E" => Some(Direction::E),
            "S" => Some(Direction::S),
            "W" => Some(Direction::W),
            _ => None,
        }
    }
}

/// Integer grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighbouring cell in `dir` (may be off-grid)
    pub fn step(self, dir: Direction) -> Self {
        let (dx, dy) = dir.offset();
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn manhattan(self, other: Position) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

/// Validated instruction for one tank for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Wait,
    Move(Direction),
    Aim(Direction),
    Shoot,
}

/// An intent tagged with the issuing tank (index into the roster)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TankAction {
    pub tank: usize,
    pub action: Action,
}

impl TankAction {
    pub fn wait(tank: usize) -> Self {
        Self {
            tank,
            action: Action::Wait,
        }
    }
}
