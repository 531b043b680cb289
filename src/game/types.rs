use serde::{Deserialize, Serialize};
use std::fmt;

/// Difficulty levels. Grid size, bomb count and point value are a function
/// of the level alone (see `config::GameRules`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Easy,
    Medium,
    Hard,
}

impl Level {
    pub fn all() -> [Level; 3] {
        [Level::Easy, Level::Medium, Level::Hard]
    }

    pub fn parse(s: &str) -> Option<Level> {
        match s {
            "easy" => Some(Level::Easy),
            "medium" => Some(Level::Medium),
            "hard" => Some(Level::Hard),
            _ => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Easy => write!(f, "easy"),
            Level::Medium => write!(f, "medium"),
            Level::Hard => write!(f, "hard"),
        }
    }
}

/// One board cell. Never serialized to a client while the game is active.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cell {
    pub symbol: String,
    pub is_bomb: bool,
}

/// Session lifecycle. `Won` and `Lost` are terminal; the record is deleted
/// the instant either is reached, so they only ever appear in responses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Active,
    Won,
    Lost,
}

/// The authoritative hidden board for one in-progress game. Lives in the
/// store under `game:{id}` and is mutated only by the reveal engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSession {
    pub wallet: String,
    pub level: Level,
    pub cells: Vec<Cell>,
    /// Append-only, no duplicates.
    pub revealed: Vec<usize>,
    pub status: GameStatus,
    pub created_at_ms: u64,
}

impl GameSession {
    pub fn total_safe_cells(&self) -> usize {
        self.cells.iter().filter(|c| !c.is_bomb).count()
    }

    pub fn revealed_safe_cells(&self) -> usize {
        self.revealed
            .iter()
            .filter(|&&i| !self.cells[i].is_bomb)
            .count()
    }
}
