//! Scratch-card game core: hidden boards, session tokens, reveals.

pub mod reveal;
pub mod session;
pub mod types;

pub use reveal::{RevealEngine, RevealOutcome, RevealedCell};
pub use session::{GameManager, NewGame};
pub use types::{Cell, GameSession, GameStatus, Level};
