//! Atomic cell-reveal state machine
//!
//! Every reveal runs as one store script on the session key: validation,
//! the duplicate check, the bomb/win decision and the terminal delete all
//! happen under the per-key lock. A finished board is removed inside the
//! script, so of any number of racing reveals exactly one observes the
//! winning transition and is the only caller that credits the win.

use crate::{
    config::GameRules,
    errors::{CoreError, CoreResult},
    game::{
        session::{game_key, verify_game_token},
        types::{Cell, GameSession, GameStatus, Level},
    },
    ledger::{Ledger, WinCredit},
    ratelimit::{Op, RateLimiter},
    store::{KvStore, Write},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// A cell as shown to the client once revealed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealedCell {
    pub index: usize,
    pub symbol: String,
    pub is_bomb: bool,
}

impl RevealedCell {
    fn new(index: usize, cell: &Cell) -> Self {
        Self {
            index,
            symbol: cell.symbol.clone(),
            is_bomb: cell.is_bomb,
        }
    }
}

/// Result of one reveal. The full board is disclosed only on terminal
/// transitions; an active game never leaks unrevealed cells.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RevealOutcome {
    Active {
        cell: RevealedCell,
        revealed_count: usize,
        safe_remaining: usize,
    },
    Lost {
        cell: RevealedCell,
        board: Vec<Cell>,
    },
    Won {
        cell: RevealedCell,
        board: Vec<Cell>,
        points_earned: u64,
        daily_limit_reached: bool,
    },
}

/// What the reveal script decided, before any ledger side effect.
enum Transition {
    Active(RevealedCell, usize, usize),
    Lost(RevealedCell, Vec<Cell>),
    Won(RevealedCell, Vec<Cell>, Level),
}

pub struct RevealEngine {
    store: Arc<KvStore>,
    rules: GameRules,
    secret: Vec<u8>,
    ledger: Arc<Ledger>,
    limiter: Arc<RateLimiter>,
}

impl RevealEngine {
    pub fn new(
        store: Arc<KvStore>,
        rules: GameRules,
        secret: Vec<u8>,
        ledger: Arc<Ledger>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            store,
            rules,
            secret,
            ledger,
            limiter,
        }
    }

    /// Reveal one cell. `wallet` is the session-authenticated caller and
    /// must both match the game token and own the stored session.
    pub fn reveal(
        &self,
        wallet: &str,
        game_id: &str,
        game_token: &str,
        cell_index: usize,
    ) -> CoreResult<RevealOutcome> {
        let wallet = wallet.to_lowercase();
        if !verify_game_token(&self.secret, game_id, &wallet, game_token) {
            return Err(CoreError::Forbidden("invalid game token".to_string()));
        }

        let ttl = self.rules.game_ttl();
        let transition = self.store.update(&game_key(game_id), |session| {
            let mut session: GameSession = match session {
                Some(s) => s,
                None => {
                    return (
                        Write::Unchanged,
                        Err(CoreError::NotFound(
                            "game session expired or not found".to_string(),
                        )),
                    )
                }
            };
            if session.wallet != wallet {
                return (
                    Write::Unchanged,
                    Err(CoreError::Forbidden(
                        "game belongs to a different wallet".to_string(),
                    )),
                );
            }
            if session.status != GameStatus::Active {
                return (
                    Write::Unchanged,
                    Err(CoreError::conflict("game is already finished")),
                );
            }
            if cell_index >= session.cells.len() {
                return (
                    Write::Unchanged,
                    Err(CoreError::validation(format!(
                        "cell index {} out of range for {} cells",
                        cell_index,
                        session.cells.len()
                    ))),
                );
            }
            if session.revealed.contains(&cell_index) {
                return (
                    Write::Unchanged,
                    Err(CoreError::conflict("cell already revealed")),
                );
            }

            session.revealed.push(cell_index);
            let cell = RevealedCell::new(cell_index, &session.cells[cell_index]);

            if cell.is_bomb {
                // Terminal: delete inside the script so no later reveal
                // can observe this board again.
                return (
                    Write::Delete,
                    Ok(Transition::Lost(cell, session.cells)),
                );
            }
            if session.revealed_safe_cells() == session.total_safe_cells() {
                let level = session.level;
                return (Write::Delete, Ok(Transition::Won(cell, session.cells, level)));
            }

            let revealed = session.revealed.len();
            let remaining = session.total_safe_cells() - session.revealed_safe_cells();
            (
                Write::Put(session, Some(ttl)),
                Ok(Transition::Active(cell, revealed, remaining)),
            )
        })??;

        match transition {
            Transition::Active(cell, revealed_count, safe_remaining) => {
                Ok(RevealOutcome::Active {
                    cell,
                    revealed_count,
                    safe_remaining,
                })
            }
            Transition::Lost(cell, board) => {
                info!(wallet = %wallet, game_id, cell = cell.index, "bomb hit, game lost");
                Ok(RevealOutcome::Lost { cell, board })
            }
            Transition::Won(cell, board, level) => {
                // Only the one caller that observed the winning transition
                // reaches this point; the ledger applies the daily cap.
                // A wallet clearing boards faster than the win budget allows
                // keeps its finished game but forfeits the credit.
                let credit = if self.limiter.check(Op::RecordWin, &wallet).is_ok() {
                    self.ledger.record_win(&wallet, level)?
                } else {
                    WinCredit::LimitReached
                };
                let (points_earned, daily_limit_reached) = match credit {
                    WinCredit::Credited { points, .. } => (points, false),
                    WinCredit::LimitReached => (0, true),
                };
                info!(wallet = %wallet, game_id, points_earned, "board cleared, game won");
                Ok(RevealOutcome::Won {
                    cell,
                    board,
                    points_earned,
                    daily_limit_reached,
                })
            }
        }
    }
}
