//! Game session creation
//!
//! Builds the hidden board server-side with a crypto-secure random source
//! and binds it to the owning wallet through an HMAC game token. The client
//! only ever sees grid dimensions and the bomb count until the game ends.

use crate::{
    config::GameRules,
    errors::{CoreError, CoreResult},
    game::types::{Cell, GameSession, GameStatus, Level},
    store::KvStore,
};
use hmac::{Hmac, Mac};
use rand::{seq::index::sample, Rng};
use serde::Serialize;
use sha2::Sha256;
use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::info;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Reward symbols assigned to non-bomb cells.
pub const SYMBOLS: [&str; 10] = ["🍒", "⭐", "🍀", "🔔", "🥇", "🍉", "🍇", "🍎", "🎁", "🎉"];

/// Non-revealing metadata returned to the client at game start.
#[derive(Debug, Clone, Serialize)]
pub struct NewGame {
    pub game_id: String,
    pub token: String,
    pub level: Level,
    pub grid_size: usize,
    pub total_cells: usize,
    pub bomb_count: usize,
}

/// Creates and persists game sessions.
pub struct GameManager {
    store: Arc<KvStore>,
    rules: GameRules,
    secret: Vec<u8>,
}

impl GameManager {
    pub fn new(store: Arc<KvStore>, rules: GameRules, secret: Vec<u8>) -> Self {
        Self {
            store,
            rules,
            secret,
        }
    }

    /// Start a game for an already-authenticated wallet. The caller is
    /// responsible for auth and rate limiting; this only builds state.
    pub fn start_game(&self, wallet: &str, level: Level) -> CoreResult<NewGame> {
        let wallet = wallet.to_lowercase();
        let config = self.rules.level(level);

        let game_id = Uuid::new_v4().to_string();
        let token = sign_game_token(&self.secret, &game_id, &wallet)?;
        let cells = generate_cells(config.total_cells(), config.bombs);

        let session = GameSession {
            wallet: wallet.clone(),
            level,
            cells,
            revealed: Vec::new(),
            status: GameStatus::Active,
            created_at_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        };
        self.store
            .set_json(&game_key(&game_id), &session, Some(self.rules.game_ttl()))?;

        info!(wallet = %wallet, level = %level, game_id = %game_id, "game session created");
        Ok(NewGame {
            game_id,
            token,
            level,
            grid_size: config.size,
            total_cells: config.total_cells(),
            bomb_count: config.bombs,
        })
    }
}

pub fn game_key(game_id: &str) -> String {
    format!("game:{}", game_id)
}

/// HMAC(game_id, wallet): unforgeable without the server secret, so a
/// client cannot drive someone else's session even if it guesses the id.
pub fn sign_game_token(secret: &[u8], game_id: &str, wallet: &str) -> CoreResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| CoreError::Internal(format!("hmac init failed: {}", e)))?;
    mac.update(format!("{}:{}", game_id, wallet).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Timing-safe token check via the MAC's own verifier.
pub fn verify_game_token(secret: &[u8], game_id: &str, wallet: &str, token: &str) -> bool {
    let Ok(raw) = hex::decode(token) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(format!("{}:{}", game_id, wallet).as_bytes());
    mac.verify_slice(&raw).is_ok()
}

/// Full board generation: bomb positions are a uniform random subset
/// without replacement, every other cell gets a random reward symbol.
fn generate_cells(total: usize, bombs: usize) -> Vec<Cell> {
    let mut rng = rand::rngs::OsRng;
    let bomb_positions = sample(&mut rng, total, bombs);
    let mut is_bomb = vec![false; total];
    for idx in bomb_positions {
        is_bomb[idx] = true;
    }
    (0..total)
        .map(|i| Cell {
            symbol: SYMBOLS[rng.gen_range(0..SYMBOLS.len())].to_string(),
            is_bomb: is_bomb[i],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secrets;

    fn manager() -> GameManager {
        GameManager::new(
            Arc::new(KvStore::new()),
            GameRules::default(),
            Secrets::for_tests().game_secret,
        )
    }

    #[test]
    fn test_board_has_exact_bomb_count() {
        for _ in 0..20 {
            let cells = generate_cells(25, 2);
            assert_eq!(cells.len(), 25);
            assert_eq!(cells.iter().filter(|c| c.is_bomb).count(), 2);
            assert!(cells.iter().all(|c| SYMBOLS.contains(&c.symbol.as_str())));
        }
    }

    #[test]
    fn test_start_game_persists_hidden_session() {
        let manager = manager();
        let new_game = manager
            .start_game("0xABCDEF1234567890abcdef1234567890ABCDEF12", Level::Medium)
            .unwrap();

        assert_eq!(new_game.grid_size, 4);
        assert_eq!(new_game.total_cells, 16);
        assert_eq!(new_game.bomb_count, 1);

        let session: GameSession = manager
            .store
            .get_json(&game_key(&new_game.game_id))
            .unwrap()
            .expect("session stored");
        assert_eq!(session.wallet, "0xabcdef1234567890abcdef1234567890abcdef12");
        assert_eq!(session.status, GameStatus::Active);
        assert!(session.revealed.is_empty());
        assert_eq!(session.cells.len(), 16);
    }

    #[test]
    fn test_start_response_carries_no_cell_contents() {
        let manager = manager();
        let new_game = manager
            .start_game("0xabcdef1234567890abcdef1234567890abcdef12", Level::Easy)
            .unwrap();
        let encoded = serde_json::to_string(&new_game).unwrap();
        let fields: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert!(fields.get("cells").is_none());
        assert!(!encoded.contains("is_bomb"));
        for symbol in SYMBOLS {
            assert!(!encoded.contains(symbol));
        }
    }

    #[test]
    fn test_game_token_binds_session_to_wallet() {
        let secret = Secrets::for_tests().game_secret;
        let token = sign_game_token(&secret, "game-1", "0xaaa").unwrap();

        assert!(verify_game_token(&secret, "game-1", "0xaaa", &token));
        assert!(!verify_game_token(&secret, "game-2", "0xaaa", &token));
        assert!(!verify_game_token(&secret, "game-1", "0xbbb", &token));
        assert!(!verify_game_token(&secret, "game-1", "0xaaa", "not-hex"));
        assert!(!verify_game_token(b"other-secret-other-secret-other!", "game-1", "0xaaa", &token));
    }
}
