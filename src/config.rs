//! Configuration management with validation and defaults
//!
//! All tunable game constants live here so the behavioral tests can assert
//! against configuration instead of magic numbers scattered through the code.

use crate::errors::{CoreError, CoreResult};
use crate::game::types::Level;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for the game core.
#[derive(Clone, Debug)]
pub struct GameConfig {
    pub rules: GameRules,
    pub limits: RateBudgets,
    pub secrets: Secrets,
}

impl GameConfig {
    /// Assemble configuration from environment + defaults. Fails fast when
    /// the signing secret is absent; everything else has a sane default.
    pub fn from_env() -> CoreResult<Self> {
        Ok(Self {
            rules: GameRules::default(),
            limits: RateBudgets::default(),
            secrets: Secrets::from_env()?,
        })
    }
}

/// Per-level board geometry and reward value.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LevelConfig {
    /// Grid edge length; the board has `size * size` cells.
    pub size: usize,
    /// Bombs hidden on the board.
    pub bombs: usize,
    /// Points credited for clearing every safe cell.
    pub points: u64,
}

impl LevelConfig {
    pub fn total_cells(&self) -> usize {
        self.size * self.size
    }

    pub fn safe_cells(&self) -> usize {
        self.total_cells() - self.bombs
    }
}

/// Economy and board rules. The reward economy is keyed on level identity,
/// so these stay fixed per level for the lifetime of a deployment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameRules {
    pub easy: LevelConfig,
    pub medium: LevelConfig,
    pub hard: LevelConfig,

    /// Wins credited per wallet per UTC day; further wins are discarded.
    pub daily_win_limit: u32,

    /// Points per daily-login claim.
    pub daily_login_points: u64,
    /// Cooldown between daily-login claims, measured from the last
    /// successful claim (not wall-clock midnight).
    pub daily_login_cooldown_ms: u64,

    /// Points the referrer earns per successful referral.
    pub referral_points: u64,
    /// Hard cap on referrals credited to one wallet.
    pub max_referrals: u32,
    /// Wins a wallet must have before its referral code use counts.
    pub min_wins_for_referral: u64,

    /// One-time bonus for oracle-confirmed supporters.
    pub supporter_bonus_points: u64,

    /// Seconds a nonce stays valid.
    pub nonce_ttl_secs: u64,
    /// Seconds a session token stays valid.
    pub session_ttl_secs: u64,
    /// Seconds an active game session survives between reveals.
    pub game_ttl_secs: u64,

    /// How long a leaderboard snapshot may be served stale.
    pub leaderboard_cache_secs: u64,
    /// Players returned by the leaderboard.
    pub leaderboard_top_n: usize,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            easy: LevelConfig { size: 3, bombs: 1, points: 3 },
            medium: LevelConfig { size: 4, bombs: 1, points: 5 },
            hard: LevelConfig { size: 5, bombs: 2, points: 10 },
            daily_win_limit: 10,
            daily_login_points: 2,
            daily_login_cooldown_ms: 24 * 60 * 60 * 1000,
            referral_points: 10,
            max_referrals: 50,
            min_wins_for_referral: 5,
            supporter_bonus_points: 50,
            nonce_ttl_secs: 300,
            session_ttl_secs: 24 * 60 * 60,
            game_ttl_secs: 600,
            leaderboard_cache_secs: 10,
            leaderboard_top_n: 100,
        }
    }
}

impl GameRules {
    pub fn level(&self, level: Level) -> LevelConfig {
        match level {
            Level::Easy => self.easy,
            Level::Medium => self.medium,
            Level::Hard => self.hard,
        }
    }

    pub fn nonce_ttl(&self) -> Duration {
        Duration::from_secs(self.nonce_ttl_secs)
    }

    pub fn game_ttl(&self) -> Duration {
        Duration::from_secs(self.game_ttl_secs)
    }

    /// Validate invariants that would silently break gameplay.
    pub fn validate(&self) -> CoreResult<()> {
        for (name, lvl) in [
            ("easy", self.easy),
            ("medium", self.medium),
            ("hard", self.hard),
        ] {
            if lvl.size < 2 {
                return Err(CoreError::Internal(format!(
                    "level {}: grid size {} too small",
                    name, lvl.size
                )));
            }
            if lvl.bombs == 0 || lvl.bombs >= lvl.total_cells() {
                return Err(CoreError::Internal(format!(
                    "level {}: bomb count {} out of range for {} cells",
                    name,
                    lvl.bombs,
                    lvl.total_cells()
                )));
            }
        }
        if self.daily_win_limit == 0 {
            return Err(CoreError::Internal(
                "daily_win_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// One sliding-window budget: `max` requests per `window`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Budget {
    pub max: u32,
    pub window_secs: u64,
}

impl Budget {
    pub const fn new(max: u32, window_secs: u64) -> Self {
        Self { max, window_secs }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Per-operation-class rate budgets, applied before any state mutation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateBudgets {
    /// Nonce issuance, keyed by IP.
    pub nonce: Budget,
    /// Login attempts, keyed by IP.
    pub login: Budget,
    /// Game starts, keyed by wallet.
    pub game_start: Budget,
    /// Cell reveals, keyed by wallet. Deliberately the tallest budget —
    /// a single game produces many reveals.
    pub reveal: Budget,
    /// Win recording, keyed by wallet. Caps wins per minute independently
    /// of the daily cap.
    pub record_win: Budget,
    /// Quest claims (daily login, referral), keyed by wallet.
    pub quest: Budget,
    /// Profile reads, keyed by wallet.
    pub profile: Budget,
    /// Administrative export. Very low on purpose.
    pub export: Budget,
}

impl Default for RateBudgets {
    fn default() -> Self {
        Self {
            nonce: Budget::new(5, 60),
            login: Budget::new(5, 60),
            game_start: Budget::new(10, 60),
            reveal: Budget::new(30, 10),
            record_win: Budget::new(6, 60),
            quest: Budget::new(10, 60),
            profile: Budget::new(20, 60),
            export: Budget::new(2, 60),
        }
    }
}

/// Secret material pulled from the environment.
#[derive(Clone)]
pub struct Secrets {
    /// HMAC key for session and game tokens. Mandatory.
    pub game_secret: Vec<u8>,
    /// Shared key gating `/export`. Route is disabled when unset.
    pub export_key: Option<String>,
    /// Comma-separated wallet allowlist for the static supporter oracle.
    pub supporter_allowlist: Vec<String>,
}

impl Secrets {
    pub fn from_env() -> CoreResult<Self> {
        let game_secret = std::env::var("GAME_SECRET").map_err(|_| {
            CoreError::Internal(
                "GAME_SECRET environment variable is required; \
                 generate one with: openssl rand -hex 32"
                    .to_string(),
            )
        })?;
        if game_secret.len() < 32 {
            return Err(CoreError::Internal(
                "GAME_SECRET must be at least 32 characters".to_string(),
            ));
        }

        let supporter_allowlist = std::env::var("SUPPORTER_WALLETS")
            .unwrap_or_default()
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().to_lowercase())
            .collect();

        Ok(Self {
            game_secret: game_secret.into_bytes(),
            export_key: std::env::var("EXPORT_KEY").ok(),
            supporter_allowlist,
        })
    }

    /// Fixed secret for tests; never used by the binary.
    #[doc(hidden)]
    pub fn for_tests() -> Self {
        Self {
            game_secret: b"0123456789abcdef0123456789abcdef".to_vec(),
            export_key: None,
            supporter_allowlist: vec![],
        }
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("game_secret", &"<redacted>")
            .field("export_key", &self.export_key.as_ref().map(|_| "<redacted>"))
            .field("supporter_allowlist", &self.supporter_allowlist.len())
            .finish()
    }
}
