//! Win ledger and point economy
//!
//! Durable per-wallet accumulators: per-level win counters behind a lazily
//! reset daily cap, daily-login streak points, referral bookkeeping and the
//! one-time supporter bonus. Every rule that spans requests (caps, one-shot
//! claims, the referred-by slot) is enforced inside a single store script.

use crate::{
    config::GameRules,
    errors::{CoreError, CoreResult},
    game::types::Level,
    oracle::SupporterOracle,
    store::{KvStore, Write},
};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{info, warn};

/// Durable per-wallet record, stored at `player:{wallet}` with no TTL.
/// Created lazily on first write; never deleted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerRecord {
    pub wallet: String,
    pub easy_wins: u64,
    pub medium_wins: u64,
    pub hard_wins: u64,
    /// Valid only while `daily_win_date` is today (UTC); any stale date is
    /// treated as zero before incrementing. Lazy reset, no background job.
    pub daily_win_count: u32,
    pub daily_win_date: String,
    /// Unix millis of the last successful daily-login claim.
    pub last_daily_login: u64,
    pub daily_login_points: u64,
    pub referral_code: Option<String>,
    pub referred_by: Option<String>,
    pub referral_count: u32,
    pub is_supporter: bool,
    pub supporter_bonus_claimed: bool,
}

impl PlayerRecord {
    fn for_wallet(wallet: &str) -> Self {
        Self {
            wallet: wallet.to_string(),
            ..Self::default()
        }
    }

    pub fn total_wins(&self) -> u64 {
        self.easy_wins + self.medium_wins + self.hard_wins
    }

    fn level_wins_mut(&mut self, level: Level) -> &mut u64 {
        match level {
            Level::Easy => &mut self.easy_wins,
            Level::Medium => &mut self.medium_wins,
            Level::Hard => &mut self.hard_wins,
        }
    }

    pub fn level_wins(&self, level: Level) -> u64 {
        match level {
            Level::Easy => self.easy_wins,
            Level::Medium => self.medium_wins,
            Level::Hard => self.hard_wins,
        }
    }
}

/// Outcome of crediting a win against the daily cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WinCredit {
    Credited { points: u64, remaining: u32 },
    /// Cap hit: the win is discarded (the reveal itself already happened),
    /// per-level counters untouched.
    LimitReached,
}

/// Successful daily-login claim.
#[derive(Debug, Clone, Serialize)]
pub struct DailyLoginClaim {
    pub points_earned: u64,
    pub total_daily_login_points: u64,
    pub next_claim_time: u64,
}

/// Daily-login status for the read path.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLoginStatus {
    pub can_claim: bool,
    pub last_claim_time: u64,
    pub next_claim_time: u64,
    pub cooldown_remaining: u64,
    pub total_daily_login_points: u64,
    pub points_per_claim: u64,
}

/// Self-referral info for the read path.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralInfo {
    pub referral_code: String,
    pub referral_count: u32,
    pub referral_points: u64,
    pub max_referrals: u32,
    pub points_per_referral: u64,
    pub referrals_remaining: u32,
}

/// Full points breakdown for `/profile`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub wallet: String,
    pub exists: bool,
    pub points: PointsBreakdown,
    pub stats: WinStats,
    pub referral: ReferralSummary,
    pub is_supporter: bool,
    pub supporter_bonus_claimed: bool,
    pub can_claim_supporter_bonus: bool,
    pub daily_wins_remaining: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsBreakdown {
    pub game: u64,
    pub daily_login: u64,
    pub supporter: u64,
    pub referral: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WinStats {
    pub easy_wins: u64,
    pub medium_wins: u64,
    pub hard_wins: u64,
    pub total_wins: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralSummary {
    pub code: Option<String>,
    pub count: u32,
    pub max_referrals: u32,
    pub referred_by: Option<String>,
}

/// Atomic bookkeeping over player records.
pub struct Ledger {
    store: Arc<KvStore>,
    rules: GameRules,
}

impl Ledger {
    pub fn new(store: Arc<KvStore>, rules: GameRules) -> Self {
        Self { store, rules }
    }

    /// Credit one win for `wallet`, capped per UTC day. The whole
    /// read-check-increment runs as one script so two racing wins cannot
    /// both slip past the cap.
    pub fn record_win(&self, wallet: &str, level: Level) -> CoreResult<WinCredit> {
        self.record_win_on(wallet, level, &today_utc())
    }

    fn record_win_on(&self, wallet: &str, level: Level, today: &str) -> CoreResult<WinCredit> {
        let wallet = wallet.to_lowercase();
        let limit = self.rules.daily_win_limit;
        let points = self.rules.level(level).points;

        let credit = self.store.update(&player_key(&wallet), |record| {
            let mut record: PlayerRecord =
                record.unwrap_or_else(|| PlayerRecord::for_wallet(&wallet));

            let mut count = record.daily_win_count;
            if record.daily_win_date != today {
                count = 0;
            }
            if count >= limit {
                return (Write::Unchanged, WinCredit::LimitReached);
            }

            *record.level_wins_mut(level) += 1;
            record.daily_win_count = count + 1;
            record.daily_win_date = today.to_string();
            let remaining = limit - record.daily_win_count;
            (
                Write::Put(record, None),
                WinCredit::Credited { points, remaining },
            )
        })?;

        match &credit {
            WinCredit::Credited { points, remaining } => {
                info!(wallet = %wallet, level = %level, points, remaining, "win recorded");
            }
            WinCredit::LimitReached => {
                warn!(wallet = %wallet, level = %level, "daily win limit reached, win discarded");
            }
        }
        Ok(credit)
    }

    /// Claim the daily-login reward. The cooldown window is measured from
    /// the last successful claim, not wall-clock midnight.
    pub fn claim_daily_login(&self, wallet: &str) -> CoreResult<DailyLoginClaim> {
        self.claim_daily_login_at(wallet, unix_now_ms())
    }

    fn claim_daily_login_at(&self, wallet: &str, now_ms: u64) -> CoreResult<DailyLoginClaim> {
        let wallet = wallet.to_lowercase();
        let cooldown = self.rules.daily_login_cooldown_ms;
        let points = self.rules.daily_login_points;

        self.store.update(&player_key(&wallet), |record| {
            let mut record: PlayerRecord =
                record.unwrap_or_else(|| PlayerRecord::for_wallet(&wallet));

            let elapsed = now_ms.saturating_sub(record.last_daily_login);
            if record.last_daily_login != 0 && elapsed < cooldown {
                let remaining = cooldown - elapsed;
                return (
                    Write::Unchanged,
                    Err(CoreError::conflict_with(
                        "already claimed, come back later",
                        serde_json::json!({
                            "cooldownRemaining": remaining,
                            "nextClaimTime": record.last_daily_login + cooldown,
                        }),
                    )),
                );
            }

            record.last_daily_login = now_ms;
            record.daily_login_points += points;
            let claim = DailyLoginClaim {
                points_earned: points,
                total_daily_login_points: record.daily_login_points,
                next_claim_time: now_ms + cooldown,
            };
            (Write::Put(record, None), Ok(claim))
        })?
    }

    pub fn daily_login_status(&self, wallet: &str) -> CoreResult<DailyLoginStatus> {
        self.daily_login_status_at(wallet, unix_now_ms())
    }

    fn daily_login_status_at(&self, wallet: &str, now_ms: u64) -> CoreResult<DailyLoginStatus> {
        let record = self.load(wallet)?.unwrap_or_default();
        let cooldown = self.rules.daily_login_cooldown_ms;
        let elapsed = now_ms.saturating_sub(record.last_daily_login);
        let can_claim = record.last_daily_login == 0 || elapsed >= cooldown;
        let next = record.last_daily_login + cooldown;
        Ok(DailyLoginStatus {
            can_claim,
            last_claim_time: record.last_daily_login,
            next_claim_time: if can_claim { now_ms } else { next },
            cooldown_remaining: if can_claim { 0 } else { next - now_ms },
            total_daily_login_points: record.daily_login_points,
            points_per_claim: self.rules.daily_login_points,
        })
    }

    /// Fetch (or lazily mint) the wallet's own referral code.
    pub fn referral_info(&self, wallet: &str) -> CoreResult<ReferralInfo> {
        let wallet = wallet.to_lowercase();

        let (code, count) = self.store.update(&player_key(&wallet), |record| {
            let mut record: PlayerRecord =
                record.unwrap_or_else(|| PlayerRecord::for_wallet(&wallet));
            match record.referral_code.clone() {
                Some(code) => (Write::Unchanged, (code, record.referral_count)),
                None => {
                    let code = generate_referral_code(&wallet);
                    record.referral_code = Some(code.clone());
                    let count = record.referral_count;
                    (Write::Put(record, None), (code, count))
                }
            }
        })?;
        // Reverse mapping for code lookup; idempotent for the winning code.
        self.store.set_string(&referral_key(&code), &wallet, None);

        Ok(ReferralInfo {
            referral_count: count,
            referral_points: count as u64 * self.rules.referral_points,
            max_referrals: self.rules.max_referrals,
            points_per_referral: self.rules.referral_points,
            referrals_remaining: self.rules.max_referrals.saturating_sub(count),
            referral_code: code,
        })
    }

    /// Register `wallet` as referred by the owner of `code`. Both player
    /// records are checked and mutated inside one two-key script, so the
    /// referred-by slot fills at most once and the referrer cap holds under
    /// concurrent attempts.
    pub fn register_referral(&self, wallet: &str, code: &str) -> CoreResult<u64> {
        let wallet = wallet.to_lowercase();
        let code = code.to_uppercase();

        let referrer = self
            .store
            .get_string(&referral_key(&code))
            .ok_or_else(|| CoreError::validation("invalid referral code"))?
            .to_lowercase();
        if referrer == wallet {
            return Err(CoreError::validation("cannot refer yourself"));
        }

        let min_wins = self.rules.min_wins_for_referral;
        let max_referrals = self.rules.max_referrals;
        let points = self.rules.referral_points;

        self.store.update_pair(
            &player_key(&wallet),
            &player_key(&referrer),
            |referee, referrer_rec| {
                let mut referee: PlayerRecord =
                    referee.unwrap_or_else(|| PlayerRecord::for_wallet(&wallet));
                let mut referrer_rec: PlayerRecord =
                    referrer_rec.unwrap_or_else(|| PlayerRecord::for_wallet(&referrer));

                if referee.referred_by.is_some() {
                    return (
                        Write::Unchanged,
                        Write::Unchanged,
                        Err(CoreError::conflict("you have already been referred")),
                    );
                }
                if referrer_rec.referral_count >= max_referrals {
                    return (
                        Write::Unchanged,
                        Write::Unchanged,
                        Err(CoreError::conflict("referrer has reached maximum referrals")),
                    );
                }
                if referee.total_wins() < min_wins {
                    return (
                        Write::Unchanged,
                        Write::Unchanged,
                        Err(CoreError::conflict_with(
                            format!("you need at least {} wins to use a referral code", min_wins),
                            serde_json::json!({
                                "currentWins": referee.total_wins(),
                                "winsNeeded": min_wins - referee.total_wins(),
                            }),
                        )),
                    );
                }

                referee.referred_by = Some(referrer.clone());
                referrer_rec.referral_count += 1;
                (
                    Write::Put(referee, None),
                    Write::Put(referrer_rec, None),
                    Ok(points),
                )
            },
        )?
    }

    /// Query the supporter oracle and stamp the flag on the record.
    pub async fn confirm_supporter(
        &self,
        wallet: &str,
        oracle: &dyn SupporterOracle,
    ) -> CoreResult<bool> {
        let wallet = wallet.to_lowercase();
        let confirmed = oracle.is_supporter(&wallet).await?;
        if confirmed {
            self.store.update(&player_key(&wallet), |record| {
                let mut record: PlayerRecord =
                    record.unwrap_or_else(|| PlayerRecord::for_wallet(&wallet));
                record.is_supporter = true;
                (Write::Put(record, None), ())
            })?;
            info!(wallet = %wallet, "supporter status confirmed");
        }
        Ok(confirmed)
    }

    /// One-shot supporter bonus, gated on the oracle-confirmed flag.
    pub fn claim_supporter_bonus(&self, wallet: &str) -> CoreResult<u64> {
        let wallet = wallet.to_lowercase();
        let points = self.rules.supporter_bonus_points;

        self.store.update(&player_key(&wallet), |record| {
            let mut record: PlayerRecord =
                record.unwrap_or_else(|| PlayerRecord::for_wallet(&wallet));
            if !record.is_supporter {
                return (
                    Write::Unchanged,
                    Err(CoreError::Forbidden(
                        "wallet is not a confirmed supporter".to_string(),
                    )),
                );
            }
            if record.supporter_bonus_claimed {
                return (
                    Write::Unchanged,
                    Err(CoreError::conflict("supporter bonus already claimed")),
                );
            }
            record.supporter_bonus_claimed = true;
            (Write::Put(record, None), Ok(points))
        })?
    }

    /// Points breakdown and stats; safe for unauthenticated reads.
    pub fn profile(&self, wallet: &str) -> CoreResult<Profile> {
        let wallet = wallet.to_lowercase();
        let record = self.load(&wallet)?;
        let exists = record.is_some();
        let record = record.unwrap_or_default();

        let game_points = record.easy_wins * self.rules.easy.points
            + record.medium_wins * self.rules.medium.points
            + record.hard_wins * self.rules.hard.points;
        let supporter_points = if record.supporter_bonus_claimed {
            self.rules.supporter_bonus_points
        } else {
            0
        };
        let referral_points = record.referral_count as u64 * self.rules.referral_points;
        let total =
            game_points + record.daily_login_points + supporter_points + referral_points;

        let daily_count = if record.daily_win_date == today_utc() {
            record.daily_win_count
        } else {
            0
        };

        Ok(Profile {
            wallet,
            exists,
            points: PointsBreakdown {
                game: game_points,
                daily_login: record.daily_login_points,
                supporter: supporter_points,
                referral: referral_points,
                total,
            },
            stats: WinStats {
                easy_wins: record.easy_wins,
                medium_wins: record.medium_wins,
                hard_wins: record.hard_wins,
                total_wins: record.total_wins(),
            },
            referral: ReferralSummary {
                code: record.referral_code,
                count: record.referral_count,
                max_referrals: self.rules.max_referrals,
                referred_by: record.referred_by,
            },
            is_supporter: record.is_supporter,
            supporter_bonus_claimed: record.supporter_bonus_claimed,
            can_claim_supporter_bonus: record.is_supporter && !record.supporter_bonus_claimed,
            daily_wins_remaining: self.rules.daily_win_limit.saturating_sub(daily_count),
        })
    }

    /// All player records; informational read for the export surface.
    pub fn export_all(&self) -> Vec<PlayerRecord> {
        self.store
            .scan_prefix("player:")
            .into_iter()
            .filter_map(|(_, raw)| serde_json::from_str(&raw).ok())
            .collect()
    }

    pub fn load(&self, wallet: &str) -> CoreResult<Option<PlayerRecord>> {
        self.store.get_json(&player_key(&wallet.to_lowercase()))
    }
}

pub fn player_key(wallet: &str) -> String {
    format!("player:{}", wallet)
}

fn referral_key(code: &str) -> String {
    format!("referral:{}", code)
}

/// Last 6 wallet chars + 4 random alphanumerics, uppercased.
fn generate_referral_code(wallet: &str) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::rngs::OsRng;
    let suffix: String = (0..4)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{}{}", wallet[wallet.len() - 6..].to_uppercase(), suffix)
}

/// UTC calendar date string used for the lazy daily reset.
pub fn today_utc() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
