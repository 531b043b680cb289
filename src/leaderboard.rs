//! Total-points leaderboard with a short-lived cache
//!
//! Ranking scans every player record, so the computed snapshot is cached
//! for a few seconds and served stale to everyone in between. The ranking
//! key is total points across all sources, ties broken by total wins.

use crate::{config::GameRules, errors::CoreResult, ledger::Ledger};
use serde::Serialize;
use std::{
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub wallet: String,
    pub total_points: u64,
    pub total_wins: u64,
    pub is_supporter: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardSnapshot {
    pub entries: Vec<LeaderboardEntry>,
    pub total_players: usize,
    pub generated_at_ms: u64,
}

struct Cached {
    snapshot: LeaderboardSnapshot,
    computed_at: Instant,
}

pub struct Leaderboard {
    ledger: Arc<Ledger>,
    rules: GameRules,
    cache: RwLock<Option<Cached>>,
}

impl Leaderboard {
    pub fn new(ledger: Arc<Ledger>, rules: GameRules) -> Self {
        Self {
            ledger,
            rules,
            cache: RwLock::new(None),
        }
    }

    /// Current top-N snapshot, at most `leaderboard_cache_secs` stale.
    pub fn top(&self) -> CoreResult<LeaderboardSnapshot> {
        let max_age = Duration::from_secs(self.rules.leaderboard_cache_secs);

        if let Ok(guard) = self.cache.read() {
            if let Some(cached) = guard.as_ref() {
                if cached.computed_at.elapsed() < max_age {
                    return Ok(cached.snapshot.clone());
                }
            }
        }

        let snapshot = self.compute()?;
        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(Cached {
                snapshot: snapshot.clone(),
                computed_at: Instant::now(),
            });
        }
        Ok(snapshot)
    }

    fn compute(&self) -> CoreResult<LeaderboardSnapshot> {
        let records = self.ledger.export_all();
        let total_players = records.len();

        let mut scored: Vec<(u64, u64, String, bool)> = Vec::with_capacity(total_players);
        for record in records {
            let profile = self.ledger.profile(&record.wallet)?;
            scored.push((
                profile.points.total,
                profile.stats.total_wins,
                record.wallet,
                record.is_supporter,
            ));
        }
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)).then(a.2.cmp(&b.2)));
        scored.truncate(self.rules.leaderboard_top_n);

        let entries = scored
            .into_iter()
            .enumerate()
            .map(|(i, (points, wins, wallet, is_supporter))| LeaderboardEntry {
                rank: i + 1,
                wallet,
                total_points: points,
                total_wins: wins,
                is_supporter,
            })
            .collect();

        debug!(total_players, "leaderboard recomputed");
        Ok(LeaderboardSnapshot {
            entries,
            total_players,
            generated_at_ms: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        })
    }
}
