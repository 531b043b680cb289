//! Request and response models
//!
//! Wire-level DTOs. Request bodies are lenient about casing on the wallet
//! field (normalized in the handlers); responses use camelCase throughout.

use crate::{
    game::{Cell, Level, RevealedCell},
    leaderboard::LeaderboardSnapshot,
    ledger::{DailyLoginStatus, Profile, ReferralInfo},
};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// -- auth ------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct NonceQuery {
    pub wallet: String,
}

#[derive(Debug, Serialize)]
pub struct NonceResponse {
    pub nonce: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub wallet: String,
    pub signature: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub wallet: String,
    pub expires_at: u64,
}

// -- game ------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StartGameRequest {
    pub wallet: String,
    pub level: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGameResponse {
    pub game_id: String,
    pub game_token: String,
    pub level: Level,
    pub grid_size: usize,
    pub total_cells: usize,
    pub bomb_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealRequest {
    pub game_id: String,
    /// The per-game token, not the session token.
    #[serde(rename = "token", alias = "gameToken")]
    pub game_token: String,
    pub wallet: String,
    pub cell_index: usize,
}

/// Reveal response. The board is present only on terminal outcomes.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealResponse {
    pub status: &'static str,
    pub cell: RevealedCell,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board: Option<Vec<Cell>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revealed_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safe_remaining: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points_earned: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_limit_reached: Option<bool>,
}

// -- quests ----------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLoginClaimResponse {
    pub points_earned: u64,
    pub total_daily_login_points: u64,
    pub next_claim_time: u64,
}

pub type DailyLoginStatusResponse = DailyLoginStatus;
pub type ReferralInfoResponse = ReferralInfo;

#[derive(Debug, Deserialize)]
pub struct ReferralRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralRegisteredResponse {
    pub referrer_points_earned: u64,
}

// -- supporter -------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupporterStatusResponse {
    pub is_supporter: bool,
    pub bonus_claimed: bool,
    pub bonus_points: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupporterClaimResponse {
    pub points_earned: u64,
}

// -- reads -----------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct WalletQuery {
    pub wallet: String,
}

pub type ProfileResponse = Profile;
pub type LeaderboardResponse = LeaderboardSnapshot;
