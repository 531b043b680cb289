//! Request Handlers
//!
//! Thin HTTP shims over the game core: extract, rate-limit, authenticate,
//! delegate, translate. All invariants live below this layer.

use super::{
    errors::ApiError,
    middleware::{ClientIp, RequestId},
    models::*,
};
use crate::{
    auth::Authenticator,
    config::GameConfig,
    errors::CoreError,
    game::{GameManager, Level, RevealEngine, RevealOutcome},
    leaderboard::Leaderboard,
    ledger::Ledger,
    oracle::SupporterOracle,
    ratelimit::{Op, RateLimiter},
    store::KvStore,
};
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Extension, Json,
};
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub config: GameConfig,
    pub store: Arc<KvStore>,
    pub auth: Authenticator,
    pub games: GameManager,
    pub reveals: RevealEngine,
    pub ledger: Arc<Ledger>,
    pub leaderboard: Leaderboard,
    pub limiter: Arc<RateLimiter>,
    pub oracle: Arc<dyn SupporterOracle>,
    pub version: String,
}

impl AppState {
    fn limit(&self, op: Op, identity: &str, request_id: &str) -> Result<(), ApiError> {
        self.limiter
            .check(op, identity)
            .map_err(|e| ApiError::new(request_id.to_string(), e))
    }

    /// Resolve the session wallet from the bearer token.
    fn session_wallet(&self, headers: &HeaderMap, request_id: &str) -> Result<String, ApiError> {
        let token = bearer_token(headers, request_id)?;
        self.auth
            .verify(token)
            .map_err(|e| ApiError::new(request_id.to_string(), e))
    }

    /// Like `session_wallet`, but also requires the session to match the
    /// wallet the request body claims to act for.
    fn session_wallet_for(
        &self,
        headers: &HeaderMap,
        claimed: &str,
        request_id: &str,
    ) -> Result<String, ApiError> {
        let token = bearer_token(headers, request_id)?;
        self.auth
            .verify_for_wallet(token, claimed)
            .map_err(|e| ApiError::new(request_id.to_string(), e))
    }
}

fn bearer_token<'a>(headers: &'a HeaderMap, request_id: &str) -> Result<&'a str, ApiError> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized(request_id.to_string(), "missing bearer token"))
}

fn wrap(request_id: &RequestId) -> impl Fn(CoreError) -> ApiError + '_ {
    move |e| ApiError::new(request_id.0.clone(), e)
}

/// Health check handler - minimal response time
/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: state.version.clone(),
    })
}

/// Issue a login nonce for a wallet
/// GET /auth/nonce?wallet=0x...
pub async fn nonce_handler(
    Extension(request_id): Extension<RequestId>,
    Extension(client_ip): Extension<ClientIp>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<NonceQuery>,
) -> Result<Json<NonceResponse>, ApiError> {
    state.limit(Op::Nonce, &client_ip.0, &request_id.0)?;

    let grant = state
        .auth
        .issue_nonce(&query.wallet)
        .map_err(wrap(&request_id))?;
    Ok(Json(NonceResponse {
        nonce: grant.nonce,
        message: grant.message,
    }))
}

/// Exchange a signed nonce for a session token
/// POST /auth/login
pub async fn login_handler(
    Extension(request_id): Extension<RequestId>,
    Extension(client_ip): Extension<ClientIp>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    state.limit(Op::Login, &client_ip.0, &request_id.0)?;

    let grant = state
        .auth
        .login(&body.wallet, &body.signature)
        .map_err(wrap(&request_id))?;
    Ok(Json(LoginResponse {
        token: grant.token,
        wallet: grant.wallet,
        expires_at: grant.expires_at,
    }))
}

/// Start a new game session
/// POST /game/start
pub async fn start_game_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<StartGameRequest>,
) -> Result<Json<StartGameResponse>, ApiError> {
    let wallet = state.session_wallet_for(&headers, &body.wallet, &request_id.0)?;
    state.limit(Op::GameStart, &wallet, &request_id.0)?;

    let level = Level::parse(&body.level).ok_or_else(|| {
        ApiError::bad_request(
            request_id.0.clone(),
            format!("unknown level '{}', expected easy|medium|hard", body.level),
        )
    })?;

    let game = state
        .games
        .start_game(&wallet, level)
        .map_err(wrap(&request_id))?;
    Ok(Json(StartGameResponse {
        game_id: game.game_id,
        game_token: game.token,
        level: game.level,
        grid_size: game.grid_size,
        total_cells: game.total_cells,
        bomb_count: game.bomb_count,
    }))
}

/// Reveal one cell of an active game
/// POST /game/reveal
pub async fn reveal_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RevealRequest>,
) -> Result<Json<RevealResponse>, ApiError> {
    let wallet = state.session_wallet_for(&headers, &body.wallet, &request_id.0)?;
    state.limit(Op::Reveal, &wallet, &request_id.0)?;

    let outcome = state
        .reveals
        .reveal(&wallet, &body.game_id, &body.game_token, body.cell_index)
        .map_err(wrap(&request_id))?;

    let response = match outcome {
        RevealOutcome::Active {
            cell,
            revealed_count,
            safe_remaining,
        } => RevealResponse {
            status: "active",
            cell,
            board: None,
            revealed_count: Some(revealed_count),
            safe_remaining: Some(safe_remaining),
            points_earned: None,
            daily_limit_reached: None,
        },
        RevealOutcome::Lost { cell, board } => RevealResponse {
            status: "lost",
            cell,
            board: Some(board),
            revealed_count: None,
            safe_remaining: None,
            points_earned: None,
            daily_limit_reached: None,
        },
        RevealOutcome::Won {
            cell,
            board,
            points_earned,
            daily_limit_reached,
        } => RevealResponse {
            status: "won",
            cell,
            board: Some(board),
            revealed_count: None,
            safe_remaining: None,
            points_earned: Some(points_earned),
            daily_limit_reached: Some(daily_limit_reached),
        },
    };
    Ok(Json(response))
}

/// Leaderboard snapshot, cached server-side
/// GET /leaderboard
pub async fn leaderboard_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<LeaderboardResponse>, ApiError> {
    let snapshot = state.leaderboard.top().map_err(wrap(&request_id))?;
    Ok(Json(snapshot))
}

/// Public points breakdown for any wallet
/// GET /profile?wallet=0x...
pub async fn profile_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WalletQuery>,
) -> Result<Json<ProfileResponse>, ApiError> {
    if !crate::auth::is_valid_wallet(&query.wallet) {
        return Err(ApiError::bad_request(
            request_id.0.clone(),
            "invalid wallet address",
        ));
    }
    state.limit(Op::Profile, &query.wallet, &request_id.0)?;
    let profile = state
        .ledger
        .profile(&query.wallet)
        .map_err(wrap(&request_id))?;
    Ok(Json(profile))
}

/// Daily-login quest status; public read keyed by wallet
/// GET /quest/daily-login?wallet=0x...
pub async fn daily_login_status_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WalletQuery>,
) -> Result<Json<DailyLoginStatusResponse>, ApiError> {
    if !crate::auth::is_valid_wallet(&query.wallet) {
        return Err(ApiError::bad_request(
            request_id.0.clone(),
            "invalid wallet address",
        ));
    }
    let status = state
        .ledger
        .daily_login_status(&query.wallet)
        .map_err(wrap(&request_id))?;
    Ok(Json(status))
}

/// Claim the daily-login reward
/// POST /quest/daily-login
pub async fn daily_login_claim_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<DailyLoginClaimResponse>, ApiError> {
    let wallet = state.session_wallet(&headers, &request_id.0)?;
    state.limit(Op::Quest, &wallet, &request_id.0)?;

    let claim = state
        .ledger
        .claim_daily_login(&wallet)
        .map_err(wrap(&request_id))?;
    Ok(Json(DailyLoginClaimResponse {
        points_earned: claim.points_earned,
        total_daily_login_points: claim.total_daily_login_points,
        next_claim_time: claim.next_claim_time,
    }))
}

/// Referral code and stats for a wallet (minted lazily on first read)
/// GET /quest/referral?wallet=0x...
pub async fn referral_info_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WalletQuery>,
) -> Result<Json<ReferralInfoResponse>, ApiError> {
    if !crate::auth::is_valid_wallet(&query.wallet) {
        return Err(ApiError::bad_request(
            request_id.0.clone(),
            "invalid wallet address",
        ));
    }
    let info = state
        .ledger
        .referral_info(&query.wallet)
        .map_err(wrap(&request_id))?;
    Ok(Json(info))
}

/// Register under someone else's referral code
/// POST /quest/referral
pub async fn referral_register_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ReferralRequest>,
) -> Result<Json<ReferralRegisteredResponse>, ApiError> {
    let wallet = state.session_wallet(&headers, &request_id.0)?;
    state.limit(Op::Quest, &wallet, &request_id.0)?;

    let points = state
        .ledger
        .register_referral(&wallet, &body.code)
        .map_err(wrap(&request_id))?;
    Ok(Json(ReferralRegisteredResponse {
        referrer_points_earned: points,
    }))
}

/// Supporter status for a wallet
/// GET /donate?wallet=0x...
pub async fn supporter_status_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WalletQuery>,
) -> Result<Json<SupporterStatusResponse>, ApiError> {
    if !crate::auth::is_valid_wallet(&query.wallet) {
        return Err(ApiError::bad_request(
            request_id.0.clone(),
            "invalid wallet address",
        ));
    }
    let record = state
        .ledger
        .load(&query.wallet)
        .map_err(wrap(&request_id))?
        .unwrap_or_default();
    Ok(Json(SupporterStatusResponse {
        is_supporter: record.is_supporter,
        bonus_claimed: record.supporter_bonus_claimed,
        bonus_points: state.config.rules.supporter_bonus_points,
    }))
}

/// Verify supporter status with the oracle and claim the one-time bonus
/// POST /donate
pub async fn supporter_claim_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SupporterClaimResponse>, ApiError> {
    let wallet = state.session_wallet(&headers, &request_id.0)?;
    state.limit(Op::Quest, &wallet, &request_id.0)?;

    let confirmed = state
        .ledger
        .confirm_supporter(&wallet, state.oracle.as_ref())
        .await
        .map_err(wrap(&request_id))?;
    if !confirmed {
        return Err(ApiError::new(
            request_id.0.clone(),
            CoreError::Forbidden("no donation found for this wallet".to_string()),
        ));
    }

    let points = state
        .ledger
        .claim_supporter_bonus(&wallet)
        .map_err(wrap(&request_id))?;
    Ok(Json(SupporterClaimResponse {
        points_earned: points,
    }))
}

/// Full player-record dump, gated by the export key
/// GET /export
pub async fn export_handler(
    Extension(request_id): Extension<RequestId>,
    Extension(client_ip): Extension<ClientIp>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.limit(Op::Export, &client_ip.0, &request_id.0)?;

    let expected = state.config.secrets.export_key.as_deref().ok_or_else(|| {
        ApiError::not_found(request_id.0.clone(), "export is not enabled")
    })?;
    let presented = headers
        .get("x-export-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !crate::auth::constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
        return Err(ApiError::new(
            request_id.0.clone(),
            CoreError::Forbidden("invalid export key".to_string()),
        ));
    }

    let players = state.ledger.export_all();
    let count = players.len();
    Ok(Json(serde_json::json!({
        "players": players,
        "count": count,
    })))
}
