//! Route Definitions
//!
//! Maps URLs to handlers with type-safe routing.

use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check (high priority)
        .route("/health", get(health_handler))
        // Wallet authentication
        .route("/auth/nonce", get(nonce_handler))
        .route("/auth/login", post(login_handler))
        // Gameplay
        .route("/game/start", post(start_game_handler))
        .route("/game/reveal", post(reveal_handler))
        // Public reads
        .route("/leaderboard", get(leaderboard_handler))
        .route("/profile", get(profile_handler))
        // Quests
        .route(
            "/quest/daily-login",
            get(daily_login_status_handler).post(daily_login_claim_handler),
        )
        .route(
            "/quest/referral",
            get(referral_info_handler).post(referral_register_handler),
        )
        // Supporter bonus
        .route(
            "/donate",
            get(supporter_status_handler).post(supporter_claim_handler),
        )
        // Administrative export (key gated)
        .route("/export", get(export_handler))
        // Attach shared state
        .with_state(state)
}
