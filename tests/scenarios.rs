//! End-to-end API scenarios driven through the full router.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use k256::ecdsa::SigningKey;
use scratchd::{
    api::{
        middleware::request_id_middleware,
        routes::create_router,
        server::build_state,
    },
    config::{GameConfig, GameRules, RateBudgets, Secrets},
    game::{session::game_key, GameSession},
};
use serde_json::{json, Value};
use sha3::{Digest, Keccak256};
use std::sync::Arc;
use tower::ServiceExt;

/// Minimal wallet: a fresh secp256k1 key plus EIP-191 personal signing.
struct Wallet {
    key: SigningKey,
    address: String,
}

impl Wallet {
    fn random() -> Self {
        let key = SigningKey::random(&mut rand::rngs::OsRng);
        let point = key.verifying_key().to_encoded_point(false);
        let mut hasher = Keccak256::new();
        hasher.update(&point.as_bytes()[1..]);
        let hash = hasher.finalize();
        let address = format!("0x{}", hex::encode(&hash[12..]));
        Self { key, address }
    }

    fn sign(&self, message: &str) -> String {
        let mut hasher = Keccak256::new();
        hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()));
        hasher.update(message.as_bytes());
        let digest: [u8; 32] = hasher.finalize().into();

        let (sig, recovery_id) = self
            .key
            .sign_prehash_recoverable(&digest)
            .expect("signing cannot fail");
        let mut raw = sig.to_bytes().to_vec();
        raw.push(27 + recovery_id.to_byte());
        format!("0x{}", hex::encode(raw))
    }
}

struct TestApp {
    router: Router,
    state: Arc<scratchd::api::handlers::AppState>,
}

fn test_app() -> TestApp {
    let config = GameConfig {
        rules: GameRules::default(),
        limits: RateBudgets::default(),
        secrets: Secrets::for_tests(),
    };
    let state = build_state(config, "test".to_string());
    let router =
        create_router(state.clone()).layer(axum::middleware::from_fn(request_id_middleware));
    TestApp { router, state }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

fn post_json(path: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Full login flow: nonce, sign, exchange for a session token.
async fn login(app: &TestApp, wallet: &Wallet) -> String {
    let (status, body) = send(
        &app.router,
        get(&format!("/auth/nonce?wallet={}", wallet.address)),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "nonce failed: {}", body);
    let message = body["message"].as_str().unwrap().to_string();

    let signature = wallet.sign(&message);
    let (status, body) = send(
        &app.router,
        post_json(
            "/auth/login",
            None,
            json!({ "wallet": wallet.address, "signature": signature }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["token"].as_str().unwrap().to_string()
}

async fn start_game(app: &TestApp, token: &str, wallet: &Wallet, level: &str) -> Value {
    let (status, body) = send(
        &app.router,
        post_json(
            "/game/start",
            Some(token),
            json!({ "wallet": wallet.address, "level": level }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "start failed: {}", body);
    body
}

/// Read the hidden board straight out of the store; the API never leaks it.
fn board_partition(app: &TestApp, game_id: &str) -> (Vec<usize>, Vec<usize>) {
    let session: GameSession = app
        .state
        .store
        .get_json(&game_key(game_id))
        .unwrap()
        .expect("session should exist");
    let mut safe = Vec::new();
    let mut bombs = Vec::new();
    for (i, cell) in session.cells.iter().enumerate() {
        if cell.is_bomb {
            bombs.push(i);
        } else {
            safe.push(i);
        }
    }
    (safe, bombs)
}

async fn reveal(
    app: &TestApp,
    token: &str,
    wallet: &Wallet,
    game: &Value,
    index: usize,
) -> (StatusCode, Value) {
    send(
        &app.router,
        post_json(
            "/game/reveal",
            Some(token),
            json!({
                "gameId": game["gameId"],
                "token": game["gameToken"],
                "wallet": wallet.address,
                "cellIndex": index,
            }),
        ),
    )
    .await
}

#[tokio::test]
async fn easy_win_credits_points_and_shows_on_profile() {
    let app = test_app();
    let wallet = Wallet::random();
    let token = login(&app, &wallet).await;

    let game = start_game(&app, &token, &wallet, "easy").await;
    assert_eq!(game["gridSize"], 3);
    assert_eq!(game["totalCells"], 9);
    assert_eq!(game["bombCount"], 1);

    let (safe, _) = board_partition(&app, game["gameId"].as_str().unwrap());
    for (n, &index) in safe.iter().enumerate() {
        let (status, body) = reveal(&app, &token, &wallet, &game, index).await;
        assert_eq!(status, StatusCode::OK, "reveal failed: {}", body);
        if n + 1 < safe.len() {
            assert_eq!(body["status"], "active");
            assert!(body.get("board").is_none(), "active reveal leaked board");
        } else {
            assert_eq!(body["status"], "won");
            assert_eq!(body["pointsEarned"], 3);
            assert_eq!(body["board"].as_array().unwrap().len(), 9);
        }
    }

    let (status, profile) = send(
        &app.router,
        get(&format!("/profile?wallet={}", wallet.address)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["stats"]["easyWins"], 1);
    assert_eq!(profile["points"]["game"], 3);
    assert_eq!(profile["points"]["total"], 3);
}

#[tokio::test]
async fn hard_bomb_loses_and_session_is_gone() {
    let app = test_app();
    let wallet = Wallet::random();
    let token = login(&app, &wallet).await;

    let game = start_game(&app, &token, &wallet, "hard").await;
    let (_, bombs) = board_partition(&app, game["gameId"].as_str().unwrap());

    let (status, body) = reveal(&app, &token, &wallet, &game, bombs[0]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "lost");
    assert_eq!(body["cell"]["isBomb"], true);
    assert_eq!(body["board"].as_array().unwrap().len(), 25);

    // The finished session no longer exists.
    let (status, body) = reveal(&app, &token, &wallet, &game, 0).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    // A lost game never shows up as a win.
    let (_, profile) = send(
        &app.router,
        get(&format!("/profile?wallet={}", wallet.address)),
    )
    .await;
    assert_eq!(profile["stats"]["totalWins"], 0);
}

#[tokio::test]
async fn duplicate_reveal_conflicts() {
    let app = test_app();
    let wallet = Wallet::random();
    let token = login(&app, &wallet).await;

    let game = start_game(&app, &token, &wallet, "medium").await;
    let (safe, _) = board_partition(&app, game["gameId"].as_str().unwrap());

    let (status, _) = reveal(&app, &token, &wallet, &game, safe[0]).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = reveal(&app, &token, &wallet, &game, safe[0]).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn other_wallets_session_is_forbidden() {
    let app = test_app();
    let owner = Wallet::random();
    let intruder = Wallet::random();
    let owner_token = login(&app, &owner).await;
    let intruder_token = login(&app, &intruder).await;

    let game = start_game(&app, &owner_token, &owner, "easy").await;
    let (status, body) = reveal(&app, &intruder_token, &intruder, &game, 0).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "body: {}", body);
}

#[tokio::test]
async fn daily_login_double_claim_conflicts_with_cooldown_details() {
    let app = test_app();
    let wallet = Wallet::random();
    let token = login(&app, &wallet).await;

    let (status, body) = send(
        &app.router,
        post_json("/quest/daily-login", Some(&token), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "claim failed: {}", body);
    assert_eq!(body["pointsEarned"], 2);

    let (status, body) = send(
        &app.router,
        post_json("/quest/daily-login", Some(&token), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
    let remaining = body["error"]["details"]["cooldownRemaining"].as_u64().unwrap();
    assert!(remaining > 0 && remaining <= 24 * 60 * 60 * 1000);

    let (status, status_body) = send(
        &app.router,
        get(&format!("/quest/daily-login?wallet={}", wallet.address)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(status_body["canClaim"], false);
    assert_eq!(status_body["totalDailyLoginPoints"], 2);
}

#[tokio::test]
async fn referral_flow_enforces_minimum_wins() {
    let app = test_app();
    let referrer = Wallet::random();
    let referee = Wallet::random();
    let referee_token = login(&app, &referee).await;

    let (status, info) = send(
        &app.router,
        get(&format!("/quest/referral?wallet={}", referrer.address)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let code = info["referralCode"].as_str().unwrap().to_string();

    // No wins yet: registration is refused with the win requirement.
    let (status, body) = send(
        &app.router,
        post_json("/quest/referral", Some(&referee_token), json!({ "code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["details"]["winsNeeded"], 5);
}

#[tokio::test]
async fn nonce_endpoint_is_rate_limited_per_ip() {
    let app = test_app();
    let wallet = Wallet::random();

    for i in 0..6 {
        let request = Request::builder()
            .uri(format!("/auth/nonce?wallet={}", wallet.address))
            .header("x-forwarded-for", "198.51.100.7")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app.router, request).await;
        if i < 5 {
            assert_eq!(status, StatusCode::OK, "request {} failed: {}", i, body);
        } else {
            assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
            assert_eq!(body["error"]["code"], "RATE_LIMITED");
        }
    }

    // A different IP still has its own budget.
    let request = Request::builder()
        .uri(format!("/auth/nonce?wallet={}", wallet.address))
        .header("x-forwarded-for", "198.51.100.8")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn bad_signature_and_missing_token_are_rejected() {
    let app = test_app();
    let wallet = Wallet::random();
    let other = Wallet::random();

    let (_, body) = send(
        &app.router,
        get(&format!("/auth/nonce?wallet={}", wallet.address)),
    )
    .await;
    let message = body["message"].as_str().unwrap();

    // Signature from the wrong key.
    let (status, body) = send(
        &app.router,
        post_json(
            "/auth/login",
            None,
            json!({ "wallet": wallet.address, "signature": other.sign(message) }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "body: {}", body);

    // No bearer token on an authenticated route.
    let (status, _) = send(
        &app.router,
        post_json(
            "/game/start",
            None,
            json!({ "wallet": wallet.address, "level": "easy" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn leaderboard_ranks_wallets_by_points() {
    let app = test_app();
    let wallet = Wallet::random();
    let token = login(&app, &wallet).await;

    // Win one easy game.
    let game = start_game(&app, &token, &wallet, "easy").await;
    let (safe, _) = board_partition(&app, game["gameId"].as_str().unwrap());
    for &index in &safe {
        reveal(&app, &token, &wallet, &game, index).await;
    }

    let (status, body) = send(&app.router, get("/leaderboard")).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["wallet"], wallet.address.to_lowercase());
    assert_eq!(entries[0]["totalPoints"], 3);
    assert_eq!(entries[0]["rank"], 1);
}

#[tokio::test]
async fn public_reads_reject_malformed_wallets() {
    let app = test_app();
    for path in [
        "/profile?wallet=banana",
        "/quest/daily-login?wallet=banana",
        "/quest/referral?wallet=banana",
        "/donate?wallet=banana",
    ] {
        let (status, body) = send(&app.router, get(path)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}: {}", path, body);
        assert_eq!(body["error"]["code"], "BAD_REQUEST", "{}", path);
    }
}

#[tokio::test]
async fn export_requires_configured_key() {
    let app = test_app();
    // Secrets::for_tests() sets no export key, so the route reports 404.
    let (status, _) = send(&app.router, get("/export")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn export_checks_the_presented_key() {
    let mut secrets = Secrets::for_tests();
    secrets.export_key = Some("hunter2".to_string());
    let config = GameConfig {
        rules: GameRules::default(),
        limits: RateBudgets::default(),
        secrets,
    };
    let state = build_state(config, "test".to_string());
    let router =
        create_router(state).layer(axum::middleware::from_fn(request_id_middleware));

    let wrong = Request::builder()
        .uri("/export")
        .header("x-export-key", "hunter")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&router, wrong).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let right = Request::builder()
        .uri("/export")
        .header("x-export-key", "hunter2")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&router, right).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn health_reports_running() {
    let app = test_app();
    let (status, body) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Running");
}
