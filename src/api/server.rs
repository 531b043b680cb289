//! API Server
//!
//! Server assembly: wires the game core into the router, layers the
//! middleware stack and runs with graceful shutdown.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::{
    auth::Authenticator,
    config::GameConfig,
    game::{GameManager, RevealEngine},
    leaderboard::Leaderboard,
    ledger::Ledger,
    oracle::{DenyAllOracle, StaticOracle, SupporterOracle},
    ratelimit::RateLimiter,
    store::KvStore,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
    pub version: String,
    /// Seconds between expired-entry sweeps of the store.
    pub sweep_interval_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
            version: env!("CARGO_PKG_VERSION").to_string(),
            sweep_interval_secs: 60,
        }
    }
}

/// HTTP API server
pub struct ApiServer {
    config: ApiConfig,
    game: GameConfig,
}

impl ApiServer {
    pub fn new(config: ApiConfig, game: GameConfig) -> Self {
        Self { config, game }
    }

    /// Start the API server
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        self.game.rules.validate()?;

        let app = self.create_app();
        let addr = self.get_socket_addr()?;

        info!("starting scratchd API server");
        info!("   listen: http://{}", addr);
        self.log_server_info();

        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("API server stopped gracefully");
        Ok(())
    }

    /// Create the application with the full middleware stack
    fn create_app(&self) -> axum::Router {
        let state = build_state(self.game.clone(), self.config.version.clone());

        KvStore::start_sweep_task(
            state.store.clone(),
            Duration::from_secs(self.config.sweep_interval_secs),
        );
        RateLimiter::start_prune_task(state.limiter.clone(), Duration::from_secs(300));

        create_router(state)
            // Request ID middleware (first for tracing)
            .layer(axum::middleware::from_fn(request_id_middleware))
            // CORS layer (before timeout to handle preflight)
            .layer(create_cors_layer(self.config.allowed_origins.clone()))
            // Timeout layer
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.request_timeout_secs,
            )))
            // Tracing layer (last for complete request tracing)
            .layer(TraceLayer::new_for_http())
    }

    fn get_socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((
            self.config.host.parse::<std::net::IpAddr>()?,
            self.config.port,
        )))
    }

    fn log_server_info(&self) {
        info!("server configuration:");
        info!("   version: {}", self.config.version);
        info!("   CORS: {:?}", self.config.allowed_origins);
        info!("   request timeout: {}s", self.config.request_timeout_secs);
        info!(
            "   export endpoint: {}",
            if self.game.secrets.export_key.is_some() {
                "enabled"
            } else {
                "disabled"
            }
        );
        info!("available endpoints:");
        info!("   GET  /health            - Health check");
        info!("   GET  /auth/nonce        - Login nonce");
        info!("   POST /auth/login        - Signature login");
        info!("   POST /game/start        - Start a game");
        info!("   POST /game/reveal       - Reveal a cell");
        info!("   GET  /leaderboard       - Top players");
        info!("   GET  /profile           - Points breakdown");
        info!("   GET/POST /quest/daily-login");
        info!("   GET/POST /quest/referral");
        info!("   GET/POST /donate        - Supporter bonus");
    }
}

/// Assemble the shared state from configuration. Exposed for the
/// integration tests, which drive the router without a socket.
pub fn build_state(game: GameConfig, version: String) -> Arc<AppState> {
    let store = Arc::new(KvStore::new());
    let secret = game.secrets.game_secret.clone();

    let ledger = Arc::new(Ledger::new(store.clone(), game.rules.clone()));
    let oracle: Arc<dyn SupporterOracle> = if game.secrets.supporter_allowlist.is_empty() {
        Arc::new(DenyAllOracle)
    } else {
        Arc::new(StaticOracle::new(
            game.secrets.supporter_allowlist.iter().cloned(),
        ))
    };

    let limiter = Arc::new(RateLimiter::new(game.limits.clone()));

    Arc::new(AppState {
        auth: Authenticator::new(store.clone(), game.rules.clone(), secret.clone()),
        games: GameManager::new(store.clone(), game.rules.clone(), secret.clone()),
        reveals: RevealEngine::new(
            store.clone(),
            game.rules.clone(),
            secret,
            ledger.clone(),
            limiter.clone(),
        ),
        leaderboard: Leaderboard::new(ledger.clone(), game.rules.clone()),
        limiter,
        ledger,
        oracle,
        store,
        config: game,
        version,
    })
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C signal");
        },
        _ = terminate => {
            info!("received terminate signal");
        },
    }
}
