//! scratchd server binary
//!
//! Reads secrets from the environment, tunables from the command line, and
//! serves the game API until interrupted.

use clap::Parser;
use scratchd::{
    api::{ApiConfig, ApiServer},
    config::GameConfig,
};

#[derive(Parser, Debug)]
#[command(name = "scratchd")]
#[command(about = "Scratch card game API server", long_about = None)]
struct Args {
    /// API server host
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// API server port
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Allowed CORS origins (comma-separated, use * for all)
    #[arg(long, default_value = "*")]
    cors_origins: String,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// Seconds between expired-entry sweeps of the store
    #[arg(long, default_value = "60")]
    sweep_interval: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scratchd=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    // GAME_SECRET (and optionally EXPORT_KEY, SUPPORTER_WALLETS) come from
    // the environment; refuse to start without a usable secret.
    let game = GameConfig::from_env()?;

    let config = ApiConfig {
        host: args.host,
        port: args.port,
        allowed_origins: args
            .cors_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        request_timeout_secs: args.timeout,
        sweep_interval_secs: args.sweep_interval,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    ApiServer::new(config, game).run().await
}
