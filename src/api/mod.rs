//! HTTP API service
//!
//! JSON API for wallet auth, gameplay, quests and the leaderboard. Every
//! response carries a request id; every error uses the structured envelope
//! in `errors`.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{ApiConfig, ApiServer};
