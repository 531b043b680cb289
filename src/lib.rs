//! scratchd - Server-Authoritative Scratch Card Game Backend
//!
//! Wallet-signature authentication, hidden game boards, an atomic reveal
//! state machine and a daily-capped point economy, served over a JSON HTTP
//! API. All game state lives in an in-process shared store; every
//! cross-request invariant is enforced by an atomic store script.

pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod game;
pub mod leaderboard;
pub mod ledger;
pub mod oracle;
pub mod ratelimit;
pub mod store;
