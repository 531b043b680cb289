//! Error taxonomy for the scratch-game core
//!
//! One closed set of error kinds shared by every component; the HTTP layer
//! translates these to status codes in exactly one place (`api::errors`).

use thiserror::Error;

/// Root error type for all core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed client input (wallet, level, cell index, code shape).
    #[error("{0}")]
    Validation(String),

    /// Missing, invalid or expired bearer token, or a token for a
    /// different wallet than the request claims.
    #[error("{0}")]
    Unauthenticated(String),

    /// Authenticated but not allowed: forged game token or a session
    /// owned by another wallet.
    #[error("{0}")]
    Forbidden(String),

    /// Nonce or game session no longer exists (consumed or TTL-expired).
    #[error("{0}")]
    NotFound(String),

    /// Business-rule violation: already revealed, already referred,
    /// already claimed, daily limit reached. Not a bug.
    #[error("{message}")]
    Conflict {
        message: String,
        /// Machine-readable extras for the client (e.g. cooldown remaining).
        details: Option<serde_json::Value>,
    },

    /// Sliding-window budget exceeded; nothing was mutated.
    #[error("too many requests")]
    RateLimited,

    /// Supporter oracle or another collaborator failed.
    #[error("{0}")]
    Upstream(String),

    /// Anything unexpected. Logged in full, surfaced as a generic message.
    #[error("{0}")]
    Internal(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        CoreError::Conflict {
            message: msg.into(),
            details: None,
        }
    }

    pub fn conflict_with(msg: impl Into<String>, details: serde_json::Value) -> Self {
        CoreError::Conflict {
            message: msg.into(),
            details: Some(details),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Internal(format!("record encoding failed: {}", e))
    }
}

/// Convenience alias used throughout the crate.
pub type CoreResult<T> = Result<T, CoreError>;
