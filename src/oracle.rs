//! Supporter verification oracle
//!
//! Whether a wallet has actually donated is decided off-process (on-chain
//! lookup, payment processor, ops allowlist). The trait keeps that concern
//! behind one async seam; the server wires in the allowlist-backed oracle
//! from `SUPPORTER_WALLETS`.

use crate::errors::CoreResult;
use async_trait::async_trait;
use std::collections::HashSet;

#[async_trait]
pub trait SupporterOracle: Send + Sync {
    /// True when the wallet's supporter status can be confirmed right now.
    /// Transient lookup failures surface as `CoreError::Upstream`.
    async fn is_supporter(&self, wallet: &str) -> CoreResult<bool>;
}

/// Allowlist-backed oracle. Wallets are normalized to lowercase at
/// construction so lookups stay case-insensitive.
pub struct StaticOracle {
    allowlist: HashSet<String>,
}

impl StaticOracle {
    pub fn new(wallets: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowlist: wallets.into_iter().map(|w| w.to_lowercase()).collect(),
        }
    }
}

#[async_trait]
impl SupporterOracle for StaticOracle {
    async fn is_supporter(&self, wallet: &str) -> CoreResult<bool> {
        Ok(self.allowlist.contains(&wallet.to_lowercase()))
    }
}

/// Oracle that confirms no one; the default when no allowlist is set.
pub struct DenyAllOracle;

#[async_trait]
impl SupporterOracle for DenyAllOracle {
    async fn is_supporter(&self, _wallet: &str) -> CoreResult<bool> {
        Ok(false)
    }
}
