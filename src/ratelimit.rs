//! Sliding-window rate limiting
//!
//! Counters keyed by `{operation}:{identity}` where identity is an IP for
//! pre-auth endpoints and a wallet everywhere else. A request is admitted
//! only if fewer than `budget.max` requests landed inside the trailing
//! window; rejection happens before any state is touched.

use crate::{
    config::{Budget, RateBudgets},
    errors::{CoreError, CoreResult},
};
use dashmap::DashMap;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, warn};

/// Operation classes with distinct budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Nonce,
    Login,
    GameStart,
    Reveal,
    RecordWin,
    Quest,
    Profile,
    Export,
}

impl Op {
    fn key_prefix(&self) -> &'static str {
        match self {
            Op::Nonce => "nonce",
            Op::Login => "login",
            Op::GameStart => "game-start",
            Op::Reveal => "game-reveal",
            Op::RecordWin => "record-win",
            Op::Quest => "quest",
            Op::Profile => "profile",
            Op::Export => "export",
        }
    }
}

/// Sliding-window limiter shared across all handlers.
pub struct RateLimiter {
    budgets: RateBudgets,
    hits: DashMap<String, Vec<Instant>>,
}

impl RateLimiter {
    pub fn new(budgets: RateBudgets) -> Self {
        Self {
            budgets,
            hits: DashMap::new(),
        }
    }

    fn budget(&self, op: Op) -> Budget {
        match op {
            Op::Nonce => self.budgets.nonce,
            Op::Login => self.budgets.login,
            Op::GameStart => self.budgets.game_start,
            Op::Reveal => self.budgets.reveal,
            Op::RecordWin => self.budgets.record_win,
            Op::Quest => self.budgets.quest,
            Op::Profile => self.budgets.profile,
            Op::Export => self.budgets.export,
        }
    }

    /// Record one request; rejects once the trailing window is full.
    pub fn check(&self, op: Op, identity: &str) -> CoreResult<()> {
        let budget = self.budget(op);
        let key = format!("{}:{}", op.key_prefix(), identity.to_lowercase());
        let now = Instant::now();
        let window = budget.window();

        let mut entry = self.hits.entry(key).or_default();
        entry.retain(|&t| now.duration_since(t) <= window);
        if entry.len() >= budget.max as usize {
            warn!(op = op.key_prefix(), identity, "rate limit exceeded");
            return Err(CoreError::RateLimited);
        }
        entry.push(now);
        Ok(())
    }

    /// Drop windows that have gone fully idle.
    pub fn prune(&self) {
        // The longest configured window bounds how old a useful entry can be.
        let horizon = Duration::from_secs(
            [
                self.budgets.nonce,
                self.budgets.login,
                self.budgets.game_start,
                self.budgets.reveal,
                self.budgets.record_win,
                self.budgets.quest,
                self.budgets.profile,
                self.budgets.export,
            ]
            .iter()
            .map(|b| b.window_secs)
            .max()
            .unwrap_or(60),
        );
        let now = Instant::now();
        self.hits.retain(|_, times| {
            times.retain(|&t| now.duration_since(t) <= horizon);
            !times.is_empty()
        });
        debug!("pruned idle rate-limit windows, {} remain", self.hits.len());
    }

    /// Periodic cleanup so idle identities do not accumulate forever.
    pub fn start_prune_task(limiter: Arc<RateLimiter>, every: Duration) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                limiter.prune();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tight_budgets() -> RateBudgets {
        RateBudgets {
            nonce: Budget::new(2, 60),
            ..RateBudgets::default()
        }
    }

    #[test]
    fn test_admits_up_to_budget_then_rejects() {
        let limiter = RateLimiter::new(tight_budgets());
        assert!(limiter.check(Op::Nonce, "1.2.3.4").is_ok());
        assert!(limiter.check(Op::Nonce, "1.2.3.4").is_ok());
        assert!(matches!(
            limiter.check(Op::Nonce, "1.2.3.4"),
            Err(CoreError::RateLimited)
        ));
    }

    #[test]
    fn test_identities_are_independent() {
        let limiter = RateLimiter::new(tight_budgets());
        assert!(limiter.check(Op::Nonce, "1.2.3.4").is_ok());
        assert!(limiter.check(Op::Nonce, "1.2.3.4").is_ok());
        assert!(limiter.check(Op::Nonce, "5.6.7.8").is_ok());
    }

    #[test]
    fn test_operations_are_independent() {
        let limiter = RateLimiter::new(tight_budgets());
        assert!(limiter.check(Op::Nonce, "0xWALLET").is_ok());
        assert!(limiter.check(Op::Nonce, "0xwallet").is_ok());
        // Same identity, case-folded, shares the nonce window...
        assert!(limiter.check(Op::Nonce, "0xWallet").is_err());
        // ...but a different operation class has its own budget.
        assert!(limiter.check(Op::Quest, "0xwallet").is_ok());
    }

    #[test]
    fn test_window_slides() {
        let budgets = RateBudgets {
            nonce: Budget {
                max: 1,
                window_secs: 0,
            },
            ..RateBudgets::default()
        };
        let limiter = RateLimiter::new(budgets);
        assert!(limiter.check(Op::Nonce, "a").is_ok());
        std::thread::sleep(Duration::from_millis(10));
        // Zero-second window: the previous hit has already left it.
        assert!(limiter.check(Op::Nonce, "a").is_ok());
    }

    #[test]
    fn test_prune_drops_idle_windows() {
        let limiter = RateLimiter::new(RateBudgets::default());
        limiter.check(Op::Profile, "a").unwrap();
        limiter.prune();
        // Still within the horizon, so the window survives.
        assert_eq!(limiter.hits.len(), 1);
    }
}
