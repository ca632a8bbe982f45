//! Circuit breaker for a consistently failing account.
//!
//! Failures are counted in the heartbeat row so they survive restarts. At
//! the threshold the account's active flag is cleared — the supervisor will
//! not auto-restart it — and the watcher exits cleanly. There is no
//! automatic close-after-cooldown: re-activation is an explicit external
//! start call.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::Result;
use crate::account::{AccountId, AccountRepository};
use crate::heartbeat::HeartbeatRepository;

/// Consecutive failures before the breaker opens.
pub const FAILURE_THRESHOLD: i64 = 5;

/// Failure-counting guard for one account's watcher.
pub struct CircuitBreaker {
    accounts: Arc<AccountRepository>,
    heartbeats: Arc<HeartbeatRepository>,
    account_id: AccountId,
    worker_id: String,
    threshold: i64,
}

impl CircuitBreaker {
    /// Creates a breaker with the default threshold.
    #[must_use]
    pub fn new(
        accounts: Arc<AccountRepository>,
        heartbeats: Arc<HeartbeatRepository>,
        account_id: AccountId,
    ) -> Self {
        Self {
            accounts,
            heartbeats,
            account_id,
            worker_id: crate::heartbeat::worker_id(account_id),
            threshold: FAILURE_THRESHOLD,
        }
    }

    /// Overrides the threshold (tests and tuning).
    #[must_use]
    pub const fn with_threshold(mut self, threshold: i64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Records one failure. Returns true when this failure opened the
    /// circuit: the account is now inactive and the watcher must exit.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn record_failure(&self, reason: &str) -> Result<bool> {
        let count = self.heartbeats.record_failure(&self.worker_id, reason).await?;
        debug!(
            account_id = self.account_id.0,
            reason, count, "recorded watcher failure"
        );

        if count >= self.threshold {
            let detail = format!("circuit_open:{reason}");
            self.accounts
                .set_active(self.account_id, false, Some(&detail))
                .await?;
            self.heartbeats.beat(&self.worker_id, &detail).await?;
            warn!(
                account_id = self.account_id.0,
                count, reason, "circuit opened; account deactivated"
            );
            return Ok(true);
        }

        Ok(false)
    }

    /// Resets the counter after a successful connect-and-authenticate cycle.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn record_success(&self) -> Result<()> {
        self.heartbeats.reset_failures(&self.worker_id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::account::Account;

    async fn setup() -> (Arc<AccountRepository>, Arc<HeartbeatRepository>, AccountId) {
        let accounts = Arc::new(AccountRepository::in_memory().await.unwrap());
        let heartbeats = Arc::new(HeartbeatRepository::in_memory().await.unwrap());

        let mut account = Account {
            email: "user@example.com".to_string(),
            ..Account::default()
        };
        accounts.save(&mut account).await.unwrap();
        (accounts, heartbeats, account.id.unwrap())
    }

    #[tokio::test]
    async fn opens_after_threshold_and_deactivates_account() {
        let (accounts, heartbeats, id) = setup().await;
        let breaker = CircuitBreaker::new(Arc::clone(&accounts), heartbeats, id);

        for _ in 0..4 {
            assert!(!breaker.record_failure("connect_failed").await.unwrap());
            assert!(accounts.get(id).await.unwrap().unwrap().is_active);
        }

        // fifth consecutive failure opens the circuit
        assert!(breaker.record_failure("connect_failed").await.unwrap());

        let account = accounts.get(id).await.unwrap().unwrap();
        assert!(!account.is_active);
        assert_eq!(
            account.last_error.as_deref(),
            Some("circuit_open:connect_failed")
        );
    }

    #[tokio::test]
    async fn success_resets_the_count() {
        let (accounts, heartbeats, id) = setup().await;
        let breaker =
            CircuitBreaker::new(Arc::clone(&accounts), Arc::clone(&heartbeats), id);

        for _ in 0..4 {
            breaker.record_failure("timeout").await.unwrap();
        }
        breaker.record_success().await.unwrap();

        // counter restarted: four more failures still do not open it
        for _ in 0..4 {
            assert!(!breaker.record_failure("timeout").await.unwrap());
        }
        assert!(accounts.get(id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn custom_threshold() {
        let (accounts, heartbeats, id) = setup().await;
        let breaker = CircuitBreaker::new(Arc::clone(&accounts), heartbeats, id).with_threshold(2);

        assert!(!breaker.record_failure("x").await.unwrap());
        assert!(breaker.record_failure("x").await.unwrap());
        assert!(!accounts.get(id).await.unwrap().unwrap().is_active);
    }
}
