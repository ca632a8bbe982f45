//! Heartbeat model types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::account::AccountId;

/// Derives the worker identity for an account's watcher.
#[must_use]
pub fn worker_id(account_id: AccountId) -> String {
    format!("imap_{}", account_id.0)
}

/// One row per running watcher.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerHeartbeat {
    /// Worker identity, `imap_<account id>`.
    pub worker_id: String,
    /// Last time the worker reported in.
    pub last_heartbeat: DateTime<Utc>,
    /// Status string, e.g. `active`, `circuit_open:auth_failed`, `stopped`.
    pub status: String,
    /// Consecutive failure count feeding the circuit breaker.
    pub error_count: i64,
    /// Set by the supervisor to request cooperative shutdown.
    pub stop_requested: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_id_format() {
        assert_eq!(worker_id(AccountId(7)), "imap_7");
    }
}
