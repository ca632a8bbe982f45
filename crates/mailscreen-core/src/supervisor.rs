//! Watcher supervisor: the process-wide registry of running watchers.
//!
//! The registry is an owned type with start/stop as its only public
//! mutators, keyed by account id and guarded by its own mutex — no ambient
//! global state. Start and stop are idempotent: starting a running account
//! and stopping a stopped one are both successful no-ops.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::account::{AccountId, AccountRepository, CredentialVault};
use crate::heartbeat::HeartbeatRepository;
use crate::store::MessageRepository;
use crate::watcher::{AccountWatcher, WatcherConfig};
use crate::{Error, Result};

/// How long `stop` waits for a watcher to exit cooperatively.
const STOP_GRACE: Duration = Duration::from_secs(10);

/// Result of a start call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A watcher task was spawned.
    Started,
    /// A watcher was already running for the account; nothing changed.
    AlreadyRunning,
}

/// Result of a stop call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The watcher exited (or was asked to and will exit shortly).
    Stopped,
    /// No watcher was running for the account; nothing changed.
    NotRunning,
}

struct WatcherHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Registry mapping account ids to running watchers.
pub struct WatcherSupervisor {
    accounts: Arc<AccountRepository>,
    messages: Arc<MessageRepository>,
    heartbeats: Arc<HeartbeatRepository>,
    vault: Arc<CredentialVault>,
    config: WatcherConfig,
    running: Mutex<HashMap<i64, WatcherHandle>>,
}

impl WatcherSupervisor {
    /// Creates a supervisor over the shared stores.
    #[must_use]
    pub fn new(
        accounts: Arc<AccountRepository>,
        messages: Arc<MessageRepository>,
        heartbeats: Arc<HeartbeatRepository>,
        vault: Arc<CredentialVault>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            accounts,
            messages,
            heartbeats,
            vault,
            config,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a watcher for the account.
    ///
    /// This is the explicit re-activation path: the account's active flag is
    /// set and its failure count and stop flag are cleared, so an account
    /// whose circuit opened starts from a clean slate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] if the account does not exist, or
    /// a storage error.
    pub async fn start(&self, account_id: AccountId) -> Result<StartOutcome> {
        let mut running = self.running.lock().await;

        if let Some(handle) = running.get(&account_id.0) {
            if !handle.task.is_finished() {
                return Ok(StartOutcome::AlreadyRunning);
            }
            running.remove(&account_id.0);
        }

        let mut account = self
            .accounts
            .get(account_id)
            .await?
            .ok_or_else(|| Error::AccountNotFound(account_id.to_string()))?;

        self.accounts.set_active(account_id, true, None).await?;
        account.is_active = true;
        account.last_error = None;

        let worker_id = crate::heartbeat::worker_id(account_id);
        self.heartbeats.request_stop(&worker_id, false).await?;
        self.heartbeats.reset_failures(&worker_id).await?;

        let cancel = CancellationToken::new();
        let watcher = AccountWatcher::new(
            account,
            Arc::clone(&self.accounts),
            Arc::clone(&self.messages),
            Arc::clone(&self.heartbeats),
            Arc::clone(&self.vault),
            cancel.clone(),
            self.config.clone(),
        );
        let task = tokio::spawn(watcher.run());

        running.insert(account_id.0, WatcherHandle { cancel, task });
        info!(account_id = account_id.0, "started watcher");
        Ok(StartOutcome::Started)
    }

    /// Stops the watcher for the account, cooperatively.
    ///
    /// Sets the persistent stop flag, cancels the wait primitive, and gives
    /// the task a bounded grace period. There is no hard kill; a task that
    /// outlives the grace period keeps running until it notices the flag.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the stop flag cannot be persisted.
    pub async fn stop(&self, account_id: AccountId) -> Result<StopOutcome> {
        let handle = {
            let mut running = self.running.lock().await;
            running.remove(&account_id.0)
        };

        let Some(handle) = handle else {
            return Ok(StopOutcome::NotRunning);
        };

        let worker_id = crate::heartbeat::worker_id(account_id);
        self.heartbeats.request_stop(&worker_id, true).await?;
        handle.cancel.cancel();

        if tokio::time::timeout(STOP_GRACE, handle.task).await.is_err() {
            warn!(
                account_id = account_id.0,
                "watcher did not exit within grace period; detaching"
            );
        }

        info!(account_id = account_id.0, "stopped watcher");
        Ok(StopOutcome::Stopped)
    }

    /// Starts watchers for every account whose active flag is set.
    ///
    /// Returns the number of watchers started.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the account list cannot be read.
    pub async fn start_all_active(&self) -> Result<usize> {
        let mut started = 0;
        for account in self.accounts.list_active().await? {
            let Some(id) = account.id else { continue };
            if self.start(id).await? == StartOutcome::Started {
                started += 1;
            }
        }
        Ok(started)
    }

    /// Account ids with a live watcher task.
    pub async fn running(&self) -> Vec<AccountId> {
        let running = self.running.lock().await;
        running
            .iter()
            .filter(|(_, handle)| !handle.task.is_finished())
            .map(|(id, _)| AccountId(*id))
            .collect()
    }

    /// Returns true if a watcher task is live for the account.
    pub async fn is_running(&self, account_id: AccountId) -> bool {
        let running = self.running.lock().await;
        running
            .get(&account_id.0)
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Stops every running watcher (process shutdown).
    pub async fn shutdown(&self) {
        let ids: Vec<AccountId> = {
            let running = self.running.lock().await;
            running.keys().map(|id| AccountId(*id)).collect()
        };
        for id in ids {
            if let Err(e) = self.stop(id).await {
                warn!(account_id = id.0, error = %e, "failed to stop watcher");
            }
        }
    }
}
