//! Per-account watcher: the interception loop.
//!
//! One watcher owns exactly one protocol session at a time and drives the
//! state machine `CONNECTING → {IDLE_WAIT | POLL_WAIT} → PROCESSING`, with
//! the circuit breaker as the side channel into `CIRCUIT_OPEN` and the
//! cancellation token / heartbeat stop flag leading to `STOPPED`. Failures
//! never crash the process: they are recorded and the loop reconnects with
//! backoff or exits cleanly.

mod backoff;
mod circuit;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mailscreen_imap::command::{FetchItems, StoreAction};
use mailscreen_imap::types::{Flag, Uid, UidSet};
use mailscreen_imap::{IdleEvent, MailboxStatus};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use backoff::ExponentialBackoff;
pub use circuit::{CircuitBreaker, FAILURE_THRESHOLD};

use crate::account::{Account, AccountId, AccountRepository, CredentialVault};
use crate::heartbeat::HeartbeatRepository;
use crate::service::{
    SelectedClient, SessionError, connect_and_login, ensure_folder, parse_internal_date,
};
use crate::store::{InterceptedMessage, MessageRepository};

/// Tuning knobs for the watcher loop.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Sleep between scans when IDLE is unavailable or disabled.
    pub poll_interval: Duration,
    /// How often the heartbeat row is refreshed.
    pub heartbeat_interval: Duration,
    /// Force the polling path even when the server supports IDLE.
    pub disable_idle: bool,
    /// Seed delay for reconnect backoff.
    pub backoff_seed: Duration,
    /// Cap for reconnect backoff.
    pub backoff_cap: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
            disable_idle: false,
            backoff_seed: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(60),
        }
    }
}

/// Hold strategy, selected once per session from the capability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HoldStrategy {
    /// Native MOVE (RFC 6851).
    Move,
    /// COPY, then `+FLAGS \Deleted`, then EXPUNGE. Copy strictly precedes
    /// the delete: losing a message to a crash between the steps is the
    /// rare acceptable failure, deleting before a confirmed copy is not.
    CopyPurge,
}

/// A live session against the source folder.
struct WatchSession {
    client: Option<SelectedClient>,
    strategy: HoldStrategy,
    use_idle: bool,
    watermark: u32,
}

impl WatchSession {
    fn client_mut(&mut self) -> Result<&mut SelectedClient, mailscreen_imap::Error> {
        self.client
            .as_mut()
            .ok_or_else(|| mailscreen_imap::Error::InvalidState("session lost".to_string()))
    }
}

/// Why a wait cycle ended.
enum Wake {
    /// The server signalled a change (or the poll interval elapsed).
    Check,
    /// Stop was requested.
    Stopped,
}

/// How the watcher loop finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Stopped,
    CircuitOpen,
}

/// Long-running interception worker for one account.
pub struct AccountWatcher {
    account: Account,
    account_id: AccountId,
    worker_id: String,
    accounts: Arc<AccountRepository>,
    messages: Arc<MessageRepository>,
    heartbeats: Arc<HeartbeatRepository>,
    vault: Arc<CredentialVault>,
    breaker: CircuitBreaker,
    cancel: CancellationToken,
    config: WatcherConfig,
    last_beat: Option<Instant>,
}

impl AccountWatcher {
    /// Creates a watcher for an account.
    ///
    /// # Panics
    ///
    /// Panics if the account has no id; only persisted accounts are
    /// watchable.
    #[must_use]
    pub fn new(
        account: Account,
        accounts: Arc<AccountRepository>,
        messages: Arc<MessageRepository>,
        heartbeats: Arc<HeartbeatRepository>,
        vault: Arc<CredentialVault>,
        cancel: CancellationToken,
        config: WatcherConfig,
    ) -> Self {
        let account_id = account.id.unwrap_or_else(|| {
            panic!("watcher requires a persisted account");
        });
        let breaker = CircuitBreaker::new(Arc::clone(&accounts), Arc::clone(&heartbeats), account_id);
        Self {
            worker_id: crate::heartbeat::worker_id(account_id),
            account,
            account_id,
            accounts,
            messages,
            heartbeats,
            vault,
            breaker,
            cancel,
            config,
            last_beat: None,
        }
    }

    /// Runs the watcher until stop is requested or the circuit opens.
    pub async fn run(mut self) {
        info!(
            account_id = self.account_id.0,
            email = %self.account.email,
            "watcher starting"
        );
        let mut backoff =
            ExponentialBackoff::new(self.config.backoff_seed, self.config.backoff_cap);

        let exit = loop {
            if self.should_stop().await {
                break Exit::Stopped;
            }

            self.beat_now("connecting").await;
            match self.connect().await {
                Ok(mut session) => {
                    backoff.reset();
                    if let Err(e) = self.breaker.record_success().await {
                        warn!(error = %e, "failed to reset breaker count");
                    }
                    self.beat_now("active").await;

                    match self.watch(&mut session).await {
                        Ok(()) => break Exit::Stopped,
                        Err(e) => {
                            warn!(
                                account_id = self.account_id.0,
                                error = %e,
                                "session ended; reconnecting"
                            );
                            if self.note_failure(failure_reason(&e)).await {
                                break Exit::CircuitOpen;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        account_id = self.account_id.0,
                        error = %e,
                        "connect failed"
                    );
                    if self.note_failure(e.reason()).await {
                        break Exit::CircuitOpen;
                    }
                    let delay = backoff.next_delay();
                    debug!(?delay, "backing off before reconnect");
                    tokio::select! {
                        () = self.cancel.cancelled() => break Exit::Stopped,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        };

        if exit == Exit::Stopped {
            let _ = self.heartbeats.beat(&self.worker_id, "stopped").await;
        }
        info!(account_id = self.account_id.0, ?exit, "watcher exited");
    }

    /// CONNECTING: open a session, ensure folders, select the source
    /// folder, pick strategies, and reconcile the watermark.
    async fn connect(&self) -> Result<WatchSession, SessionError> {
        // A missing or corrupt secret is a configuration problem; from the
        // watcher's perspective it simply prevents a usable session.
        let secret = self
            .vault
            .decrypt(&self.account.encrypted_secret)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                SessionError::Authentication("stored secret unavailable".to_string())
            })?;

        let mut auth = connect_and_login(&self.account, &secret).await?;
        ensure_folder(&mut auth, &self.account.quarantine_folder).await?;

        let (client, status) = auth
            .select(&self.account.source_folder)
            .await
            .map_err(|e| SessionError::Operation(e.to_string()))?;

        let strategy = if client.supports_move() {
            HoldStrategy::Move
        } else {
            HoldStrategy::CopyPurge
        };
        let use_idle = client.supports_idle() && !self.config.disable_idle;
        let watermark = self.reconcile_watermark(&status).await?;

        debug!(
            account_id = self.account_id.0,
            ?strategy,
            use_idle,
            watermark,
            "session established"
        );

        Ok(WatchSession {
            client: Some(client),
            strategy,
            use_idle,
            watermark,
        })
    }

    async fn reconcile_watermark(&self, status: &MailboxStatus) -> Result<u32, SessionError> {
        let uid_validity = status.uid_validity.map_or(0, mailscreen_imap::UidValidity::get);
        let baseline = status
            .uid_next
            .map_or(0, |u| u.get().saturating_sub(1));

        self.messages
            .sync_generation(
                self.account_id,
                &self.account.source_folder,
                uid_validity,
                baseline,
            )
            .await
            .map_err(|e| SessionError::Operation(e.to_string()))
    }

    /// The wait/process loop for one established session.
    ///
    /// Returns `Ok(())` only on a requested stop; any protocol or storage
    /// error propagates so the caller can count it and reconnect.
    async fn watch(&mut self, session: &mut WatchSession) -> crate::Result<()> {
        loop {
            if self.should_stop().await {
                return Ok(());
            }
            self.beat("active").await;

            // Process first: mail that arrived while disconnected must not
            // wait for the next change notification.
            self.process_new(session).await?;

            match self.wait_for_changes(session).await? {
                Wake::Check => {}
                Wake::Stopped => return Ok(()),
            }
        }
    }

    /// IDLE_WAIT / POLL_WAIT.
    async fn wait_for_changes(&mut self, session: &mut WatchSession) -> crate::Result<Wake> {
        if !session.use_idle {
            // POLL_WAIT: fixed short sleep, then re-scan.
            tokio::select! {
                () = self.cancel.cancelled() => return Ok(Wake::Stopped),
                () = tokio::time::sleep(self.config.poll_interval) => return Ok(Wake::Check),
            }
        }

        // IDLE_WAIT: each cycle is capped by the account's idle budget and
        // broken early on the keep-alive interval to issue a NOOP. The wait
        // runs in heartbeat-sized chunks so the heartbeat row stays fresh
        // without leaving IDLE.
        enum IdleEnd {
            Changed,
            KeepAlive,
            Stopped,
        }

        let budget = self.account.idle_timeout();
        let keepalive = self.account.keepalive_interval();
        let cycle_start = Instant::now();
        let mut last_noop = Instant::now();

        loop {
            let end = {
                let cancel = self.cancel.clone();
                let mut handle = session.client_mut()?.idle().await?;

                let end = loop {
                    let chunk = self.config.heartbeat_interval.min(keepalive).min(budget);
                    match handle.wait(chunk, &cancel).await {
                        Ok(IdleEvent::Exists(_) | IdleEvent::Recent(_)) => break IdleEnd::Changed,
                        Ok(IdleEvent::Expunge(_) | IdleEvent::Other) => {}
                        Ok(IdleEvent::Timeout) => {
                            self.beat("active").await;
                            if self.should_stop().await {
                                break IdleEnd::Stopped;
                            }
                        }
                        Err(mailscreen_imap::Error::Cancelled) => break IdleEnd::Stopped,
                        Err(e) => return Err(e.into()),
                    }
                    if last_noop.elapsed() >= keepalive || cycle_start.elapsed() >= budget {
                        break IdleEnd::KeepAlive;
                    }
                };

                // Leave IDLE before issuing anything else. On a requested
                // stop the DONE is best-effort; the session is going away.
                match end {
                    IdleEnd::Stopped => {
                        let _ = handle.done().await;
                    }
                    IdleEnd::Changed | IdleEnd::KeepAlive => handle.done().await?,
                }
                end
            };

            match end {
                IdleEnd::Changed => return Ok(Wake::Check),
                IdleEnd::Stopped => return Ok(Wake::Stopped),
                IdleEnd::KeepAlive => {
                    session.client_mut()?.noop().await?;
                    last_noop = Instant::now();
                    if cycle_start.elapsed() >= budget {
                        // Budget spent without a disconnect: re-scan and
                        // start a fresh idle cycle rather than erroring.
                        return Ok(Wake::Check);
                    }
                }
            }
        }
    }

    /// PROCESSING: capture and hold every unseen UID above the watermark.
    async fn process_new(&mut self, session: &mut WatchSession) -> crate::Result<()> {
        let query = format!("UID {}:*", session.watermark.saturating_add(1));
        let mut uids = session.client_mut()?.uid_search(&query).await?;
        // Servers answer `n:*` with the last message even when nothing is
        // above the watermark; drop anything at or below it.
        uids.retain(|uid| uid.get() > session.watermark);
        uids.sort_unstable();

        if uids.is_empty() {
            let _ = self
                .accounts
                .touch_checked(self.account_id, Utc::now())
                .await;
            return Ok(());
        }

        info!(
            account_id = self.account_id.0,
            count = uids.len(),
            "intercepting messages"
        );

        for uid in uids {
            if self.should_stop().await {
                return Ok(());
            }

            if !self.messages.exists_capture(self.account_id, uid.get()).await? {
                self.capture_and_hold(session, uid).await?;
            }

            self.messages
                .advance_watermark(self.account_id, &self.account.source_folder, uid.get())
                .await?;
            session.watermark = uid.get();
        }

        let _ = self
            .accounts
            .touch_checked(self.account_id, Utc::now())
            .await;
        Ok(())
    }

    /// Fetches one message, records it durably, then performs the hold.
    ///
    /// Ordering is the crash-safety contract: the capture row (with raw
    /// payload) is inserted before the destructive remote operation. If the
    /// hold fails the row remains `FETCHED` — visible as captured but not
    /// yet quarantined — instead of silently disappearing.
    async fn capture_and_hold(
        &mut self,
        session: &mut WatchSession,
        uid: Uid,
    ) -> crate::Result<()> {
        let set = UidSet::single(uid);
        let results = session
            .client_mut()?
            .uid_fetch(&set, FetchItems::capture())
            .await?;

        let mut raw: Option<Vec<u8>> = None;
        let mut internal_date: Option<String> = None;
        for (_seq, items) in results {
            let mut matches = false;
            let mut body: Option<Vec<u8>> = None;
            let mut date: Option<String> = None;
            for item in items {
                match item {
                    mailscreen_imap::FetchItem::Uid(u) => matches = u == uid,
                    mailscreen_imap::FetchItem::Body(b) => body = b,
                    mailscreen_imap::FetchItem::InternalDate(d) => date = Some(d),
                    _ => {}
                }
            }
            if matches {
                raw = body;
                internal_date = date;
            }
        }

        let Some(raw) = raw else {
            // Expunged between search and fetch; nothing to hold.
            debug!(uid = uid.get(), "message vanished before fetch");
            return Ok(());
        };

        let mut message =
            InterceptedMessage::captured(self.account_id, uid.get(), raw.clone(), Utc::now());
        message.original_internal_date = internal_date.as_deref().and_then(parse_internal_date);

        if let Ok(parsed) = mailscreen_mime::Message::parse(&raw) {
            message.sender = parsed.from().unwrap_or_default().to_string();
            message.recipients = parsed
                .to()
                .map(split_addresses)
                .unwrap_or_default();
            message.subject = parsed.subject().unwrap_or_default().to_string();
            message.provider_message_id = parsed.message_id().map(ToString::to_string);
            message.body_text = parsed.body_text();
            message.body_html = parsed.body_html();
        }

        let id = self.messages.insert(&mut message).await?;

        self.hold(session, &set).await?;
        self.messages.mark_held(id).await?;

        info!(
            message_id = id.0,
            uid = uid.get(),
            sender = %message.sender,
            subject = %message.subject,
            "held message"
        );
        Ok(())
    }

    /// Moves the message into quarantine, native move first.
    async fn hold(
        &mut self,
        session: &mut WatchSession,
        set: &UidSet,
    ) -> Result<(), mailscreen_imap::Error> {
        let quarantine = self.account.quarantine_folder.clone();
        match session.strategy {
            HoldStrategy::Move => {
                match session.client_mut()?.uid_move(set, &quarantine).await {
                    Ok(()) => Ok(()),
                    Err(mailscreen_imap::Error::No(text) | mailscreen_imap::Error::Bad(text)) => {
                        debug!(%text, "native move refused; falling back to copy+purge");
                        self.copy_purge(session, set).await
                    }
                    Err(e) => Err(e),
                }
            }
            HoldStrategy::CopyPurge => self.copy_purge(session, set).await,
        }
    }

    /// Copy+purge fallback. The copy must complete before the delete is
    /// issued; the ordering is a correctness choice, not performance.
    async fn copy_purge(
        &mut self,
        session: &mut WatchSession,
        set: &UidSet,
    ) -> Result<(), mailscreen_imap::Error> {
        let quarantine = self.account.quarantine_folder.clone();
        let source = self.account.source_folder.clone();

        session.client_mut()?.uid_copy(set, &quarantine).await?;

        if self.account.mark_seen_in_quarantine
            && let Some(client) = session.client.take()
        {
            // Same-UID addressing in the target only holds on servers that
            // keep UIDs across COPY; a failed store is not worth a session.
            let (mut client, _) = client.select(&quarantine).await?;
            if let Err(e) = client
                .uid_store_silent(set, StoreAction::AddFlags(vec![Flag::Seen]))
                .await
            {
                debug!(error = %e, "could not mark quarantined copy seen");
            }
            let (client, _) = client.select(&source).await?;
            session.client = Some(client);
        }

        session
            .client_mut()?
            .uid_store_silent(set, StoreAction::AddFlags(vec![Flag::Deleted]))
            .await?;
        session.client_mut()?.expunge().await?;
        Ok(())
    }

    /// Records a failure; returns true when the circuit opened.
    async fn note_failure(&self, reason: &str) -> bool {
        match self.breaker.record_failure(reason).await {
            Ok(opened) => opened,
            Err(e) => {
                warn!(error = %e, "failed to record watcher failure");
                false
            }
        }
    }

    async fn should_stop(&self) -> bool {
        if self.cancel.is_cancelled() {
            return true;
        }
        self.heartbeats
            .stop_requested(&self.worker_id)
            .await
            .unwrap_or(false)
    }

    fn heartbeat_due(&self) -> bool {
        self.last_beat
            .is_none_or(|at| at.elapsed() >= self.config.heartbeat_interval)
    }

    /// Best-effort heartbeat upsert, rate-limited to the configured
    /// interval.
    async fn beat(&mut self, status: &str) {
        if self.heartbeat_due() {
            self.beat_now(status).await;
        }
    }

    /// Unconditional heartbeat upsert, for status transitions.
    async fn beat_now(&mut self, status: &str) {
        if let Err(e) = self.heartbeats.beat(&self.worker_id, status).await {
            warn!(error = %e, "heartbeat update failed");
        }
        self.last_beat = Some(Instant::now());
    }
}

/// Classifies an in-session error for the circuit breaker record.
fn failure_reason(error: &crate::Error) -> &'static str {
    match error {
        crate::Error::Imap(e) => match e {
            mailscreen_imap::Error::Io(_) => "io_error",
            mailscreen_imap::Error::Timeout(_) => "timeout",
            mailscreen_imap::Error::Bye(_) => "disconnected",
            mailscreen_imap::Error::No(_) | mailscreen_imap::Error::Bad(_) => "protocol_error",
            _ => "error",
        },
        crate::Error::Database(_) => "db_error",
        _ => "error",
    }
}

/// Splits a To header into an ordered, non-deduplicated recipient list.
fn split_addresses(header: &str) -> Vec<String> {
    header
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn split_addresses_preserves_order_and_duplicates() {
        let recipients = split_addresses("a@example.com, b@example.com , a@example.com");
        assert_eq!(
            recipients,
            vec![
                "a@example.com".to_string(),
                "b@example.com".to_string(),
                "a@example.com".to_string()
            ]
        );
    }

    #[test]
    fn split_addresses_empty() {
        assert!(split_addresses("").is_empty());
    }

    #[test]
    fn failure_reason_classification() {
        let timeout: crate::Error =
            mailscreen_imap::Error::Timeout(Duration::from_secs(5)).into();
        assert_eq!(failure_reason(&timeout), "timeout");

        let bye: crate::Error = mailscreen_imap::Error::Bye("later".to_string()).into();
        assert_eq!(failure_reason(&bye), "disconnected");

        let no: crate::Error = mailscreen_imap::Error::No("nope".to_string()).into();
        assert_eq!(failure_reason(&no), "protocol_error");
    }

    #[test]
    fn default_config() {
        let config = WatcherConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert!(!config.disable_idle);
    }
}
