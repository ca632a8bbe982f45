//! # mailscreen-core
//!
//! The interception core: everything between the wire and the reviewer.
//!
//! This crate provides:
//! - Account configuration storage with an encrypted credential vault
//! - The durable message store recording every intercepted message and its
//!   lifecycle (`FETCHED → HELD → {RELEASED | DISCARDED}`)
//! - Worker heartbeats with failure counting
//! - The per-account watcher: a long-running task that keeps one IMAP
//!   session alive, detects new mail, and moves it into quarantine at most
//!   once, surviving crashes via a persisted UID watermark
//! - The release engine: applies reviewer edits to a held message and
//!   re-delivers it exactly once
//! - The watcher supervisor: the process-wide registry of running watchers

pub mod account;
mod error;
pub mod heartbeat;
pub mod release;
pub mod service;
pub mod store;
pub mod supervisor;
pub mod watcher;

pub use account::{
    Account, AccountId, AccountRepository, CredentialVault, ImapConfig, Security, ValidationError,
    validate_account,
};
pub use error::{Error, Result};
pub use heartbeat::{HeartbeatRepository, WorkerHeartbeat, worker_id};
pub use release::{
    EditOutcome, ReleaseError, ReleaseOutcome, ReleaseRequest, discard_message, edit_held_message,
    held_stats, list_held, release_message,
};
pub use service::{AuthClient, SelectedClient, SessionError, connect_and_login, ensure_folder};
pub use store::{
    Direction, HeldStats, HeldSummary, InterceptState, InterceptedMessage, MessageId,
    MessageRepository,
};
pub use supervisor::{StartOutcome, StopOutcome, WatcherSupervisor};
pub use watcher::{AccountWatcher, CircuitBreaker, ExponentialBackoff, FAILURE_THRESHOLD, WatcherConfig};
