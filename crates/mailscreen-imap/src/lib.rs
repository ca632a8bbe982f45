//! # mailscreen-imap
//!
//! Async IMAP session layer used by the mailscreen interception core.
//!
//! The crate wraps one live connection to a remote mailbox behind a small,
//! capability-aware interface: connect, authenticate, select, UID search and
//! fetch, move/copy/purge, append, and a cancellable IDLE wait. It implements
//! the subset of RFC 3501/9051 that interception and release require; server
//! differences (MOVE vs copy+purge, IDLE vs polling) are surfaced as cached
//! capability checks so callers pick a strategy once per session.
//!
//! ## Connection states
//!
//! The type-state pattern enforces valid IMAP state transitions at compile
//! time:
//!
//! ```text
//! NotAuthenticated ── login() ──→ Authenticated ── select() ──→ Selected
//!                                      ▲                           │
//!                                      └───────── close() ─────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::time::Duration;
//! use mailscreen_imap::{FetchItems, UidSet, connect_tls};
//! use tokio_util::sync::CancellationToken;
//!
//! let stream = connect_tls("imap.example.com", 993).await?;
//! let client = mailscreen_imap::Client::from_stream(stream).await?;
//! let client = client.login("user@example.com", "password").await?;
//! let (mut client, status) = client.select("INBOX").await?;
//!
//! let new = client.uid_search("UID 120:*").await?;
//! if client.supports_idle() {
//!     let cancel = CancellationToken::new();
//!     let mut handle = client.idle().await?;
//!     let event = handle.wait(Duration::from_secs(840), &cancel).await?;
//!     handle.done().await?;
//! }
//! ```

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use command::{Command, FetchItems, StoreAction, TagGenerator};
pub use connection::{
    Authenticated, Client, FramedStream, IdleEvent, IdleHandle, ImapStream, NotAuthenticated,
    ResponseAccumulator, Selected, connect_plain, connect_tls,
};
pub use error::{Error, Result};
pub use parser::{FetchItem, Response, ResponseParser, UntaggedResponse};
pub use types::{
    Capability, Flag, Flags, Mailbox, MailboxStatus, ResponseCode, SeqNum, Status, Uid, UidSet,
    UidValidity,
};
