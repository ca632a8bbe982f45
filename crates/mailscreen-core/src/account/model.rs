//! Account model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl AccountId {
    /// Create a new account ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Security/encryption mode for connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Security {
    /// No encryption (not recommended).
    None,
    /// Implicit TLS (connect directly with TLS).
    #[default]
    Tls,
    /// STARTTLS upgrade after plaintext connect.
    StartTls,
}

impl Security {
    /// Get default port for the security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None | Self::StartTls => 143,
            Self::Tls => 993,
        }
    }
}

/// IMAP server configuration for a monitored mailbox.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImapConfig {
    /// Server hostname.
    pub host: String,
    /// Server port (default: 993 for TLS, 143 otherwise).
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Username for authentication.
    pub username: String,
}

/// A monitored mailbox.
///
/// The secret is stored encrypted (see
/// [`CredentialVault`](crate::account::CredentialVault)); nothing in this
/// type ever holds the plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier (None for unsaved accounts).
    pub id: Option<AccountId>,
    /// Display name for the account.
    pub name: String,
    /// Email address of the monitored mailbox.
    pub email: String,
    /// IMAP connection settings.
    pub imap: ImapConfig,
    /// Vault-encrypted account secret.
    pub encrypted_secret: String,
    /// Folder watched for new mail.
    pub source_folder: String,
    /// Folder held messages are parked in.
    pub quarantine_folder: String,
    /// Per-cycle idle session budget, seconds. Kept below typical server
    /// idle expiry (~30 minutes).
    pub idle_timeout_secs: u32,
    /// Keep-alive interval, seconds: how often the watcher breaks IDLE to
    /// issue a NOOP so the session is not silently dropped.
    pub keepalive_interval_secs: u32,
    /// Mark the quarantined copy `\Seen` to reduce badge noise.
    pub mark_seen_in_quarantine: bool,
    /// Whether the watcher should run for this account. Cleared by the
    /// circuit breaker; set again by an explicit start.
    pub is_active: bool,
    /// Last recorded error, e.g. `circuit_open:auth_failed`.
    pub last_error: Option<String>,
    /// Last time the watcher completed a scan of the source folder.
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            email: String::new(),
            imap: ImapConfig::default(),
            encrypted_secret: String::new(),
            source_folder: "INBOX".to_string(),
            quarantine_folder: "Quarantine".to_string(),
            idle_timeout_secs: 25 * 60,
            keepalive_interval_secs: 14 * 60,
            mark_seen_in_quarantine: true,
            is_active: true,
            last_error: None,
            last_checked_at: None,
        }
    }
}

impl Account {
    /// Create a new account with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The idle session budget as a duration.
    #[must_use]
    pub fn idle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.idle_timeout_secs))
    }

    /// The keep-alive interval as a duration.
    #[must_use]
    pub fn keepalive_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.keepalive_interval_secs))
    }
}
