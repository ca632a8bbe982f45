//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IMAP operation failed.
    #[error("IMAP error: {0}")]
    Imap(#[from] mailscreen_imap::Error),

    /// MIME parsing or rewriting failed.
    #[error("MIME error: {0}")]
    Mime(#[from] mailscreen_mime::Error),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential vault error.
    #[error("Vault error: {0}")]
    Vault(#[from] crate::account::vault::VaultError),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
