//! Account configuration validation.

use thiserror::Error;

use super::model::Account;

/// Validation errors for account configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Email address is missing or malformed.
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    /// Server hostname is empty.
    #[error("IMAP host is required")]
    MissingHost,

    /// Port is zero.
    #[error("IMAP port is required")]
    MissingPort,

    /// Username is empty.
    #[error("IMAP username is required")]
    MissingUsername,

    /// Source and quarantine folders must differ.
    #[error("Source and quarantine folder are both {0:?}")]
    SameFolders(String),

    /// The keep-alive interval must fit inside the idle budget.
    #[error("Keep-alive interval {keepalive}s exceeds idle budget {idle}s")]
    KeepaliveExceedsIdleBudget {
        /// Configured keep-alive seconds.
        keepalive: u32,
        /// Configured idle budget seconds.
        idle: u32,
    },
}

/// Result type for validation.
pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// Validates an account before it is saved or watched.
///
/// # Errors
///
/// Returns the first violated constraint.
pub fn validate_account(account: &Account) -> ValidationResult<()> {
    if account.email.is_empty() || !account.email.contains('@') {
        return Err(ValidationError::InvalidEmail(account.email.clone()));
    }
    if account.imap.host.is_empty() {
        return Err(ValidationError::MissingHost);
    }
    if account.imap.port == 0 {
        return Err(ValidationError::MissingPort);
    }
    if account.imap.username.is_empty() {
        return Err(ValidationError::MissingUsername);
    }
    if account.source_folder == account.quarantine_folder {
        return Err(ValidationError::SameFolders(account.source_folder.clone()));
    }
    if account.keepalive_interval_secs > account.idle_timeout_secs {
        return Err(ValidationError::KeepaliveExceedsIdleBudget {
            keepalive: account.keepalive_interval_secs,
            idle: account.idle_timeout_secs,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Security;

    fn valid_account() -> Account {
        Account {
            email: "user@example.com".to_string(),
            imap: crate::account::ImapConfig {
                host: "imap.example.com".to_string(),
                port: 993,
                security: Security::Tls,
                username: "user@example.com".to_string(),
            },
            ..Account::default()
        }
    }

    #[test]
    fn valid_account_passes() {
        assert!(validate_account(&valid_account()).is_ok());
    }

    #[test]
    fn missing_email_rejected() {
        let mut account = valid_account();
        account.email = "nodomain".to_string();
        assert!(matches!(
            validate_account(&account),
            Err(ValidationError::InvalidEmail(_))
        ));
    }

    #[test]
    fn missing_host_rejected() {
        let mut account = valid_account();
        account.imap.host.clear();
        assert_eq!(validate_account(&account), Err(ValidationError::MissingHost));
    }

    #[test]
    fn same_folders_rejected() {
        let mut account = valid_account();
        account.quarantine_folder = "INBOX".to_string();
        assert!(matches!(
            validate_account(&account),
            Err(ValidationError::SameFolders(_))
        ));
    }

    #[test]
    fn keepalive_beyond_idle_budget_rejected() {
        let mut account = valid_account();
        account.keepalive_interval_secs = account.idle_timeout_secs + 1;
        assert!(matches!(
            validate_account(&account),
            Err(ValidationError::KeepaliveExceedsIdleBudget { .. })
        ));
    }
}
