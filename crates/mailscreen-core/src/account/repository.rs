//! Account storage repository.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::debug;

use super::model::{Account, AccountId, ImapConfig, Security};
use crate::Result;

/// Repository for account storage and retrieval.
///
/// The account secret is stored vault-encrypted; this repository never sees
/// plaintext credentials.
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
    /// Create a new repository with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation
    /// fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation
    /// fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS email_accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                imap_host TEXT NOT NULL,
                imap_port INTEGER NOT NULL,
                imap_security TEXT NOT NULL,
                imap_username TEXT NOT NULL,
                imap_secret TEXT NOT NULL,
                source_folder TEXT NOT NULL DEFAULT 'INBOX',
                quarantine_folder TEXT NOT NULL DEFAULT 'Quarantine',
                idle_timeout_secs INTEGER NOT NULL DEFAULT 1500,
                keepalive_interval_secs INTEGER NOT NULL DEFAULT 840,
                mark_seen_in_quarantine INTEGER NOT NULL DEFAULT 1,
                is_active INTEGER NOT NULL DEFAULT 1,
                last_error TEXT,
                last_checked_at TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get all accounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} FROM email_accounts ORDER BY name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_account).collect())
    }

    /// Get all accounts whose active flag is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_active(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} FROM email_accounts WHERE is_active = 1 ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_account).collect())
    }

    /// Get account by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} FROM email_accounts WHERE id = ?"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_account))
    }

    /// Save an account (insert or update). Assigns the id on insert.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn save(&self, account: &mut Account) -> Result<()> {
        if let Some(id) = account.id {
            sqlx::query(
                r"
                UPDATE email_accounts SET
                    name = ?, email = ?,
                    imap_host = ?, imap_port = ?, imap_security = ?,
                    imap_username = ?, imap_secret = ?,
                    source_folder = ?, quarantine_folder = ?,
                    idle_timeout_secs = ?, keepalive_interval_secs = ?,
                    mark_seen_in_quarantine = ?,
                    is_active = ?, last_error = ?,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = ?
                ",
            )
            .bind(&account.name)
            .bind(&account.email)
            .bind(&account.imap.host)
            .bind(i64::from(account.imap.port))
            .bind(security_to_string(account.imap.security))
            .bind(&account.imap.username)
            .bind(&account.encrypted_secret)
            .bind(&account.source_folder)
            .bind(&account.quarantine_folder)
            .bind(i64::from(account.idle_timeout_secs))
            .bind(i64::from(account.keepalive_interval_secs))
            .bind(account.mark_seen_in_quarantine)
            .bind(account.is_active)
            .bind(&account.last_error)
            .bind(id.0)
            .execute(&self.pool)
            .await?;

            debug!(account_id = id.0, "updated account");
        } else {
            let result = sqlx::query(
                r"
                INSERT INTO email_accounts
                    (name, email, imap_host, imap_port, imap_security,
                     imap_username, imap_secret, source_folder, quarantine_folder,
                     idle_timeout_secs, keepalive_interval_secs,
                     mark_seen_in_quarantine, is_active, last_error)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(&account.name)
            .bind(&account.email)
            .bind(&account.imap.host)
            .bind(i64::from(account.imap.port))
            .bind(security_to_string(account.imap.security))
            .bind(&account.imap.username)
            .bind(&account.encrypted_secret)
            .bind(&account.source_folder)
            .bind(&account.quarantine_folder)
            .bind(i64::from(account.idle_timeout_secs))
            .bind(i64::from(account.keepalive_interval_secs))
            .bind(account.mark_seen_in_quarantine)
            .bind(account.is_active)
            .bind(&account.last_error)
            .execute(&self.pool)
            .await?;

            account.id = Some(AccountId(result.last_insert_rowid()));
            debug!(account_id = result.last_insert_rowid(), "inserted account");
        }

        Ok(())
    }

    /// Set or clear the active flag, recording the reason when clearing.
    ///
    /// Used by the circuit breaker (`active = false` with a
    /// `circuit_open:...` reason) and by explicit start calls
    /// (`active = true`, reason cleared).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn set_active(
        &self,
        id: AccountId,
        active: bool,
        last_error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE email_accounts
            SET is_active = ?, last_error = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            ",
        )
        .bind(active)
        .bind(last_error)
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a successful scan time for the account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn touch_checked(&self, id: AccountId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r"
            UPDATE email_accounts SET last_checked_at = ? WHERE id = ?
            ",
        )
        .bind(at.to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete(&self, id: AccountId) -> Result<()> {
        sqlx::query("DELETE FROM email_accounts WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

const SELECT_COLUMNS: &str = "SELECT id, name, email, imap_host, imap_port, imap_security, \
     imap_username, imap_secret, source_folder, quarantine_folder, \
     idle_timeout_secs, keepalive_interval_secs, mark_seen_in_quarantine, \
     is_active, last_error, last_checked_at";

/// Convert a database row to an Account.
fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Account {
    let last_checked_at: Option<String> = row.get("last_checked_at");

    Account {
        id: Some(AccountId(row.get::<i64, _>("id"))),
        name: row.get("name"),
        email: row.get("email"),
        imap: ImapConfig {
            host: row.get("imap_host"),
            port: u16::try_from(row.get::<i64, _>("imap_port")).unwrap_or_default(),
            security: security_from_string(&row.get::<String, _>("imap_security")),
            username: row.get("imap_username"),
        },
        encrypted_secret: row.get("imap_secret"),
        source_folder: row.get("source_folder"),
        quarantine_folder: row.get("quarantine_folder"),
        idle_timeout_secs: u32::try_from(row.get::<i64, _>("idle_timeout_secs"))
            .unwrap_or_default(),
        keepalive_interval_secs: u32::try_from(row.get::<i64, _>("keepalive_interval_secs"))
            .unwrap_or_default(),
        mark_seen_in_quarantine: row.get::<bool, _>("mark_seen_in_quarantine"),
        is_active: row.get::<bool, _>("is_active"),
        last_error: row.get("last_error"),
        last_checked_at: last_checked_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

const fn security_to_string(security: Security) -> &'static str {
    match security {
        Security::None => "none",
        Security::Tls => "tls",
        Security::StartTls => "starttls",
    }
}

fn security_from_string(s: &str) -> Security {
    match s {
        "none" => Security::None,
        "starttls" => Security::StartTls,
        _ => Security::Tls,
    }
}
