//! Message store repository.
//!
//! All writes to a given row go through single-row conditional updates; the
//! state guard in the `WHERE` clause is the concurrency control. There is no
//! cross-table locking anywhere in the core.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::debug;

use super::model::{
    Direction, HeldStats, HeldSummary, InterceptState, InterceptedMessage, MessageId,
};
use crate::Result;
use crate::account::AccountId;

/// Repository for intercepted message storage.
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
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
            CREATE TABLE IF NOT EXISTS email_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                direction TEXT NOT NULL DEFAULT 'inbound',
                interception_state TEXT NOT NULL DEFAULT 'FETCHED',
                provider_message_id TEXT,
                sender TEXT NOT NULL DEFAULT '',
                recipients TEXT NOT NULL DEFAULT '[]',
                subject TEXT NOT NULL DEFAULT '',
                body_text TEXT,
                body_html TEXT,
                raw_content BLOB,
                raw_path TEXT,
                original_uid INTEGER,
                original_internal_date TEXT,
                created_at TEXT NOT NULL,
                action_taken_at TEXT,
                latency_ms INTEGER,
                released_message_id TEXT,
                review_notes TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Watermark bookkeeping per (account, folder) generation.
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS folder_generations (
                account_id INTEGER NOT NULL,
                folder TEXT NOT NULL,
                uid_validity INTEGER NOT NULL,
                last_seen_uid INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (account_id, folder)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_messages_account_uid
            ON email_messages(account_id, original_uid)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_messages_state
            ON email_messages(interception_state)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a captured message, assigning its row id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn insert(&self, message: &mut InterceptedMessage) -> Result<MessageId> {
        let recipients = serde_json::to_string(&message.recipients)?;

        let result = sqlx::query(
            r"
            INSERT INTO email_messages
                (account_id, direction, interception_state, provider_message_id,
                 sender, recipients, subject, body_text, body_html,
                 raw_content, raw_path, original_uid, original_internal_date,
                 created_at, review_notes)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(message.account_id.0)
        .bind(message.direction.as_str())
        .bind(message.state.as_str())
        .bind(&message.provider_message_id)
        .bind(&message.sender)
        .bind(recipients)
        .bind(&message.subject)
        .bind(&message.body_text)
        .bind(&message.body_html)
        .bind(&message.raw)
        .bind(&message.raw_path)
        .bind(message.original_uid.map(i64::from))
        .bind(message.original_internal_date.map(|d| d.to_rfc3339()))
        .bind(message.captured_at.to_rfc3339())
        .bind(&message.review_notes)
        .execute(&self.pool)
        .await?;

        let id = MessageId(result.last_insert_rowid());
        message.id = Some(id);
        debug!(message_id = id.0, account_id = message.account_id.0, "inserted capture");
        Ok(id)
    }

    /// Load a message by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: MessageId) -> Result<Option<InterceptedMessage>> {
        let row = sqlx::query("SELECT * FROM email_messages WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_message))
    }

    /// Current state of a row, if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_state(&self, id: MessageId) -> Result<Option<InterceptState>> {
        let row = sqlx::query("SELECT interception_state FROM email_messages WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .and_then(|r| InterceptState::parse(&r.get::<String, _>("interception_state"))))
    }

    /// Returns true if a capture row already exists for this account/UID.
    ///
    /// Together with the watermark this is what makes the hold at-most-once:
    /// re-running detection against the same remote state never produces a
    /// second row for a UID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn exists_capture(&self, account_id: AccountId, uid: u32) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM email_messages WHERE account_id = ? AND original_uid = ? LIMIT 1",
        )
        .bind(account_id.0)
        .bind(i64::from(uid))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Highest remote UID recorded for the account, across all rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn max_recorded_uid(&self, account_id: AccountId) -> Result<Option<u32>> {
        let row = sqlx::query(
            "SELECT MAX(original_uid) AS max_uid FROM email_messages WHERE account_id = ?",
        )
        .bind(account_id.0)
        .fetch_one(&self.pool)
        .await?;

        let max: Option<i64> = row.get("max_uid");
        Ok(max.and_then(|v| u32::try_from(v).ok()))
    }

    /// Marks a captured row as held once the hold operation succeeded.
    ///
    /// Guarded `FETCHED → HELD`; returns false if the row was not in
    /// `FETCHED` (already held, or handled by another path).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn mark_held(&self, id: MessageId) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE email_messages
            SET interception_state = 'HELD'
            WHERE id = ? AND interception_state = 'FETCHED'
            ",
        )
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Performs the guarded `HELD → RELEASED` transition.
    ///
    /// Records the outgoing message id, the action time, and the derived
    /// latency. Returns false when the row was not `HELD` — the idempotency
    /// guard for retried release calls.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn release(
        &self,
        id: MessageId,
        released_message_id: &str,
        action_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE email_messages
            SET interception_state = 'RELEASED',
                released_message_id = ?,
                action_taken_at = ?,
                latency_ms = CAST((julianday(?) - julianday(created_at)) * 86400000 AS INTEGER)
            WHERE id = ? AND interception_state = 'HELD'
            ",
        )
        .bind(released_message_id)
        .bind(action_at.to_rfc3339())
        .bind(action_at.to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Performs the guarded `HELD → DISCARDED` transition.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn discard(&self, id: MessageId, action_at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE email_messages
            SET interception_state = 'DISCARDED',
                action_taken_at = ?,
                latency_ms = CAST((julianday(?) - julianday(created_at)) * 86400000 AS INTEGER)
            WHERE id = ? AND interception_state = 'HELD'
            ",
        )
        .bind(action_at.to_rfc3339())
        .bind(action_at.to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Updates the editable fields of a `HELD` row.
    ///
    /// Only edit-trail and body fields are touched, never the state.
    /// Returns false when the row is not `HELD`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn update_held_fields(
        &self,
        id: MessageId,
        subject: Option<&str>,
        body_text: Option<&str>,
        body_html: Option<&str>,
        review_notes: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE email_messages
            SET subject = COALESCE(?, subject),
                body_text = COALESCE(?, body_text),
                body_html = COALESCE(?, body_html),
                review_notes = COALESCE(?, review_notes)
            WHERE id = ? AND interception_state = 'HELD'
            ",
        )
        .bind(subject)
        .bind(body_text)
        .bind(body_html)
        .bind(review_notes)
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Lists currently held messages, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_held(&self, account_id: Option<AccountId>) -> Result<Vec<HeldSummary>> {
        let rows = if let Some(account_id) = account_id {
            sqlx::query(
                r"
                SELECT id, account_id, sender, recipients, subject, latency_ms, created_at
                FROM email_messages
                WHERE interception_state = 'HELD' AND account_id = ?
                ORDER BY id DESC LIMIT 200
                ",
            )
            .bind(account_id.0)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                r"
                SELECT id, account_id, sender, recipients, subject, latency_ms, created_at
                FROM email_messages
                WHERE interception_state = 'HELD'
                ORDER BY id DESC LIMIT 200
                ",
            )
            .fetch_all(&self.pool)
            .await?
        };

        Ok(rows
            .iter()
            .map(|row| HeldSummary {
                id: MessageId(row.get("id")),
                account_id: AccountId(row.get("account_id")),
                sender: row.get("sender"),
                recipients: parse_recipients(&row.get::<String, _>("recipients")),
                subject: row.get("subject"),
                latency_ms: row.get("latency_ms"),
                captured_at: parse_timestamp(&row.get::<String, _>("created_at")),
            })
            .collect())
    }

    /// Aggregate statistics over the store.
    ///
    /// # Errors
    ///
    /// Returns an error if a database query fails.
    pub async fn held_stats(&self) -> Result<HeldStats> {
        let held: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM email_messages WHERE interception_state = 'HELD'",
        )
        .fetch_one(&self.pool)
        .await?
        .get("n");

        let released_24h: i64 = sqlx::query(
            r"
            SELECT COUNT(*) AS n FROM email_messages
            WHERE interception_state = 'RELEASED'
              AND action_taken_at >= datetime('now', '-1 day')
            ",
        )
        .fetch_one(&self.pool)
        .await?
        .get("n");

        let rows = sqlx::query(
            r"
            SELECT latency_ms FROM email_messages
            WHERE latency_ms IS NOT NULL
            ORDER BY id DESC LIMIT 200
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut latencies: Vec<i64> = rows.iter().map(|r| r.get("latency_ms")).collect();
        latencies.sort_unstable();
        let median_latency_ms = if latencies.is_empty() {
            None
        } else {
            Some(latencies[latencies.len() / 2])
        };

        Ok(HeldStats {
            held,
            released_24h,
            median_latency_ms,
        })
    }

    /// Reconciles the persisted watermark with the folder generation.
    ///
    /// Returns the UID watermark to scan from. A UIDVALIDITY change means
    /// every cached UID is stale, so the watermark resets to zero. A brand
    /// new (account, folder) pair resumes from the highest recorded UID, or
    /// from `baseline` (typically `UIDNEXT - 1`) when the store has no rows
    /// yet, so preexisting mailbox content is not bulk-intercepted on first
    /// start.
    ///
    /// # Errors
    ///
    /// Returns an error if a database query fails.
    pub async fn sync_generation(
        &self,
        account_id: AccountId,
        folder: &str,
        uid_validity: u32,
        baseline: u32,
    ) -> Result<u32> {
        let row = sqlx::query(
            "SELECT uid_validity, last_seen_uid FROM folder_generations \
             WHERE account_id = ? AND folder = ?",
        )
        .bind(account_id.0)
        .bind(folder)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => {
                let watermark = match self.max_recorded_uid(account_id).await? {
                    Some(max) => max,
                    None => baseline,
                };
                sqlx::query(
                    "INSERT INTO folder_generations (account_id, folder, uid_validity, last_seen_uid) \
                     VALUES (?, ?, ?, ?)",
                )
                .bind(account_id.0)
                .bind(folder)
                .bind(i64::from(uid_validity))
                .bind(i64::from(watermark))
                .execute(&self.pool)
                .await?;
                Ok(watermark)
            }
            Some(row) => {
                let stored_validity = u32::try_from(row.get::<i64, _>("uid_validity")).unwrap_or(0);
                if stored_validity == uid_validity {
                    Ok(u32::try_from(row.get::<i64, _>("last_seen_uid")).unwrap_or(0))
                } else {
                    debug!(
                        account_id = account_id.0,
                        folder,
                        old_validity = stored_validity,
                        new_validity = uid_validity,
                        "folder generation changed; resetting watermark"
                    );
                    sqlx::query(
                        "UPDATE folder_generations SET uid_validity = ?, last_seen_uid = 0 \
                         WHERE account_id = ? AND folder = ?",
                    )
                    .bind(i64::from(uid_validity))
                    .bind(account_id.0)
                    .bind(folder)
                    .execute(&self.pool)
                    .await?;
                    Ok(0)
                }
            }
        }
    }

    /// Advances the watermark to `uid` if it is higher than the stored one.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn advance_watermark(
        &self,
        account_id: AccountId,
        folder: &str,
        uid: u32,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE folder_generations SET last_seen_uid = MAX(last_seen_uid, ?) \
             WHERE account_id = ? AND folder = ?",
        )
        .bind(i64::from(uid))
        .bind(account_id.0)
        .bind(folder)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn parse_recipients(json: &str) -> Vec<String> {
    serde_json::from_str(json).unwrap_or_default()
}

fn parse_timestamp(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

/// Convert a database row to a message.
fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> InterceptedMessage {
    let internal_date: Option<String> = row.get("original_internal_date");
    let action_taken_at: Option<String> = row.get("action_taken_at");

    InterceptedMessage {
        id: Some(MessageId(row.get("id"))),
        account_id: AccountId(row.get("account_id")),
        direction: Direction::parse(&row.get::<String, _>("direction")),
        state: InterceptState::parse(&row.get::<String, _>("interception_state"))
            .unwrap_or(InterceptState::Fetched),
        provider_message_id: row.get("provider_message_id"),
        sender: row.get("sender"),
        recipients: parse_recipients(&row.get::<String, _>("recipients")),
        subject: row.get("subject"),
        body_text: row.get("body_text"),
        body_html: row.get("body_html"),
        raw: row.get("raw_content"),
        raw_path: row.get("raw_path"),
        original_uid: row
            .get::<Option<i64>, _>("original_uid")
            .and_then(|v| u32::try_from(v).ok()),
        original_internal_date: internal_date
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        captured_at: parse_timestamp(&row.get::<String, _>("created_at")),
        action_taken_at: action_taken_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        latency_ms: row.get("latency_ms"),
        released_message_id: row.get("released_message_id"),
        review_notes: row.get("review_notes"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn repo() -> MessageRepository {
        MessageRepository::in_memory().await.unwrap()
    }

    fn capture(uid: u32) -> InterceptedMessage {
        let mut msg =
            InterceptedMessage::captured(AccountId(1), uid, b"raw bytes".to_vec(), Utc::now());
        msg.sender = "sender@example.com".to_string();
        msg.recipients = vec!["a@example.com".to_string(), "b@example.com".to_string()];
        msg.subject = "INVOICE 42".to_string();
        msg
    }

    #[tokio::test]
    async fn insert_and_load_round_trip() {
        let repo = repo().await;
        let mut msg = capture(120);
        let id = repo.insert(&mut msg).await.unwrap();

        let loaded = repo.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.state, InterceptState::Fetched);
        assert_eq!(loaded.original_uid, Some(120));
        assert_eq!(loaded.sender, "sender@example.com");
        assert_eq!(
            loaded.recipients,
            vec!["a@example.com".to_string(), "b@example.com".to_string()]
        );
        assert_eq!(loaded.raw.as_deref(), Some(b"raw bytes".as_slice()));
    }

    #[tokio::test]
    async fn exists_capture_prevents_second_row() {
        let repo = repo().await;
        let mut msg = capture(120);
        repo.insert(&mut msg).await.unwrap();

        assert!(repo.exists_capture(AccountId(1), 120).await.unwrap());
        assert!(!repo.exists_capture(AccountId(1), 121).await.unwrap());
        assert!(!repo.exists_capture(AccountId(2), 120).await.unwrap());
    }

    #[tokio::test]
    async fn max_recorded_uid_tracks_highest() {
        let repo = repo().await;
        assert_eq!(repo.max_recorded_uid(AccountId(1)).await.unwrap(), None);

        for uid in [5, 9, 7] {
            let mut msg = capture(uid);
            repo.insert(&mut msg).await.unwrap();
        }
        assert_eq!(repo.max_recorded_uid(AccountId(1)).await.unwrap(), Some(9));
    }

    #[tokio::test]
    async fn mark_held_is_guarded() {
        let repo = repo().await;
        let mut msg = capture(120);
        let id = repo.insert(&mut msg).await.unwrap();

        assert!(repo.mark_held(id).await.unwrap());
        assert_eq!(
            repo.get_state(id).await.unwrap(),
            Some(InterceptState::Held)
        );
        // second attempt is a no-op
        assert!(!repo.mark_held(id).await.unwrap());
    }

    #[tokio::test]
    async fn release_transition_is_exactly_once() {
        let repo = repo().await;
        let mut msg = capture(120);
        let id = repo.insert(&mut msg).await.unwrap();
        repo.mark_held(id).await.unwrap();

        let first = repo
            .release(id, "<new@mailscreen>", Utc::now())
            .await
            .unwrap();
        let second = repo
            .release(id, "<other@mailscreen>", Utc::now())
            .await
            .unwrap();

        assert!(first);
        assert!(!second, "second release must be rejected by the guard");

        let loaded = repo.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.state, InterceptState::Released);
        assert_eq!(loaded.released_message_id.as_deref(), Some("<new@mailscreen>"));
        assert!(loaded.action_taken_at.is_some());
    }

    #[tokio::test]
    async fn discard_requires_held() {
        let repo = repo().await;
        let mut msg = capture(120);
        let id = repo.insert(&mut msg).await.unwrap();

        // still FETCHED: discard is rejected
        assert!(!repo.discard(id, Utc::now()).await.unwrap());

        repo.mark_held(id).await.unwrap();
        assert!(repo.discard(id, Utc::now()).await.unwrap());
        // terminal states never transition again
        assert!(!repo.discard(id, Utc::now()).await.unwrap());
        assert!(!repo.release(id, "<x>", Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn latency_derivation() {
        let repo = repo().await;
        let captured_at = Utc::now() - Duration::milliseconds(5000);
        let mut msg =
            InterceptedMessage::captured(AccountId(1), 120, b"raw".to_vec(), captured_at);
        let id = repo.insert(&mut msg).await.unwrap();
        repo.mark_held(id).await.unwrap();

        repo.release(id, "<new@mailscreen>", Utc::now())
            .await
            .unwrap();

        let loaded = repo.get(id).await.unwrap().unwrap();
        let latency = loaded.latency_ms.unwrap();
        assert!(
            (latency - 5000).abs() < 250,
            "expected ~5000ms, got {latency}"
        );
    }

    #[tokio::test]
    async fn edit_is_guarded_by_state() {
        let repo = repo().await;
        let mut msg = capture(120);
        let id = repo.insert(&mut msg).await.unwrap();

        // FETCHED row: not editable
        assert!(
            !repo
                .update_held_fields(id, Some("edited"), None, None, None)
                .await
                .unwrap()
        );

        repo.mark_held(id).await.unwrap();
        assert!(
            repo.update_held_fields(id, Some("[EDITED] INVOICE 42"), Some("new body"), None, None)
                .await
                .unwrap()
        );

        let loaded = repo.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.subject, "[EDITED] INVOICE 42");
        assert_eq!(loaded.body_text.as_deref(), Some("new body"));
        // untouched fields preserved
        assert_eq!(loaded.sender, "sender@example.com");
    }

    #[tokio::test]
    async fn list_held_filters_by_state_and_account() {
        let repo = repo().await;

        let mut held = capture(120);
        let held_id = repo.insert(&mut held).await.unwrap();
        repo.mark_held(held_id).await.unwrap();

        let mut fetched_only = capture(121);
        repo.insert(&mut fetched_only).await.unwrap();

        let mut other_account =
            InterceptedMessage::captured(AccountId(2), 50, b"raw".to_vec(), Utc::now());
        let other_id = repo.insert(&mut other_account).await.unwrap();
        repo.mark_held(other_id).await.unwrap();

        let all = repo.list_held(None).await.unwrap();
        assert_eq!(all.len(), 2);

        let scoped = repo.list_held(Some(AccountId(1))).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].id, held_id);
        assert_eq!(scoped[0].subject, "INVOICE 42");
    }

    #[tokio::test]
    async fn held_stats_counts() {
        let repo = repo().await;

        let mut held = capture(120);
        let held_id = repo.insert(&mut held).await.unwrap();
        repo.mark_held(held_id).await.unwrap();

        let mut released = capture(121);
        let released_id = repo.insert(&mut released).await.unwrap();
        repo.mark_held(released_id).await.unwrap();
        repo.release(released_id, "<m@x>", Utc::now()).await.unwrap();

        let stats = repo.held_stats().await.unwrap();
        assert_eq!(stats.held, 1);
        assert_eq!(stats.released_24h, 1);
        assert!(stats.median_latency_ms.is_some());
    }

    #[tokio::test]
    async fn sync_generation_first_run_uses_baseline() {
        let repo = repo().await;
        let watermark = repo
            .sync_generation(AccountId(1), "INBOX", 1111, 130)
            .await
            .unwrap();
        assert_eq!(watermark, 130, "empty store resumes from baseline");
    }

    #[tokio::test]
    async fn sync_generation_resumes_from_recorded_uids() {
        let repo = repo().await;
        let mut msg = capture(120);
        repo.insert(&mut msg).await.unwrap();

        let watermark = repo
            .sync_generation(AccountId(1), "INBOX", 1111, 500)
            .await
            .unwrap();
        assert_eq!(watermark, 120, "store contents beat the baseline");
    }

    #[tokio::test]
    async fn sync_generation_resets_on_validity_change() {
        let repo = repo().await;
        repo.sync_generation(AccountId(1), "INBOX", 1111, 10)
            .await
            .unwrap();
        repo.advance_watermark(AccountId(1), "INBOX", 42)
            .await
            .unwrap();

        // same generation: watermark persists
        let same = repo
            .sync_generation(AccountId(1), "INBOX", 1111, 10)
            .await
            .unwrap();
        assert_eq!(same, 42);

        // new generation: stale UIDs are not trusted
        let reset = repo
            .sync_generation(AccountId(1), "INBOX", 2222, 10)
            .await
            .unwrap();
        assert_eq!(reset, 0);
    }

    #[tokio::test]
    async fn advance_watermark_never_regresses() {
        let repo = repo().await;
        repo.sync_generation(AccountId(1), "INBOX", 1111, 0)
            .await
            .unwrap();

        repo.advance_watermark(AccountId(1), "INBOX", 50).await.unwrap();
        repo.advance_watermark(AccountId(1), "INBOX", 40).await.unwrap();

        let watermark = repo
            .sync_generation(AccountId(1), "INBOX", 1111, 0)
            .await
            .unwrap();
        assert_eq!(watermark, 50);
    }
}
