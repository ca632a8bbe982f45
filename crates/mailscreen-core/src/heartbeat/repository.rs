//! Heartbeat storage repository.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::model::WorkerHeartbeat;
use crate::Result;

/// Repository for worker heartbeat storage.
pub struct HeartbeatRepository {
    pool: SqlitePool,
}

impl HeartbeatRepository {
    /// Create a new repository with the given database path.
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
            CREATE TABLE IF NOT EXISTS worker_heartbeats (
                worker_id TEXT PRIMARY KEY,
                last_heartbeat TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT '',
                error_count INTEGER NOT NULL DEFAULT 0,
                stop_requested INTEGER NOT NULL DEFAULT 0
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Upserts a heartbeat, preserving the failure count and stop flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn beat(&self, worker_id: &str, status: &str) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO worker_heartbeats (worker_id, last_heartbeat, status)
            VALUES (?, ?, ?)
            ON CONFLICT(worker_id) DO UPDATE SET
                last_heartbeat = excluded.last_heartbeat,
                status = excluded.status
            ",
        )
        .bind(worker_id)
        .bind(Utc::now().to_rfc3339())
        .bind(status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a failure: bumps the counter, stamps the reason as status,
    /// and returns the new consecutive-failure count.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn record_failure(&self, worker_id: &str, reason: &str) -> Result<i64> {
        sqlx::query(
            r"
            INSERT INTO worker_heartbeats (worker_id, last_heartbeat, status, error_count)
            VALUES (?, ?, ?, 1)
            ON CONFLICT(worker_id) DO UPDATE SET
                last_heartbeat = excluded.last_heartbeat,
                status = excluded.status,
                error_count = worker_heartbeats.error_count + 1
            ",
        )
        .bind(worker_id)
        .bind(Utc::now().to_rfc3339())
        .bind(reason)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT error_count FROM worker_heartbeats WHERE worker_id = ?")
            .bind(worker_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("error_count"))
    }

    /// Resets the consecutive-failure count after a successful cycle.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn reset_failures(&self, worker_id: &str) -> Result<()> {
        sqlx::query("UPDATE worker_heartbeats SET error_count = 0 WHERE worker_id = ?")
            .bind(worker_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Sets or clears the cooperative stop flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn request_stop(&self, worker_id: &str, stop: bool) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO worker_heartbeats (worker_id, last_heartbeat, status, stop_requested)
            VALUES (?, ?, '', ?)
            ON CONFLICT(worker_id) DO UPDATE SET
                stop_requested = excluded.stop_requested
            ",
        )
        .bind(worker_id)
        .bind(Utc::now().to_rfc3339())
        .bind(stop)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns true if a stop has been requested for the worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn stop_requested(&self, worker_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT stop_requested FROM worker_heartbeats WHERE worker_id = ?")
            .bind(worker_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some_and(|r| r.get::<bool, _>("stop_requested")))
    }

    /// Loads a heartbeat row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, worker_id: &str) -> Result<Option<WorkerHeartbeat>> {
        let row = sqlx::query(
            "SELECT worker_id, last_heartbeat, status, error_count, stop_requested \
             FROM worker_heartbeats WHERE worker_id = ?",
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_heartbeat))
    }

    /// Lists heartbeats seen within the given number of seconds.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list_recent(&self, within_secs: i64) -> Result<Vec<WorkerHeartbeat>> {
        let rows = sqlx::query(
            r"
            SELECT worker_id, last_heartbeat, status, error_count, stop_requested
            FROM worker_heartbeats
            WHERE datetime(last_heartbeat) > datetime('now', ?)
            ORDER BY last_heartbeat DESC
            ",
        )
        .bind(format!("-{within_secs} seconds"))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_heartbeat).collect())
    }

    /// Deletes a heartbeat row (on account removal).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn delete(&self, worker_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM worker_heartbeats WHERE worker_id = ?")
            .bind(worker_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn row_to_heartbeat(row: &sqlx::sqlite::SqliteRow) -> WorkerHeartbeat {
    WorkerHeartbeat {
        worker_id: row.get("worker_id"),
        last_heartbeat: DateTime::parse_from_rfc3339(&row.get::<String, _>("last_heartbeat"))
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_default(),
        status: row.get("status"),
        error_count: row.get("error_count"),
        stop_requested: row.get("stop_requested"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn beat_preserves_error_count() {
        let repo = HeartbeatRepository::in_memory().await.unwrap();

        repo.record_failure("imap_1", "connect_failed").await.unwrap();
        repo.record_failure("imap_1", "connect_failed").await.unwrap();
        repo.beat("imap_1", "active").await.unwrap();

        let hb = repo.get("imap_1").await.unwrap().unwrap();
        assert_eq!(hb.status, "active");
        assert_eq!(hb.error_count, 2);
    }

    #[tokio::test]
    async fn record_failure_increments_and_returns_count() {
        let repo = HeartbeatRepository::in_memory().await.unwrap();

        assert_eq!(repo.record_failure("imap_1", "error").await.unwrap(), 1);
        assert_eq!(repo.record_failure("imap_1", "error").await.unwrap(), 2);
        assert_eq!(repo.record_failure("imap_1", "error").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn reset_failures_zeroes_count() {
        let repo = HeartbeatRepository::in_memory().await.unwrap();
        repo.record_failure("imap_1", "error").await.unwrap();
        repo.reset_failures("imap_1").await.unwrap();

        let hb = repo.get("imap_1").await.unwrap().unwrap();
        assert_eq!(hb.error_count, 0);
    }

    #[tokio::test]
    async fn stop_flag_round_trip() {
        let repo = HeartbeatRepository::in_memory().await.unwrap();

        assert!(!repo.stop_requested("imap_1").await.unwrap());
        repo.request_stop("imap_1", true).await.unwrap();
        assert!(repo.stop_requested("imap_1").await.unwrap());
        repo.request_stop("imap_1", false).await.unwrap();
        assert!(!repo.stop_requested("imap_1").await.unwrap());
    }

    #[tokio::test]
    async fn list_recent_includes_fresh_beats() {
        let repo = HeartbeatRepository::in_memory().await.unwrap();
        repo.beat("imap_1", "active").await.unwrap();

        let recent = repo.list_recent(120).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].worker_id, "imap_1");
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let repo = HeartbeatRepository::in_memory().await.unwrap();
        repo.beat("imap_1", "active").await.unwrap();
        repo.delete("imap_1").await.unwrap();
        assert!(repo.get("imap_1").await.unwrap().is_none());
    }
}
