//! Repository layer for database operations
//!
//! Key/value access to the local storage table and the sync history.

use super::models::*;
use crate::error::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Repository for database operations
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Read the value stored under `key`
    pub async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM local_storage WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    /// Read the full row stored under `key`
    pub async fn get_stored_item(&self, key: &str) -> Result<Option<StoredItem>> {
        let item = sqlx::query_as::<_, StoredItem>("SELECT * FROM local_storage WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }

    /// Insert or replace the value under `key`
    pub async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO local_storage (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        tracing::debug!("Stored {} ({} bytes)", key, value.len());
        Ok(())
    }

    /// Remove `key`; returns whether it existed
    pub async fn remove_item(&self, key: &str) -> Result<bool> {
        let rows = sqlx::query("DELETE FROM local_storage WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows > 0)
    }

    /// Remove `key` only while it still holds `expected`.
    ///
    /// Lets the sync service clear the needs-sync flag without losing a
    /// newer dirty mark written while a push was in flight.
    pub async fn remove_item_if(&self, key: &str, expected: &str) -> Result<bool> {
        let rows = sqlx::query("DELETE FROM local_storage WHERE key = ? AND value = ?")
            .bind(key)
            .bind(expected)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows > 0)
    }

    /// Record a finished sync attempt
    pub async fn record_sync_run(
        &self,
        started_at: DateTime<Utc>,
        direction: &str,
        status: &str,
        message: Option<&str>,
    ) -> Result<SyncRun> {
        let id = Uuid::new_v4().to_string();

        let run = sqlx::query_as::<_, SyncRun>(
            r#"
            INSERT INTO sync_runs (id, started_at, finished_at, direction, status, message)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(started_at)
        .bind(Utc::now())
        .bind(direction)
        .bind(status)
        .bind(message)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!("Recorded sync run: {} ({} {})", id, direction, status);
        Ok(run)
    }

    /// Most recent sync attempts first
    pub async fn list_sync_runs(&self, limit: i64) -> Result<Vec<SyncRun>> {
        let runs = sqlx::query_as::<_, SyncRun>(
            r#"
            SELECT * FROM sync_runs ORDER BY started_at DESC LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::schema::initialize_database;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_repo() -> Repository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        initialize_database(&pool).await.unwrap();

        Repository::new(pool)
    }

    #[tokio::test]
    async fn test_set_and_get_item() {
        let repo = create_test_repo().await;

        assert_eq!(repo.get_item("doc").await.unwrap(), None);

        repo.set_item("doc", r#"{"clients":[]}"#).await.unwrap();
        assert_eq!(
            repo.get_item("doc").await.unwrap(),
            Some(r#"{"clients":[]}"#.to_string())
        );

        // Overwrite
        repo.set_item("doc", "{}").await.unwrap();
        let item = repo.get_stored_item("doc").await.unwrap().unwrap();
        assert_eq!(item.value, "{}");
    }

    #[tokio::test]
    async fn test_remove_item() {
        let repo = create_test_repo().await;

        repo.set_item("flag", "1").await.unwrap();
        assert!(repo.remove_item("flag").await.unwrap());
        assert!(!repo.remove_item("flag").await.unwrap());
        assert_eq!(repo.get_item("flag").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_item_if_matches_only() {
        let repo = create_test_repo().await;

        repo.set_item("flag", "7").await.unwrap();
        assert!(!repo.remove_item_if("flag", "6").await.unwrap());
        assert_eq!(repo.get_item("flag").await.unwrap(), Some("7".to_string()));

        assert!(repo.remove_item_if("flag", "7").await.unwrap());
        assert_eq!(repo.get_item("flag").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sync_runs() {
        let repo = create_test_repo().await;

        let started = Utc::now() - chrono::Duration::seconds(5);
        repo.record_sync_run(started, "push", "ok", None)
            .await
            .unwrap();
        let failed = repo
            .record_sync_run(Utc::now(), "pull", "failed", Some("timeout"))
            .await
            .unwrap();

        let runs = repo.list_sync_runs(10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, failed.id);
        assert_eq!(runs[0].message.as_deref(), Some("timeout"));
        assert_eq!(runs[1].direction, "push");
    }
}
