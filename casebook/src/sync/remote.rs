//! Remote store backends.
//!
//! The hosted store keeps one table per entity kind. Every row belongs to
//! an owner and carries the entity as an opaque JSON payload, so the
//! remote schema never has to follow changes to the local models.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::{RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{AppError, Result};

/// One row of a remote table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRow {
    pub id: String,
    pub owner_id: String,
    /// Id of the owning entity for nested kinds (cases, stages, sessions)
    pub parent_id: Option<String>,
    /// Order among siblings
    pub position: i64,
    pub data: Value,
}

/// Storage seam for synchronization (mocked in tests)
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// All rows of `table` belonging to `owner_id`, ordered by position
    async fn fetch(&self, table: &str, owner_id: &str) -> Result<Vec<RemoteRow>>;

    /// Delete every row of `owner_id` in `table`, then insert `rows`
    async fn replace(&self, table: &str, owner_id: &str, rows: &[RemoteRow]) -> Result<()>;
}

// ============================================================================
// REST backend
// ============================================================================

/// PostgREST-style HTTP backend (`/rest/v1/<table>` with `eq.` filters)
pub struct RestRemoteStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestRemoteStore {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("casebook/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

fn ensure_success(response: Response, action: &str, table: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(AppError::Sync(format!(
            "{} {} failed with status {}",
            action, table, status
        )))
    }
}

#[async_trait::async_trait]
impl RemoteStore for RestRemoteStore {
    async fn fetch(&self, table: &str, owner_id: &str) -> Result<Vec<RemoteRow>> {
        let response = self
            .authorized(self.client.get(self.endpoint(table)))
            .query(&[
                ("owner_id", format!("eq.{}", owner_id)),
                ("order", "position.asc".to_string()),
            ])
            .send()
            .await?;

        let rows: Vec<RemoteRow> = ensure_success(response, "fetch", table)?.json().await?;
        tracing::debug!("Fetched {} rows from {}", rows.len(), table);
        Ok(rows)
    }

    async fn replace(&self, table: &str, owner_id: &str, rows: &[RemoteRow]) -> Result<()> {
        let response = self
            .authorized(self.client.delete(self.endpoint(table)))
            .query(&[("owner_id", format!("eq.{}", owner_id))])
            .send()
            .await?;
        ensure_success(response, "delete", table)?;

        if rows.is_empty() {
            return Ok(());
        }

        let response = self
            .authorized(self.client.post(self.endpoint(table)))
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await?;
        ensure_success(response, "insert", table)?;

        tracing::debug!("Pushed {} rows to {}", rows.len(), table);
        Ok(())
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Remote store kept in process memory; used by tests and offline demos
#[derive(Default)]
pub struct MemoryRemoteStore {
    tables: RwLock<HashMap<(String, String), Vec<RemoteRow>>>,
    offline: AtomicBool,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the network were down
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub async fn rows(&self, table: &str, owner_id: &str) -> Vec<RemoteRow> {
        self.tables
            .read()
            .await
            .get(&(table.to_string(), owner_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::Sync("remote store unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn fetch(&self, table: &str, owner_id: &str) -> Result<Vec<RemoteRow>> {
        self.check_online()?;
        let mut rows = self.rows(table, owner_id).await;
        rows.sort_by_key(|row| row.position);
        Ok(rows)
    }

    async fn replace(&self, table: &str, owner_id: &str, rows: &[RemoteRow]) -> Result<()> {
        self.check_online()?;
        self.tables
            .write()
            .await
            .insert((table.to_string(), owner_id.to_string()), rows.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: &str, owner: &str, position: i64) -> RemoteRow {
        RemoteRow {
            id: id.to_string(),
            owner_id: owner.to_string(),
            parent_id: None,
            position,
            data: json!({"id": id}),
        }
    }

    #[tokio::test]
    async fn test_memory_store_isolates_owners() {
        let remote = MemoryRemoteStore::new();
        remote
            .replace("clients", "office-a", &[row("c1", "office-a", 0)])
            .await
            .unwrap();

        assert_eq!(remote.fetch("clients", "office-a").await.unwrap().len(), 1);
        assert!(remote.fetch("clients", "office-b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_replace_discards_previous_rows() {
        let remote = MemoryRemoteStore::new();
        remote
            .replace("clients", "o", &[row("c1", "o", 0), row("c2", "o", 1)])
            .await
            .unwrap();
        remote.replace("clients", "o", &[row("c3", "o", 0)]).await.unwrap();

        let rows = remote.fetch("clients", "o").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "c3");
    }

    #[tokio::test]
    async fn test_memory_store_orders_by_position() {
        let remote = MemoryRemoteStore::new();
        remote
            .replace("clients", "o", &[row("late", "o", 5), row("early", "o", 1)])
            .await
            .unwrap();

        let ids: Vec<String> = remote
            .fetch("clients", "o")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn test_offline_memory_store_fails() {
        let remote = MemoryRemoteStore::new();
        remote.set_offline(true);

        assert!(matches!(
            remote.fetch("clients", "o").await,
            Err(AppError::Sync(_))
        ));

        remote.set_offline(false);
        assert!(remote.fetch("clients", "o").await.is_ok());
    }

    #[test]
    fn test_rest_endpoint_trims_trailing_slash() {
        let remote = RestRemoteStore::new("https://example.test/ ", "key").unwrap();
        assert_eq!(
            remote.endpoint("sessions"),
            "https://example.test/rest/v1/sessions"
        );
    }

    #[test]
    fn test_remote_row_wire_format() {
        let mut value = row("c1", "o", 2);
        value.parent_id = Some("p".to_string());
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(
            json,
            json!({"id": "c1", "owner_id": "o", "parent_id": "p", "position": 2, "data": {"id": "c1"}})
        );
    }
}
