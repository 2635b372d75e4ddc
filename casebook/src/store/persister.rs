//! Background writer for store commits.
//!
//! Drains [`StoreEvent`]s and writes the latest snapshot to durable
//! storage, then marks it as needing sync with the revision that produced
//! it. Queued events are coalesced: only the newest snapshot is written,
//! and it is flagged if any of the coalesced events was.
//! Failures are logged and never reach the store.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::StoreEvent;
use crate::config::{DATA_STORAGE_KEY, NEEDS_SYNC_STORAGE_KEY};
use crate::database::Repository;
use crate::error::Result;

pub fn spawn_persister(
    repo: Repository,
    mut events: mpsc::UnboundedReceiver<StoreEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Persister started");

        while let Some(mut latest) = events.recv().await {
            while let Ok(newer) = events.try_recv() {
                let needs_sync = latest.needs_sync || newer.needs_sync;
                latest = newer;
                latest.needs_sync = needs_sync;
            }

            if let Err(e) = persist(&repo, &latest).await {
                tracing::error!("Failed to persist revision {}: {}", latest.revision, e);
            }
        }

        tracing::info!("Persister stopped");
    })
}

/// Write one snapshot and, for local changes, flag it for the next sync
pub async fn persist(repo: &Repository, event: &StoreEvent) -> Result<()> {
    let document = serde_json::to_string(event.snapshot.as_ref())?;
    repo.set_item(DATA_STORAGE_KEY, &document).await?;
    if event.needs_sync {
        repo.set_item(NEEDS_SYNC_STORAGE_KEY, &event.revision.to_string())
            .await?;
    }

    tracing::debug!(
        "Persisted revision {} ({} bytes)",
        event.revision,
        document.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::initialize_database;
    use crate::hydration::hydrate_str;
    use crate::models::{AppData, Client};
    use crate::store::LocalStore;
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
    async fn test_commits_reach_storage() {
        let repo = create_test_repo().await;
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_persister(repo.clone(), rx);

        let mut store = LocalStore::new(AppData::default(), tx);
        store.add_client(Client::new("Nadia", ""));
        store.add_client(Client::new("Omar", ""));
        let expected = store.snapshot();
        let revision = store.revision();

        // Dropping the store closes the channel so the persister drains and exits
        drop(store);
        handle.await.unwrap();

        let raw = repo.get_item(DATA_STORAGE_KEY).await.unwrap().unwrap();
        assert_eq!(hydrate_str(&raw), expected);
        assert_eq!(
            repo.get_item(NEEDS_SYNC_STORAGE_KEY).await.unwrap(),
            Some(revision.to_string())
        );
    }

    #[tokio::test]
    async fn test_reopen_restores_document() {
        let repo = create_test_repo().await;
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_persister(repo.clone(), rx);

        let mut store = LocalStore::new(AppData::default(), tx);
        store.add_assistant("Amal");
        store.add_client(Client::new("Nadia", ""));
        let expected = store.snapshot();
        drop(store);
        handle.await.unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let reopened = LocalStore::open(&repo, tx).await.unwrap();
        assert_eq!(reopened.snapshot(), expected);
    }

    #[tokio::test]
    async fn test_remote_snapshot_is_not_flagged() {
        let repo = create_test_repo().await;
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_persister(repo.clone(), rx);

        let mut store = LocalStore::new(AppData::default(), tx);
        store.apply_remote(&serde_json::json!({"clients": [{"name": "Nadia"}]}));
        drop(store);
        handle.await.unwrap();

        assert!(repo.get_item(DATA_STORAGE_KEY).await.unwrap().is_some());
        assert_eq!(repo.get_item(NEEDS_SYNC_STORAGE_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_open_with_corrupt_document_starts_empty() {
        let repo = create_test_repo().await;
        repo.set_item(DATA_STORAGE_KEY, "{not json").await.unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let store = LocalStore::open(&repo, tx).await.unwrap();
        assert_eq!(store.snapshot(), AppData::default());
    }
}
