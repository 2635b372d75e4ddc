//! Remote synchronization
//!
//! One sync run either pushes or pulls, never both:
//! - if the needs-sync flag is set, the durable document is pushed and the
//!   flag is cleared only if no newer change re-set it meanwhile;
//! - otherwise the remote tables are pulled and returned as a raw document
//!   for the caller to hand to [`LocalStore::apply_remote`].
//!
//! Runs never overlap: a trigger that arrives while one is in flight is
//! skipped, not queued. Each run is bounded by a timeout and recorded in
//! the sync history.
//!
//! [`LocalStore::apply_remote`]: crate::store::LocalStore::apply_remote

pub mod remote;
pub mod tables;

pub use remote::{MemoryRemoteStore, RemoteRow, RemoteStore, RestRemoteStore};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::config::{DATA_STORAGE_KEY, NEEDS_SYNC_STORAGE_KEY};
use crate::database::Repository;
use crate::error::{AppError, Result};
use crate::hydration::hydrate_str;
use crate::models::AppData;
use crate::services::settings::SyncSettings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Synced(DateTime<Utc>),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    Push,
    Pull,
    Skipped,
}

impl SyncDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncDirection::Push => "push",
            SyncDirection::Pull => "pull",
            SyncDirection::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Another run was in flight
    Skipped,
    /// Local changes were uploaded; `cleared` is false when newer changes
    /// arrived during the push and the flag stayed set
    Pushed { revision: String, cleared: bool },
    /// Remote document, not yet hydrated
    Pulled(Value),
}

impl SyncOutcome {
    pub fn direction(&self) -> SyncDirection {
        match self {
            SyncOutcome::Skipped => SyncDirection::Skipped,
            SyncOutcome::Pushed { .. } => SyncDirection::Push,
            SyncOutcome::Pulled(_) => SyncDirection::Pull,
        }
    }
}

/// Clears the busy flag when a run ends, including on early return
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncService {
    repo: Repository,
    remote: Arc<dyn RemoteStore>,
    owner_id: String,
    timeout: Duration,
    busy: AtomicBool,
    status: RwLock<SyncStatus>,
}

impl SyncService {
    pub fn new(
        repo: Repository,
        remote: Arc<dyn RemoteStore>,
        owner_id: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            repo,
            remote,
            owner_id: owner_id.into(),
            timeout,
            busy: AtomicBool::new(false),
            status: RwLock::new(SyncStatus::Idle),
        }
    }

    /// Build the service against the configured REST endpoint
    pub fn from_settings(repo: Repository, settings: &SyncSettings) -> Result<Self> {
        let (Some(owner_id), Some(remote_url)) = (&settings.owner_id, &settings.remote_url) else {
            return Err(AppError::Settings(
                "sync needs both owner_id and remote_url".to_string(),
            ));
        };

        let api_key = settings.api_key.as_deref().unwrap_or_default();
        let remote = RestRemoteStore::new(remote_url, api_key)?;
        Ok(Self::new(
            repo,
            Arc::new(remote),
            owner_id.clone(),
            Duration::from_secs(settings.timeout_secs),
        ))
    }

    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    async fn set_status(&self, status: SyncStatus) {
        *self.status.write().await = status;
    }

    /// Run one push or pull
    pub async fn sync_once(&self) -> Result<SyncOutcome> {
        if self.busy.swap(true, Ordering::AcqRel) {
            tracing::debug!("Sync already in progress, skipping trigger");
            return Ok(SyncOutcome::Skipped);
        }
        let _guard = BusyGuard(&self.busy);

        self.set_status(SyncStatus::Syncing).await;
        let started_at = Utc::now();

        let result = match tokio::time::timeout(self.timeout, self.run()).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Sync(format!("timed out after {:?}", self.timeout))),
        };

        match &result {
            Ok(outcome) => {
                self.set_status(SyncStatus::Synced(Utc::now())).await;
                tracing::info!("Sync finished: {}", outcome.direction().as_str());
                self.record(started_at, outcome.direction(), "ok", None).await;
            }
            Err(e) => {
                let message = e.to_string();
                self.set_status(SyncStatus::Failed(message.clone())).await;
                tracing::error!("Sync failed: {}", message);
                self.record(started_at, self.pending_direction().await, "failed", Some(&message))
                    .await;
            }
        }

        result
    }

    async fn run(&self) -> Result<SyncOutcome> {
        match self.repo.get_item(NEEDS_SYNC_STORAGE_KEY).await? {
            Some(revision) => self.push(revision).await,
            None => self.pull().await,
        }
    }

    async fn push(&self, revision: String) -> Result<SyncOutcome> {
        let data = match self.repo.get_item(DATA_STORAGE_KEY).await? {
            Some(raw) => hydrate_str(&raw),
            None => AppData::default(),
        };

        let tables = tables::flatten(&data, &self.owner_id)?;
        for (table, rows) in &tables {
            self.remote.replace(table, &self.owner_id, rows).await?;
        }

        let cleared = self
            .repo
            .remove_item_if(NEEDS_SYNC_STORAGE_KEY, &revision)
            .await?;
        if !cleared {
            tracing::info!(
                "Local changes arrived during push of revision {}, keeping sync flag",
                revision
            );
        }

        Ok(SyncOutcome::Pushed { revision, cleared })
    }

    async fn pull(&self) -> Result<SyncOutcome> {
        let mut fetched = HashMap::new();
        for table in tables::TABLES {
            let rows = self.remote.fetch(table, &self.owner_id).await?;
            fetched.insert(table.to_string(), rows);
        }

        Ok(SyncOutcome::Pulled(tables::unflatten(fetched)))
    }

    /// Direction a failed run was attempting, for the history record
    async fn pending_direction(&self) -> SyncDirection {
        match self.repo.get_item(NEEDS_SYNC_STORAGE_KEY).await {
            Ok(Some(_)) => SyncDirection::Push,
            _ => SyncDirection::Pull,
        }
    }

    async fn record(
        &self,
        started_at: DateTime<Utc>,
        direction: SyncDirection,
        status: &str,
        message: Option<&str>,
    ) {
        if let Err(e) = self
            .repo
            .record_sync_run(started_at, direction.as_str(), status, message)
            .await
        {
            tracing::warn!("Failed to record sync run: {}", e);
        }
    }
}
