//! Backup service
//!
//! Exports the stored document as a JSON file and imports such files back.
//! Export writes the stored text as-is, so a file always reflects exactly
//! what durable storage holds. Import parses first and only then replaces
//! the store, so an unreadable file changes nothing.

use crate::config::DATA_STORAGE_KEY;
use crate::database::Repository;
use crate::error::{AppError, Result};
use crate::models::AppData;
use crate::store::LocalStore;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;

const DEFAULT_RETENTION_COUNT: usize = 10;
const EXPORT_PREFIX: &str = "casebook_";

/// A snapshot file in the exports directory
#[derive(Debug, Clone, Serialize)]
pub struct ExportFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Backup service
#[derive(Clone)]
pub struct BackupService {
    repo: Repository,
    exports_dir: PathBuf,
}

impl BackupService {
    pub fn new(repo: Repository, app_data_dir: PathBuf) -> Self {
        Self {
            repo,
            exports_dir: app_data_dir.join("exports"),
        }
    }

    /// The stored document text, or the empty document if nothing is stored
    async fn stored_document(&self) -> Result<String> {
        match self.repo.get_item(DATA_STORAGE_KEY).await? {
            Some(raw) => Ok(raw),
            None => Ok(serde_json::to_string(&AppData::default())?),
        }
    }

    /// Write the stored document to `path`
    pub async fn export_to(&self, path: &Path) -> Result<()> {
        let document = self.stored_document().await?;

        // Create the target directory if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        // Stored text is written byte for byte
        fs::write(path, document.as_bytes()).await?;

        tracing::info!("Exported {} bytes to {:?}", document.len(), path);
        Ok(())
    }

    /// Write a timestamped export into the exports directory, pruning old ones
    pub async fn create_snapshot(&self) -> Result<PathBuf> {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S%3f");
        let path = self
            .exports_dir
            .join(format!("{}{}.json", EXPORT_PREFIX, timestamp));

        self.export_to(&path).await?;

        // Apply retention policy
        self.prune_snapshots(DEFAULT_RETENTION_COUNT).await?;
        Ok(path)
    }

    /// Exported snapshots, newest first
    pub async fn list_snapshots(&self) -> Result<Vec<ExportFile>> {
        if !fs::try_exists(&self.exports_dir).await? {
            return Ok(Vec::new());
        }

        // Collect snapshot files, skipping anything else in the directory
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.exports_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(EXPORT_PREFIX) && name.ends_with(".json") {
                files.push(ExportFile {
                    path: entry.path(),
                    size: entry.metadata().await?.len(),
                });
            }
        }

        // Timestamped names sort chronologically
        files.sort_by(|a, b| b.path.cmp(&a.path));
        Ok(files)
    }

    async fn prune_snapshots(&self, keep: usize) -> Result<()> {
        for old in self.list_snapshots().await?.into_iter().skip(keep) {
            tracing::info!("Removing old export {:?}", old.path);
            fs::remove_file(&old.path).await?;
        }
        Ok(())
    }

    /// Read and parse an export file without touching any state
    pub async fn read_export(path: &Path) -> Result<Value> {
        let text = fs::read_to_string(path)
            .await
            .map_err(|e| AppError::Import(format!("cannot read {:?}: {}", path, e)))?;

        serde_json::from_str(&text)
            .map_err(|e| AppError::Import(format!("{:?} is not valid JSON: {}", path, e)))
    }

    /// Replace the store with the contents of `path`
    pub async fn import_from(&self, path: &Path, store: &mut LocalStore) -> Result<()> {
        // Parse before touching the store
        let document = Self::read_export(path).await?;

        // Hydrate and commit as one change
        store.replace_all(&document);

        tracing::info!(
            "Imported {:?}: {} clients, {} tasks",
            path,
            store.clients().len(),
            store.admin_tasks().len()
        );
        Ok(())
    }
}
