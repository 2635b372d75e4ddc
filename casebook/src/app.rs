//! Application state and initialization
//!
//! Opens everything that lives in the data directory (database, settings)
//! once on startup. The local store itself is opened separately because
//! only one task may own it.

use crate::calendar::HolidayCalendar;
use crate::config::DATABASE_FILE_NAME;
use crate::database::{create_pool, Repository};
use crate::error::Result;
use crate::services::settings::AppSettings;
use crate::services::{BackupService, SettingsService};
use crate::store::persister::spawn_persister;
use crate::store::LocalStore;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Central application state shared by the services
#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub repo: Repository,
    pub settings_service: SettingsService,
    pub settings: AppSettings,
}

impl AppState {
    pub fn calendar(&self) -> HolidayCalendar {
        HolidayCalendar::from_settings(&self.settings.calendar)
    }

    pub fn backup_service(&self) -> BackupService {
        BackupService::new(self.repo.clone(), self.data_dir.clone())
    }

    /// Open the local store with its persister task attached.
    ///
    /// The persister exits after the store is dropped and every pending
    /// change has been written; await the handle to flush on shutdown.
    pub async fn open_store(&self) -> Result<(LocalStore, JoinHandle<()>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let persister = spawn_persister(self.repo.clone(), rx);
        let store = LocalStore::open(&self.repo, tx).await?;
        Ok((store, persister))
    }

    /// Import an export file and wait until it is written to storage.
    /// Returns the number of clients and sessions now held.
    pub async fn import_file(&self, path: &Path) -> Result<(usize, usize)> {
        let (mut store, persister) = self.open_store().await?;
        let imported = self.backup_service().import_from(path, &mut store).await;
        let counts = (store.clients().len(), store.all_sessions().len());

        drop(store);
        if let Err(e) = persister.await {
            tracing::error!("Persister task failed after import: {}", e);
        }
        imported.map(|_| counts)
    }
}

/// Application setup - called once on startup
pub async fn setup(data_dir: PathBuf) -> Result<AppState> {
    tracing::info!("Initializing application");
    tracing::info!("Data directory: {:?}", data_dir);

    tokio::fs::create_dir_all(&data_dir).await?;

    let pool = create_pool(&data_dir.join(DATABASE_FILE_NAME)).await?;
    let repo = Repository::new(pool);

    let settings_service = SettingsService::new(data_dir.clone());
    let settings = settings_service.load().await?;

    tracing::info!("Application initialized successfully");

    Ok(AppState {
        data_dir,
        repo,
        settings_service,
        settings,
    })
}
