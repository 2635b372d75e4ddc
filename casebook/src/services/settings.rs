//! Settings service
//!
//! Manages application settings persistence using JSON file storage.

use crate::config::{
    MAX_REMINDER_INTERVAL_SECS, MAX_SYNC_TIMEOUT_SECS, MIN_REMINDER_INTERVAL_SECS,
    MIN_SYNC_TIMEOUT_SECS, SETTINGS_FILE_NAME,
};
use crate::error::{AppError, Result};
use crate::services::scheduler::SyncFrequency;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// Remote synchronization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub enabled: bool,
    /// "15m", "2h" or "hourly"
    #[serde(default = "default_sync_frequency")]
    pub frequency: String,
    #[serde(default = "default_sync_timeout")]
    pub timeout_secs: u64,
    /// Owner id all remote rows are scoped to
    #[serde(default)]
    pub owner_id: Option<String>,
    /// Base URL of the hosted backend, e.g. "https://project.example.co"
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_sync_frequency() -> String {
    "15m".to_string()
}

fn default_sync_timeout() -> u64 {
    30
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            frequency: default_sync_frequency(),
            timeout_secs: default_sync_timeout(),
            owner_id: None,
            remote_url: None,
            api_key: None,
        }
    }
}

/// A configured public holiday
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolidaySetting {
    /// "MM-DD" for every year or "YYYY-MM-DD" for a single date
    pub date: String,
    pub name: String,
}

/// Working-day calendar used for postponement warnings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarSettings {
    #[serde(default = "default_weekend_days")]
    pub weekend_days: Vec<String>,
    #[serde(default = "default_holidays")]
    pub holidays: Vec<HolidaySetting>,
}

fn default_weekend_days() -> Vec<String> {
    vec!["saturday".to_string(), "sunday".to_string()]
}

fn default_holidays() -> Vec<HolidaySetting> {
    vec![
        HolidaySetting {
            date: "01-01".to_string(),
            name: "New Year's Day".to_string(),
        },
        HolidaySetting {
            date: "05-01".to_string(),
            name: "Labour Day".to_string(),
        },
    ]
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            weekend_days: default_weekend_days(),
            holidays: default_holidays(),
        }
    }
}

/// Overdue-session reminder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_reminder_interval")]
    pub check_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_reminder_interval() -> u64 {
    3600 // hourly
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_secs: default_reminder_interval(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostponementSettings {
    /// Allow postponing sessions dated before today (historical backfill)
    #[serde(default)]
    pub allow_past_sessions: bool,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppSettings {
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub calendar: CalendarSettings,
    #[serde(default)]
    pub reminders: ReminderSettings,
    #[serde(default)]
    pub postponement: PostponementSettings,
}

impl AppSettings {
    /// Check value ranges; an enabled sync needs an owner and a remote URL
    pub fn validate(&self) -> Result<()> {
        // Sync timeout bounds
        let timeout = self.sync.timeout_secs;
        if !(MIN_SYNC_TIMEOUT_SECS..=MAX_SYNC_TIMEOUT_SECS).contains(&timeout) {
            return Err(AppError::Settings(format!(
                "sync timeout must be between {} and {} seconds",
                MIN_SYNC_TIMEOUT_SECS, MAX_SYNC_TIMEOUT_SECS
            )));
        }

        // Reminder interval bounds
        let interval = self.reminders.check_interval_secs;
        if !(MIN_REMINDER_INTERVAL_SECS..=MAX_REMINDER_INTERVAL_SECS).contains(&interval) {
            return Err(AppError::Settings(format!(
                "reminder interval must be between {} and {} seconds",
                MIN_REMINDER_INTERVAL_SECS, MAX_REMINDER_INTERVAL_SECS
            )));
        }

        // Frequency must be schedulable
        self.sync
            .frequency
            .parse::<SyncFrequency>()
            .map_err(|e| AppError::Settings(format!("sync frequency: {}", e)))?;

        if self.sync.enabled && (self.sync.owner_id.is_none() || self.sync.remote_url.is_none()) {
            return Err(AppError::Settings(
                "sync is enabled but owner_id or remote_url is missing".to_string(),
            ));
        }

        Ok(())
    }
}

/// Service for managing application settings
#[derive(Clone)]
pub struct SettingsService {
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new(app_data_dir: PathBuf) -> Self {
        Self {
            settings_path: app_data_dir.join(SETTINGS_FILE_NAME),
        }
    }

    /// Load settings from disk or create default if not exists
    pub async fn load(&self) -> Result<AppSettings> {
        if !self.settings_path.exists() {
            tracing::info!("Settings file not found, creating default settings");
            let default = AppSettings::default();
            self.save(&default).await?;
            return Ok(default);
        }

        // Missing fields fall back to their defaults
        let content = fs::read_to_string(&self.settings_path).await?;
        let settings: AppSettings = serde_json::from_str(&content)
            .map_err(|e| AppError::Settings(format!("Failed to parse settings: {}", e)))?;

        Ok(settings)
    }

    /// Save settings to disk
    pub async fn save(&self, settings: &AppSettings) -> Result<()> {
        // Never persist settings that would fail on next start
        settings.validate()?;

        let content = serde_json::to_string_pretty(settings)
            .map_err(|e| AppError::Settings(format!("Failed to serialize settings: {}", e)))?;

        fs::write(&self.settings_path, content).await?;
        tracing::info!("Settings saved to {:?}", self.settings_path);

        Ok(())
    }

    pub async fn get_sync(&self) -> Result<SyncSettings> {
        let settings = self.load().await?;
        Ok(settings.sync)
    }

    pub async fn update_sync(&self, sync: SyncSettings) -> Result<()> {
        let mut settings = self.load().await?;
        settings.sync = sync;
        self.save(&settings).await?;
        Ok(())
    }

    pub async fn get_calendar(&self) -> Result<CalendarSettings> {
        let settings = self.load().await?;
        Ok(settings.calendar)
    }

    pub async fn update_calendar(&self, calendar: CalendarSettings) -> Result<()> {
        let mut settings = self.load().await?;
        settings.calendar = calendar;
        self.save(&settings).await?;
        Ok(())
    }

    pub async fn get_reminders(&self) -> Result<ReminderSettings> {
        let settings = self.load().await?;
        Ok(settings.reminders)
    }

    pub async fn update_reminders(&self, reminders: ReminderSettings) -> Result<()> {
        let mut settings = self.load().await?;
        settings.reminders = reminders;
        self.save(&settings).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_service() -> (SettingsService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let service = SettingsService::new(temp_dir.path().to_path_buf());
        (service, temp_dir)
    }

    #[tokio::test]
    async fn test_default_settings_created_on_load() {
        let (service, temp) = create_test_service();

        let settings = service.load().await.unwrap();

        assert!(!settings.sync.enabled);
        assert_eq!(settings.sync.frequency, "15m");
        assert_eq!(settings.calendar.weekend_days, vec!["saturday", "sunday"]);
        assert_eq!(settings.calendar.holidays.len(), 2);
        assert!(settings.reminders.enabled);
        assert!(!settings.postponement.allow_past_sessions);
        assert!(temp.path().join(SETTINGS_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn test_partial_file_uses_field_defaults() {
        let (service, temp) = create_test_service();
        std::fs::write(
            temp.path().join(SETTINGS_FILE_NAME),
            r#"{"calendar": {"weekend_days": ["friday"]}}"#,
        )
        .unwrap();

        let settings = service.load().await.unwrap();
        assert_eq!(settings.calendar.weekend_days, vec!["friday"]);
        assert_eq!(settings.calendar.holidays, default_holidays());
        assert_eq!(settings.sync.timeout_secs, 30);
    }

    #[tokio::test]
    async fn test_settings_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let settings_path = temp_dir.path().to_path_buf();

        {
            let service = SettingsService::new(settings_path.clone());
            service
                .update_reminders(ReminderSettings {
                    enabled: false,
                    check_interval_secs: 600,
                })
                .await
                .unwrap();
        }

        {
            let service = SettingsService::new(settings_path);
            let loaded = service.get_reminders().await.unwrap();
            assert!(!loaded.enabled);
            assert_eq!(loaded.check_interval_secs, 600);
        }
    }

    #[tokio::test]
    async fn test_enabled_sync_requires_remote() {
        let (service, _temp) = create_test_service();

        let result = service
            .update_sync(SyncSettings {
                enabled: true,
                ..SyncSettings::default()
            })
            .await;
        assert!(matches!(result, Err(AppError::Settings(_))));

        let sync = service.get_sync().await.unwrap();
        assert!(!sync.enabled);
    }

    #[tokio::test]
    async fn test_unknown_frequency_rejected() {
        let (service, _temp) = create_test_service();

        let result = service
            .update_sync(SyncSettings {
                frequency: "weekly".to_string(),
                ..SyncSettings::default()
            })
            .await;
        assert!(matches!(result, Err(AppError::Settings(_))));
    }

    #[tokio::test]
    async fn test_out_of_range_values_rejected() {
        let (service, _temp) = create_test_service();

        let result = service
            .update_reminders(ReminderSettings {
                enabled: true,
                check_interval_secs: 1,
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_calendar_preserved_after_reminder_update() {
        let (service, _temp) = create_test_service();

        service
            .update_calendar(CalendarSettings {
                weekend_days: vec!["friday".to_string(), "saturday".to_string()],
                holidays: vec![],
            })
            .await
            .unwrap();

        service
            .update_reminders(ReminderSettings::default())
            .await
            .unwrap();

        let calendar = service.get_calendar().await.unwrap();
        assert_eq!(calendar.weekend_days, vec!["friday", "saturday"]);
        assert!(calendar.holidays.is_empty());
    }
}
