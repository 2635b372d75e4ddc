//! Services module
//!
//! Background and file-level services that sit around the local store.

pub mod backup;
pub mod reminders;
pub mod scheduler;
pub mod settings;

pub use backup::BackupService;
pub use reminders::{OverdueSession, ReminderEvent, RemindersService};
pub use scheduler::{SyncFrequency, SyncScheduler};
pub use settings::{AppSettings, SettingsService};
