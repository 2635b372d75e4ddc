//! Application configuration constants
//!
//! Central location for storage keys, placeholder values, resource limits
//! and validation boundaries used throughout the application.

// ===== Durable Storage Keys =====

/// Key under which the whole application document is stored
pub const DATA_STORAGE_KEY: &str = "lawOfficeData";

/// Key holding the revision that last dirtied the document (absent = clean)
pub const NEEDS_SYNC_STORAGE_KEY: &str = "lawOfficeNeedsSync";

/// Database file name inside the data directory
pub const DATABASE_FILE_NAME: &str = "casebook.sqlite";

/// Settings file name inside the data directory
pub const SETTINGS_FILE_NAME: &str = "settings.json";

// ===== Assistants =====

/// Sentinel assignee meaning "nobody in particular".
/// Always present in the assistants set and never removable.
pub const UNASSIGNED: &str = "unassigned";

// ===== Placeholders =====

pub const UNNAMED_CLIENT: &str = "unnamed client";
pub const CASE_WITHOUT_SUBJECT: &str = "case with no subject";
pub const UNKNOWN_OPPONENT: &str = "unknown opponent";
pub const UNSPECIFIED_COURT: &str = "unspecified court";
pub const NO_CASE_NUMBER: &str = "no case number";
pub const UNTITLED_TASK: &str = "untitled task";
pub const UNTITLED_APPOINTMENT: &str = "untitled appointment";
pub const NO_DESCRIPTION: &str = "no description";

// ===== Date Revival =====

/// Field names whose string values are revived as dates when a document
/// is read back from durable storage.
pub const DATE_FIELDS: &[&str] = &[
    "date",
    "dueDate",
    "createdAt",
    "issueDate",
    "firstSessionDate",
    "decisionDate",
    "nextSessionDate",
];

// ===== Sync Limits =====

/// Minimum sync timeout in seconds
pub const MIN_SYNC_TIMEOUT_SECS: u64 = 5;

/// Maximum sync timeout in seconds (10 minutes)
pub const MAX_SYNC_TIMEOUT_SECS: u64 = 600;

// ===== Reminder Limits =====

/// Minimum interval between overdue-session checks in seconds
pub const MIN_REMINDER_INTERVAL_SECS: u64 = 60;

/// Maximum interval between overdue-session checks (1 day)
pub const MAX_REMINDER_INTERVAL_SECS: u64 = 86_400;
