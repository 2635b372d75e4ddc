//! Database models
//!
//! Rust structs representing database rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One entry of the key/value local storage
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StoredItem {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// A finished synchronization attempt
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncRun {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// "push", "pull" or "skipped"
    pub direction: String,
    /// "ok" or "failed"
    pub status: String,
    pub message: Option<String>,
}
