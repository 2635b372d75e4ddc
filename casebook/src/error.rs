//! Error types for Casebook
//!
//! All errors use thiserror for structured error handling.
//! Validation problems in stored or imported data never surface here;
//! the hydration layer repairs them silently.

use crate::postponement::Rejection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Unknown assistant: {0}")]
    UnknownAssistant(String),

    #[error("Postponement rejected: {0}")]
    Postponement(#[from] Rejection),

    #[error("Import error: {0}")]
    Import(String),

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Settings error: {0}")]
    Settings(String),
}

impl AppError {
    pub(crate) fn not_found(kind: &'static str, id: &str) -> Self {
        AppError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
