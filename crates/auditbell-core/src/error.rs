//! Core error types for auditbell-core.
//!
//! The hierarchy mirrors how failures are handled by the scheduler:
//! store failures abort a run, render and delivery failures roll a claim
//! back, and a duplicate claim is an expected outcome rather than a fault.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for auditbell-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Storage-related errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Scheduler run aborted
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Storage errors. Any of these is `StoreUnavailable` from the scheduler's
/// point of view.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked past the busy timeout
    #[error("Database is locked")]
    Locked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be decoded
    #[error("Corrupt record in '{table}': {message}")]
    Corrupt { table: &'static str, message: String },

    /// In-memory store poisoned by a panicking writer
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Outcomes of recording a dispatch claim.
#[derive(Error, Debug)]
pub enum DedupError {
    /// Another caller already recorded this exact (audit, tier) pair.
    #[error("Tier '{tier}' already recorded for audit {audit_id}")]
    AlreadyRecorded { audit_id: String, tier: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Rendering a notification failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Unknown template variable '{0}'")]
    UnknownVariable(String),

    #[error("Template variable '{0}' is not available for this notification kind")]
    VariableNotAvailable(String),

    #[error("Unterminated placeholder at byte {0}")]
    Unterminated(usize),

    #[error("Invalid date format '{0}'")]
    InvalidDateFormat(String),
}

/// Delivering a rendered notification failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("No recipients")]
    NoRecipients,

    #[error("Transport failure: {0}")]
    Transport(String),
}

/// A scheduler run was aborted before completing.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to determine or create the data directory
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid time range
    #[error("Invalid time range: ends_at ({end}) must be greater than starts_at ({start})")]
    InvalidTimeRange {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },

    /// Empty collection
    #[error("Empty collection: {0}")]
    EmptyCollection(String),

    /// Duplicate entry in a collection that must be unique
    #[error("Duplicate {field}: {value}")]
    Duplicate { field: String, value: String },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg)
                if matches!(
                    inner.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                StoreError::Locked
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
