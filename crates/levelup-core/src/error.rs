//! Core error types for levelup-core.
//!
//! This module defines the error hierarchy using thiserror. Storage errors
//! carry a transient/permanent distinction so the retry policy can decide
//! what is worth retrying; validation errors are always surfaced unchanged.

use std::path::PathBuf;
use thiserror::Error;

use crate::suggestion::SuggestionStatus;

/// Core error type for levelup-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Persistence-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors (rejected before any mutation)
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Whether retrying the failed operation could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Storage(e) if e.is_transient())
    }
}

/// Storage-specific errors.
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

    /// A stored row could not be decoded
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Another writer holds the database
    #[error("Database is busy")]
    Busy,

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

impl StoreError {
    /// Busy and locked databases clear up on their own; everything else does not.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Busy | StoreError::Locked)
    }
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

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to locate the data directory
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// User id was empty
    #[error("User id must not be empty")]
    EmptyUserId,

    /// Habit does not exist
    #[error("Unknown habit: {0}")]
    UnknownHabit(String),

    /// Habit belongs to another user
    #[error("Habit {habit_id} does not belong to user {user_id}")]
    HabitOwnership { habit_id: String, user_id: String },

    /// Suggestion does not exist
    #[error("Unknown suggestion: {0}")]
    UnknownSuggestion(String),

    /// Suggestion already answered
    #[error("Suggestion {id} is already {status}")]
    SuggestionNotPending { id: String, status: SuggestionStatus },

    /// Awarded experience must not be negative
    #[error("Experience points must be non-negative, got {0}")]
    NegativeExperience(i64),

    /// Level change happened too recently to accept another level-up
    #[error("Habit {habit_id} changed level {days_since_change} days ago (cooldown {cooldown_days} days)")]
    CooldownActive {
        habit_id: String,
        days_since_change: i64,
        cooldown_days: i64,
    },

    /// Malformed input value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => match e.code {
                rusqlite::ErrorCode::DatabaseBusy => StoreError::Busy,
                rusqlite::ErrorCode::DatabaseLocked => StoreError::Locked,
                _ => StoreError::QueryFailed(err.to_string()),
            },
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Storage(err.into())
    }
}

/// A side effect that failed without failing the operation around it.
///
/// Returned inside operation outcomes so callers can tell a clean run from
/// a degraded one; the primary mutation has already been committed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// Display names could not be resolved; domain codes were used instead.
    DomainNamesUnavailable { reason: String },
    /// A level change was applied but its audit entry was not written.
    HistoryNotRecorded { entity_id: String, reason: String },
    /// Stale pending suggestions for the habit were left pending.
    SupersedeFailed { habit_id: String, reason: String },
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_and_locked_are_transient() {
        assert!(StoreError::Busy.is_transient());
        assert!(StoreError::Locked.is_transient());
        assert!(!StoreError::QueryFailed("x".into()).is_transient());
        assert!(!CoreError::Validation(ValidationError::EmptyUserId).is_transient());
        assert!(CoreError::Storage(StoreError::Locked).is_transient());
    }

    #[test]
    fn sqlite_busy_maps_to_busy() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(StoreError::from(err), StoreError::Busy));
    }
}
