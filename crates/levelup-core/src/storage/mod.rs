mod config;
pub mod database;
pub mod migrations;
pub mod retry;
pub mod traits;

pub use config::{LevelDownConfig, LevelUpConfig, LevelingConfig, RetryConfig, SuggestionConfig};
pub use database::LevelingDb;
pub use retry::RetryPolicy;
pub use traits::{
    AcceptWrite, ActivityStore, DomainNameResolver, ExpertiseStore, HabitStore, HistoryStore,
    SuggestionStore,
};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/levelup[-dev]/` based on LEVELUP_ENV.
///
/// Set LEVELUP_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("LEVELUP_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("levelup-dev")
    } else {
        base_dir.join("levelup")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}
