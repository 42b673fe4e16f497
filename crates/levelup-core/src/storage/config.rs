//! TOML-based engine configuration.
//!
//! Holds the detection thresholds, the acceptance policy and the retry
//! budget for store calls. Every field has a default, so a partial file
//! (or none at all) is valid.
//!
//! Configuration is stored at `~/.config/levelup/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data_dir;
use crate::error::ConfigError;

/// Level-up gate thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelUpConfig {
    #[serde(default = "default_level_up_window")]
    pub window_days: i64,
    #[serde(default = "default_min_completion_rate")]
    pub min_completion_rate: f64,
    /// Days that must pass after a level change before the next level-up.
    #[serde(default = "default_cooldown_days")]
    pub cooldown_days: i64,
    #[serde(default = "default_level_step")]
    pub level_step: i32,
}

/// Level-down gate thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelDownConfig {
    #[serde(default = "default_level_down_window")]
    pub window_days: i64,
    /// Completion rates strictly below this trigger a baby step.
    #[serde(default = "default_max_completion_rate")]
    pub max_completion_rate: f64,
    #[serde(default = "default_min_habit_age")]
    pub min_habit_age_days: i64,
    #[serde(default = "default_level_factor")]
    pub level_factor: f64,
}

/// Suggestion acceptance policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestionConfig {
    /// Re-check the level-up cooldown when a suggestion is accepted.
    #[serde(default)]
    pub revalidate_cooldown_on_accept: bool,
}

/// Retry budget for transient store failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

/// Engine configuration.
///
/// Serialized to/from TOML at `~/.config/levelup/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelingConfig {
    #[serde(default)]
    pub level_up: LevelUpConfig,
    #[serde(default)]
    pub level_down: LevelDownConfig,
    #[serde(default)]
    pub suggestions: SuggestionConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

// Default functions
fn default_level_up_window() -> i64 {
    30
}
fn default_min_completion_rate() -> f64 {
    0.9
}
fn default_cooldown_days() -> i64 {
    30
}
fn default_level_step() -> i32 {
    15
}
fn default_level_down_window() -> i64 {
    14
}
fn default_max_completion_rate() -> f64 {
    0.5
}
fn default_min_habit_age() -> i64 {
    14
}
fn default_level_factor() -> f64 {
    0.5
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    25
}

impl Default for LevelUpConfig {
    fn default() -> Self {
        Self {
            window_days: default_level_up_window(),
            min_completion_rate: default_min_completion_rate(),
            cooldown_days: default_cooldown_days(),
            level_step: default_level_step(),
        }
    }
}

impl Default for LevelDownConfig {
    fn default() -> Self {
        Self {
            window_days: default_level_down_window(),
            max_completion_rate: default_max_completion_rate(),
            min_habit_age_days: default_min_habit_age(),
            level_factor: default_level_factor(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl LevelingConfig {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(n) if n.is_f64() => value
                        .parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                        .map(serde_json::Value::Number)
                        .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?,
                    serde_json::Value::Number(_) => value
                        .parse::<i64>()
                        .map(|n| serde_json::Value::Number(n.into()))
                        .map_err(|_| invalid(format!("cannot parse '{value}' as integer")))?,
                    serde_json::Value::Object(_) => return Err(unknown()),
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default location of the configuration file.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load from `path`, writing defaults there if the file is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: LevelingConfig =
                    toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::default_path()?)
    }

    /// Persist to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!("falling back to default configuration: {}", e);
                Self::default()
            }
        }
    }

    /// Reject thresholds that would make detection meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| {
            Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            })
        };

        if self.level_up.window_days < 1 {
            return invalid("level_up.window_days", "must be at least 1");
        }
        if self.level_down.window_days < 1 {
            return invalid("level_down.window_days", "must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.level_up.min_completion_rate) {
            return invalid("level_up.min_completion_rate", "must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.level_down.max_completion_rate) {
            return invalid("level_down.max_completion_rate", "must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.level_down.level_factor) {
            return invalid("level_down.level_factor", "must be within [0, 1]");
        }
        if self.level_up.level_step < 1 {
            return invalid("level_up.level_step", "must be at least 1");
        }
        if self.level_up.cooldown_days < 0 || self.level_down.min_habit_age_days < 0 {
            return invalid("cooldown_days", "day counts must not be negative");
        }
        if self.retry.max_attempts < 1 {
            return invalid("retry.max_attempts", "must be at least 1");
        }
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key, validating the result.
    ///
    /// Does not persist; call [`LevelingConfig::save`] afterwards.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: LevelingConfig =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}
