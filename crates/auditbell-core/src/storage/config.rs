//! TOML-based application configuration.
//!
//! Stores operator settings including:
//! - Database location
//! - Scheduler cadence and retention horizon
//! - Reminder tier schedule
//! - Notification templates and link base
//!
//! Configuration is stored at `<data dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;
use crate::render::{
    TemplatePair, TemplateRenderer, DEFAULT_BASE_URL, DEFAULT_DATE_FORMAT, DEFAULT_REMINDER_BODY,
    DEFAULT_REMINDER_SUBJECT, DEFAULT_STANDARD_BODY, DEFAULT_STANDARD_SUBJECT,
};
use crate::tier::{default_tiers, ReminderTier, TierSchedule, MAX_OFFSET_DAYS};

/// Scheduler cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Open audits whose deadline passed more than this many days ago are
    /// no longer scanned.
    #[serde(default = "default_retention_horizon_days")]
    pub retention_horizon_days: i64,
    /// Seconds between runs in `watch` mode.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

/// Notification rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Link included in every notice as `{{url}}`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// chrono format string for `{{ends_at}}`.
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default = "default_standard_template")]
    pub standard: TemplatePair,
    #[serde(default = "default_reminder_template")]
    pub reminder: TemplatePair,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data dir>/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite file, relative to the data directory unless absolute.
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default = "default_tiers")]
    pub tiers: Vec<ReminderTier>,
}

// Default functions
fn default_retention_horizon_days() -> i64 {
    30
}
fn default_interval_secs() -> u64 {
    300
}
fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}
fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.into()
}
fn default_database() -> String {
    "auditbell.db".into()
}
fn default_standard_template() -> TemplatePair {
    TemplatePair::new(DEFAULT_STANDARD_SUBJECT, DEFAULT_STANDARD_BODY)
}
fn default_reminder_template() -> TemplatePair {
    TemplatePair::new(DEFAULT_REMINDER_SUBJECT, DEFAULT_REMINDER_BODY)
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            retention_horizon_days: default_retention_horizon_days(),
            interval_secs: default_interval_secs(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            date_format: default_date_format(),
            standard: default_standard_template(),
            reminder: default_reminder_template(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            scheduler: SchedulerConfig::default(),
            render: RenderConfig::default(),
            tiers: default_tiers(),
        }
    }
}

impl Config {
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
        if parts.peek().map_or(true, |part| part.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as integer")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default location of the config file.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there if the file is absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
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
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
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

    /// Set a config value by dot-separated key, in memory only.
    ///
    /// The resulting config is validated; on error `self` is unchanged.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tier_schedule()?;
        if !(0..=MAX_OFFSET_DAYS).contains(&self.scheduler.retention_horizon_days) {
            return Err(ConfigError::InvalidValue {
                key: "scheduler.retention_horizon_days".into(),
                message: format!("must be between 0 and {MAX_OFFSET_DAYS}"),
            });
        }
        if self.scheduler.interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "scheduler.interval_secs".into(),
                message: "must be at least 1".into(),
            });
        }
        TemplateRenderer::from_config(&self.render)?;
        Ok(())
    }

    pub fn tier_schedule(&self) -> Result<TierSchedule, ConfigError> {
        TierSchedule::new(self.tiers.clone()).map_err(|e| ConfigError::InvalidValue {
            key: "tiers".into(),
            message: e.to_string(),
        })
    }

    pub fn retention_horizon(&self) -> chrono::Duration {
        chrono::Duration::days(self.scheduler.retention_horizon_days)
    }

    /// Resolved database path.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        let path = PathBuf::from(&self.database);
        if path.is_absolute() {
            Ok(path)
        } else {
            Ok(data_dir()?.join(path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.scheduler.retention_horizon_days, 30);
        assert_eq!(parsed.tiers.len(), 3);
        assert_eq!(parsed.render.date_format, "%Y-%m-%d");
    }

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [scheduler]
            interval_secs = 60

            [[tiers]]
            name = "7d"
            offset_days = 7
            kind = "standard"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.scheduler.interval_secs, 60);
        assert_eq!(parsed.scheduler.retention_horizon_days, 30);
        assert_eq!(parsed.tier_schedule().unwrap().tiers().len(), 1);
        assert_eq!(parsed.database, "auditbell.db");
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("scheduler.interval_secs").as_deref(), Some("300"));
        assert_eq!(cfg.get("render.date_format").as_deref(), Some("%Y-%m-%d"));
        assert!(cfg.get("scheduler.missing_key").is_none());
    }

    #[test]
    fn set_updates_nested_number() {
        let mut cfg = Config::default();
        cfg.set("scheduler.retention_horizon_days", "45").unwrap();
        assert_eq!(cfg.scheduler.retention_horizon_days, 45);
    }

    #[test]
    fn set_replaces_tier_array_from_json() {
        let mut cfg = Config::default();
        cfg.set(
            "tiers",
            r#"[{"name":"7d","offset_days":7,"kind":"standard"},{"name":"1d","offset_days":1,"kind":"reminder"}]"#,
        )
        .unwrap();
        let names: Vec<_> = cfg
            .tier_schedule()
            .unwrap()
            .tiers()
            .iter()
            .map(|t| t.name.clone())
            .collect();
        assert_eq!(names, vec!["7d", "1d"]);
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("scheduler.nonexistent_key", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn set_rejects_invalid_type() {
        let mut cfg = Config::default();
        assert!(cfg.set("scheduler.interval_secs", "soon").is_err());
    }

    #[test]
    fn set_rejects_value_failing_validation() {
        let mut cfg = Config::default();
        assert!(cfg.set("render.base_url", "not a url").is_err());
        assert_eq!(cfg.render.base_url, "https://groups.example.com/");
        assert!(cfg.set("scheduler.interval_secs", "0").is_err());
        assert!(cfg
            .set("tiers", r#"[{"name":"a","offset_days":1,"kind":"standard"},{"name":"a","offset_days":2,"kind":"standard"}]"#)
            .is_err());
    }

    #[test]
    fn set_rejects_out_of_range_day_counts() {
        let mut cfg = Config::default();
        assert!(cfg.set("scheduler.retention_horizon_days", "100000000").is_err());
        assert!(cfg.set("scheduler.retention_horizon_days", "-1").is_err());
        assert_eq!(cfg.scheduler.retention_horizon_days, 30);
        assert!(cfg
            .set("tiers", r#"[{"name":"ancient","offset_days":-200000000,"kind":"reminder"}]"#)
            .is_err());
        assert_eq!(cfg.tiers.len(), 3);
    }

    #[test]
    fn load_from_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.scheduler.interval_secs, 300);

        let mut changed = cfg.clone();
        changed.set("scheduler.interval_secs", "42").unwrap();
        changed.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().scheduler.interval_secs, 42);
    }

    #[test]
    fn load_from_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "tiers = 3").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::LoadFailed { .. })
        ));
    }
}
