//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Work window and slot size used to classify the calendar
//! - Scheduler polling, debounce and minimum gap duration
//! - Prompt timeout, snooze and the focus placeholder rule
//! - Calendar write retry policy
//! - Replay pacing and the DevTools endpoint
//! - The category taxonomy (calendar category + time codes)
//!
//! Configuration is stored at `~/.config/toe/config.toml`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::calendar::{FocusMatch, FocusRule, WorkWindow};
use crate::error::ConfigError;

/// Daily work window in local time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkWindowConfig {
    #[serde(default = "default_window_start")]
    pub start: String,
    #[serde(default = "default_window_end")]
    pub end: String,
    #[serde(default = "default_slot_minutes")]
    pub slot_minutes: u32,
}

/// Gap detection scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_min_gap_minutes")]
    pub min_gap_minutes: u32,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_debounce_cycles")]
    pub debounce_cycles: u32,
    /// Ask once about the current slot and exit, ignoring the calendar.
    #[serde(default)]
    pub force_bypass: bool,
}

/// Prompt configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,
    #[serde(default = "default_snooze_minutes")]
    pub snooze_minutes: u64,
    #[serde(default = "default_true")]
    pub remember_last: bool,
    /// Subject of the low-commitment placeholder event.
    #[serde(default = "default_focus_title")]
    pub focus_title: String,
    #[serde(default)]
    pub focus_match: FocusMatch,
}

/// Calendar write-back configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Log would-be entries instead of writing them.
    #[serde(default)]
    pub preview_only: bool,
}

/// Replay engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// DevTools endpoint, `http://host:port` or a `ws://` debugger URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Fall back to scanning ports 9222-9225 when the endpoint does not answer.
    #[serde(default = "default_true")]
    pub scan_ports: bool,
    #[serde(default)]
    pub delay_base_ms: u64,
    #[serde(default)]
    pub jitter_ms: u64,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,
    /// Where failure screenshots go. Screenshots are disabled when unset.
    #[serde(default)]
    pub screenshot_dir: Option<String>,
    #[serde(default = "default_weekly_capacity_hours")]
    pub weekly_capacity_hours: f64,
}

/// Input and output file locations. Relative to the data dir when unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Snapshot JSON written by the external calendar loader.
    #[serde(default)]
    pub snapshot: Option<String>,
    /// Local calendar store the submission writer appends to.
    #[serde(default)]
    pub calendar: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_true")]
    pub file: bool,
}

/// One entry of the category taxonomy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CategoryConfig {
    /// Category name used on the calendar. Defaults to the taxonomy key.
    #[serde(default)]
    pub outlook_category: Option<String>,
    #[serde(default)]
    pub jira_timecodes: Vec<String>,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/toe/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub work_window: WorkWindowConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub writer: WriterConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryConfig>,
}

// Default functions
fn default_window_start() -> String {
    "09:00".into()
}
fn default_window_end() -> String {
    "17:00".into()
}
fn default_slot_minutes() -> u32 {
    30
}
fn default_min_gap_minutes() -> u32 {
    30
}
fn default_poll_interval_secs() -> u64 {
    30
}
fn default_debounce_cycles() -> u32 {
    2
}
fn default_timeout_minutes() -> u64 {
    10
}
fn default_snooze_minutes() -> u64 {
    10
}
fn default_focus_title() -> String {
    "Focus Sprint".into()
}
fn default_max_attempts() -> u32 {
    4
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_backoff_max_ms() -> u64 {
    8_000
}
fn default_endpoint() -> String {
    "http://127.0.0.1:9222".into()
}
fn default_step_timeout_ms() -> u64 {
    20_000
}
fn default_weekly_capacity_hours() -> f64 {
    40.0
}
fn default_log_level() -> String {
    "info".into()
}
fn default_true() -> bool {
    true
}

impl Default for WorkWindowConfig {
    fn default() -> Self {
        Self {
            start: default_window_start(),
            end: default_window_end(),
            slot_minutes: default_slot_minutes(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_gap_minutes: default_min_gap_minutes(),
            poll_interval_secs: default_poll_interval_secs(),
            debounce_cycles: default_debounce_cycles(),
            force_bypass: false,
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: default_timeout_minutes(),
            snooze_minutes: default_snooze_minutes(),
            remember_last: true,
            focus_title: default_focus_title(),
            focus_match: FocusMatch::default(),
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            preview_only: false,
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            scan_ports: true,
            delay_base_ms: 0,
            jitter_ms: 0,
            dry_run: false,
            step_timeout_ms: default_step_timeout_ms(),
            screenshot_dir: None,
            weekly_capacity_hours: default_weekly_capacity_hours(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_window: WorkWindowConfig::default(),
            scheduler: SchedulerConfig::default(),
            prompt: PromptConfig::default(),
            writer: WriterConfig::default(),
            replay: ReplayConfig::default(),
            paths: PathsConfig::default(),
            logging: LoggingConfig::default(),
            categories: BTreeMap::new(),
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
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
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

            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }

        Err(ConfigError::UnknownKey(key.to_string()))
    }

    /// Default location of the config file.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if !path.exists() {
            let cfg = Self::default();
            cfg.save_to(&path)?;
            return Ok(cfg);
        }
        Self::load_from(&path)
    }

    /// Load from an explicit path. A missing file is an error here.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
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

    /// Reject values the scheduler and replay engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.work_window()?;
        if self.scheduler.debounce_cycles == 0 {
            return Err(ConfigError::InvalidValue {
                key: "scheduler.debounce_cycles".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.scheduler.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "scheduler.poll_interval_secs".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.writer.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "writer.max_attempts".into(),
                message: "must be at least 1".into(),
            });
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

    /// Set a config value by key in memory. Returns error if key is unknown
    /// or the resulting config does not validate.
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

    /// Parsed work window.
    pub fn work_window(&self) -> Result<WorkWindow, ConfigError> {
        WorkWindow::parse(
            &self.work_window.start,
            &self.work_window.end,
            self.work_window.slot_minutes,
        )
        .map_err(|message| ConfigError::InvalidValue {
            key: "work_window".into(),
            message,
        })
    }

    pub fn focus_rule(&self) -> FocusRule {
        FocusRule {
            title: self.prompt.focus_title.clone(),
            mode: self.prompt.focus_match,
        }
    }

    /// Snapshot file location.
    pub fn snapshot_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.paths.snapshot {
            Some(p) => Ok(PathBuf::from(p)),
            None => Ok(data_dir()?.join("events.json")),
        }
    }

    /// Local calendar store location.
    pub fn calendar_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.paths.calendar {
            Some(p) => Ok(PathBuf::from(p)),
            None => Ok(data_dir()?.join("calendar.json")),
        }
    }

    /// Calendar category written for a taxonomy entry.
    pub fn calendar_category(&self, name: &str) -> String {
        self.categories
            .get(name)
            .and_then(|c| c.outlook_category.clone())
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| name.to_string())
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
        assert_eq!(parsed.scheduler.debounce_cycles, 2);
        assert_eq!(parsed.prompt.focus_title, "Focus Sprint");
        assert_eq!(parsed.replay.endpoint, "http://127.0.0.1:9222");
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [scheduler]
            min_gap_minutes = 45

            [categories."Deep Work"]
            jira_timecodes = ["DXG-1 - Engineering"]
            "#,
        )
        .unwrap();
        assert_eq!(parsed.scheduler.min_gap_minutes, 45);
        assert_eq!(parsed.scheduler.poll_interval_secs, 30);
        assert_eq!(parsed.work_window.slot_minutes, 30);
        assert_eq!(
            parsed.categories["Deep Work"].jira_timecodes,
            vec!["DXG-1 - Engineering".to_string()]
        );
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("scheduler.debounce_cycles").as_deref(), Some("2"));
        assert_eq!(cfg.get("replay.dry_run").as_deref(), Some("false"));
        assert_eq!(cfg.get("work_window.start").as_deref(), Some("09:00"));
        assert!(cfg.get("scheduler.missing_key").is_none());
    }

    #[test]
    fn set_json_value_by_path_updates_nested_number() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        Config::set_json_value_by_path(&mut json, "replay.jitter_ms", "750").unwrap();
        assert_eq!(
            Config::get_json_value_by_path(&json, "replay.jitter_ms").unwrap(),
            &serde_json::Value::Number(750.into())
        );
    }

    #[test]
    fn set_json_value_by_path_fills_optional_string() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        Config::set_json_value_by_path(&mut json, "paths.snapshot", "/tmp/events.json").unwrap();
        assert_eq!(
            Config::get_json_value_by_path(&json, "paths.snapshot").unwrap(),
            &serde_json::Value::String("/tmp/events.json".into())
        );
    }

    #[test]
    fn set_rejects_unknown_key_and_bad_type() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("scheduler.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(cfg.set("replay.dry_run", "maybe").is_err());
    }

    #[test]
    fn set_rejects_values_that_fail_validation() {
        let mut cfg = Config::default();
        assert!(cfg.set("scheduler.debounce_cycles", "0").is_err());
        assert_eq!(cfg.scheduler.debounce_cycles, 2);
        assert!(cfg.set("work_window.start", "25:00").is_err());
    }

    #[test]
    fn set_in_memory_updates_value() {
        let mut cfg = Config::default();
        cfg.set("scheduler.min_gap_minutes", "60").unwrap();
        assert_eq!(cfg.scheduler.min_gap_minutes, 60);
        cfg.set("prompt.focus_match", "contains_ci").unwrap();
        assert_eq!(cfg.prompt.focus_match, FocusMatch::ContainsCi);
    }

    #[test]
    fn calendar_category_prefers_mapping() {
        let mut cfg = Config::default();
        cfg.categories.insert(
            "Admin".into(),
            CategoryConfig {
                outlook_category: Some("Yellow Category".into()),
                jira_timecodes: vec![],
            },
        );
        cfg.categories.insert("Meetings".into(), CategoryConfig::default());
        assert_eq!(cfg.calendar_category("Admin"), "Yellow Category");
        assert_eq!(cfg.calendar_category("Meetings"), "Meetings");
    }

    #[test]
    fn save_and_load_from_explicit_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = Config::default();
        cfg.replay.delay_base_ms = 1200;
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.replay.delay_base_ms, 1200);
        assert!(Config::load_from(&dir.path().join("missing.toml")).is_err());
    }
}
