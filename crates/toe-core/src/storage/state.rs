//! Small persisted state between prompts: remembered answers and snooze.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;

/// Persisted at `<data_dir>/state.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PromptMemory {
    #[serde(default)]
    pub last_category: Option<String>,
    #[serde(default)]
    pub last_timecode: Option<String>,
    #[serde(default)]
    pub snooze_until: Option<DateTime<Utc>>,
}

impl PromptMemory {
    pub fn default_path() -> PathBuf {
        data_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("state.json")
    }

    /// Load state, falling back to empty state when missing or unreadable.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable prompt state");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)
    }

    pub fn is_snoozed(&self, now: DateTime<Utc>) -> bool {
        self.snooze_until.map(|until| now < until).unwrap_or(false)
    }

    pub fn remember(&mut self, category: &str, timecode: Option<&str>) {
        self.last_category = Some(category.to_string());
        self.last_timecode = timecode.map(str::to_string);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn missing_file_is_empty_state() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = PromptMemory::load(&dir.path().join("state.json"));
        assert_eq!(state, PromptMemory::default());
    }

    #[test]
    fn persist_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let mut state = PromptMemory::default();
        state.remember("Deep Work", Some("DXG-1 - Engineering"));
        state.save(&path).unwrap();

        let loaded = PromptMemory::load(&path);
        assert_eq!(loaded.last_category.as_deref(), Some("Deep Work"));
        assert_eq!(loaded.last_timecode.as_deref(), Some("DXG-1 - Engineering"));
    }

    #[test]
    fn corrupt_file_is_empty_state() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(PromptMemory::load(&path), PromptMemory::default());
    }

    #[test]
    fn snooze_window() {
        let now = Utc::now();
        let state = PromptMemory {
            snooze_until: Some(now + Duration::minutes(10)),
            ..Default::default()
        };
        assert!(state.is_snoozed(now));
        assert!(!state.is_snoozed(now + Duration::minutes(10)));
    }
}
