//! File-backed calendar store used as the write-back target.
//!
//! Same JSON shape as the snapshot, so a loader can point both at one file.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use super::slots::FocusRule;
use super::snapshot::{CalendarEvent, Snapshot};
use crate::error::WriteError;
use crate::submission::{CalendarEntry, CalendarSink, EntryKey};

pub struct JsonCalendarStore {
    path: PathBuf,
}

impl JsonCalendarStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> WriteError {
        WriteError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn read(&self) -> Result<Snapshot, WriteError> {
        if !self.path.exists() {
            return Ok(Snapshot::default());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| self.io_err(e))?;
        if content.trim().is_empty() {
            return Ok(Snapshot::default());
        }
        serde_json::from_str(&content).map_err(|e| WriteError::Corrupt(e.to_string()))
    }

    /// Write through a temp file so a crash never leaves a half-written store.
    fn write(&self, snapshot: &Snapshot) -> Result<(), WriteError> {
        let data = serde_json::to_string_pretty(snapshot)
            .map_err(|e| WriteError::Corrupt(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data).map_err(|e| self.io_err(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))
    }
}

impl CalendarSink for JsonCalendarStore {
    fn find(&self, key: &EntryKey) -> Result<Option<String>, WriteError> {
        let snapshot = self.read()?;
        Ok(snapshot
            .events
            .iter()
            .find(|e| {
                e.start == key.start
                    && e.end == key.end
                    && e.category_list().any(|c| c == key.category)
            })
            .map(|e| e.id.clone().unwrap_or_default()))
    }

    fn insert(&mut self, entry: &CalendarEntry) -> Result<String, WriteError> {
        let mut snapshot = self.read()?;
        let id = uuid::Uuid::new_v4().to_string();
        let mut event = CalendarEvent::new(entry.subject.clone(), entry.key.start, entry.key.end)
            .with_categories(entry.key.category.clone());
        event.id = Some(id.clone());
        snapshot.events.push(event);
        snapshot.events.sort_by_key(|e| e.start);
        snapshot.generated_at = Some(Utc::now());
        self.write(&snapshot)?;
        Ok(id)
    }

    fn remove_placeholders(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        rule: &FocusRule,
    ) -> Result<usize, WriteError> {
        let mut snapshot = self.read()?;
        let before = snapshot.events.len();
        snapshot
            .events
            .retain(|e| !(e.overlaps(start, end) && !e.all_day && rule.matches(&e.subject)));
        let removed = before - snapshot.events.len();
        if removed > 0 {
            self.write(&snapshot)?;
        }
        Ok(removed)
    }
}
