//! Event snapshot store.
//!
//! The snapshot is written by an external calendar loader; this side only
//! ever reads it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::SnapshotError;

/// A calendar event as exported by the loader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub subject: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Comma-separated category names, as calendar clients store them.
    #[serde(default)]
    pub categories: String,
    #[serde(default)]
    pub all_day: bool,
}

impl CalendarEvent {
    pub fn new(subject: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            id: None,
            subject: subject.into(),
            start,
            end,
            categories: String::new(),
            all_day: false,
        }
    }

    pub fn with_categories(mut self, categories: impl Into<String>) -> Self {
        self.categories = categories.into();
        self
    }

    /// Half-open overlap with `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && self.end > start
    }

    pub fn category_list(&self) -> impl Iterator<Item = &str> {
        self.categories
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// Calendar state for a time window.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub events: Vec<CalendarEvent>,
}

impl Snapshot {
    pub fn new(mut events: Vec<CalendarEvent>) -> Self {
        events.sort_by_key(|e| e.start);
        Self {
            generated_at: Some(Utc::now()),
            events,
        }
    }

    /// Timed (non all-day) events overlapping `[start, end)`.
    pub fn blocking_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Iterator<Item = &CalendarEvent> {
        self.events
            .iter()
            .filter(move |e| !e.all_day && e.overlaps(start, end))
    }
}

/// Read access to the current calendar snapshot.
pub trait SnapshotSource {
    fn load(&self) -> Result<Snapshot, SnapshotError>;
}

/// Snapshot stored as a JSON file.
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotSource for JsonSnapshotStore {
    fn load(&self) -> Result<Snapshot, SnapshotError> {
        let content =
            std::fs::read_to_string(&self.path).map_err(|source| SnapshotError::ReadFailed {
                path: self.path.clone(),
                source,
            })?;
        let mut snapshot: Snapshot =
            serde_json::from_str(&content).map_err(|source| SnapshotError::ParseFailed {
                path: self.path.clone(),
                source,
            })?;
        snapshot.events.sort_by_key(|e| e.start);
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn loads_and_sorts_events() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("events.json");
        std::fs::write(
            &path,
            r#"{
              "generated_at": "2025-11-03T07:00:00Z",
              "events": [
                {"subject": "Standup", "start": "2025-11-03T11:00:00+01:00", "end": "2025-11-03T11:30:00+01:00"},
                {"subject": "Planning", "start": "2025-11-03T08:00:00Z", "end": "2025-11-03T09:00:00Z", "categories": "Meetings, Blue"}
              ]
            }"#,
        )
        .unwrap();

        let snapshot = JsonSnapshotStore::new(&path).load().unwrap();
        assert_eq!(snapshot.events.len(), 2);
        assert_eq!(snapshot.events[0].subject, "Planning");
        assert_eq!(
            snapshot.events[1].start,
            Utc.with_ymd_and_hms(2025, 11, 3, 10, 0, 0).unwrap()
        );
        let cats: Vec<_> = snapshot.events[0].category_list().collect();
        assert_eq!(cats, vec!["Meetings", "Blue"]);
    }

    #[test]
    fn missing_file_is_read_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = JsonSnapshotStore::new(dir.path().join("nope.json"))
            .load()
            .unwrap_err();
        assert!(matches!(err, SnapshotError::ReadFailed { .. }));
    }

    #[test]
    fn malformed_file_is_parse_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("events.json");
        std::fs::write(&path, "{\"events\": [").unwrap();
        let err = JsonSnapshotStore::new(&path).load().unwrap_err();
        assert!(matches!(err, SnapshotError::ParseFailed { .. }));
    }

    #[test]
    fn all_day_events_never_block() {
        let start = Utc.with_ymd_and_hms(2025, 11, 3, 9, 0, 0).unwrap();
        let end = start + chrono::Duration::hours(8);
        let mut holiday = CalendarEvent::new("Company offsite", start, end);
        holiday.all_day = true;
        let snapshot = Snapshot::new(vec![holiday]);
        assert_eq!(snapshot.blocking_events(start, end).count(), 0);
    }
}
