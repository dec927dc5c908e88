//! Slot classification.
//!
//! Cuts the work window into fixed-size slots and labels each one from the
//! events overlapping it.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::snapshot::Snapshot;

/// Occupancy of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotLabel {
    Free,
    Busy,
    /// Only a focus placeholder is booked. Counts as free for gap purposes.
    FocusMode,
}

impl SlotLabel {
    pub fn is_open(self) -> bool {
        matches!(self, SlotLabel::Free | SlotLabel::FocusMode)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub label: SlotLabel,
    #[serde(default)]
    pub category: Option<String>,
}

impl CalendarSlot {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, label: SlotLabel) -> Self {
        Self {
            start,
            end,
            label,
            category: None,
        }
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && self.end > start
    }
}

/// How an event subject is compared with the focus title.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusMatch {
    #[default]
    EqualsCi,
    ContainsCi,
    Exact,
}

/// Identifies low-commitment placeholder events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusRule {
    pub title: String,
    pub mode: FocusMatch,
}

impl Default for FocusRule {
    fn default() -> Self {
        Self {
            title: "Focus Sprint".into(),
            mode: FocusMatch::EqualsCi,
        }
    }
}

impl FocusRule {
    pub fn matches(&self, subject: &str) -> bool {
        let subject = subject.trim();
        match self.mode {
            FocusMatch::EqualsCi => subject.to_lowercase() == self.title.to_lowercase(),
            FocusMatch::ContainsCi => subject
                .to_lowercase()
                .contains(&self.title.to_lowercase()),
            FocusMatch::Exact => subject == self.title,
        }
    }
}

/// Daily window in local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub slot_minutes: u32,
}

impl WorkWindow {
    /// Parse `HH:MM` bounds.
    pub fn parse(start: &str, end: &str, slot_minutes: u32) -> Result<Self, String> {
        let parse = |s: &str| {
            NaiveTime::parse_from_str(s.trim(), "%H:%M")
                .map_err(|e| format!("invalid time '{s}': {e}"))
        };
        let start = parse(start)?;
        let end = parse(end)?;
        if end <= start {
            return Err(format!("window end {end} must be after start {start}"));
        }
        if slot_minutes == 0 {
            return Err("slot_minutes must be at least 1".into());
        }
        Ok(Self {
            start,
            end,
            slot_minutes,
        })
    }

    pub fn slot_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.slot_minutes))
    }

    /// UTC bounds of the window on `date` in the time zone `tz`.
    pub fn bounds_on<Tz: TimeZone>(
        &self,
        date: NaiveDate,
        tz: &Tz,
    ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = tz
            .from_local_datetime(&date.and_time(self.start))
            .earliest()?
            .with_timezone(&Utc);
        let end = tz
            .from_local_datetime(&date.and_time(self.end))
            .earliest()?
            .with_timezone(&Utc);
        Some((start, end))
    }

    /// Whether `now` falls inside the window on its own local date.
    pub fn contains<Tz: TimeZone>(&self, now: DateTime<Utc>, tz: &Tz) -> bool {
        let local = now.with_timezone(tz).naive_local().time();
        self.start <= local && local < self.end
    }
}

/// Label every slot of `[window_start, window_end)`.
///
/// A slot with no timed event is Free; a slot whose only event is the focus
/// placeholder is FocusMode; anything else is Busy. The last slot is clipped
/// to the window end.
pub fn classify_slots(
    snapshot: &Snapshot,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    slot: Duration,
    rule: &FocusRule,
) -> Vec<CalendarSlot> {
    let mut slots = Vec::new();
    if slot <= Duration::zero() {
        return slots;
    }

    let mut cursor = window_start;
    while cursor < window_end {
        let end = (cursor + slot).min(window_end);
        let events: Vec<_> = snapshot.blocking_events(cursor, end).collect();

        let (label, category) = match events.as_slice() {
            [] => (SlotLabel::Free, None),
            [only] if rule.matches(&only.subject) => (SlotLabel::FocusMode, None),
            [first, ..] => (
                SlotLabel::Busy,
                first.category_list().next().map(str::to_string),
            ),
        };

        slots.push(CalendarSlot {
            start: cursor,
            end,
            label,
            category,
        });
        cursor = end;
    }

    slots
}
