//! Gap scheduler.
//!
//! Polls the snapshot, debounces detected gaps across consecutive polls and
//! decides when a gap becomes a prompt. The pure decision logic lives in
//! [`GapScheduler`]; [`Watcher`] drives it from a tokio loop.

mod clock;
mod watch;

pub use clock::{Clock, ManualClock, SystemClock};
pub use watch::{OneShot, WatchOptions, WatchSummary, Watcher};

use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};
use std::collections::{HashMap, HashSet};

use crate::calendar::{CalendarSlot, SlotLabel};
use crate::error::SnapshotError;
use crate::gap::{GapCandidate, GapDetector};
use crate::storage::Config;

/// (start, end) identity of a gap.
pub type GapKey = (DateTime<Utc>, DateTime<Utc>);

/// Whether a qualifying gap may be turned into a prompt right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptGate {
    Open,
    Snoozed,
    OutsideWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub min_gap_minutes: i64,
    /// Consecutive polls a gap must be seen in before it qualifies.
    pub debounce_cycles: u32,
    pub slot_minutes: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            min_gap_minutes: 30,
            debounce_cycles: 2,
            slot_minutes: 30,
        }
    }
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_gap_minutes: i64::from(config.scheduler.min_gap_minutes),
            debounce_cycles: config.scheduler.debounce_cycles.max(1),
            slot_minutes: config.work_window.slot_minutes,
        }
    }
}

/// Debounce and de-duplication state across polls.
pub struct GapScheduler {
    detector: GapDetector,
    settings: SchedulerSettings,
    streaks: HashMap<GapKey, u32>,
    /// Keys already turned into a prompt. Dropped once the gap disappears.
    reported: HashSet<GapKey>,
}

impl GapScheduler {
    pub fn new(settings: SchedulerSettings) -> Self {
        Self {
            detector: GapDetector::new().with_min_gap(settings.min_gap_minutes),
            settings,
            streaks: HashMap::new(),
            reported: HashSet::new(),
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Consecutive polls `key` has been seen in.
    pub fn streak(&self, key: &GapKey) -> u32 {
        self.streaks.get(key).copied().unwrap_or(0)
    }

    /// Feed one poll's slots.
    ///
    /// Returns at most one new candidate: the earliest gap that contains
    /// `now`, has been stable for the debounce threshold, was not reported
    /// before and is not `is_tracked` by an open session. Streaks keep
    /// counting while the gate is closed.
    pub fn observe(
        &mut self,
        slots: &[CalendarSlot],
        now: DateTime<Utc>,
        gate: PromptGate,
        is_tracked: impl Fn(&GapKey) -> bool,
    ) -> Result<Option<GapCandidate>, SnapshotError> {
        let gaps = self.detector.find_gaps(slots)?;

        let streaks: HashMap<GapKey, u32> = gaps
            .iter()
            .map(|g| (g.key(), self.streak(&g.key()) + 1))
            .collect();
        self.streaks = streaks;
        self.reported.retain(|k| self.streaks.contains_key(k));

        if gate != PromptGate::Open {
            tracing::trace!(?gate, gaps = gaps.len(), "prompting gated");
            return Ok(None);
        }

        let candidate = gaps.into_iter().find(|g| {
            let key = g.key();
            self.streak(&key) >= self.settings.debounce_cycles
                && g.contains(now)
                && !self.reported.contains(&key)
                && !is_tracked(&key)
        });
        if let Some(gap) = &candidate {
            self.reported.insert(gap.key());
            tracing::info!(start = %gap.start, end = %gap.end, "gap qualifies for prompt");
        }
        Ok(candidate)
    }

    /// The slot containing `now`.
    ///
    /// Slots are aligned to multiples of `slot_minutes` in local time
    /// (`:00`/`:30` for half-hour slots). With `exact_now` the slot starts at
    /// the current minute instead.
    pub fn slot_at(&self, now: DateTime<Utc>, offset: FixedOffset, exact_now: bool) -> GapCandidate {
        let minute = now
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);
        let length = i64::from(self.settings.slot_minutes.max(1));
        let start = if exact_now {
            minute
        } else {
            let local = now.with_timezone(&offset);
            let of_day = i64::from(local.hour() * 60 + local.minute());
            minute - Duration::minutes(of_day % length)
        };
        GapCandidate::new(start, start + Duration::minutes(length))
    }

    /// Candidate for the current slot that ignores the calendar and all
    /// gating, and is never invalidated.
    pub fn force_bypass(&self, now: DateTime<Utc>, offset: FixedOffset, exact_now: bool) -> GapCandidate {
        GapCandidate {
            forced: true,
            ..self.slot_at(now, offset, exact_now)
        }
    }
}

/// Whether any Busy slot overlaps `gap`.
pub fn busy_overlap(slots: &[CalendarSlot], gap: &GapCandidate) -> bool {
    slots
        .iter()
        .any(|s| s.label == SlotLabel::Busy && gap.overlaps(s.start, s.end))
}
