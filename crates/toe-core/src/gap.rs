//! Gap detection over classified calendar slots.
//!
//! Finds maximal runs of open (free or focus placeholder) slots that are long
//! enough to be worth asking about. Pure: no clock, no state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::CalendarSlot;
use crate::error::SnapshotError;

/// A contiguous span of unaccounted calendar time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GapCandidate {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Produced by force-bypass rather than by the calendar.
    #[serde(default)]
    pub forced: bool,
}

impl GapCandidate {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            forced: false,
        }
    }

    /// Identity used for debounce and de-duplication.
    pub fn key(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.start, self.end)
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && self.end > start
    }
}

/// Detector for finding gaps in a slot sequence.
pub struct GapDetector {
    /// Minimum gap duration to report (in minutes)
    min_gap_minutes: i64,
}

impl GapDetector {
    /// Create a new detector with the default 30 minute minimum.
    pub fn new() -> Self {
        Self {
            min_gap_minutes: 30,
        }
    }

    pub fn with_min_gap(mut self, minutes: i64) -> Self {
        self.min_gap_minutes = minutes;
        self
    }

    pub fn min_gap_minutes(&self) -> i64 {
        self.min_gap_minutes
    }

    /// Merge consecutive open slots into gaps.
    ///
    /// Slots must be ordered and non-overlapping. A Busy slot or a hole between
    /// two slots ends the current run. Runs shorter than the minimum are dropped.
    ///
    /// # Returns
    /// Gaps sorted by start time, pairwise disjoint.
    pub fn find_gaps(&self, slots: &[CalendarSlot]) -> Result<Vec<GapCandidate>, SnapshotError> {
        validate_slots(slots)?;

        let mut gaps = Vec::new();
        let mut run: Option<(DateTime<Utc>, DateTime<Utc>)> = None;

        for slot in slots {
            if !slot.label.is_open() {
                self.close_run(run.take(), &mut gaps);
                continue;
            }
            run = match run {
                Some((start, end)) if end == slot.start => Some((start, slot.end)),
                other => {
                    self.close_run(other, &mut gaps);
                    Some((slot.start, slot.end))
                }
            };
        }
        self.close_run(run, &mut gaps);

        Ok(gaps)
    }

    fn close_run(&self, run: Option<(DateTime<Utc>, DateTime<Utc>)>, gaps: &mut Vec<GapCandidate>) {
        if let Some((start, end)) = run {
            if end - start >= Duration::minutes(self.min_gap_minutes) {
                gaps.push(GapCandidate::new(start, end));
            }
        }
    }
}

impl Default for GapDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Check the ordering invariant the detector relies on.
pub fn validate_slots(slots: &[CalendarSlot]) -> Result<(), SnapshotError> {
    for (index, slot) in slots.iter().enumerate() {
        if slot.end <= slot.start {
            return Err(SnapshotError::InvalidRange {
                start: slot.start,
                end: slot.end,
            });
        }
        if index > 0 && slot.start < slots[index - 1].end {
            return Err(SnapshotError::OverlappingSlots { index });
        }
    }
    Ok(())
}

/// Convenience function to find gaps with a given minimum.
pub fn detect_gaps(
    slots: &[CalendarSlot],
    min_gap_minutes: i64,
) -> Result<Vec<GapCandidate>, SnapshotError> {
    GapDetector::new()
        .with_min_gap(min_gap_minutes)
        .find_gaps(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::SlotLabel;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 3, h, m, 0).unwrap()
    }

    fn slot(h: u32, m: u32, label: SlotLabel) -> CalendarSlot {
        let start = at(h, m);
        CalendarSlot::new(start, start + Duration::minutes(30), label)
    }

    #[test]
    fn merges_free_and_focus_runs() {
        let slots = vec![
            slot(9, 0, SlotLabel::Free),
            slot(9, 30, SlotLabel::FocusMode),
            slot(10, 0, SlotLabel::Busy),
            slot(10, 30, SlotLabel::Free),
            slot(11, 0, SlotLabel::Busy),
            slot(11, 30, SlotLabel::FocusMode),
        ];
        let gaps = detect_gaps(&slots, 30).unwrap();
        assert_eq!(
            gaps,
            vec![
                GapCandidate::new(at(9, 0), at(10, 0)),
                GapCandidate::new(at(10, 30), at(11, 0)),
                GapCandidate::new(at(11, 30), at(12, 0)),
            ]
        );
    }

    #[test]
    fn drops_runs_below_minimum() {
        let slots = vec![
            slot(9, 0, SlotLabel::Free),
            slot(9, 30, SlotLabel::Busy),
            slot(10, 0, SlotLabel::Free),
            slot(10, 30, SlotLabel::Free),
        ];
        let gaps = detect_gaps(&slots, 60).unwrap();
        assert_eq!(gaps, vec![GapCandidate::new(at(10, 0), at(11, 0))]);
    }

    #[test]
    fn hole_between_slots_splits_run() {
        let slots = vec![slot(9, 0, SlotLabel::Free), slot(10, 0, SlotLabel::Free)];
        let gaps = detect_gaps(&slots, 30).unwrap();
        assert_eq!(gaps.len(), 2);
    }

    #[test]
    fn rejects_overlapping_slots() {
        let slots = vec![
            slot(9, 0, SlotLabel::Free),
            CalendarSlot::new(at(9, 15), at(9, 45), SlotLabel::Free),
        ];
        assert!(matches!(
            detect_gaps(&slots, 30),
            Err(SnapshotError::OverlappingSlots { index: 1 })
        ));
    }

    #[test]
    fn rejects_empty_slot_range() {
        let slots = vec![CalendarSlot::new(at(9, 0), at(9, 0), SlotLabel::Free)];
        assert!(matches!(
            detect_gaps(&slots, 30),
            Err(SnapshotError::InvalidRange { .. })
        ));
    }

    #[test]
    fn gap_candidate_queries() {
        let gap = GapCandidate::new(at(10, 0), at(11, 0));
        assert_eq!(gap.duration_minutes(), 60);
        assert!(gap.contains(at(10, 0)));
        assert!(!gap.contains(at(11, 0)));
        assert!(gap.overlaps(at(10, 45), at(11, 15)));
        assert!(!gap.overlaps(at(11, 0), at(11, 30)));
    }
}
