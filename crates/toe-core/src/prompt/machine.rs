//! Queue of open prompt sessions.
//!
//! Keeps at most one session Shown; later candidates wait in FIFO order.
//! Every method that closes a session hands the terminal session back so the
//! caller can archive it.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use uuid::Uuid;

use super::session::{DismissReason, PromptSession, TransitionError};
use crate::gap::GapCandidate;

#[derive(Debug, Default)]
pub struct PromptMachine {
    shown: Option<PromptSession>,
    pending: VecDeque<PromptSession>,
}

impl PromptMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a new session for `gap`.
    pub fn enqueue(&mut self, gap: GapCandidate, now: DateTime<Utc>) -> Uuid {
        let session = PromptSession::new(gap, now);
        let id = session.id;
        tracing::debug!(session = %id, start = %session.gap.start, end = %session.gap.end, "prompt queued");
        self.pending.push_back(session);
        id
    }

    pub fn shown(&self) -> Option<&PromptSession> {
        self.shown.as_ref()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.shown.is_none() && self.pending.is_empty()
    }

    /// Whether a non-terminal session already covers `key`.
    pub fn is_tracked(&self, key: &(DateTime<Utc>, DateTime<Utc>)) -> bool {
        self.open_sessions().any(|s| &s.gap.key() == key)
    }

    pub fn open_sessions(&self) -> impl Iterator<Item = &PromptSession> {
        self.shown.iter().chain(self.pending.iter())
    }

    /// Promote the oldest pending session if nothing is shown.
    ///
    /// Returns the newly shown session, or `None` when a session is already
    /// shown or the queue is empty.
    pub fn show_next(&mut self, now: DateTime<Utc>) -> Option<&PromptSession> {
        if self.shown.is_some() {
            return None;
        }
        let mut next = self.pending.pop_front()?;
        // Pending sessions are never terminal, so this cannot fail.
        if next.show(now).is_err() {
            return None;
        }
        self.shown = Some(next);
        self.shown.as_ref()
    }

    /// Record the user's answer for the shown session.
    pub fn answer(
        &mut self,
        category: impl Into<String>,
        timecode: Option<String>,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<PromptSession, TransitionError> {
        let category = category.into();
        self.close_shown(|s| s.answer(category, timecode, comment, now))
            .unwrap_or(Err(TransitionError::NothingShown))
    }

    /// Dismiss the shown session (skip or snooze).
    pub fn dismiss_shown(
        &mut self,
        reason: DismissReason,
        now: DateTime<Utc>,
    ) -> Option<PromptSession> {
        self.close_shown(|s| s.dismiss(reason, now))?.ok()
    }

    /// The shown session's prompt window elapsed.
    pub fn time_out(&mut self, now: DateTime<Utc>) -> Option<PromptSession> {
        self.close_shown(|s| s.time_out(now))?.ok()
    }

    /// Apply `transition` to the shown session, keeping it shown on failure.
    fn close_shown(
        &mut self,
        transition: impl FnOnce(&mut PromptSession) -> Result<(), TransitionError>,
    ) -> Option<Result<PromptSession, TransitionError>> {
        let mut session = self.shown.take()?;
        match transition(&mut session) {
            Ok(()) => Some(Ok(session)),
            Err(e) => {
                self.shown = Some(session);
                Some(Err(e))
            }
        }
    }

    /// Dismiss every open session whose gap `is_stale` reports as overlapped.
    pub fn invalidate(
        &mut self,
        mut is_stale: impl FnMut(&GapCandidate) -> bool,
        now: DateTime<Utc>,
    ) -> Vec<PromptSession> {
        let mut closed = Vec::new();

        if self.shown.as_ref().is_some_and(|s| is_stale(&s.gap)) {
            if let Some(mut session) = self.shown.take() {
                if session.dismiss(DismissReason::Invalidated, now).is_ok() {
                    closed.push(session);
                }
            }
        }

        let mut kept = VecDeque::with_capacity(self.pending.len());
        for mut session in self.pending.drain(..) {
            if is_stale(&session.gap) && session.dismiss(DismissReason::Invalidated, now).is_ok() {
                closed.push(session);
            } else {
                kept.push_back(session);
            }
        }
        self.pending = kept;

        for session in &closed {
            tracing::info!(session = %session.id, "prompt invalidated by calendar change");
        }
        closed
    }

    /// Dismiss everything on shutdown.
    pub fn abort_all(&mut self, now: DateTime<Utc>) -> Vec<PromptSession> {
        let mut closed = Vec::new();
        let open = self.shown.take().into_iter().chain(self.pending.drain(..));
        for mut session in open.collect::<Vec<_>>() {
            if session.dismiss(DismissReason::Aborted, now).is_ok() {
                closed.push(session);
            }
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptStatus;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 3, h, m, 0).unwrap()
    }

    fn gap(h: u32) -> GapCandidate {
        GapCandidate::new(at(h, 0), at(h, 0) + Duration::minutes(60))
    }

    #[test]
    fn only_one_session_shown_at_a_time() {
        let mut machine = PromptMachine::new();
        let first = machine.enqueue(gap(10), at(10, 0));
        let second = machine.enqueue(gap(11), at(10, 0));

        assert_eq!(machine.show_next(at(10, 1)).map(|s| s.id), Some(first));
        assert!(machine.show_next(at(10, 2)).is_none());
        assert_eq!(machine.pending_len(), 1);

        let answered = machine
            .answer("Admin", None, None, at(10, 3))
            .unwrap();
        assert_eq!(answered.id, first);
        assert_eq!(answered.status, PromptStatus::Answered);

        assert_eq!(machine.show_next(at(10, 4)).map(|s| s.id), Some(second));
    }

    #[test]
    fn answer_without_shown_session_fails() {
        let mut machine = PromptMachine::new();
        machine.enqueue(gap(10), at(10, 0));
        assert_eq!(
            machine.answer("Admin", None, None, at(10, 1)),
            Err(TransitionError::NothingShown)
        );
        assert_eq!(machine.pending_len(), 1);
    }

    #[test]
    fn invalidate_dismisses_shown_and_pending() {
        let mut machine = PromptMachine::new();
        machine.enqueue(gap(10), at(10, 0));
        machine.enqueue(gap(12), at(10, 0));
        machine.enqueue(gap(14), at(10, 0));
        machine.show_next(at(10, 0));

        let closed = machine.invalidate(|g| g.start < at(13, 0), at(10, 5));
        assert_eq!(closed.len(), 2);
        assert!(closed
            .iter()
            .all(|s| s.dismiss_reason == Some(DismissReason::Invalidated)));
        assert!(machine.shown().is_none());
        assert_eq!(machine.pending_len(), 1);
        assert!(machine.is_tracked(&gap(14).key()));
        assert!(!machine.is_tracked(&gap(10).key()));
    }

    #[test]
    fn time_out_closes_shown() {
        let mut machine = PromptMachine::new();
        machine.enqueue(gap(10), at(10, 0));
        assert!(machine.time_out(at(10, 1)).is_none());
        machine.show_next(at(10, 1));
        let closed = machine.time_out(at(10, 11)).unwrap();
        assert_eq!(closed.status, PromptStatus::TimedOut);
        assert!(machine.is_idle());
    }

    #[test]
    fn abort_all_drains_queue() {
        let mut machine = PromptMachine::new();
        machine.enqueue(gap(10), at(10, 0));
        machine.enqueue(gap(11), at(10, 0));
        machine.show_next(at(10, 0));
        let closed = machine.abort_all(at(10, 30));
        assert_eq!(closed.len(), 2);
        assert!(closed
            .iter()
            .all(|s| s.dismiss_reason == Some(DismissReason::Aborted)));
        assert!(machine.is_idle());
    }
}
