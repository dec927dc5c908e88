//! The watch loop: poll, prompt, write back.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{busy_overlap, Clock, GapScheduler, PromptGate, SchedulerSettings, SystemClock};
use crate::calendar::{classify_slots, CalendarSlot, FocusRule, SnapshotSource, WorkWindow};
use crate::error::ConfigError;
use crate::gap::GapCandidate;
use crate::prompt::{
    CategoryChoice, DismissReason, PromptContext, PromptMachine, PromptReply, PromptSession,
    PromptStatus, PromptSurface,
};
use crate::storage::{Config, PromptMemory, SessionArchive};
use crate::submission::{CalendarSink, SubmissionWriter};

/// A single prompt for the current slot instead of the polling loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OneShot {
    /// Poll the calendar and prompt for gaps as they appear.
    #[default]
    Off,
    /// Prompt for the current slot if the work window, snooze and calendar
    /// allow it, then stop.
    Checked,
    /// Prompt for the current slot regardless of the calendar, then stop.
    Bypass,
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub poll_interval: Duration,
    pub prompt_timeout: Duration,
    pub snooze: chrono::Duration,
    pub remember_last: bool,
    pub one_shot: OneShot,
    /// One-shot slots start at the current minute instead of the slot boundary.
    pub exact_now: bool,
    /// Stop once the first prompt has closed.
    pub once: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            prompt_timeout: Duration::from_secs(600),
            snooze: chrono::Duration::minutes(10),
            remember_last: true,
            one_shot: OneShot::Off,
            exact_now: false,
            once: false,
        }
    }
}

impl WatchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.scheduler.poll_interval_secs.max(1)),
            prompt_timeout: Duration::from_secs(config.prompt.timeout_minutes * 60),
            snooze: chrono::Duration::minutes(config.prompt.snooze_minutes as i64),
            remember_last: config.prompt.remember_last,
            one_shot: if config.scheduler.force_bypass {
                OneShot::Bypass
            } else {
                OneShot::Off
            },
            exact_now: false,
            once: false,
        }
    }
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WatchSummary {
    pub polls: u64,
    pub poll_failures: u64,
    /// Prompts the surface failed to show or read a reply for.
    pub surface_failures: u32,
    pub prompted: u32,
    pub answered: u32,
    pub written: u32,
    pub write_failures: u32,
    pub timed_out: u32,
    pub dismissed: u32,
}

impl WatchSummary {
    pub fn closed(&self) -> u32 {
        self.answered + self.timed_out + self.dismissed
    }
}

pub struct Watcher<S, P, C, K = SystemClock> {
    source: S,
    surface: P,
    writer: SubmissionWriter<C>,
    clock: K,
    scheduler: GapScheduler,
    machine: PromptMachine,
    window: WorkWindow,
    focus: FocusRule,
    ctx: PromptContext,
    memory: PromptMemory,
    memory_path: Option<PathBuf>,
    archive: Option<SessionArchive>,
    options: WatchOptions,
    shown_deadline: Option<Instant>,
    summary: WatchSummary,
}

impl<S, P, C> Watcher<S, P, C, SystemClock>
where
    S: SnapshotSource,
    P: PromptSurface,
    C: CalendarSink,
{
    pub fn from_config(
        config: &Config,
        source: S,
        surface: P,
        writer: SubmissionWriter<C>,
    ) -> Result<Self, ConfigError> {
        if config.categories.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "categories".into(),
                message: "at least one category is required to answer prompts".into(),
            });
        }
        let ctx = PromptContext {
            categories: config
                .categories
                .iter()
                .map(|(name, c)| CategoryChoice {
                    name: name.clone(),
                    timecodes: c.jira_timecodes.clone(),
                })
                .collect(),
            last_category: None,
            last_timecode: None,
            snooze_minutes: config.prompt.snooze_minutes,
        };

        Ok(Self {
            source,
            surface,
            writer,
            clock: SystemClock,
            scheduler: GapScheduler::new(SchedulerSettings::from_config(config)),
            machine: PromptMachine::new(),
            window: config.work_window()?,
            focus: config.focus_rule(),
            ctx,
            memory: PromptMemory::default(),
            memory_path: None,
            archive: None,
            options: WatchOptions::from_config(config),
            shown_deadline: None,
            summary: WatchSummary::default(),
        })
    }
}

impl<S, P, C, K> Watcher<S, P, C, K>
where
    S: SnapshotSource,
    P: PromptSurface,
    C: CalendarSink,
    K: Clock,
{
    pub fn with_clock<K2: Clock>(self, clock: K2) -> Watcher<S, P, C, K2> {
        Watcher {
            source: self.source,
            surface: self.surface,
            writer: self.writer,
            clock,
            scheduler: self.scheduler,
            machine: self.machine,
            window: self.window,
            focus: self.focus,
            ctx: self.ctx,
            memory: self.memory,
            memory_path: self.memory_path,
            archive: self.archive,
            options: self.options,
            shown_deadline: self.shown_deadline,
            summary: self.summary,
        }
    }

    pub fn with_options(mut self, options: WatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Load remembered answers and snooze state, saving changes back to `path`.
    pub fn with_memory(mut self, memory: PromptMemory, path: Option<PathBuf>) -> Self {
        if self.options.remember_last {
            self.ctx.last_category = memory.last_category.clone();
            self.ctx.last_timecode = memory.last_timecode.clone();
        }
        self.memory = memory;
        self.memory_path = path;
        self
    }

    pub fn with_archive(mut self, archive: SessionArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn surface(&self) -> &P {
        &self.surface
    }

    pub fn writer(&self) -> &SubmissionWriter<C> {
        &self.writer
    }

    pub fn memory(&self) -> &PromptMemory {
        &self.memory
    }

    /// Run until cancelled, input closes, or (with `once` or a one-shot) the
    /// first prompt closes. Open sessions are dismissed as aborted on the way
    /// out.
    ///
    /// Surface and snapshot failures are logged and counted; they never stop
    /// the loop.
    pub async fn run(&mut self, cancel: CancellationToken) -> WatchSummary {
        let mut ticker = tokio::time::interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let one_shot = self.options.one_shot != OneShot::Off;
        if one_shot {
            match self.one_shot_slot() {
                Some(gap) => {
                    tracing::info!(
                        start = %gap.start,
                        end = %gap.end,
                        bypass = gap.forced,
                        "one-shot prompt"
                    );
                    self.machine.enqueue(gap, self.clock.now());
                }
                None => {
                    tracing::info!("one-shot prompt not allowed for the current slot");
                    return self.summary.clone();
                }
            }
        }
        let once = self.options.once || one_shot;

        loop {
            self.show_next();

            if once && self.summary.closed() > 0 && self.machine.is_idle() {
                break;
            }

            let awaiting = self.machine.shown().is_some();
            let deadline = self.shown_deadline;

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("watch loop shutting down");
                    break;
                }
                _ = ticker.tick() => self.poll(),
                reply = self.surface.next_reply(&self.ctx), if awaiting => {
                    match reply {
                        Ok(Some(reply)) => self.handle_reply(reply).await,
                        Ok(None) => {
                            tracing::info!("prompt input closed");
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to read prompt reply");
                            self.undeliverable();
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.expire();
                }
            }
        }

        let now = self.clock.now();
        for session in self.machine.abort_all(now) {
            self.record(&session);
        }
        tracing::info!(summary = ?self.summary, "watch loop stopped");
        self.summary.clone()
    }

    /// The current slot, if the one-shot mode allows prompting for it.
    fn one_shot_slot(&mut self) -> Option<GapCandidate> {
        let now = self.clock.now();
        let tz = self.clock.offset_at(now);
        let exact_now = self.options.exact_now;

        if self.options.one_shot == OneShot::Bypass {
            return Some(self.scheduler.force_bypass(now, tz, exact_now));
        }

        let slot = self.scheduler.slot_at(now, tz, exact_now);
        if !self.window.contains(slot.start, &tz) {
            tracing::debug!(start = %slot.start, "slot outside the work window");
            return None;
        }
        if self.memory.is_snoozed(now) {
            tracing::debug!(until = ?self.memory.snooze_until, "prompting snoozed");
            return None;
        }
        let slots = self.day_slots(now)?;
        if busy_overlap(&slots, &slot) {
            tracing::debug!(start = %slot.start, "calendar blocks the slot");
            return None;
        }
        Some(slot)
    }

    /// Classified slots for today's work window. `None` when the snapshot
    /// cannot be read or today has no window.
    fn day_slots(&mut self, now: chrono::DateTime<chrono::Utc>) -> Option<Vec<CalendarSlot>> {
        let snapshot = match self.source.load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.summary.poll_failures += 1;
                tracing::warn!(error = %e, kind = ?e.kind(), "snapshot poll failed");
                return None;
            }
        };

        let tz = self.clock.offset_at(now);
        let date = now.with_timezone(&tz).date_naive();
        let (start, end) = self.window.bounds_on(date, &tz)?;
        Some(classify_slots(&snapshot, start, end, self.window.slot_duration(), &self.focus))
    }

    /// One snapshot poll: invalidate stale prompts, then look for a new gap.
    fn poll(&mut self) {
        let now = self.clock.now();
        self.summary.polls += 1;

        let Some(slots) = self.day_slots(now) else {
            return;
        };

        let shown_id = self.machine.shown().map(|s| s.id);
        let stale = self
            .machine
            .invalidate(|gap| !gap.forced && busy_overlap(&slots, gap), now);
        for session in &stale {
            if Some(session.id) == shown_id {
                self.shown_deadline = None;
                if let Err(e) = self.surface.withdraw(session, "calendar changed") {
                    tracing::warn!(error = %e, "failed to withdraw prompt");
                }
            }
            self.record(session);
        }

        // A one-shot only ever asks about its own slot.
        if self.options.one_shot != OneShot::Off {
            return;
        }

        let tz = self.clock.offset_at(now);
        let gate = if !self.window.contains(now, &tz) {
            PromptGate::OutsideWindow
        } else if self.memory.is_snoozed(now) {
            PromptGate::Snoozed
        } else {
            PromptGate::Open
        };

        let machine = &self.machine;
        match self
            .scheduler
            .observe(&slots, now, gate, |key| machine.is_tracked(key))
        {
            Ok(Some(gap)) => {
                self.machine.enqueue(gap, now);
            }
            Ok(None) => {}
            Err(e) => {
                self.summary.poll_failures += 1;
                tracing::warn!(error = %e, kind = ?e.kind(), "gap detection failed");
            }
        }
    }

    fn show_next(&mut self) {
        let now = self.clock.now();
        let Some(session) = self.machine.show_next(now) else {
            return;
        };
        let presented = self.surface.present(session, &self.ctx);
        let (id, start) = (session.id, session.gap.start);

        match presented {
            Ok(()) => {
                self.shown_deadline = Some(Instant::now() + self.options.prompt_timeout);
                self.summary.prompted += 1;
                tracing::info!(session = %id, start = %start, "prompt shown");
            }
            Err(e) => {
                tracing::warn!(session = %id, error = %e, "failed to show prompt");
                self.undeliverable();
            }
        }
    }

    /// The surface failed the shown session: close it and keep polling.
    fn undeliverable(&mut self) {
        self.shown_deadline = None;
        self.summary.surface_failures += 1;
        if let Some(session) = self
            .machine
            .dismiss_shown(DismissReason::Undeliverable, self.clock.now())
        {
            self.record(&session);
        }
    }

    async fn handle_reply(&mut self, reply: PromptReply) {
        let now = self.clock.now();
        self.shown_deadline = None;

        match reply {
            PromptReply::Answer {
                category,
                timecode,
                comment,
            } => {
                let session = match self.machine.answer(category, timecode, comment, now) {
                    Ok(session) => session,
                    Err(e) => {
                        tracing::warn!(error = %e, "answer rejected");
                        return;
                    }
                };
                if self.options.remember_last {
                    if let Some(category) = &session.category_chosen {
                        self.memory.remember(category, session.timecode.as_deref());
                        self.ctx.last_category = Some(category.clone());
                        self.ctx.last_timecode = session.timecode.clone();
                        self.save_memory();
                    }
                }
                match self.writer.submit(&session).await {
                    Ok(outcome) => {
                        self.summary.written += 1;
                        tracing::debug!(?outcome, "submission finished");
                    }
                    Err(e) => {
                        self.summary.write_failures += 1;
                        tracing::error!(session = %session.id, error = %e, "submission failed");
                    }
                }
                self.record(&session);
            }
            PromptReply::Skip => {
                if let Some(session) = self.machine.dismiss_shown(DismissReason::Skipped, now) {
                    self.record(&session);
                }
            }
            PromptReply::Snooze => {
                if let Some(session) = self.machine.dismiss_shown(DismissReason::Snoozed, now) {
                    self.memory.snooze_until = Some(now + self.options.snooze);
                    self.save_memory();
                    tracing::info!(until = ?self.memory.snooze_until, "prompting snoozed");
                    self.record(&session);
                }
            }
        }
    }

    fn expire(&mut self) {
        self.shown_deadline = None;
        if let Some(session) = self.machine.time_out(self.clock.now()) {
            if let Err(e) = self.surface.withdraw(&session, "timed out") {
                tracing::warn!(error = %e, "failed to withdraw prompt");
            }
            tracing::info!(
                session = %session.id,
                minutes = self.options.prompt_timeout.as_secs() / 60,
                "prompt timed out"
            );
            self.record(&session);
        }
    }

    /// Count and archive a terminal session.
    fn record(&mut self, session: &PromptSession) {
        match session.status {
            PromptStatus::Answered => self.summary.answered += 1,
            PromptStatus::TimedOut => self.summary.timed_out += 1,
            PromptStatus::Dismissed => self.summary.dismissed += 1,
            PromptStatus::Pending | PromptStatus::Shown => return,
        }
        if let Some(kind) = session.failure_kind() {
            tracing::debug!(session = %session.id, ?kind, "prompt closed without an answer");
        }
        if let Some(archive) = &self.archive {
            if let Err(e) = archive.append(session) {
                tracing::warn!(path = %archive.path().display(), error = %e, "failed to archive session");
            }
        }
    }

    fn save_memory(&self) {
        if let Some(path) = &self.memory_path {
            if let Err(e) = self.memory.save(path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to save prompt state");
            }
        }
    }
}
