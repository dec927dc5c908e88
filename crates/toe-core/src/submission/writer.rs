//! Retried, idempotent calendar writes.

use std::collections::BTreeMap;
use std::time::Duration;

use super::{CalendarEntry, CalendarSink, EntryKey};
use crate::calendar::FocusRule;
use crate::error::{FailureKind, WriteError};
use crate::prompt::{PromptSession, PromptStatus};
use crate::storage::Config;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base: Duration::from_millis(500),
            max: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1),
    /// capped at `max`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Created(String),
    /// An entry with the same key already existed; nothing was written.
    AlreadyPresent(String),
    /// Preview mode: the entry was logged, not written.
    Previewed(CalendarEntry),
}

pub struct SubmissionWriter<C> {
    sink: C,
    policy: RetryPolicy,
    focus: FocusRule,
    preview_only: bool,
    /// Prompt category name to calendar category.
    category_map: BTreeMap<String, String>,
}

impl<C: CalendarSink> SubmissionWriter<C> {
    pub fn new(sink: C) -> Self {
        Self {
            sink,
            policy: RetryPolicy::default(),
            focus: FocusRule::default(),
            preview_only: false,
            category_map: BTreeMap::new(),
        }
    }

    /// Build a writer from the `[writer]`, `[prompt]` and `[categories]`
    /// config sections.
    pub fn from_config(sink: C, config: &Config) -> Self {
        let category_map = config
            .categories
            .keys()
            .map(|name| (name.clone(), config.calendar_category(name)))
            .collect();
        Self {
            sink,
            policy: RetryPolicy {
                max_attempts: config.writer.max_attempts,
                base: Duration::from_millis(config.writer.backoff_base_ms),
                max: Duration::from_millis(config.writer.backoff_max_ms),
            },
            focus: config.focus_rule(),
            preview_only: config.writer.preview_only,
            category_map,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_preview_only(mut self, preview_only: bool) -> Self {
        self.preview_only = preview_only;
        self
    }

    pub fn with_focus_rule(mut self, focus: FocusRule) -> Self {
        self.focus = focus;
        self
    }

    pub fn sink(&self) -> &C {
        &self.sink
    }

    /// Entry that `session` would produce.
    pub fn entry_for(&self, session: &PromptSession) -> Result<CalendarEntry, WriteError> {
        let category = match (&session.status, &session.category_chosen) {
            (PromptStatus::Answered, Some(c)) => c,
            _ => return Err(WriteError::NotAnswered(session.id)),
        };
        let calendar_category = self
            .category_map
            .get(category)
            .cloned()
            .unwrap_or_else(|| category.clone());
        let subject = session
            .comment
            .clone()
            .unwrap_or_else(|| category.clone());

        Ok(CalendarEntry {
            key: EntryKey {
                start: session.gap.start,
                end: session.gap.end,
                category: calendar_category,
            },
            subject,
        })
    }

    /// Persist an answered session, retrying transient failures. Anything
    /// else (a corrupt store, say) fails on the first attempt.
    pub async fn submit(&mut self, session: &PromptSession) -> Result<WriteOutcome, WriteError> {
        let entry = self.entry_for(session)?;

        if self.preview_only {
            tracing::info!(
                start = %entry.key.start,
                end = %entry.key.end,
                category = %entry.key.category,
                subject = %entry.subject,
                "preview only, entry not written"
            );
            return Ok(WriteOutcome::Previewed(entry));
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_write(&entry) {
                Ok(outcome) => {
                    tracing::info!(session = %session.id, attempt, ?outcome, "calendar entry written");
                    return Ok(outcome);
                }
                Err(e) if e.kind() != FailureKind::TransientIo => {
                    tracing::error!(session = %session.id, attempt, error = %e, "calendar write failed");
                    return Err(e);
                }
                Err(e) if attempt < max_attempts => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        session = %session.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "calendar write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!(session = %session.id, attempts = attempt, error = %e, "calendar write abandoned");
                    return Err(WriteError::Exhausted {
                        attempts: attempt,
                        last: e.to_string(),
                    });
                }
            }
        }
    }

    fn try_write(&mut self, entry: &CalendarEntry) -> Result<WriteOutcome, WriteError> {
        if let Some(id) = self.sink.find(&entry.key)? {
            return Ok(WriteOutcome::AlreadyPresent(id));
        }
        let removed = self
            .sink
            .remove_placeholders(entry.key.start, entry.key.end, &self.focus)?;
        if removed > 0 {
            tracing::debug!(removed, "focus placeholders removed");
        }
        self.sink.insert(entry).map(WriteOutcome::Created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gap::GapCandidate;
    use chrono::{DateTime, TimeZone, Utc};

    /// Sink that fails the first `failures` inserts. A failure can land after
    /// the write, like a timeout on a request that did go through.
    #[derive(Default)]
    struct FlakySink {
        entries: Vec<(String, CalendarEntry)>,
        failures: u32,
        fail_after_write: bool,
        corrupt: bool,
        insert_calls: u32,
    }

    impl CalendarSink for FlakySink {
        fn find(&self, key: &EntryKey) -> Result<Option<String>, WriteError> {
            Ok(self
                .entries
                .iter()
                .find(|(_, e)| &e.key == key)
                .map(|(id, _)| id.clone()))
        }

        fn insert(&mut self, entry: &CalendarEntry) -> Result<String, WriteError> {
            self.insert_calls += 1;
            let id = format!("evt-{}", self.insert_calls);
            if self.corrupt {
                return Err(WriteError::Corrupt("unexpected token at line 1".into()));
            }
            if self.failures > 0 {
                self.failures -= 1;
                if self.fail_after_write {
                    self.entries.push((id, entry.clone()));
                }
                return Err(WriteError::Unavailable("timeout".into()));
            }
            self.entries.push((id.clone(), entry.clone()));
            Ok(id)
        }

        fn remove_placeholders(
            &mut self,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _rule: &FocusRule,
        ) -> Result<usize, WriteError> {
            Ok(0)
        }
    }

    fn answered(category: &str) -> PromptSession {
        let start = Utc.with_ymd_and_hms(2025, 11, 3, 10, 0, 0).unwrap();
        let gap = GapCandidate::new(start, start + chrono::Duration::minutes(30));
        let mut session = PromptSession::new(gap, start);
        session.show(start).unwrap();
        session
            .answer(category, None, Some("Reviewing PRs".into()), start)
            .unwrap();
        session
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base: Duration::from_millis(500),
            max: Duration::from_secs(3),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(4), Duration::from_secs(3));
        assert_eq!(policy.delay_for(40), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let sink = FlakySink {
            failures: 2,
            ..Default::default()
        };
        let mut writer = SubmissionWriter::new(sink);
        let outcome = writer.submit(&answered("Deep Work")).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Created("evt-3".into()));
        assert_eq!(writer.sink().entries.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ambiguous_failure_does_not_duplicate() {
        let sink = FlakySink {
            failures: 1,
            fail_after_write: true,
            ..Default::default()
        };
        let mut writer = SubmissionWriter::new(sink);
        let outcome = writer.submit(&answered("Deep Work")).await.unwrap();
        assert_eq!(outcome, WriteOutcome::AlreadyPresent("evt-1".into()));
        assert_eq!(writer.sink().entries.len(), 1);
        assert_eq!(writer.sink().insert_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn resubmitting_is_idempotent() {
        let mut writer = SubmissionWriter::new(FlakySink::default());
        let session = answered("Deep Work");
        writer.submit(&session).await.unwrap();
        let again = writer.submit(&session).await.unwrap();
        assert!(matches!(again, WriteOutcome::AlreadyPresent(_)));
        assert_eq!(writer.sink().entries.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let sink = FlakySink {
            failures: 10,
            ..Default::default()
        };
        let mut writer = SubmissionWriter::new(sink).with_policy(RetryPolicy {
            max_attempts: 3,
            base: Duration::from_millis(10),
            max: Duration::from_millis(40),
        });
        let err = writer.submit(&answered("Deep Work")).await.unwrap_err();
        assert!(matches!(err, WriteError::Exhausted { attempts: 3, .. }));
        assert_eq!(writer.sink().insert_calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn corrupt_store_is_not_retried() {
        let sink = FlakySink {
            corrupt: true,
            ..Default::default()
        };
        let mut writer = SubmissionWriter::new(sink);
        let err = writer.submit(&answered("Deep Work")).await.unwrap_err();
        assert!(matches!(err, WriteError::Corrupt(_)), "{err:?}");
        assert_eq!(writer.sink().insert_calls, 1);
    }

    #[tokio::test]
    async fn preview_mode_writes_nothing() {
        let mut writer = SubmissionWriter::new(FlakySink::default()).with_preview_only(true);
        let outcome = writer.submit(&answered("Admin")).await.unwrap();
        assert!(matches!(outcome, WriteOutcome::Previewed(ref e) if e.subject == "Reviewing PRs"));
        assert_eq!(writer.sink().insert_calls, 0);
    }

    #[tokio::test]
    async fn unanswered_session_is_rejected() {
        let start = Utc::now();
        let session = PromptSession::new(GapCandidate::new(start, start + chrono::Duration::minutes(30)), start);
        let mut writer = SubmissionWriter::new(FlakySink::default());
        assert!(matches!(
            writer.submit(&session).await,
            Err(WriteError::NotAnswered(id)) if id == session.id
        ));
    }

    #[test]
    fn maps_category_through_config() {
        let mut config = Config::default();
        config.categories.insert(
            "Deep Work".into(),
            crate::storage::CategoryConfig {
                outlook_category: Some("Blue Category".into()),
                jira_timecodes: vec![],
            },
        );
        let writer = SubmissionWriter::from_config(FlakySink::default(), &config);
        let entry = writer.entry_for(&answered("Deep Work")).unwrap();
        assert_eq!(entry.key.category, "Blue Category");
        let entry = writer.entry_for(&answered("Unlisted")).unwrap();
        assert_eq!(entry.key.category, "Unlisted");
    }
}
