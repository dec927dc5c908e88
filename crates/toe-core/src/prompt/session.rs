//! Prompt session lifecycle.
//!
//! ## State Transitions
//!
//! ```text
//! Pending -> Shown -> Answered
//!    |         |---> TimedOut
//!    |         '---> Dismissed
//!    '-------------> Dismissed
//! ```
//!
//! Answered, TimedOut and Dismissed are terminal. Any further transition is
//! rejected and leaves the session untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::FailureKind;
use crate::gap::GapCandidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptStatus {
    Pending,
    Shown,
    Answered,
    TimedOut,
    Dismissed,
}

impl PromptStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PromptStatus::Answered | PromptStatus::TimedOut | PromptStatus::Dismissed
        )
    }
}

impl std::fmt::Display for PromptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PromptStatus::Pending => "pending",
            PromptStatus::Shown => "shown",
            PromptStatus::Answered => "answered",
            PromptStatus::TimedOut => "timedout",
            PromptStatus::Dismissed => "dismissed",
        };
        f.write_str(s)
    }
}

/// Why a session was dismissed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DismissReason {
    /// The calendar changed under the gap.
    Invalidated,
    /// The user skipped the prompt.
    Skipped,
    /// The user snoozed prompting.
    Snoozed,
    /// The scheduler shut down with the session still open.
    Aborted,
    /// The prompt surface failed to show the session or read the reply.
    Undeliverable,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("session is already {0}")]
    Terminal(PromptStatus),

    #[error("cannot move from {from} to {to}")]
    Invalid { from: PromptStatus, to: PromptStatus },

    #[error("no prompt is shown")]
    NothingShown,
}

/// One attempt to ask the user about one gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSession {
    pub id: Uuid,
    pub gap: GapCandidate,
    pub status: PromptStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub shown_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category_chosen: Option<String>,
    #[serde(default)]
    pub timecode: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub dismiss_reason: Option<DismissReason>,
}

impl PromptSession {
    pub fn new(gap: GapCandidate, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            gap,
            status: PromptStatus::Pending,
            created_at: now,
            shown_at: None,
            closed_at: None,
            category_chosen: None,
            timecode: None,
            comment: None,
            dismiss_reason: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn guard(&self, allowed: &[PromptStatus], to: PromptStatus) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }
        if !allowed.contains(&self.status) {
            return Err(TransitionError::Invalid {
                from: self.status,
                to,
            });
        }
        Ok(())
    }

    /// Pending -> Shown.
    pub fn show(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.guard(&[PromptStatus::Pending], PromptStatus::Shown)?;
        self.status = PromptStatus::Shown;
        self.shown_at = Some(now);
        Ok(())
    }

    /// Shown -> Answered.
    pub fn answer(
        &mut self,
        category: impl Into<String>,
        timecode: Option<String>,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.guard(&[PromptStatus::Shown], PromptStatus::Answered)?;
        self.status = PromptStatus::Answered;
        self.category_chosen = Some(category.into());
        self.timecode = timecode;
        self.comment = comment.filter(|c| !c.trim().is_empty());
        self.closed_at = Some(now);
        Ok(())
    }

    /// Shown -> TimedOut.
    pub fn time_out(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.guard(&[PromptStatus::Shown], PromptStatus::TimedOut)?;
        self.status = PromptStatus::TimedOut;
        self.closed_at = Some(now);
        Ok(())
    }

    /// How a session that closed without an answer failed, if it did.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match (self.status, self.dismiss_reason) {
            (PromptStatus::TimedOut, _) => Some(FailureKind::UserTimeout),
            (PromptStatus::Dismissed, Some(DismissReason::Invalidated)) => {
                Some(FailureKind::Invalidation)
            }
            _ => None,
        }
    }

    /// Pending or Shown -> Dismissed.
    pub fn dismiss(&mut self, reason: DismissReason, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.guard(
            &[PromptStatus::Pending, PromptStatus::Shown],
            PromptStatus::Dismissed,
        )?;
        self.status = PromptStatus::Dismissed;
        self.dismiss_reason = Some(reason);
        self.closed_at = Some(now);
        Ok(())
    }
}
