//! Per-step results and the job report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::step::StepKind;
use crate::error::FailureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Mutating step in a dry run.
    DryRun,
    /// An earlier step failed.
    Halted,
    /// The job was aborted.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayResult {
    pub row_index: usize,
    pub step_index: usize,
    pub action: StepKind,
    pub target: String,
    #[serde(flatten)]
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded,
    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        row_index: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_index: Option<usize>,
        kind: FailureKind,
        message: String,
    },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub rows: usize,
    pub results: Vec<ReplayResult>,
    #[serde(flatten)]
    pub outcome: JobOutcome,
}

impl ReplayReport {
    pub fn is_success(&self) -> bool {
        self.outcome == JobOutcome::Succeeded
    }

    fn count(&self, pred: impl Fn(&StepStatus) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.status)).count()
    }

    pub fn succeeded_count(&self) -> usize {
        self.count(|s| *s == StepStatus::Succeeded)
    }

    pub fn failed_count(&self) -> usize {
        self.count(|s| *s == StepStatus::Failed)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|s| matches!(s, StepStatus::Skipped(_)))
    }

    pub fn first_failure(&self) -> Option<&ReplayResult> {
        self.results.iter().find(|r| r.status == StepStatus::Failed)
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// Statuses in execution order.
    pub fn statuses(&self) -> Vec<StepStatus> {
        self.results.iter().map(|r| r.status).collect()
    }
}
