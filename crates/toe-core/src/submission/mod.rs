//! Write-back of answered prompts to the calendar store.
//!
//! Writes are idempotent on (start, end, category): the writer looks the key
//! up before inserting, so retrying after an ambiguous failure never
//! duplicates an entry.

mod writer;

pub use writer::{RetryPolicy, SubmissionWriter, WriteOutcome};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::FocusRule;
use crate::error::WriteError;

/// Identity of a calendar entry for de-duplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryKey {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub category: String,
}

/// An entry to create in the calendar store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEntry {
    pub key: EntryKey,
    pub subject: String,
}

/// External calendar store the writer targets.
pub trait CalendarSink {
    /// Id of an existing entry with the same key, if any.
    fn find(&self, key: &EntryKey) -> Result<Option<String>, WriteError>;

    /// Create the entry and return its id.
    fn insert(&mut self, entry: &CalendarEntry) -> Result<String, WriteError>;

    /// Delete focus placeholders overlapping `[start, end)`.
    fn remove_placeholders(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        rule: &FocusRule,
    ) -> Result<usize, WriteError>;
}
