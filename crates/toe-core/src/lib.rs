//! # TOE Core Library
//!
//! Core logic for TOE, a time-accounting assistant. It watches a calendar
//! snapshot for unaccounted stretches of the working day, asks the user what
//! the time was spent on, writes the answer back to the calendar, and later
//! replays the week's classified entries into a time-tracking web form through
//! an already running browser.
//!
//! ## Architecture
//!
//! - **Calendar**: Snapshot loading and slot classification over the work window
//! - **Gap Detection**: Pure slot list -> gap candidate computation
//! - **Scheduler**: Debounced polling loop deciding when to prompt
//! - **Prompt**: Per-gap session state machine and the prompt surface
//! - **Submission**: Idempotent, retried calendar write-back
//! - **Replay**: Scripted browser steps over the DevTools protocol
//! - **Storage**: TOML configuration, prompt memory and the session archive
//!
//! ## Key Components
//!
//! - [`GapScheduler`]: Debounce and force-bypass rules
//! - [`Watcher`]: The polling/prompting loop
//! - [`PromptMachine`]: Prompt session lifecycle
//! - [`SubmissionWriter`]: Calendar write-back
//! - [`ReplayEngine`]: Step replay with pacing and dry runs
//! - [`Config`]: Application configuration management

pub mod calendar;
pub mod error;
pub mod gap;
pub mod logging;
pub mod prompt;
pub mod replay;
pub mod scheduler;
pub mod storage;
pub mod submission;

pub use calendar::{
    classify_slots, CalendarEvent, CalendarSlot, JsonCalendarStore, JsonSnapshotStore, SlotLabel,
    Snapshot, SnapshotSource, WorkWindow,
};
pub use error::{
    BrowserError, ConfigError, CoreError, FailureKind, ReplayError, SnapshotError, WriteError,
};
pub use gap::{detect_gaps, GapCandidate, GapDetector};
pub use prompt::{PromptMachine, PromptSession, PromptStatus, PromptSurface, TerminalPrompt};
pub use replay::{
    CdpEndpoint, JitterPacer, JobOutcome, PayloadRow, ReplayEngine, ReplayJob, ReplayReport,
    Script,
};
pub use scheduler::{GapScheduler, SchedulerSettings, Watcher};
pub use storage::{Config, PromptMemory, SessionArchive};
pub use submission::{CalendarSink, SubmissionWriter, WriteOutcome};
