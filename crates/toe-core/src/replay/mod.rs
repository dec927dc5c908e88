//! Scripted step replay against an attached browser.
//!
//! A [`Script`] of [`ActionStep`]s is run once per [`PayloadRow`] by the
//! [`ReplayEngine`], which paces steps with a [`Pacer`], drives a
//! [`BrowserSession`] (normally a [`CdpSession`] found through a
//! [`CdpEndpoint`]) and collects a [`ReplayReport`].

mod browser;
mod cdp;
mod engine;
mod pacing;
mod payload;
mod report;
mod step;

pub use browser::{Attach, BrowserSession};
pub use cdp::{CdpEndpoint, CdpSession, SCAN_PORTS};
pub use engine::{ReplayEngine, ReplayJob};
pub use pacing::{FixedPacer, JitterPacer, Pacer};
pub use payload::{
    extract_issue, load_payload, minutes_to_hm_str, parse_payload, CapacitySummary, PayloadFilter,
    PayloadRow,
};
pub use report::{JobOutcome, ReplayReport, ReplayResult, SkipReason, StepStatus};
pub use step::{render_template, ActionStep, Script, StepKind};
