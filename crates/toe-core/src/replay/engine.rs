//! Step replay engine.
//!
//! Runs every step of a script once per payload row, strictly in order,
//! against one exclusively borrowed browser session.
//!
//! ## Step Outcomes
//!
//! ```text
//! step ok                  -> Succeeded
//! step error               -> Failed, every later step (later rows too) -> Skipped(Halted)
//! dry run + mutating step  -> selector looked up, Skipped(DryRun)
//! cancel token fired       -> current and later steps -> Skipped(Cancelled)
//! ```
//!
//! The job outcome is `Succeeded` only when no step failed and nothing was
//! cancelled.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::browser::{Attach, BrowserSession};
use super::pacing::{JitterPacer, Pacer};
use super::payload::PayloadRow;
use super::report::{JobOutcome, ReplayReport, ReplayResult, SkipReason, StepStatus};
use super::step::{ActionStep, Script};
use crate::error::{BrowserError, ReplayError};
use crate::storage::config::ReplayConfig;

/// A script plus the rows it is replayed for.
#[derive(Debug, Clone)]
pub struct ReplayJob {
    pub script: Script,
    /// Empty means the script runs once with no payload.
    pub rows: Vec<PayloadRow>,
    pub dry_run: bool,
    pub step_timeout_ms: u64,
}

impl ReplayJob {
    pub fn new(script: Script, rows: Vec<PayloadRow>) -> Self {
        Self {
            script,
            rows,
            dry_run: false,
            step_timeout_ms: 20_000,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_step_timeout(mut self, timeout_ms: u64) -> Self {
        self.step_timeout_ms = timeout_ms;
        self
    }

    /// Total number of step executions.
    pub fn step_count(&self) -> usize {
        self.script.len() * self.rows.len().max(1)
    }
}

pub struct ReplayEngine<P = JitterPacer> {
    pacer: P,
    screenshot_dir: Option<PathBuf>,
    cancel: CancellationToken,
}

impl ReplayEngine<JitterPacer> {
    pub fn from_config(config: &ReplayConfig, seed: Option<u64>) -> Self {
        Self::new(JitterPacer::new(config.delay_base_ms, config.jitter_ms, seed))
            .with_screenshot_dir(config.screenshot_dir.as_ref().map(PathBuf::from))
    }
}

impl<P: Pacer> ReplayEngine<P> {
    pub fn new(pacer: P) -> Self {
        Self {
            pacer,
            screenshot_dir: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Where failure screenshots are written. `None` disables them.
    pub fn with_screenshot_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.screenshot_dir = dir;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Attach, run, then release the session.
    ///
    /// An endpoint that cannot be reached fails the job before any step.
    pub async fn run_attached<A: Attach>(&mut self, job: &ReplayJob, attach: &A) -> ReplayReport {
        let started_at = Utc::now();
        match attach.attach().await {
            Ok(mut session) => {
                let report = self.run(job, &mut session).await;
                session.release().await;
                report
            }
            Err(e) => {
                tracing::error!(error = %e, "Could not attach to browser");
                ReplayReport {
                    started_at,
                    finished_at: Utc::now(),
                    dry_run: job.dry_run,
                    rows: job.rows.len(),
                    results: Vec::new(),
                    outcome: JobOutcome::Failed {
                        row_index: None,
                        step_index: None,
                        kind: e.kind(),
                        message: e.to_string(),
                    },
                }
            }
        }
    }

    pub async fn run<B: BrowserSession>(&mut self, job: &ReplayJob, browser: &mut B) -> ReplayReport {
        let started_at = Utc::now();
        let empty = [PayloadRow::default()];
        let rows: &[PayloadRow] = if job.rows.is_empty() { &empty } else { &job.rows };

        tracing::info!(
            steps = job.script.len(),
            rows = rows.len(),
            dry_run = job.dry_run,
            "Starting replay"
        );

        let mut results = Vec::with_capacity(job.step_count());
        let mut outcome = JobOutcome::Succeeded;
        let mut halted: Option<SkipReason> = None;
        let mut first = true;

        for (row_index, row) in rows.iter().enumerate() {
            if halted.is_none() && !row.summary.is_empty() {
                tracing::info!(row = row_index, "{}", row.summary);
            }
            for (step_index, step) in job.script.steps.iter().enumerate() {
                let mut result = ReplayResult {
                    row_index,
                    step_index,
                    action: step.kind(),
                    target: step.target(),
                    status: StepStatus::Succeeded,
                    error: None,
                    error_kind: None,
                    screenshot: None,
                };

                if let Some(reason) = halted {
                    result.status = StepStatus::Skipped(reason);
                    results.push(result);
                    continue;
                }

                if !first {
                    let delay = self.pacer.next_delay();
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => {}
                    }
                }
                first = false;

                let executed = if self.cancel.is_cancelled() {
                    None
                } else {
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => None,
                        status = execute(step, step_index, row, browser, job) => Some(status),
                    }
                };

                match executed {
                    None => {
                        tracing::warn!(row = row_index, step = step_index, "Replay cancelled");
                        result.status = StepStatus::Skipped(SkipReason::Cancelled);
                        outcome = JobOutcome::Cancelled;
                        halted = Some(SkipReason::Cancelled);
                    }
                    Some(Ok(status)) => {
                        tracing::info!(
                            row = row_index,
                            step = step_index,
                            action = %result.action,
                            target = %result.target,
                            ?status,
                            "Step done"
                        );
                        result.status = status;
                    }
                    Some(Err(e)) => {
                        tracing::error!(
                            row = row_index,
                            step = step_index,
                            action = %result.action,
                            target = %result.target,
                            error = %e,
                            "Step failed"
                        );
                        result.status = StepStatus::Failed;
                        result.error = Some(e.to_string());
                        result.error_kind = Some(e.kind());
                        result.screenshot = self.capture(browser, row_index, step_index).await;
                        outcome = JobOutcome::Failed {
                            row_index: Some(row_index),
                            step_index: Some(step_index),
                            kind: e.kind(),
                            message: e.to_string(),
                        };
                        halted = Some(SkipReason::Halted);
                    }
                }
                results.push(result);
            }
        }

        let report = ReplayReport {
            started_at,
            finished_at: Utc::now(),
            dry_run: job.dry_run,
            rows: job.rows.len(),
            results,
            outcome,
        };
        tracing::info!(
            succeeded = report.succeeded_count(),
            failed = report.failed_count(),
            skipped = report.skipped_count(),
            "Replay finished"
        );
        report
    }

    /// Best-effort failure screenshot; returns the file path on success.
    async fn capture<B: BrowserSession>(
        &self,
        browser: &mut B,
        row_index: usize,
        step_index: usize,
    ) -> Option<String> {
        let dir = self.screenshot_dir.as_deref()?;
        let bytes = match browser.screenshot().await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "Failure screenshot not taken");
                return None;
            }
        };
        let name = format!(
            "toe_fail_row{row_index}_step{step_index}_{}.png",
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        match write_file(dir, &name, &bytes) {
            Ok(path) => {
                tracing::info!(path = %path.display(), "Saved failure screenshot");
                Some(path.display().to_string())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failure screenshot not saved");
                None
            }
        }
    }
}

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);
    std::fs::write(&path, bytes)?;
    Ok(path)
}

/// Bind, validate and run one step.
async fn execute<B: BrowserSession>(
    step: &ActionStep,
    index: usize,
    row: &PayloadRow,
    browser: &mut B,
    job: &ReplayJob,
) -> Result<StepStatus, ReplayError> {
    let bound = step.bind(row)?;
    bound.validate(index)?;
    let timeout = job.step_timeout_ms;

    if job.dry_run && bound.kind().is_mutating() {
        if let Some(selector) = bound.selector() {
            if !browser.has_selector(selector).await? {
                return Err(ReplayError::MalformedStep {
                    index,
                    message: format!("selector '{selector}' is not valid in this page"),
                });
            }
        }
        return Ok(StepStatus::Skipped(SkipReason::DryRun));
    }

    let value = |value: Option<String>| {
        value.ok_or_else(|| ReplayError::MalformedStep {
            index,
            message: "no value to enter".into(),
        })
    };

    match bound {
        ActionStep::Navigate { url } => browser.navigate(&url, timeout).await?,
        ActionStep::Click { selector } => {
            browser.wait_visible(&selector, timeout).await?;
            browser.click(&selector).await?;
        }
        ActionStep::Fill {
            selector, value: v, ..
        } => {
            let v = value(v)?;
            browser.wait_visible(&selector, timeout).await?;
            browser.fill(&selector, &v).await?;
        }
        ActionStep::Select {
            selector, value: v, ..
        } => {
            let v = value(v)?;
            browser.wait_visible(&selector, timeout).await?;
            browser.select(&selector, &v).await?;
        }
        ActionStep::Press { selector, key } => {
            browser.wait_visible(&selector, timeout).await?;
            browser.press(&selector, &key).await?;
        }
        ActionStep::Tab {
            selector,
            count,
            shift,
        } => {
            if let Some(selector) = selector {
                browser.wait_visible(&selector, timeout).await?;
                browser.click(&selector).await?;
            }
            browser.tab(count, shift).await?;
        }
        ActionStep::Submit { selector } => browser.submit(&selector, timeout).await?,
        ActionStep::Wait {
            selector,
            ms,
            timeout_ms,
        } => {
            if let Some(ms) = ms {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            if let Some(selector) = selector {
                browser
                    .wait_visible(&selector, timeout_ms.unwrap_or(timeout))
                    .await?;
            }
        }
        ActionStep::Assert {
            selector,
            text,
            url_contains,
        } => {
            if let Some(fragment) = url_contains {
                let url = browser.current_url().await?;
                if !url.contains(&fragment) {
                    return Err(ReplayError::AssertionFailed(format!(
                        "url '{url}' does not contain '{fragment}'"
                    )));
                }
            }
            if let Some(selector) = selector {
                let found = browser.text_content(&selector).await?;
                match (found, text) {
                    (None, _) => {
                        return Err(ReplayError::Browser(BrowserError::ElementNotFound(selector)))
                    }
                    (Some(found), Some(expected)) if !found.contains(&expected) => {
                        return Err(ReplayError::AssertionFailed(format!(
                            "'{selector}' shows '{}', expected '{expected}'",
                            found.trim()
                        )));
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(StepStatus::Succeeded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::replay::pacing::FixedPacer;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Records every call; selectors in `failing` make actions fail.
    #[derive(Default)]
    struct FakeBrowser {
        calls: Vec<String>,
        releases: Arc<AtomicUsize>,
        failing: HashSet<String>,
        invalid: HashSet<String>,
        url: String,
        cancel_on: Option<(String, CancellationToken)>,
    }

    impl FakeBrowser {
        fn failing(selectors: &[&str]) -> Self {
            Self {
                failing: selectors.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }

        fn act(&mut self, call: String, selector: &str) -> Result<(), BrowserError> {
            self.calls.push(call);
            if let Some((target, token)) = &self.cancel_on {
                if target == selector {
                    token.cancel();
                }
            }
            if self.failing.contains(selector) {
                return Err(BrowserError::ElementNotFound(selector.to_string()));
            }
            Ok(())
        }

        fn mutations(&self) -> Vec<&String> {
            self.calls
                .iter()
                .filter(|c| {
                    ["click", "fill", "select", "press", "tab", "submit"]
                        .iter()
                        .any(|m| c.starts_with(&format!("{m}:")))
                })
                .collect()
        }
    }

    impl BrowserSession for FakeBrowser {
        async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<(), BrowserError> {
            self.url = url.to_string();
            self.act(format!("navigate:{url}"), url)
        }
        async fn wait_visible(&mut self, selector: &str, _timeout_ms: u64) -> Result<(), BrowserError> {
            self.act(format!("wait:{selector}"), selector)
        }
        async fn click(&mut self, selector: &str) -> Result<(), BrowserError> {
            self.act(format!("click:{selector}"), selector)
        }
        async fn fill(&mut self, selector: &str, value: &str) -> Result<(), BrowserError> {
            self.act(format!("fill:{selector}={value}"), selector)
        }
        async fn select(&mut self, selector: &str, value: &str) -> Result<(), BrowserError> {
            self.act(format!("select:{selector}={value}"), selector)
        }
        async fn press(&mut self, selector: &str, key: &str) -> Result<(), BrowserError> {
            self.act(format!("press:{selector}:{key}"), selector)
        }
        async fn tab(&mut self, count: u32, shift: bool) -> Result<(), BrowserError> {
            self.act(format!("tab:{count}:{shift}"), "")
        }
        async fn submit(&mut self, selector: &str, _timeout_ms: u64) -> Result<(), BrowserError> {
            self.act(format!("submit:{selector}"), selector)
        }
        async fn has_selector(&mut self, selector: &str) -> Result<bool, BrowserError> {
            self.calls.push(format!("lookup:{selector}"));
            Ok(!self.invalid.contains(selector))
        }
        async fn text_content(&mut self, selector: &str) -> Result<Option<String>, BrowserError> {
            self.calls.push(format!("text:{selector}"));
            Ok((!self.failing.contains(selector)).then(|| "Work logged".to_string()))
        }
        async fn current_url(&mut self) -> Result<String, BrowserError> {
            Ok(self.url.clone())
        }
        async fn screenshot(&mut self) -> Result<Vec<u8>, BrowserError> {
            Ok(vec![0x89, b'P', b'N', b'G'])
        }
        async fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn click(selector: &str) -> ActionStep {
        ActionStep::Click {
            selector: selector.into(),
        }
    }

    fn engine() -> ReplayEngine<FixedPacer> {
        ReplayEngine::new(FixedPacer(Duration::ZERO))
    }

    fn job(steps: Vec<ActionStep>) -> ReplayJob {
        ReplayJob::new(Script::new(steps).unwrap(), Vec::new())
    }

    #[tokio::test]
    async fn failure_halts_the_rest() {
        let mut browser = FakeBrowser::failing(&["#b"]);
        let steps = vec![click("#a"), click("#b"), click("#c")];
        let rows = vec![
            PayloadRow::from_pairs([("issue", "DXG-1")]),
            PayloadRow::from_pairs([("issue", "DXG-2")]),
        ];
        let job = ReplayJob::new(Script::new(steps).unwrap(), rows);

        let report = engine().run(&job, &mut browser).await;

        let halted = StepStatus::Skipped(SkipReason::Halted);
        assert_eq!(
            report.statuses(),
            vec![
                StepStatus::Succeeded,
                StepStatus::Failed,
                halted,
                halted,
                halted,
                halted
            ]
        );
        assert!(matches!(
            report.outcome,
            JobOutcome::Failed {
                row_index: Some(0),
                step_index: Some(1),
                ..
            }
        ));
        assert!(!browser.calls.contains(&"click:#c".to_string()));
    }

    #[tokio::test]
    async fn dry_run_never_mutates() {
        let mut browser = FakeBrowser::default();
        let steps = vec![
            ActionStep::Navigate {
                url: "https://jira.example.com/tempo".into(),
            },
            click("#log-work"),
            ActionStep::Fill {
                selector: "#issue".into(),
                value: Some("{{issue}}".into()),
                field: None,
            },
            ActionStep::Tab {
                selector: None,
                count: 2,
                shift: false,
            },
            ActionStep::Submit {
                selector: "form".into(),
            },
            ActionStep::Assert {
                selector: None,
                text: None,
                url_contains: Some("tempo".into()),
            },
        ];
        let rows = vec![PayloadRow::from_pairs([("issue", "DXG-1")])];
        let job = ReplayJob::new(Script::new(steps).unwrap(), rows).with_dry_run(true);

        let report = engine().run(&job, &mut browser).await;

        assert!(report.is_success());
        assert!(browser.mutations().is_empty(), "{:?}", browser.calls);
        assert!(browser.calls.contains(&"navigate:https://jira.example.com/tempo".to_string()));
        assert!(browser.calls.contains(&"lookup:#issue".to_string()));
        let dry = StepStatus::Skipped(SkipReason::DryRun);
        assert_eq!(
            report.statuses(),
            vec![StepStatus::Succeeded, dry, dry, dry, dry, StepStatus::Succeeded]
        );
    }

    #[tokio::test]
    async fn dry_run_reports_unresolvable_selector() {
        let mut browser = FakeBrowser {
            invalid: ["#bad[".to_string()].into_iter().collect(),
            ..FakeBrowser::default()
        };
        let job = job(vec![click("#bad[")]).with_dry_run(true);

        let report = engine().run(&job, &mut browser).await;

        assert_eq!(report.statuses(), vec![StepStatus::Failed]);
        assert!(browser.mutations().is_empty());
    }

    #[tokio::test]
    async fn missing_payload_key_fails_without_typing() {
        let mut browser = FakeBrowser::default();
        let steps = vec![ActionStep::Fill {
            selector: "#timecode".into(),
            value: None,
            field: Some("TimeCode".into()),
        }];
        let rows = vec![PayloadRow::from_pairs([("issue", "DXG-1")])];
        let job = ReplayJob::new(Script::new(steps).unwrap(), rows);

        let report = engine().run(&job, &mut browser).await;

        let failure = report.first_failure().unwrap();
        assert_eq!(failure.error_kind, Some(FailureKind::DataIntegrity));
        assert!(failure.error.as_deref().unwrap().contains("TimeCode"));
        assert!(matches!(
            report.outcome,
            JobOutcome::Failed {
                kind: FailureKind::DataIntegrity,
                ..
            }
        ));
        assert!(browser.calls.is_empty());
    }

    #[tokio::test]
    async fn fill_uses_bound_row_value() {
        let mut browser = FakeBrowser::default();
        let steps = vec![ActionStep::Fill {
            selector: "#comment".into(),
            value: None,
            field: Some("subject".into()),
        }];
        let rows = vec![PayloadRow::from_pairs([("subject", "Sprint planning")])];
        let job = ReplayJob::new(Script::new(steps).unwrap(), rows);

        let report = engine().run(&job, &mut browser).await;

        assert!(report.is_success());
        assert!(browser.calls.contains(&"fill:#comment=Sprint planning".to_string()));
    }

    #[tokio::test]
    async fn assert_checks_text() {
        let mut browser = FakeBrowser::default();
        let ok = job(vec![ActionStep::Assert {
            selector: Some(".aui-message".into()),
            text: Some("logged".into()),
            url_contains: None,
        }]);
        assert!(engine().run(&ok, &mut browser).await.is_success());

        let wrong = job(vec![ActionStep::Assert {
            selector: Some(".aui-message".into()),
            text: Some("rejected".into()),
            url_contains: None,
        }]);
        let report = engine().run(&wrong, &mut browser).await;
        assert_eq!(report.failed_count(), 1);
    }

    #[tokio::test]
    async fn cancellation_skips_remaining_steps() {
        let token = CancellationToken::new();
        let mut browser = FakeBrowser {
            cancel_on: Some(("#b".into(), token.clone())),
            ..FakeBrowser::default()
        };
        let job = job(vec![click("#a"), click("#b"), click("#c")]);
        let mut engine = engine().with_cancel(token);

        let report = engine.run(&job, &mut browser).await;

        let cancelled = StepStatus::Skipped(SkipReason::Cancelled);
        assert_eq!(
            report.statuses(),
            vec![StepStatus::Succeeded, StepStatus::Succeeded, cancelled]
        );
        assert_eq!(report.outcome, JobOutcome::Cancelled);
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn cancelled_before_start_runs_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let mut browser = FakeBrowser::default();
        let job = job(vec![click("#a"), click("#b")]);

        let report = engine().with_cancel(token).run(&job, &mut browser).await;

        assert_eq!(report.skipped_count(), 2);
        assert!(browser.calls.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_applies_between_steps_only() {
        let mut browser = FakeBrowser::default();
        let job = job(vec![click("#a"), click("#b"), click("#c")]);
        let mut engine = ReplayEngine::new(FixedPacer(Duration::from_millis(500)));

        let start = tokio::time::Instant::now();
        let report = engine.run(&job, &mut browser).await;
        let elapsed = start.elapsed();

        assert!(report.is_success());
        assert!(elapsed >= Duration::from_millis(1000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1500), "{elapsed:?}");
    }

    #[tokio::test]
    async fn failure_screenshot_is_saved() {
        let dir = tempfile::tempdir().unwrap();
        let mut browser = FakeBrowser::failing(&["#save"]);
        let job = job(vec![click("#save")]);
        let mut engine = engine().with_screenshot_dir(Some(dir.path().to_path_buf()));

        let report = engine.run(&job, &mut browser).await;

        let path = report.first_failure().and_then(|r| r.screenshot.clone()).unwrap();
        assert!(path.contains("toe_fail_row0_step0_"));
        assert!(std::path::Path::new(&path).exists());
    }

    struct Unreachable;

    impl Attach for Unreachable {
        type Session = FakeBrowser;

        async fn attach(&self) -> Result<FakeBrowser, ReplayError> {
            Err(ReplayError::Connectivity("127.0.0.1:9222".into()))
        }
    }

    #[tokio::test]
    async fn unreachable_browser_fails_before_any_step() {
        let job = job(vec![click("#a")]);
        let report = engine().run_attached(&job, &Unreachable).await;

        assert!(report.results.is_empty());
        assert!(matches!(
            report.outcome,
            JobOutcome::Failed {
                kind: FailureKind::Connectivity,
                step_index: None,
                ..
            }
        ));
    }

    /// Hands out a fresh browser sharing one release counter.
    struct Reachable {
        failing: &'static [&'static str],
        releases: Arc<AtomicUsize>,
    }

    impl Attach for Reachable {
        type Session = FakeBrowser;

        async fn attach(&self) -> Result<FakeBrowser, ReplayError> {
            Ok(FakeBrowser {
                releases: self.releases.clone(),
                ..FakeBrowser::failing(self.failing)
            })
        }
    }

    #[tokio::test]
    async fn attached_session_is_released_on_every_outcome() {
        let releases = Arc::new(AtomicUsize::new(0));

        let ok = Reachable {
            failing: &[],
            releases: releases.clone(),
        };
        let report = engine().run_attached(&job(vec![click("#a")]), &ok).await;
        assert!(report.is_success());
        assert_eq!(releases.load(Ordering::SeqCst), 1);

        let broken = Reachable {
            failing: &["#a"],
            releases: releases.clone(),
        };
        let report = engine().run_attached(&job(vec![click("#a"), click("#b")]), &broken).await;
        assert!(!report.is_success());
        assert_eq!(releases.load(Ordering::SeqCst), 2);

        let mut cancelled = engine();
        cancelled.cancel_token().cancel();
        let report = cancelled.run_attached(&job(vec![click("#a")]), &ok).await;
        assert_eq!(report.outcome, JobOutcome::Cancelled);
        assert_eq!(releases.load(Ordering::SeqCst), 3);
    }

    proptest! {
        #[test]
        fn statuses_follow_first_failure(fails in proptest::collection::vec(any::<bool>(), 1..12)) {
            let steps: Vec<_> = (0..fails.len()).map(|i| click(&format!("#s{i}"))).collect();
            let failing: Vec<String> = fails
                .iter()
                .enumerate()
                .filter(|(_, f)| **f)
                .map(|(i, _)| format!("#s{i}"))
                .collect();
            let mut browser = FakeBrowser {
                failing: failing.into_iter().collect(),
                ..FakeBrowser::default()
            };
            let job = job(steps);
            let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
            let report = rt.block_on(engine().run(&job, &mut browser));

            let statuses = report.statuses();
            prop_assert_eq!(statuses.len(), fails.len());
            match fails.iter().position(|f| *f) {
                Some(first) => {
                    prop_assert!(statuses[..first].iter().all(|s| *s == StepStatus::Succeeded));
                    prop_assert_eq!(statuses[first], StepStatus::Failed);
                    prop_assert!(statuses[first + 1..]
                        .iter()
                        .all(|s| *s == StepStatus::Skipped(SkipReason::Halted)));
                    prop_assert!(!report.is_success());
                }
                None => prop_assert!(report.is_success()),
            }
        }
    }
}
