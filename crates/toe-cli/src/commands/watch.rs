use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use clap::Args;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use toe_core::calendar::{JsonCalendarStore, JsonSnapshotStore, SnapshotSource};
use toe_core::prompt::{PromptSurface, TerminalPrompt};
use toe_core::scheduler::{Clock, ManualClock, OneShot, SystemClock, WatchOptions, WatchSummary, Watcher};
use toe_core::storage::{data_dir, PromptMemory, SessionArchive};
use toe_core::submission::{CalendarSink, SubmissionWriter};
use toe_core::Config;

#[derive(Args)]
pub struct WatchArgs {
    /// Snapshot JSON written by the calendar loader (defaults to paths.snapshot)
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// Calendar file answers are written to (defaults to paths.calendar)
    #[arg(long)]
    calendar: Option<PathBuf>,
    /// Config file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Ask once about the current slot if the window, snooze and calendar allow it
    #[arg(long, conflicts_with = "force_bypass")]
    force: bool,
    /// Ask once about the current slot, ignoring the calendar and all gating
    #[arg(long)]
    force_bypass: bool,
    /// Run as if the local time were HH:MM today
    #[arg(long, value_name = "HH:MM", value_parser = parse_hhmm)]
    at: Option<NaiveTime>,
    /// One-shot slot starts at the current minute instead of the slot boundary
    #[arg(long)]
    exact_now: bool,
    /// Log entries instead of writing them
    #[arg(long)]
    preview_only: bool,
    /// Seconds between snapshot polls
    #[arg(long)]
    poll_secs: Option<u64>,
    /// Exit after the first prompt closes
    #[arg(long)]
    once: bool,
    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: WatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if args.force_bypass {
        config.scheduler.force_bypass = true;
    }
    if args.preview_only {
        config.writer.preview_only = true;
    }
    if let Some(secs) = args.poll_secs {
        config.scheduler.poll_interval_secs = secs;
    }
    config.validate()?;

    let snapshot = match args.snapshot {
        Some(path) => path,
        None => config.snapshot_path()?,
    };
    let calendar = match args.calendar {
        Some(path) => path,
        None => config.calendar_path()?,
    };
    tracing::info!(
        snapshot = %snapshot.display(),
        calendar = %calendar.display(),
        "Watching calendar"
    );

    let writer = SubmissionWriter::from_config(JsonCalendarStore::new(calendar), &config);
    let memory_path = PromptMemory::default_path();
    let memory = PromptMemory::load(&memory_path);
    let archive = SessionArchive::new(data_dir()?.join("sessions.jsonl"));
    let defaults = WatchOptions::from_config(&config);
    let options = WatchOptions {
        once: args.once,
        exact_now: args.exact_now,
        one_shot: if args.force {
            OneShot::Checked
        } else {
            defaults.one_shot
        },
        ..defaults
    };

    let watcher = Watcher::from_config(
        &config,
        JsonSnapshotStore::new(snapshot),
        TerminalPrompt::stdio(),
        writer,
    )?
    .with_options(options)
    .with_memory(memory, Some(memory_path))
    .with_archive(archive);

    let summary = match args.at {
        Some(time) => {
            let now = today_at(time)?;
            tracing::info!(%now, "Running with a pinned clock");
            let clock = ManualClock::new(now).with_offset(SystemClock.offset_at(now));
            drive(watcher.with_clock(clock))?
        }
        None => drive(watcher)?,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "polls: {}  prompted: {}  answered: {}  written: {}  timed out: {}  dismissed: {}  surface failures: {}",
            summary.polls,
            summary.prompted,
            summary.answered,
            summary.written,
            summary.timed_out,
            summary.dismissed,
            summary.surface_failures
        );
    }
    Ok(())
}

fn drive<S, P, C, K>(mut watcher: Watcher<S, P, C, K>) -> std::io::Result<WatchSummary>
where
    S: SnapshotSource,
    P: PromptSurface,
    C: CalendarSink,
    K: Clock,
{
    Ok(super::runtime()?.block_on(async {
        let cancel = CancellationToken::new();
        super::cancel_on_ctrl_c(cancel.clone());
        watcher.run(cancel).await
    }))
}

fn parse_hhmm(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|_| format!("expected HH:MM, got '{s}'"))
}

/// `time` on today's local date.
fn today_at(time: NaiveTime) -> Result<DateTime<Utc>, String> {
    let date = Local::now().date_naive();
    Local
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| format!("{time} does not exist today in the local time zone"))
}
