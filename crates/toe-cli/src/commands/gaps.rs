use chrono::{DateTime, Local, NaiveDate, Utc};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use toe_core::calendar::{classify_slots, CalendarSlot, JsonSnapshotStore, SnapshotSource};
use toe_core::gap::detect_gaps;
use toe_core::Config;

#[derive(Args)]
pub struct GapsArgs {
    /// Snapshot JSON (defaults to paths.snapshot)
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// Day to inspect, YYYY-MM-DD (defaults to today)
    #[arg(long)]
    date: Option<NaiveDate>,
    /// Minimum gap length in minutes (defaults to scheduler.min_gap_minutes)
    #[arg(long)]
    min: Option<i64>,
    /// Print JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct GapView {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    minutes: i64,
}

#[derive(Serialize)]
struct GapsReport {
    date: NaiveDate,
    slots: Vec<CalendarSlot>,
    gaps: Vec<GapView>,
}

pub fn run(args: GapsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let path = match args.snapshot {
        Some(path) => path,
        None => config.snapshot_path()?,
    };
    let snapshot = JsonSnapshotStore::new(path).load()?;

    let window = config.work_window()?;
    let date = args.date.unwrap_or_else(|| Local::now().date_naive());
    let (start, end) = window
        .bounds_on(date, &Local)
        .ok_or_else(|| format!("work window does not exist on {date} in the local time zone"))?;
    let slots = classify_slots(
        &snapshot,
        start,
        end,
        window.slot_duration(),
        &config.focus_rule(),
    );
    let min = args
        .min
        .unwrap_or_else(|| i64::from(config.scheduler.min_gap_minutes));
    let gaps = detect_gaps(&slots, min)?
        .into_iter()
        .map(|g| GapView {
            start: g.start,
            end: g.end,
            minutes: g.duration_minutes(),
        })
        .collect();

    let report = GapsReport { date, slots, gaps };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{date}  {} slots", report.slots.len());
    for slot in &report.slots {
        println!(
            "  {}-{}  {:?}{}",
            slot.start.with_timezone(&Local).format("%H:%M"),
            slot.end.with_timezone(&Local).format("%H:%M"),
            slot.label,
            slot.category
                .as_deref()
                .map(|c| format!(" [{c}]"))
                .unwrap_or_default()
        );
    }
    if report.gaps.is_empty() {
        println!("no gaps of {min}+ minutes");
    }
    for gap in &report.gaps {
        println!(
            "gap {}-{} ({} min)",
            gap.start.with_timezone(&Local).format("%H:%M"),
            gap.end.with_timezone(&Local).format("%H:%M"),
            gap.minutes
        );
    }
    Ok(())
}
