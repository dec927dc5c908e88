use clap::Args;
use rand::Rng;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use toe_core::replay::{
    load_payload, CapacitySummary, CdpEndpoint, JobOutcome, PayloadFilter, PayloadRow,
    ReplayEngine, ReplayJob, ReplayReport, Script, StepStatus,
};
use toe_core::Config;

const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const CANCELED_PREVIEW: usize = 5;

#[derive(Args)]
pub struct ReplayArgs {
    /// Step script JSON (`{"steps": [...]}`)
    script: PathBuf,
    /// Payload JSON: the weekly export or an array of rows
    #[arg(long)]
    payload: Option<PathBuf>,
    /// Only rows for this date key (e.g. 03/Nov/25)
    #[arg(long)]
    date: Option<String>,
    /// Replay at most this many rows
    #[arg(long)]
    limit: Option<usize>,
    /// DevTools endpoint (defaults to replay.endpoint)
    #[arg(long)]
    endpoint: Option<String>,
    /// Do not scan ports 9222-9225 when the endpoint does not answer
    #[arg(long)]
    no_scan: bool,
    /// Validate every step without mutating the page
    #[arg(long)]
    dry_run: bool,
    /// Base delay between steps in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,
    /// Extra random delay between steps, 0..=jitter milliseconds
    #[arg(long)]
    jitter_ms: Option<u64>,
    /// Seed for the pacing jitter
    #[arg(long)]
    seed: Option<u64>,
    /// Directory for failure screenshots
    #[arg(long)]
    screenshot_dir: Option<PathBuf>,
    /// Skip the typed confirmation gates
    #[arg(long, short)]
    yes: bool,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: ReplayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load()?;
    let replay = &mut config.replay;
    replay.dry_run |= args.dry_run;
    if let Some(ms) = args.delay_ms {
        replay.delay_base_ms = ms;
    }
    if let Some(ms) = args.jitter_ms {
        replay.jitter_ms = ms;
    }
    if let Some(endpoint) = args.endpoint {
        replay.endpoint = endpoint;
    }
    if args.no_scan {
        replay.scan_ports = false;
    }
    if let Some(dir) = &args.screenshot_dir {
        replay.screenshot_dir = Some(dir.display().to_string());
    }

    let script = Script::load(&args.script)?;
    let rows = match &args.payload {
        Some(path) => {
            let filter = PayloadFilter {
                only_date: args.date.clone(),
                limit: args.limit,
            };
            let rows = load_payload(path, &filter)?;
            if rows.is_empty() {
                println!("no rows to replay in {}", path.display());
                return Ok(());
            }
            rows
        }
        None => Vec::new(),
    };

    if !config.replay.dry_run && !args.yes {
        let stdin = std::io::stdin();
        let mut input = stdin.lock();
        let mut out = std::io::stdout();
        if !run_gates(&rows, &mut rand::thread_rng(), &mut input, &mut out)? {
            return Err("replay aborted at confirmation".into());
        }
    }

    if !rows.is_empty() {
        let summary = CapacitySummary::of(&rows, config.replay.weekly_capacity_hours);
        tracing::info!(rows = rows.len(), hours = summary.total_hours(), "Loaded payload");
        println!(
            "total scheduled hours: {:.2} of {} ({:.1}% of weekly capacity)",
            summary.total_hours(),
            summary.capacity_hours,
            summary.percent_of_capacity()
        );
    }

    let job = ReplayJob::new(script, rows)
        .with_dry_run(config.replay.dry_run)
        .with_step_timeout(config.replay.step_timeout_ms);
    let endpoint = CdpEndpoint::parse(&config.replay.endpoint, config.replay.scan_ports)?
        .with_call_timeout(Duration::from_millis(config.replay.step_timeout_ms));
    let mut engine = ReplayEngine::from_config(&config.replay, args.seed);

    let report = super::runtime()?.block_on(async {
        let cancel = engine.cancel_token();
        super::cancel_on_ctrl_c(cancel);
        engine.run_attached(&job, &endpoint).await
    });

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    match report.outcome {
        JobOutcome::Succeeded => Ok(()),
        JobOutcome::Cancelled => Err("replay cancelled".into()),
        JobOutcome::Failed { message, .. } => Err(format!("replay failed: {message}").into()),
    }
}

fn print_report(report: &ReplayReport) {
    for r in &report.results {
        let status = match r.status {
            StepStatus::Succeeded => "ok".to_string(),
            StepStatus::Failed => "FAILED".to_string(),
            StepStatus::Skipped(reason) => format!("skipped ({reason:?})"),
        };
        println!(
            "row {} step {} {} {} -> {status}",
            r.row_index, r.step_index, r.action, r.target
        );
        if let Some(error) = &r.error {
            println!("    {error}");
        }
        if let Some(path) = &r.screenshot {
            println!("    screenshot: {path}");
        }
    }
    println!(
        "{} succeeded, {} failed, {} skipped in {} ms{}",
        report.succeeded_count(),
        report.failed_count(),
        report.skipped_count(),
        report.duration_ms(),
        if report.dry_run { " (dry run)" } else { "" }
    );
}

fn make_code(rng: &mut impl Rng, alphabet: &[u8], len: usize) -> String {
    (0..len)
        .map(|_| char::from(alphabet[rng.gen_range(0..alphabet.len())]))
        .collect()
}

/// Ask for `code`; anything but an exact match (including "cancel") declines.
fn confirm(
    header: &[String],
    prompt: &str,
    code: &str,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> std::io::Result<bool> {
    for line in header {
        writeln!(out, "{line}")?;
    }
    write!(out, "{prompt}: ")?;
    out.flush()?;

    let mut typed = String::new();
    input.read_line(&mut typed)?;
    let typed = typed.trim();
    let verdict = if typed.is_empty() {
        "no input provided, aborting"
    } else if typed.eq_ignore_ascii_case("cancel") {
        "cancelled"
    } else if typed != code {
        "confirmation code does not match, aborting"
    } else {
        return Ok(true);
    };
    writeln!(out, "{verdict}")?;
    Ok(false)
}

/// A live run needs a typed letter code; payloads with cancelled meetings
/// need a second, numeric one.
fn run_gates(
    rows: &[PayloadRow],
    rng: &mut impl Rng,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> std::io::Result<bool> {
    let code = make_code(rng, LETTERS, 6);
    let header = vec![
        "This is not a dry run: the script will make real changes.".to_string(),
        format!("To continue, type this code exactly: {code}"),
        "Or type 'cancel' to abort.".to_string(),
    ];
    if !confirm(&header, "Confirmation", &code, input, out)? {
        return Ok(false);
    }

    let canceled: Vec<&str> = rows
        .iter()
        .filter(|r| r.is_canceled())
        .map(PayloadRow::subject)
        .collect();
    if canceled.is_empty() {
        return Ok(true);
    }

    let code = make_code(rng, DIGITS, 6);
    let mut header = vec![format!(
        "{} row subject(s) contain 'Canceled: ':",
        canceled.len()
    )];
    header.extend(
        canceled
            .iter()
            .take(CANCELED_PREVIEW)
            .map(|s| format!("  - {s}")),
    );
    if canceled.len() > CANCELED_PREVIEW {
        header.push(format!("  - ... (+{} more)", canceled.len() - CANCELED_PREVIEW));
    }
    header.push(format!(
        "If you meant to include them, type this 6-digit code exactly: {code}"
    ));
    confirm(&header, "Canceled-events confirmation", &code, input, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Mcg128Xsl64;

    fn rows(subjects: &[&str]) -> Vec<PayloadRow> {
        subjects
            .iter()
            .map(|s| PayloadRow::from_pairs([("subject", *s)]))
            .collect()
    }

    /// Codes the gates will ask for with this seed.
    fn expected_codes(seed: u64) -> (String, String) {
        let mut rng = Mcg128Xsl64::seed_from_u64(seed);
        let letters = make_code(&mut rng, LETTERS, 6);
        let digits = make_code(&mut rng, DIGITS, 6);
        (letters, digits)
    }

    #[test]
    fn codes_use_their_alphabet() {
        let (letters, digits) = expected_codes(3);
        assert_eq!(letters.len(), 6);
        assert!(letters.chars().all(|c| c.is_ascii_uppercase()));
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn single_gate_without_canceled_rows() {
        let (letters, _) = expected_codes(11);
        let input = format!("{letters}\n").into_bytes();
        let mut out = Vec::new();

        let ok = run_gates(
            &rows(&["Standup"]),
            &mut Mcg128Xsl64::seed_from_u64(11),
            &mut input.as_slice(),
            &mut out,
        )
        .unwrap();

        assert!(ok);
        assert!(!String::from_utf8(out).unwrap().contains("Canceled-events"));
    }

    #[test]
    fn canceled_rows_need_second_code() {
        let (letters, digits) = expected_codes(5);
        let subjects = rows(&["Standup", "Canceled: Retro"]);

        let input = format!("{letters}\n{digits}\n");
        let mut out = Vec::new();
        let ok = run_gates(
            &subjects,
            &mut Mcg128Xsl64::seed_from_u64(5),
            &mut input.as_bytes(),
            &mut out,
        )
        .unwrap();
        assert!(ok);
        assert!(String::from_utf8(out).unwrap().contains("Canceled: Retro"));

        let input = format!("{letters}\n000\n");
        let ok = run_gates(
            &subjects,
            &mut Mcg128Xsl64::seed_from_u64(5),
            &mut input.as_bytes(),
            &mut std::io::sink(),
        )
        .unwrap();
        assert!(!ok);
    }

    #[test]
    fn cancel_and_empty_input_decline() {
        for typed in ["cancel\n", "CANCEL\n", "\n", ""] {
            let ok = confirm(&[], "Confirmation", "ABCDEF", &mut typed.as_bytes(), &mut std::io::sink())
                .unwrap();
            assert!(!ok, "{typed:?}");
        }
        let typed = " ABCDEF \n";
        assert!(confirm(&[], "Confirmation", "ABCDEF", &mut typed.as_bytes(), &mut std::io::sink()).unwrap());
    }
}
