//! Where prompts are shown and answers come from.

use chrono::Local;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

use super::session::PromptSession;

/// A category the user can pick, with its time codes.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryChoice {
    pub name: String,
    pub timecodes: Vec<String>,
}

/// Everything a surface needs to render a prompt.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub categories: Vec<CategoryChoice>,
    pub last_category: Option<String>,
    pub last_timecode: Option<String>,
    pub snooze_minutes: u64,
}

impl PromptContext {
    fn category(&self, name: &str) -> Option<&CategoryChoice> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Default time code for `category`: the remembered one if it belongs to
    /// the category, otherwise the first listed.
    pub fn default_timecode(&self, category: &str) -> Option<String> {
        let choice = self.category(category)?;
        self.last_timecode
            .as_ref()
            .filter(|t| choice.timecodes.contains(t))
            .or_else(|| choice.timecodes.first())
            .cloned()
    }
}

/// What the user decided.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptReply {
    Answer {
        category: String,
        timecode: Option<String>,
        comment: Option<String>,
    },
    Skip,
    Snooze,
}

/// A place prompts can be shown.
///
/// `next_reply` must be cancel-safe: the scheduler drops it whenever a poll
/// tick or timeout wins the race.
#[allow(async_fn_in_trait)]
pub trait PromptSurface {
    fn present(&mut self, session: &PromptSession, ctx: &PromptContext) -> std::io::Result<()>;

    /// Next reply for the shown prompt. `Ok(None)` means input is closed.
    async fn next_reply(&mut self, ctx: &PromptContext) -> std::io::Result<Option<PromptReply>>;

    /// The shown prompt closed without an answer.
    fn withdraw(&mut self, _session: &PromptSession, _reason: &str) -> std::io::Result<()> {
        Ok(())
    }
}

/// Parse one reply line.
///
/// Grammar: `s` skips, `z` snoozes, an empty line repeats the remembered
/// category, otherwise `<n>[/<m>] [comment]` picks category `n` and time
/// code `m` (1-based).
pub fn parse_reply(line: &str, ctx: &PromptContext) -> Result<PromptReply, String> {
    let line = line.trim();
    match line.to_lowercase().as_str() {
        "s" | "skip" => return Ok(PromptReply::Skip),
        "z" | "snooze" => return Ok(PromptReply::Snooze),
        _ => {}
    }

    if line.is_empty() {
        let category = ctx
            .last_category
            .clone()
            .filter(|c| ctx.category(c).is_some())
            .ok_or_else(|| "no remembered category; pick a number".to_string())?;
        let timecode = ctx.default_timecode(&category);
        return Ok(PromptReply::Answer {
            category,
            timecode,
            comment: None,
        });
    }

    let (choice, comment) = match line.split_once(char::is_whitespace) {
        Some((choice, rest)) => (choice, Some(rest.trim().to_string())),
        None => (line, None),
    };
    let (cat_idx, code_idx) = match choice.split_once('/') {
        Some((c, t)) => (c, Some(t)),
        None => (choice, None),
    };

    let pick = |s: &str, len: usize, what: &str| -> Result<usize, String> {
        let n: usize = s
            .parse()
            .map_err(|_| format!("'{s}' is not a {what} number"))?;
        if n == 0 || n > len {
            return Err(format!("{what} {n} is out of range 1..={len}"));
        }
        Ok(n - 1)
    };

    let category = &ctx.categories[pick(cat_idx, ctx.categories.len(), "category")?];
    let timecode = match code_idx {
        Some(t) => Some(category.timecodes[pick(t, category.timecodes.len(), "time code")?].clone()),
        None => ctx.default_timecode(&category.name),
    };

    Ok(PromptReply::Answer {
        category: category.name.clone(),
        timecode,
        comment: comment.filter(|c| !c.is_empty()),
    })
}

/// Line-oriented prompt on a terminal.
pub struct TerminalPrompt<R, W> {
    lines: Lines<R>,
    out: W,
}

impl TerminalPrompt<tokio::io::BufReader<tokio::io::Stdin>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(tokio::io::BufReader::new(tokio::io::stdin()), std::io::stdout())
    }
}

impl<R: AsyncBufRead + Unpin, W: Write> TerminalPrompt<R, W> {
    pub fn new(reader: R, out: W) -> Self {
        Self {
            lines: reader.lines(),
            out,
        }
    }

    pub fn into_writer(self) -> W {
        self.out
    }
}

impl<R: AsyncBufRead + Unpin, W: Write> PromptSurface for TerminalPrompt<R, W> {
    fn present(&mut self, session: &PromptSession, ctx: &PromptContext) -> std::io::Result<()> {
        let gap = &session.gap;
        let start = gap.start.with_timezone(&Local).format("%H:%M");
        let end = gap.end.with_timezone(&Local).format("%H:%M");
        let tag = if gap.forced { " (forced)" } else { "" };

        writeln!(self.out)?;
        writeln!(self.out, "What are you working on?  {start} -> {end}{tag}")?;
        for (i, choice) in ctx.categories.iter().enumerate() {
            let marker = if ctx.last_category.as_deref() == Some(choice.name.as_str()) {
                "*"
            } else {
                " "
            };
            writeln!(self.out, " {marker}{:>2}) {}", i + 1, choice.name)?;
            for (j, code) in choice.timecodes.iter().enumerate() {
                writeln!(self.out, "        {}/{}  {code}", i + 1, j + 1)?;
            }
        }
        writeln!(
            self.out,
            "Reply <n>[/<m>] [comment], Enter = last, s = skip, z = snooze {}m",
            ctx.snooze_minutes
        )?;
        write!(self.out, "> ")?;
        self.out.flush()
    }

    async fn next_reply(&mut self, ctx: &PromptContext) -> std::io::Result<Option<PromptReply>> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Ok(None);
            };
            match parse_reply(&line, ctx) {
                Ok(reply) => return Ok(Some(reply)),
                Err(message) => {
                    writeln!(self.out, "  {message}")?;
                    write!(self.out, "> ")?;
                    self.out.flush()?;
                }
            }
        }
    }

    fn withdraw(&mut self, _session: &PromptSession, reason: &str) -> std::io::Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "(prompt closed: {reason})")?;
        self.out.flush()
    }
}
