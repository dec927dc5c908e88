//! Append-only archive of finished prompt sessions.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::prompt::PromptSession;

/// JSON-lines file, one terminal session per line.
pub struct SessionArchive {
    path: PathBuf,
}

impl SessionArchive {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, session: &PromptSession) -> std::io::Result<()> {
        let line = serde_json::to_string(session)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gap::GapCandidate;
    use crate::prompt::{DismissReason, PromptSession};
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn appends_one_line_per_session() {
        let dir = tempfile::TempDir::new().unwrap();
        let archive = SessionArchive::new(dir.path().join("sessions.jsonl"));
        let start = Utc.with_ymd_and_hms(2025, 11, 3, 10, 0, 0).unwrap();
        let gap = GapCandidate::new(start, start + Duration::minutes(30));

        let mut first = PromptSession::new(gap.clone(), start);
        first.dismiss(DismissReason::Skipped, start).unwrap();
        let mut second = PromptSession::new(gap, start);
        second.dismiss(DismissReason::Invalidated, start).unwrap();

        archive.append(&first).unwrap();
        archive.append(&second).unwrap();

        let content = std::fs::read_to_string(archive.path()).unwrap();
        let all: Vec<PromptSession> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first.id);
        assert_eq!(all[1].dismiss_reason, Some(DismissReason::Invalidated));
    }
}
