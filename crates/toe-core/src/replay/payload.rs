//! Payload rows fed to a step script.
//!
//! Two input shapes are accepted:
//!
//! - the weekly export, keyed by `DD/Mon/YY` date with a list of entries per
//!   day, flattened and sorted by (date, start time);
//! - a plain JSON array of flat objects, used as is.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ReplayError;

const DATE_KEY_FORMAT: &str = "%d/%b/%y";

/// One replayed entry: field name to string value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadRow {
    pub fields: BTreeMap<String, String>,
    /// One-line description for logs and reports.
    #[serde(default)]
    pub summary: String,
}

impl PayloadRow {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let fields: BTreeMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let summary = fields.get("subject").cloned().unwrap_or_default();
        Self { fields, summary }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn subject(&self) -> &str {
        self.get("subject").unwrap_or_default()
    }

    pub fn duration_minutes(&self) -> i64 {
        self.get("duration_minutes")
            .and_then(|m| m.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Subjects of cancelled meetings carry this prefix.
    pub fn is_canceled(&self) -> bool {
        self.subject().contains("Canceled: ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadFilter {
    /// Only rows for this `DD/Mon/YY` date key.
    pub only_date: Option<String>,
    pub limit: Option<usize>,
}

/// Load and flatten a payload file.
pub fn load_payload(path: &Path, filter: &PayloadFilter) -> Result<Vec<PayloadRow>, ReplayError> {
    let load_failed = |message: String| ReplayError::LoadFailed {
        what: "payload",
        path: path.to_path_buf(),
        message,
    };
    let content = std::fs::read_to_string(path).map_err(|e| load_failed(e.to_string()))?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|e| ReplayError::InvalidPayload(format!("{}: {e}", path.display())))?;
    parse_payload(value, filter)
}

pub fn parse_payload(value: Value, filter: &PayloadFilter) -> Result<Vec<PayloadRow>, ReplayError> {
    let mut rows = match value {
        Value::Object(days) => flatten_export(days, filter.only_date.as_deref())?,
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| plain_row(i, item))
            .filter(|row| match (&filter.only_date, row) {
                (Some(date), Ok(row)) => row.get("date") == Some(date.as_str()),
                _ => true,
            })
            .collect::<Result<Vec<_>, _>>()?,
        other => {
            return Err(ReplayError::InvalidPayload(format!(
                "expected an object keyed by date or an array of rows, got {}",
                type_name(&other)
            )))
        }
    };

    if let Some(limit) = filter.limit {
        rows.truncate(limit);
    }
    Ok(rows)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_fields(entry: &serde_json::Map<String, Value>) -> BTreeMap<String, String> {
    entry
        .iter()
        .filter_map(|(k, v)| scalar(v).map(|s| (k.clone(), s)))
        .collect()
}

fn plain_row(index: usize, item: Value) -> Result<PayloadRow, ReplayError> {
    let Value::Object(entry) = item else {
        return Err(ReplayError::InvalidPayload(format!(
            "row {index} is {}, expected an object",
            type_name(&item)
        )));
    };
    Ok(PayloadRow::from_pairs(scalar_fields(&entry)))
}

/// Minutes after midnight from the trailing `HH:MM` of a start string such as
/// `Mon, Nov 03 09:30`. Unparseable values sort first.
fn start_minutes(start: &str) -> u32 {
    let Some(hhmm) = start.rsplit(' ').next() else {
        return 0;
    };
    let Some((h, m)) = hhmm.split_once(':') else {
        return 0;
    };
    match (h.parse::<u32>(), m.parse::<u32>()) {
        (Ok(h), Ok(m)) => h * 60 + m,
        _ => 0,
    }
}

/// Issue key from the first export category: `"DXG-1 - Engineering"` -> `DXG-1`.
pub fn extract_issue(categories: &[String]) -> String {
    let Some(head) = categories.first() else {
        return String::new();
    };
    let head = head.trim();
    let head = head.split_once(" - ").map_or(head, |(issue, _)| issue);
    head.split_whitespace().next().unwrap_or_default().to_string()
}

/// `45m`, `2h`, `1h 30m`.
pub fn minutes_to_hm_str(minutes: i64) -> String {
    if minutes < 60 {
        return format!("{minutes}m");
    }
    let (h, m) = (minutes / 60, minutes % 60);
    if m == 0 {
        format!("{h}h")
    } else {
        format!("{h}h {m}m")
    }
}

fn flatten_export(
    days: serde_json::Map<String, Value>,
    only_date: Option<&str>,
) -> Result<Vec<PayloadRow>, ReplayError> {
    let mut keyed = Vec::new();

    for (date_key, entries) in days {
        if only_date.is_some_and(|d| d != date_key) {
            continue;
        }
        let date = NaiveDate::parse_from_str(&date_key, DATE_KEY_FORMAT).map_err(|e| {
            ReplayError::InvalidPayload(format!("bad date key '{date_key}': {e}"))
        })?;
        let Value::Array(entries) = entries else {
            return Err(ReplayError::InvalidPayload(format!(
                "entries for '{date_key}' must be an array"
            )));
        };
        for (i, entry) in entries.into_iter().enumerate() {
            let Value::Object(entry) = entry else {
                return Err(ReplayError::InvalidPayload(format!(
                    "entry {i} of '{date_key}' must be an object"
                )));
            };
            let start = entry.get("start").and_then(Value::as_str).unwrap_or_default();
            keyed.push((date, start_minutes(start), export_row(&date_key, &entry)));
        }
    }

    keyed.sort_by_key(|(date, start, _)| (*date, *start));
    Ok(keyed.into_iter().map(|(_, _, row)| row).collect())
}

fn export_row(date_key: &str, entry: &serde_json::Map<String, Value>) -> PayloadRow {
    let categories: Vec<String> = entry
        .get("jira_categories")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|c| c.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let minutes = entry
        .get("duration_minutes")
        .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
        .unwrap_or(0);

    let mut fields = scalar_fields(entry);
    let issue = extract_issue(&categories);
    let subject = fields.get("subject").cloned().unwrap_or_default();
    let date = fields
        .get("date")
        .filter(|d| !d.is_empty())
        .cloned()
        .unwrap_or_else(|| date_key.to_string());

    fields.insert("issue".into(), issue.clone());
    fields.insert("subject".into(), subject.clone());
    fields.insert("date".into(), date.clone());
    fields.insert("duration_minutes".into(), minutes.to_string());
    fields.insert("duration_str".into(), minutes_to_hm_str(minutes));

    PayloadRow {
        fields,
        summary: format!("{date} {subject} -> {issue} ({minutes}m)"),
    }
}

/// Planned hours against weekly capacity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CapacitySummary {
    pub total_minutes: i64,
    pub capacity_hours: f64,
}

impl CapacitySummary {
    pub fn of(rows: &[PayloadRow], capacity_hours: f64) -> Self {
        Self {
            total_minutes: rows.iter().map(PayloadRow::duration_minutes).sum(),
            capacity_hours,
        }
    }

    pub fn total_hours(&self) -> f64 {
        self.total_minutes as f64 / 60.0
    }

    pub fn percent_of_capacity(&self) -> f64 {
        if self.capacity_hours <= 0.0 {
            return 0.0;
        }
        self.total_hours() / self.capacity_hours * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn export() -> Value {
        json!({
            "04/Nov/25": [
                {"subject": "Code review", "start": "Tue, Nov 04 13:00", "end": "Tue, Nov 04 14:30",
                 "date": "04/Nov/25", "duration_minutes": 90,
                 "jira_categories": ["DXG-1 - Engineering"]}
            ],
            "03/Nov/25": [
                {"subject": "Canceled: Retro", "start": "Mon, Nov 03 15:00", "duration_minutes": 45,
                 "jira_categories": ["DXG-9 Meetings"]},
                {"subject": "Standup", "start": "Mon, Nov 03 09:00", "duration_minutes": 15,
                 "jira_categories": [], "location": "Room 4"}
            ]
        })
    }

    #[test]
    fn flattens_and_sorts_export() {
        let rows = parse_payload(export(), &PayloadFilter::default()).unwrap();
        let subjects: Vec<_> = rows.iter().map(PayloadRow::subject).collect();
        assert_eq!(subjects, vec!["Standup", "Canceled: Retro", "Code review"]);

        let review = &rows[2];
        assert_eq!(review.get("issue"), Some("DXG-1"));
        assert_eq!(review.get("duration_str"), Some("1h 30m"));
        assert_eq!(review.summary, "04/Nov/25 Code review -> DXG-1 (90m)");

        let standup = &rows[0];
        assert_eq!(standup.get("issue"), Some(""));
        assert_eq!(standup.get("date"), Some("03/Nov/25"));
        assert_eq!(standup.get("location"), Some("Room 4"));

        assert!(rows[1].is_canceled());
        assert_eq!(rows[1].get("issue"), Some("DXG-9"));
    }

    #[test]
    fn filters_by_date_and_limit() {
        let filter = PayloadFilter {
            only_date: Some("03/Nov/25".into()),
            limit: Some(1),
        };
        let rows = parse_payload(export(), &filter).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].subject(), "Standup");
    }

    #[test]
    fn plain_array_rows() {
        let rows = parse_payload(
            json!([{"subject": "Admin", "TimeCode": "DXG-2", "hours": 1.5}]),
            &PayloadFilter::default(),
        )
        .unwrap();
        assert_eq!(rows[0].get("TimeCode"), Some("DXG-2"));
        assert_eq!(rows[0].get("hours"), Some("1.5"));
        assert_eq!(rows[0].summary, "Admin");
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(matches!(
            parse_payload(json!("nope"), &PayloadFilter::default()),
            Err(ReplayError::InvalidPayload(_))
        ));
        assert!(matches!(
            parse_payload(json!({"2025-11-03": []}), &PayloadFilter::default()),
            Err(ReplayError::InvalidPayload(_))
        ));
        assert!(matches!(
            parse_payload(json!([1, 2]), &PayloadFilter::default()),
            Err(ReplayError::InvalidPayload(_))
        ));
    }

    #[test]
    fn duration_strings() {
        assert_eq!(minutes_to_hm_str(0), "0m");
        assert_eq!(minutes_to_hm_str(45), "45m");
        assert_eq!(minutes_to_hm_str(60), "1h");
        assert_eq!(minutes_to_hm_str(135), "2h 15m");
    }

    #[test]
    fn issue_extraction() {
        assert_eq!(extract_issue(&["DXGLV-10 - Sick or PTO".into()]), "DXGLV-10");
        assert_eq!(extract_issue(&[" ABC-3 extra".into()]), "ABC-3");
        assert_eq!(extract_issue(&[]), "");
    }

    #[test]
    fn capacity_summary() {
        let rows = parse_payload(export(), &PayloadFilter::default()).unwrap();
        let summary = CapacitySummary::of(&rows, 40.0);
        assert_eq!(summary.total_minutes, 150);
        assert!((summary.total_hours() - 2.5).abs() < f64::EPSILON);
        assert!((summary.percent_of_capacity() - 6.25).abs() < 1e-9);
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("export.json");
        std::fs::write(&path, export().to_string()).unwrap();
        let rows = load_payload(&path, &PayloadFilter::default()).unwrap();
        assert_eq!(rows.len(), 3);

        let missing = load_payload(&dir.path().join("nope.json"), &PayloadFilter::default());
        assert!(matches!(missing, Err(ReplayError::LoadFailed { .. })));
    }
}
