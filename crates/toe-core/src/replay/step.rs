//! Step scripts.
//!
//! A script is `{"steps": [...]}` (or a bare array), each step tagged by its
//! `action`:
//!
//! ```json
//! {"steps": [
//!   {"action": "goto", "url": "https://jira.example.com/secure/Tempo.jspa"},
//!   {"action": "click", "selector": "#log-work"},
//!   {"action": "fill", "selector": "#issue", "value": "{{issue}}"},
//!   {"action": "fill", "selector": "#timecode", "field": "TimeCode"},
//!   {"action": "tab", "count": 2},
//!   {"action": "submit", "selector": "form#worklog"},
//!   {"action": "assert", "selector": ".aui-message-success"}
//! ]}
//! ```
//!
//! `{{key}}` placeholders in urls, selectors, values and keys are bound
//! against the payload row before the step runs. A placeholder whose key is
//! missing from the row fails the step.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::payload::PayloadRow;
use crate::error::ReplayError;

fn default_key() -> String {
    "Enter".into()
}
fn default_form() -> String {
    "form".into()
}
fn default_count() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionStep {
    #[serde(alias = "goto")]
    Navigate { url: String },
    Click { selector: String },
    Fill {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        /// Payload key whose value is typed in.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },
    Select {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },
    Press {
        selector: String,
        #[serde(default = "default_key")]
        key: String,
    },
    /// Move focus with Tab, optionally clicking `selector` first.
    Tab {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        #[serde(default = "default_count")]
        count: u32,
        #[serde(default)]
        shift: bool,
    },
    Submit {
        #[serde(default = "default_form")]
        selector: String,
    },
    /// Wait for `selector` to become visible, or sleep `ms`.
    Wait {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    Assert {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        /// Text the element must contain.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url_contains: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Navigate,
    Click,
    Fill,
    Select,
    Press,
    Tab,
    Submit,
    Wait,
    Assert,
}

impl StepKind {
    /// Kinds that change page state and are skipped in a dry run.
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            StepKind::Click
                | StepKind::Fill
                | StepKind::Select
                | StepKind::Press
                | StepKind::Tab
                | StepKind::Submit
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::Navigate => "navigate",
            StepKind::Click => "click",
            StepKind::Fill => "fill",
            StepKind::Select => "select",
            StepKind::Press => "press",
            StepKind::Tab => "tab",
            StepKind::Submit => "submit",
            StepKind::Wait => "wait",
            StepKind::Assert => "assert",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ActionStep {
    pub fn kind(&self) -> StepKind {
        match self {
            ActionStep::Navigate { .. } => StepKind::Navigate,
            ActionStep::Click { .. } => StepKind::Click,
            ActionStep::Fill { .. } => StepKind::Fill,
            ActionStep::Select { .. } => StepKind::Select,
            ActionStep::Press { .. } => StepKind::Press,
            ActionStep::Tab { .. } => StepKind::Tab,
            ActionStep::Submit { .. } => StepKind::Submit,
            ActionStep::Wait { .. } => StepKind::Wait,
            ActionStep::Assert { .. } => StepKind::Assert,
        }
    }

    /// Selector the step operates on, if any.
    pub fn selector(&self) -> Option<&str> {
        match self {
            ActionStep::Navigate { .. } => None,
            ActionStep::Click { selector }
            | ActionStep::Fill { selector, .. }
            | ActionStep::Select { selector, .. }
            | ActionStep::Press { selector, .. }
            | ActionStep::Submit { selector } => Some(selector.as_str()),
            ActionStep::Tab { selector, .. }
            | ActionStep::Wait { selector, .. }
            | ActionStep::Assert { selector, .. } => selector.as_deref(),
        }
    }

    /// Selector or url, for reports.
    pub fn target(&self) -> String {
        match self {
            ActionStep::Navigate { url } => url.clone(),
            ActionStep::Wait {
                selector: None,
                ms: Some(ms),
                ..
            } => format!("{ms}ms"),
            ActionStep::Assert {
                selector: None,
                url_contains: Some(u),
                ..
            } => format!("url ~ {u}"),
            other => other.selector().unwrap_or_default().to_string(),
        }
    }

    /// Structural checks that do not need a payload row.
    pub fn validate(&self, index: usize) -> Result<(), ReplayError> {
        let malformed = |message: &str| ReplayError::MalformedStep {
            index,
            message: message.to_string(),
        };
        if let Some(selector) = self.selector() {
            if selector.trim().is_empty() {
                return Err(malformed("empty selector"));
            }
        }
        match self {
            ActionStep::Navigate { url } if url.trim().is_empty() => Err(malformed("empty url")),
            ActionStep::Fill { value, field, .. } | ActionStep::Select { value, field, .. } => {
                match (value, field) {
                    (Some(_), Some(_)) => Err(malformed("give either 'value' or 'field', not both")),
                    (None, None) => Err(malformed("needs a 'value' or a 'field'")),
                    _ => Ok(()),
                }
            }
            ActionStep::Press { key, .. } if key.trim().is_empty() => Err(malformed("empty key")),
            ActionStep::Tab { count: 0, .. } => Err(malformed("tab count must be at least 1")),
            ActionStep::Wait { selector: None, ms: None, .. } => {
                Err(malformed("wait needs a 'selector' or 'ms'"))
            }
            ActionStep::Assert {
                selector: None,
                url_contains: None,
                ..
            } => Err(malformed("assert needs a 'selector' or 'url_contains'")),
            ActionStep::Assert {
                selector: None,
                text: Some(_),
                ..
            } => Err(malformed("'text' needs a 'selector'")),
            _ => Ok(()),
        }
    }

    /// Resolve placeholders and `field` references against `row`.
    ///
    /// The bound step has every `field` replaced by a literal `value`.
    pub fn bind(&self, row: &PayloadRow) -> Result<ActionStep, ReplayError> {
        let r = |s: &str| render_template(s, row);
        let ro = |s: &Option<String>| s.as_deref().map(|s| render_template(s, row)).transpose();
        let lookup = |value: &Option<String>, field: &Option<String>| -> Result<Option<String>, ReplayError> {
            match field {
                Some(key) => row
                    .get(key)
                    .map(|v| Some(v.to_string()))
                    .ok_or_else(|| ReplayError::MissingPayloadKey { key: key.clone() }),
                None => ro(value),
            }
        };

        Ok(match self {
            ActionStep::Navigate { url } => ActionStep::Navigate { url: r(url)? },
            ActionStep::Click { selector } => ActionStep::Click {
                selector: r(selector)?,
            },
            ActionStep::Fill {
                selector,
                value,
                field,
            } => ActionStep::Fill {
                selector: r(selector)?,
                value: lookup(value, field)?,
                field: None,
            },
            ActionStep::Select {
                selector,
                value,
                field,
            } => ActionStep::Select {
                selector: r(selector)?,
                value: lookup(value, field)?,
                field: None,
            },
            ActionStep::Press { selector, key } => ActionStep::Press {
                selector: r(selector)?,
                key: r(key)?,
            },
            ActionStep::Tab {
                selector,
                count,
                shift,
            } => ActionStep::Tab {
                selector: ro(selector)?,
                count: *count,
                shift: *shift,
            },
            ActionStep::Submit { selector } => ActionStep::Submit {
                selector: r(selector)?,
            },
            ActionStep::Wait {
                selector,
                ms,
                timeout_ms,
            } => ActionStep::Wait {
                selector: ro(selector)?,
                ms: *ms,
                timeout_ms: *timeout_ms,
            },
            ActionStep::Assert {
                selector,
                text,
                url_contains,
            } => ActionStep::Assert {
                selector: ro(selector)?,
                text: ro(text)?,
                url_contains: ro(url_contains)?,
            },
        })
    }
}

fn is_template_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Replace `{{ key }}` placeholders with row values.
///
/// Text between braces that is not a valid key is left as is.
pub fn render_template(template: &str, row: &PayloadRow) -> Result<String, ReplayError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            break;
        };
        out.push_str(&rest[..open]);
        let key = after[..close].trim();
        if is_template_key(key) {
            let value = row.get(key).ok_or_else(|| ReplayError::MissingPayloadKey {
                key: key.to_string(),
            })?;
            out.push_str(value);
        } else {
            out.push_str(&rest[open..open + 2 + close + 2]);
        }
        rest = &after[close + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// A loaded, validated step script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Script {
    pub steps: Vec<ActionStep>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptFile {
    Wrapped { steps: Vec<serde_json::Value> },
    Bare(Vec<serde_json::Value>),
}

impl Script {
    pub fn new(steps: Vec<ActionStep>) -> Result<Self, ReplayError> {
        for (index, step) in steps.iter().enumerate() {
            step.validate(index)?;
        }
        Ok(Self { steps })
    }

    pub fn from_json(content: &str) -> Result<Self, ReplayError> {
        let file: ScriptFile = serde_json::from_str(content).map_err(|e| ReplayError::MalformedStep {
            index: 0,
            message: format!("not a step script: {e}"),
        })?;
        let raw = match file {
            ScriptFile::Wrapped { steps } | ScriptFile::Bare(steps) => steps,
        };
        let steps = raw
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                serde_json::from_value::<ActionStep>(value).map_err(|e| ReplayError::MalformedStep {
                    index,
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(steps)
    }

    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let content = std::fs::read_to_string(path).map_err(|e| ReplayError::LoadFailed {
            what: "step script",
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_json(&content)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
