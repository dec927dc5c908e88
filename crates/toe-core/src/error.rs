//! Core error types for toe-core.
//!
//! Each component has its own error enum; [`CoreError`] aggregates them and
//! [`CoreError::kind`] maps every failure onto the [`FailureKind`] taxonomy
//! used to decide whether something is retried, contained or fatal to a job.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Failure taxonomy shared by all components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Snapshot reads and calendar writes. Retried.
    TransientIo,
    /// Missing payload key, malformed step, overlapping slots.
    /// Fatal to the step or job, never to the process.
    DataIntegrity,
    /// Browser endpoint unreachable. Fatal to the replay job, not retried.
    Connectivity,
    /// No answer within the prompt window.
    UserTimeout,
    /// Calendar changed under a pending prompt.
    Invalidation,
}

/// Core error type for toe-core.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Calendar write error: {0}")]
    Write(#[from] WriteError),

    #[error("Replay error: {0}")]
    Replay(#[from] ReplayError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CoreError::Snapshot(e) => e.kind(),
            CoreError::Write(e) => e.kind(),
            CoreError::Io(_) => FailureKind::TransientIo,
            CoreError::Replay(e) => e.kind(),
            CoreError::Config(_) | CoreError::Json(_) => FailureKind::DataIntegrity,
        }
    }
}

/// Errors reading or interpreting a calendar snapshot.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to read snapshot {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse snapshot {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Slots overlap or are out of order at index {index}")]
    OverlappingSlots { index: usize },

    #[error("Invalid time range: end ({end}) must be after start ({start})")]
    InvalidRange {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },
}

impl SnapshotError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SnapshotError::ReadFailed { .. } | SnapshotError::ParseFailed { .. } => {
                FailureKind::TransientIo
            }
            SnapshotError::OverlappingSlots { .. } | SnapshotError::InvalidRange { .. } => {
                FailureKind::DataIntegrity
            }
        }
    }
}

/// Errors writing an entry to the external calendar store.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Calendar store unavailable: {0}")]
    Unavailable(String),

    #[error("Calendar store IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Calendar store is corrupt: {0}")]
    Corrupt(String),

    #[error("Session {0} is not answered")]
    NotAnswered(uuid::Uuid),

    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl WriteError {
    /// Only transient failures are worth another attempt.
    pub fn kind(&self) -> FailureKind {
        match self {
            WriteError::Unavailable(_) | WriteError::Io { .. } | WriteError::Exhausted { .. } => {
                FailureKind::TransientIo
            }
            WriteError::Corrupt(_) | WriteError::NotAnswered(_) => FailureKind::DataIntegrity,
        }
    }
}

/// Errors raised by the replay engine.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Payload is missing key '{key}'")]
    MissingPayloadKey { key: String },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Malformed step {index}: {message}")]
    MalformedStep { index: usize, message: String },

    #[error("Failed to load {what} from {path}: {message}")]
    LoadFailed {
        what: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("Browser endpoint unreachable: {0}")]
    Connectivity(String),

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),
}

impl ReplayError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ReplayError::Connectivity(_) => FailureKind::Connectivity,
            ReplayError::Browser(
                BrowserError::Disconnected(_) | BrowserError::Unresponsive { .. },
            ) => FailureKind::Connectivity,
            ReplayError::LoadFailed { .. } => FailureKind::TransientIo,
            _ => FailureKind::DataIntegrity,
        }
    }
}

/// Errors talking to the attached browser.
#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Connection lost: {0}")]
    Disconnected(String),

    #[error("No reply to {method} within {timeout_ms} ms")]
    Unresponsive { method: String, timeout_ms: u64 },

    #[error("Protocol error in {method}: {message}")]
    Protocol { method: String, message: String },

    #[error("Script exception: {0}")]
    Script(String),

    #[error("Timed out after {timeout_ms} ms waiting for {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("Element not found: {0}")]
    ElementNotFound(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_component_errors() {
        let missing = CoreError::from(ReplayError::MissingPayloadKey {
            key: "TimeCode".into(),
        });
        assert_eq!(missing.kind(), FailureKind::DataIntegrity);

        let unreachable = CoreError::from(ReplayError::Connectivity("127.0.0.1:9222".into()));
        assert_eq!(unreachable.kind(), FailureKind::Connectivity);

        let read = CoreError::from(SnapshotError::ReadFailed {
            path: PathBuf::from("events.json"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
        assert_eq!(read.kind(), FailureKind::TransientIo);

        let overlap = CoreError::from(SnapshotError::OverlappingSlots { index: 3 });
        assert_eq!(overlap.kind(), FailureKind::DataIntegrity);

        let timeout = CoreError::from(ReplayError::Browser(BrowserError::Timeout {
            what: "#go".into(),
            timeout_ms: 500,
        }));
        assert_eq!(timeout.kind(), FailureKind::DataIntegrity);

        let busy = CoreError::from(WriteError::Unavailable("locked".into()));
        assert_eq!(busy.kind(), FailureKind::TransientIo);

        let corrupt = CoreError::from(WriteError::Corrupt("calendar.json".into()));
        assert_eq!(corrupt.kind(), FailureKind::DataIntegrity);
    }

    #[test]
    fn missing_key_message_names_the_key() {
        let err = ReplayError::MissingPayloadKey {
            key: "TimeCode".into(),
        };
        assert_eq!(err.to_string(), "Payload is missing key 'TimeCode'");
    }
}
