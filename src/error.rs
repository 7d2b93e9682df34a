// DriftClock Error Types
// Failures of the I/O collaborators around the scheduling core

use std::path::PathBuf;

/// Errors raised by persistence, configuration and network collaborators.
///
/// The scheduling core itself (`alarm_schedule`, `alarm_clock`, `darkness`)
/// is total and never produces one of these.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("IO error on {path}: {source}")]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Home Assistant returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
}

impl ClockError {
    pub(crate) fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoAt {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClockError>;
