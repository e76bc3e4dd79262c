use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Which part of the pipeline a per-file failure belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Acquisition,
    Conversion,
    Parse,
    Export,
}

/// Failures scoped to a single source. None of them abort a run: the orchestrator logs the
/// error, counts it under its [`FailureKind`] and moves on to the next source.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("acquire {url}: {reason}")]
    Acquire { url: String, reason: String },

    #[error("converter exited with {status} on {}: {stderr}", input.display())]
    Convert { input: PathBuf, status: String, stderr: String },

    #[error("converter timed out after {timeout:?} on {}", input.display())]
    Timeout { input: PathBuf, timeout: Duration },

    #[error("expected output {} was not produced", .0.display())]
    MissingOutput(PathBuf),

    #[error("parse {} at row {row}: {reason}", path.display())]
    Parse { path: PathBuf, row: u64, reason: String },

    #[error("{} has {found} columns, at least {expected} required", path.display())]
    ColumnCount { path: PathBuf, found: usize, expected: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StageError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StageError::Acquire { .. } => FailureKind::Acquisition,
            StageError::Convert { .. } | StageError::Timeout { .. } | StageError::MissingOutput(_) => {
                FailureKind::Conversion
            }
            StageError::Parse { .. } | StageError::ColumnCount { .. } | StageError::Io(_) => FailureKind::Parse,
        }
    }
}
