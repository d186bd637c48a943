//! Error hierarchy shared by every binary in this crate.

use std::path::PathBuf;

use thiserror::Error;

/// Error kinds produced anywhere in the backward-search engine.
///
/// `BadConfig`, `BadInput` and `Conflict` are detected before any cycle
/// begins and should terminate the process immediately. `IoError` and
/// `CorruptBwt` can also surface mid-run, in which case the caller should
/// flush whatever partial output exists and exit non-zero.
#[derive(Error, Debug)]
pub enum BeetlError {
    #[error("bad input: {0}")]
    BadInput(String),

    #[error("bad configuration: {0}")]
    BadConfig(String),

    #[error("missing file: {path} ({reason})")]
    MissingFile { path: PathBuf, reason: String },

    #[error("corrupt BWT at {path}: {reason}")]
    CorruptBwt { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl BeetlError {
    /// Process exit code for this error, per the policy in the error
    /// handling design: config/input/conflict errors and I/O or corruption
    /// errors discovered mid-run both terminate non-zero, but are kept as
    /// distinct codes so a caller's test harness can tell them apart.
    pub fn exit_code(&self) -> i32 {
        match self {
            BeetlError::BadInput(_) => 2,
            BeetlError::BadConfig(_) => 2,
            BeetlError::Conflict(_) => 3,
            BeetlError::MissingFile { .. } => 4,
            BeetlError::CorruptBwt { .. } => 5,
            BeetlError::IoError(_) => 6,
        }
    }
}

pub type Result<T> = std::result::Result<T, BeetlError>;
