//! Error kinds raised while building and running a solver invocation.

use std::fmt;

/// Which channel of the child a stream failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
    /// Waiting for the child to exit.
    Exit,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
            StreamKind::Exit => f.write_str("exit status"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    /// Missing or malformed input, caught before anything is spawned
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// The solver executable could not be started
    #[error("Failed to start {program}: {reason}")]
    SpawnFailure { program: String, reason: String },

    /// Reading the child's output failed mid-run
    #[error("Failed reading {stream}: {reason}")]
    StreamFailure { stream: StreamKind, reason: String },

    /// Another run still holds the run slot
    #[error("A run is already in progress")]
    Busy,

    /// The background worker ended without producing an outcome
    #[error("Run worker failed: {0}")]
    Worker(String),
}

impl RunError {
    pub(crate) fn stream(stream: StreamKind, err: &std::io::Error) -> Self {
        RunError::StreamFailure {
            stream,
            reason: err.to_string(),
        }
    }
}
