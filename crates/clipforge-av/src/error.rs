//! Error types for clipforge-av.

use std::path::PathBuf;
use std::time::Duration;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while probing, building or running media jobs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required external tool is not available.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// An external tool ran but reported failure.
    #[error("{tool} failed during {stage}: {message}")]
    ToolFailed {
        tool: String,
        stage: String,
        message: String,
    },

    /// An external tool exceeded its time budget and was killed.
    #[error("{tool} timed out after {after:?} during {stage}")]
    Timeout {
        tool: String,
        stage: String,
        after: Duration,
    },

    /// An external tool was killed because the server is shutting down.
    #[error("{tool} cancelled during {stage}")]
    Cancelled { tool: String, stage: String },

    /// Duration probing failed.
    #[error("probe failed for {}: {message}", .path.display())]
    Probe { path: PathBuf, message: String },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input provided to a job builder.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Staging directory error.
    #[error("workspace error: {0}")]
    Workspace(String),
}

impl Error {
    /// Create a tool not found error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Create a tool execution failed error.
    pub fn tool_failed(
        tool: impl Into<String>,
        stage: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create a probe error.
    pub fn probe(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Probe {
            path: path.into(),
            message: message.into(),
        }
    }

    /// The engine stage this error happened in, if it came from a subprocess.
    pub fn stage(&self) -> Option<&str> {
        match self {
            Error::ToolFailed { stage, .. }
            | Error::Timeout { stage, .. }
            | Error::Cancelled { stage, .. } => Some(stage),
            _ => None,
        }
    }
}
