//! Error types for external tool invocation.

use std::path::PathBuf;

/// Errors produced while running an external tool.
///
/// A tool that runs to completion with a non-zero exit code is *not* an
/// error at this layer; it is reported through [`crate::ToolOutput`].
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid tool command {name}: {reason}")]
    InvalidCommand { name: String, reason: String },

    #[error("failed to start {name} ({program}): {source}")]
    Spawn {
        name: String,
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{name} timed out after {timeout_secs} seconds")]
    Timeout { name: String, timeout_secs: u64 },

    #[error("i/o error while running {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    /// Whether the executable could not be started at all (missing binary,
    /// permissions).
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ToolError::Spawn { .. })
    }

    /// Whether the tool was stopped because it exceeded its timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ToolError::Timeout { .. })
    }
}
