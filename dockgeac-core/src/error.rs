//! Error types for dockgeac.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for dockgeac operations.
pub type Result<T> = std::result::Result<T, DockgeacError>;

/// Main error type for dockgeac.
#[derive(Error, Debug)]
pub enum DockgeacError {
    /// Malformed input from a client (bad type, bad name, invalid env file).
    #[error("{0}")]
    Validation(String),

    /// The compose compiler produced one or more errors; the plan must not deploy.
    #[error("Compose file has errors: {0}")]
    Preflight(String),

    /// The runtime CLI exited non-zero on a required operation.
    #[error("{context}: {stderr}")]
    Runtime { context: String, stderr: String },

    #[error("Compose parse error: {reason}")]
    ComposeParse { reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DockgeacError {
    /// Create a Runtime error from a CLI invocation context and its captured stderr.
    pub fn runtime(context: impl Into<String>, stderr: impl Into<String>) -> Self {
        let stderr = stderr.into();
        let stderr = if stderr.trim().is_empty() { "(no output)".to_string() } else { stderr };
        Self::Runtime { context: context.into(), stderr }
    }

    /// True when the error message indicates the runtime could not find the target.
    ///
    /// Used by the stack engine's start-then-deploy fallback.
    pub fn is_not_found(&self) -> bool {
        match self {
            DockgeacError::NotFound(_) => true,
            other => other.to_string().to_lowercase().contains("not found"),
        }
    }
}
