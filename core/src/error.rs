//! Error types for the fwbridge-core library.

use thiserror::Error;

/// Result type alias for fwbridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving backend tools.
///
/// Most read/probe operations deliberately do NOT surface through this
/// enum: availability probes return a `ConnectorInfo` with an error
/// status, mutations return a `MutationOutcome`, and parsers degrade to
/// empty collections on unexpected output. `Error` covers the remaining
/// fallible seams (deep scans without nmap, I/O, JSON).
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to execute a system command.
    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    /// A required tool binary is not installed.
    #[error("Tool not available: {0}")]
    Unavailable(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
