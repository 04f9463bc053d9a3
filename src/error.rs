//! Error types for krbkeep
//!
//! All modules use `KrbResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for krbkeep operations
pub type KrbResult<T> = Result<T, KrbError>;

/// All errors that can occur in krbkeep
#[derive(Error, Debug)]
pub enum KrbError {
    // Credential cache errors
    #[error("no credential cache found at {0}")]
    NoCredentialFound(PathBuf),

    // klist output errors
    #[error("malformed klist output: {0}")]
    Parse(String),

    // External tool errors
    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("command failed: {command}, exit code: {code}, stderr: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    // Lock errors
    #[error("failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Configuration errors
    #[error("invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl KrbError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a parse error
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse(reason.into())
    }

    /// Create a command failed error
    pub fn command_failed(
        command: impl Into<String>,
        code: i32,
        stderr: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            command: command.into(),
            code,
            stderr: stderr.into(),
        }
    }

    /// Check if error is retryable
    ///
    /// A non-zero exit from the Kerberos tools is worth retrying; a missing
    /// binary, malformed output, or an absent cache is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CommandFailed { .. })
    }
}
