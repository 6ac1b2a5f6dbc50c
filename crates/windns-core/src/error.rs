//! Error types for the WinDNS system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for WinDNS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the WinDNS system
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed required field, detected before any remote call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Record type outside the supported set
    #[error("Record type {0} is not supported")]
    UnsupportedType(String),

    /// A remote session could not be acquired or opened
    #[error("Connection error: {0}")]
    Connection(String),

    /// A command could not be started or transmitted over an open session
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote command ran but exited non-zero
    #[error("{command} exited with a non zero exit code ({exit_code}), stderr: {stderr}")]
    RemoteExit {
        /// Name of the cmdlet that failed
        command: String,
        /// Exit code reported by the remote process
        exit_code: i32,
        /// Captured stderr text
        stderr: String,
    },

    /// The remote server reports that the queried object does not exist
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Remote output was empty, not valid JSON, or contained no records
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an unsupported record type error
    pub fn unsupported_type(record_type: impl Into<String>) -> Self {
        Self::UnsupportedType(record_type.into())
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a remote exit error
    pub fn remote_exit(command: impl Into<String>, exit_code: i32, stderr: impl Into<String>) -> Self {
        Self::RemoteExit {
            command: command.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error means the record does not exist on the server
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
