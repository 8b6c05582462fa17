//! Error types for the StackQL client.
//!
//! Every public operation either succeeds or fails with one of these kinds;
//! none are swallowed along the way.

use thiserror::Error;

/// Main error type for client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// A process-mode call exceeded its execution deadline.
    #[error("Query timed out after {0} seconds")]
    Timeout(u64),

    /// Non-zero exit from the runtime, or an error response from the server.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// The server could not be reached when the session was created.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The established server connection broke; the session must be rebuilt.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Structured output could not be decoded.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Batch execution was requested with a presentation output format.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Contradictory or invalid options.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The runtime executable is missing or could not be probed.
    #[error("Binary error: {0}")]
    Binary(String),

    /// Unexpected states, such as a panicked batch task.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Creates an execution failure with the given message.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a connection-lost error with the given message.
    pub fn connection_lost(msg: impl Into<String>) -> Self {
        Self::ConnectionLost(msg.into())
    }

    /// Creates a parse error with the given message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Creates an unsupported-format error with the given message.
    pub fn unsupported_format(msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a binary error with the given message.
    pub fn binary(msg: impl Into<String>) -> Self {
        Self::Binary(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "Timeout",
            Self::ExecutionFailed(_) => "Execution Failed",
            Self::Connection(_) => "Connection Error",
            Self::ConnectionLost(_) => "Connection Lost",
            Self::Parse(_) => "Parse Error",
            Self::UnsupportedFormat(_) => "Unsupported Format",
            Self::Config(_) => "Configuration Error",
            Self::Binary(_) => "Binary Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;
