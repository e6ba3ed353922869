//! Bridge-wide error types
//!
//! This module defines the centralized error type using `thiserror`.
//! Every variant maps to a stable wire error code so the gateway can
//! turn failures into the uniform `{success: false, error}` shape.

use std::time::Duration;
use thiserror::Error;

/// Wire error codes surfaced to callers
pub mod codes {
    pub const NOT_CONNECTED: &str = "NOT_CONNECTED";
    pub const CONNECTION_FAILED: &str = "CONNECTION_FAILED";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const CONNECTION_CLOSED: &str = "CONNECTION_CLOSED";
    pub const UNKNOWN_COMMAND: &str = "UNKNOWN_COMMAND";
    pub const UNKNOWN_TOOL: &str = "UNKNOWN_TOOL";
    pub const INVALID_ARGUMENTS: &str = "INVALID_ARGUMENTS";
    pub const SEND_ERROR: &str = "SEND_ERROR";
    pub const TOOL_ERROR: &str = "TOOL_ERROR";
    /// Used when the host reports a failure without an error body
    pub const HOST_ERROR: &str = "HOST_ERROR";
}

/// Bridge-wide error type
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No live connection to the host
    #[error("Not connected to host")]
    NotConnected,

    /// The host actively refused the connection
    #[error("Connection refused at {endpoint}")]
    ConnectionRefused { endpoint: String },

    /// The connection attempt did not complete in time
    #[error("Connection to {endpoint} timed out after {}s", .timeout.as_secs_f64())]
    ConnectTimeout { endpoint: String, timeout: Duration },

    /// Any other connection failure (handshake, DNS, ...)
    #[error("Failed to connect to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// No response arrived for a request in time
    #[error("Command '{command}' timed out after {}s", .timeout.as_secs_f64())]
    Timeout { command: String, timeout: Duration },

    /// The connection went away while the request was outstanding
    #[error("Connection to host was closed")]
    ConnectionClosed,

    /// The session already carried a connection; reconnecting needs a new one
    #[error("Host session already closed; open a new session to reconnect")]
    SessionClosed,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Writing a frame to the socket failed
    #[error("Send failed: {0}")]
    Send(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl BridgeError {
    /// Wire error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::NotConnected => codes::NOT_CONNECTED,
            BridgeError::ConnectionRefused { .. }
            | BridgeError::ConnectTimeout { .. }
            | BridgeError::ConnectionFailed { .. } => codes::CONNECTION_FAILED,
            BridgeError::Timeout { .. } => codes::TIMEOUT,
            BridgeError::ConnectionClosed | BridgeError::SessionClosed => {
                codes::CONNECTION_CLOSED
            }
            BridgeError::UnknownCommand(_) => codes::UNKNOWN_COMMAND,
            BridgeError::UnknownTool(_) => codes::UNKNOWN_TOOL,
            BridgeError::InvalidArguments(_) => codes::INVALID_ARGUMENTS,
            BridgeError::Send(_) => codes::SEND_ERROR,
            BridgeError::Serialization(_) | BridgeError::Io(_) => codes::TOOL_ERROR,
        }
    }

    /// Whether a reconnect could make the same call succeed
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            BridgeError::NotConnected
                | BridgeError::ConnectionRefused { .. }
                | BridgeError::ConnectTimeout { .. }
                | BridgeError::ConnectionFailed { .. }
                | BridgeError::ConnectionClosed
                | BridgeError::SessionClosed
        )
    }
}

impl From<BridgeError> for String {
    fn from(error: BridgeError) -> String {
        error.to_string()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, BridgeError>;

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
