//! Error types for MCP operations

use std::time::Duration;
use thiserror::Error;

/// Result type for MCP operations
pub type McpResult<T> = Result<T, McpError>;

/// Error type covering the orchestrator's MCP paths
#[derive(Error, Debug)]
pub enum McpError {
    /// Transport-level errors (broken pipe, write failure)
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Child process could not be spawned
    #[error("Spawn failed: {message}")]
    SpawnFailed { message: String },

    /// MCP initialize handshake failed
    #[error("Initialization failed: {message}")]
    InitializationFailed { message: String },

    /// The stream closed while requests were outstanding
    #[error("Connection lost: {message}")]
    ConnectionLost { message: String },

    /// A request did not complete within its deadline
    #[error("Request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Protocol-level errors (malformed frames, unexpected shapes)
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// The child answered with a JSON-RPC error
    #[error("Tool execution failed ({code}): {message}")]
    ToolError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Unknown session, server, or namespace
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Invalid server configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Internal invariant violation
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl McpError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify this error for health bookkeeping
    pub fn kind(&self) -> ErrorKind {
        match self {
            McpError::Timeout { .. } => ErrorKind::Timeout,
            McpError::Transport { .. } | McpError::ConnectionLost { .. } | McpError::SpawnFailed { .. } => {
                ErrorKind::Connection
            }
            McpError::InitializationFailed { .. } => ErrorKind::Initialization,
            McpError::Protocol { .. } | McpError::Serialization { .. } => ErrorKind::Protocol,
            McpError::ToolError { .. } => ErrorKind::ToolExecution,
            _ => classify_message(&self.to_string()),
        }
    }
}

/// Coarse error categories driving health transitions and retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Timeout,
    Protocol,
    Initialization,
    ToolExecution,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Initialization => "initialization",
            ErrorKind::ToolExecution => "tool_execution",
            ErrorKind::Unknown => "unknown",
        }
    }
}

/// Classify a free-form error message into an [`ErrorKind`]
///
/// Used for errors that arrive as text (child stderr, pass-through child
/// errors) rather than as a typed `McpError`.
pub fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();

    if lower.contains("timeout") || lower.contains("timed out") {
        ErrorKind::Timeout
    } else if lower.contains("connection") || lower.contains("refused") || lower.contains("reset") {
        ErrorKind::Connection
    } else if lower.contains("initialize") || lower.contains("initialization") {
        ErrorKind::Initialization
    } else if lower.contains("protocol") || lower.contains("invalid message") {
        ErrorKind::Protocol
    } else if lower.contains("tool") {
        ErrorKind::ToolExecution
    } else {
        ErrorKind::Unknown
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for McpError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => McpError::Timeout {
                timeout: Duration::from_secs(0),
            },
            std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::UnexpectedEof => McpError::ConnectionLost {
                message: err.to_string(),
            },
            _ => McpError::Transport {
                message: err.to_string(),
            },
        }
    }
}
