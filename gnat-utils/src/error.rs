//! Error types for gnat
//!
//! Provides a unified error type used across all gnat crates.

/// Main error type for gnat operations
#[derive(Debug, thiserror::Error)]
pub enum GnatError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // === Connection Errors ===

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    // === Protocol Errors ===

    #[error("Protocol error: {0}")]
    Protocol(String),

    // === Usage Errors ===

    #[error("Invalid subject {subject:?}: {reason}")]
    BadSubject { subject: String, reason: String },

    #[error("Invalid payload: {0}")]
    BadPayload(String),

    // === Timeouts ===

    #[error("Request on \"{subject}\" timed out after {timeout_ms}ms")]
    RequestTimeout { subject: String, timeout_ms: u64 },

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GnatError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error means the connection is unusable
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Connection(_) | Self::ConnectionClosed | Self::NotConnected
        )
    }
}

/// Result type alias using GnatError
pub type Result<T> = std::result::Result<T, GnatError>;
