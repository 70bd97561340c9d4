//! IPC error types
//!
//! Errors raised by the processor fall in two groups. Request-level errors
//! (`Transport`, `Timeout`, `Canceled`, `Remote`, `Closed`) are returned to the
//! single caller that issued the request. Frame-level errors
//! (`MalformedFrame`) never leave the read loop: the offending frame is
//! dropped and decoding continues with the next one.

use serde::{Deserialize, Serialize};

/// Error type for all IPC operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum IpcError {
    /// Writing to or reading from the stream failed
    #[error("Transport error: {message}")]
    Transport {
        /// Underlying I/O failure
        message: String,
    },

    /// No reply arrived before the request deadline
    #[error("Request {command} timed out")]
    Timeout {
        /// Command that was waiting for a reply
        command: String,
    },

    /// The caller abandoned the request
    #[error("Request {command} was canceled")]
    Canceled {
        /// Command that was waiting for a reply
        command: String,
    },

    /// A frame could not be decoded
    #[error("Malformed frame: {message}")]
    MalformedFrame {
        /// Decoder diagnostic
        message: String,
    },

    /// A payload could not be encoded or a reply payload could not be decoded
    #[error("Serialization error: {message}")]
    Serialization {
        /// Serializer diagnostic
        message: String,
    },

    /// The agent answered the request with an error frame
    #[error("Agent returned {code}: {message}")]
    Remote {
        /// Machine-readable error code sent by the agent
        code: String,
        /// Human-readable description sent by the agent
        message: String,
    },

    /// The read loop stopped while the request was outstanding
    #[error("IPC stream closed")]
    Closed,
}

impl IpcError {
    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a timeout error for the given command
    pub fn timeout(command: impl Into<String>) -> Self {
        Self::Timeout {
            command: command.into(),
        }
    }

    /// Create a cancellation error for the given command
    pub fn canceled(command: impl Into<String>) -> Self {
        Self::Canceled {
            command: command.into(),
        }
    }

    /// Create a malformed frame error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedFrame {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Whether the caller may reasonably retry the request
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Canceled { .. })
    }
}

impl From<serde_json::Error> for IpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<std::io::Error> for IpcError {
    fn from(err: std::io::Error) -> Self {
        Self::transport(err.to_string())
    }
}

/// Standard Result type for IPC operations
pub type IpcResult<T> = std::result::Result<T, IpcError>;
