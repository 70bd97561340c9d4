//! Remote API errors

use ghostline_ipc::IpcError;

/// Error type for remote API calls
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The IPC exchange with the agent failed
    #[error(transparent)]
    Ipc(#[from] IpcError),

    /// Staging a file for the agent failed
    #[error("I/O error: {message}")]
    Io {
        /// Underlying I/O failure
        message: String,
    },

    /// The connector does not support the operation
    #[error("Unsupported operation: {operation}")]
    Unsupported {
        /// Name of the rejected operation
        operation: &'static str,
    },
}

impl RemoteError {
    /// Create an I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Whether a retry by the caller could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            RemoteError::Ipc(err) => err.is_recoverable(),
            RemoteError::Io { .. } => true,
            RemoteError::Unsupported { .. } => false,
        }
    }
}

impl From<std::io::Error> for RemoteError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

/// Result alias for remote API calls
pub type RemoteResult<T> = Result<T, RemoteError>;
