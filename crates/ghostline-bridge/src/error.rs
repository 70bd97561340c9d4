//! Bridge error types
//!
//! Every failure in this crate is scoped to one operation on one puppet or
//! portal. Callers log and carry on; nothing here is fatal to the process.

use ghostline_ipc::IpcError;
use ghostline_remote::{IdentifierError, RemoteError};

/// Error type for bridge operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// An IPC exchange with the agent failed
    #[error(transparent)]
    Ipc(#[from] IpcError),

    /// A remote API call failed
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A remote identifier could not be parsed
    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    /// The durable store rejected an operation
    #[error("Store error: {message}")]
    Store {
        /// Description of the storage failure
        message: String,
    },

    /// The homeserver rejected a request
    #[error("Homeserver error: {message}")]
    Homeserver {
        /// Description of the homeserver failure
        message: String,
    },

    /// Media upload to the homeserver failed
    #[error("Upload failed: {message}")]
    UploadFailed {
        /// Description of the upload failure
        message: String,
    },

    /// Downloading an override avatar failed
    #[error("Avatar fetch from {url} failed: {message}")]
    AvatarFetch {
        /// Location the avatar was requested from
        url: String,
        /// Description of the download failure
        message: String,
    },

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration problem
        message: String,
    },

    /// A user id does not belong to a puppet
    #[error("Not a puppet user id: {user_id}")]
    InvalidUserId {
        /// The rejected user id
        user_id: String,
    },
}

impl BridgeError {
    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a homeserver error
    pub fn homeserver(message: impl Into<String>) -> Self {
        Self::Homeserver {
            message: message.into(),
        }
    }

    /// Create an upload error
    pub fn upload_failed(message: impl Into<String>) -> Self {
        Self::UploadFailed {
            message: message.into(),
        }
    }

    /// Create an avatar fetch error
    pub fn avatar_fetch(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AvatarFetch {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
