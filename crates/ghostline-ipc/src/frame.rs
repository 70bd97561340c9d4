//! Frame codec
//!
//! One frame is one line of JSON:
//!
//! ```text
//! {"command": "get_contact", "id": 7, "data": {"user_guid": "iMessage;-;+15551234"}}
//! ```
//!
//! `id` is omitted (or zero) on events that expect no reply. Replies reuse the
//! request id with the reserved `response` / `error` commands.

use crate::error::{IpcError, IpcResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlation token reserved for frames that expect no reply
pub const NO_REPLY: u64 = 0;

fn is_no_reply(id: &u64) -> bool {
    *id == NO_REPLY
}

/// A single decoded frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Wire name of the command
    pub command: String,
    /// Correlation token, [`NO_REPLY`] for events
    #[serde(default, skip_serializing_if = "is_no_reply")]
    pub id: u64,
    /// Opaque payload, decoded by whoever handles the command
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    /// Build a frame from a command name, id and payload
    pub fn new(command: impl Into<String>, id: u64, data: Value) -> Self {
        Self {
            command: command.into(),
            id,
            data,
        }
    }

    /// Whether the sender expects a reply
    pub fn expects_reply(&self) -> bool {
        self.id != NO_REPLY
    }

    /// Encode the frame as a newline-terminated JSON line
    pub fn encode(&self) -> IpcResult<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    /// Decode one line (without its terminator)
    pub fn decode(line: &str) -> IpcResult<Self> {
        serde_json::from_str(line).map_err(|e| IpcError::malformed(e.to_string()))
    }
}

/// Payload of an `error` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable description
    #[serde(default)]
    pub message: String,
}

impl ErrorPayload {
    /// Build an error payload
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<ErrorPayload> for IpcError {
    fn from(payload: ErrorPayload) -> Self {
        IpcError::Remote {
            code: payload.code,
            message: payload.message,
        }
    }
}
