//! Processor configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_request_timeout_ms() -> u64 {
    30_000
}

/// IPC processor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcConfig {
    /// Deadline applied by [`crate::Processor::request`] in milliseconds.
    ///
    /// Zero disables the default deadline; requests then wait until a reply
    /// arrives, the caller cancels, or the stream closes.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl IpcConfig {
    /// Default request deadline, if any
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}
