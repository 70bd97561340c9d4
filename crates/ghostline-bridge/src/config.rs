//! Bridge Configuration
//!
//! Loaded from TOML. Every section has defaults, so an empty document is a
//! valid configuration apart from the homeserver domain.

use crate::error::{BridgeError, BridgeResult};
use ghostline_ipc::IpcConfig;
use ghostline_remote::ChannelConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Placeholder for the encoded remote id in the username template
pub const USERID_PLACEHOLDER: &str = "{userid}";
/// Placeholder for the contact name in the display name template
pub const DISPLAYNAME_PLACEHOLDER: &str = "{displayname}";

/// Complete bridge configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Homeserver the bridge registers puppets on
    pub homeserver: HomeserverConfig,
    /// Puppet naming
    pub bridge: NamingConfig,
    /// Agent IPC settings
    pub ipc: IpcConfig,
    /// Event queue capacities
    pub channels: ChannelConfig,
    /// Override avatar downloads
    pub avatar: AvatarConfig,
}

/// Homeserver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeserverConfig {
    /// Server name used in puppet user ids
    pub domain: String,
}

impl Default for HomeserverConfig {
    fn default() -> Self {
        Self {
            domain: "localhost".to_string(),
        }
    }
}

/// Puppet naming templates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Localpart template, must contain `{userid}`
    pub username_template: String,
    /// Display name template, must contain `{displayname}`
    pub displayname_template: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            username_template: "imessage_{userid}".to_string(),
            displayname_template: "{displayname} (iMessage)".to_string(),
        }
    }
}

impl NamingConfig {
    /// Apply the display name template
    pub fn format_displayname(&self, name: &str) -> String {
        self.displayname_template
            .replace(DISPLAYNAME_PLACEHOLDER, name)
    }
}

/// Override avatar download settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    /// Whole-request download timeout in seconds
    pub download_timeout_secs: u64,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            download_timeout_secs: 30,
        }
    }
}

impl AvatarConfig {
    /// Download timeout as a duration
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

impl BridgeConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(input: &str) -> BridgeResult<Self> {
        let config: Self =
            toml::from_str(input).map_err(|e| BridgeError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&input)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> BridgeResult<()> {
        if self.homeserver.domain.is_empty() {
            return Err(BridgeError::config("homeserver.domain must not be empty"));
        }
        if !self.bridge.username_template.contains(USERID_PLACEHOLDER) {
            return Err(BridgeError::config(format!(
                "bridge.username_template must contain {USERID_PLACEHOLDER}"
            )));
        }
        if !self
            .bridge
            .displayname_template
            .contains(DISPLAYNAME_PLACEHOLDER)
        {
            return Err(BridgeError::config(format!(
                "bridge.displayname_template must contain {DISPLAYNAME_PLACEHOLDER}"
            )));
        }
        if !self.channels.is_valid() {
            return Err(BridgeError::config("channel capacities must be positive"));
        }
        Ok(())
    }
}
