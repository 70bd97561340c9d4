//! Remote identifier codec
//!
//! Remote participants and conversations are named `service;marker;local-id`,
//! for example `iMessage;-;+15551234` (direct) or `iMessage;+;chat4521`
//! (group). The marker is `-` for direct chats and `+` for groups.

use std::fmt;
use std::str::FromStr;

/// Primary service name
pub const IMESSAGE_SERVICE: &str = "iMessage";
/// Fallback service for phone-number participants
pub const SMS_SERVICE: &str = "SMS";

const SEPARATOR: char = ';';
const DIRECT_MARKER: &str = "-";
const GROUP_MARKER: &str = "+";

/// Identifier decode failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    /// Separator missing, unknown marker, or an empty part
    #[error("Malformed identifier {input:?}: {reason}")]
    Malformed {
        /// The string that failed to parse
        input: String,
        /// What was wrong with it
        reason: &'static str,
    },
}

/// Structured remote identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier {
    /// Originating service, e.g. `iMessage` or `SMS`
    pub service: String,
    /// Whether the identifier names a group conversation
    pub is_group: bool,
    /// Service-local id: phone number, email, or group chat id
    pub local_id: String,
}

impl Identifier {
    /// Identifier of a direct conversation / participant
    pub fn direct(service: impl Into<String>, local_id: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            is_group: false,
            local_id: local_id.into(),
        }
    }

    /// Identifier of a group conversation
    pub fn group(service: impl Into<String>, local_id: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            is_group: true,
            local_id: local_id.into(),
        }
    }

    /// Parse the canonical `service;marker;local-id` form
    pub fn parse(input: &str) -> Result<Self, IdentifierError> {
        let malformed = |reason| IdentifierError::Malformed {
            input: input.to_string(),
            reason,
        };
        let mut parts = input.splitn(3, SEPARATOR);
        let service = parts.next().unwrap_or_default();
        let (Some(marker), Some(local_id)) = (parts.next(), parts.next()) else {
            return Err(malformed("missing separator"));
        };
        if service.is_empty() {
            return Err(malformed("empty service"));
        }
        if local_id.is_empty() {
            return Err(malformed("empty local id"));
        }
        let is_group = match marker {
            DIRECT_MARKER => false,
            GROUP_MARKER => true,
            _ => return Err(malformed("unknown chat marker")),
        };
        Ok(Self {
            service: service.to_string(),
            is_group,
            local_id: local_id.to_string(),
        })
    }

    /// Whether the local id is shaped like a phone number
    pub fn is_phone_number(&self) -> bool {
        is_phone_number(&self.local_id)
    }

    /// Whether this identifier comes from the SMS fallback service
    pub fn is_fallback_service(&self) -> bool {
        self.service == SMS_SERVICE
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.is_group {
            GROUP_MARKER
        } else {
            DIRECT_MARKER
        };
        write!(f, "{}{SEPARATOR}{marker}{SEPARATOR}{}", self.service, self.local_id)
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Whether a local id is an international phone number (`+` followed by digits)
pub fn is_phone_number(local_id: &str) -> bool {
    local_id
        .strip_prefix('+')
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Every direct-conversation identifier a participant's local id is valid
/// under: the primary service always, plus the fallback service for phone
/// numbers.
pub fn direct_chat_variants(local_id: &str) -> Vec<Identifier> {
    let mut variants = vec![Identifier::direct(IMESSAGE_SERVICE, local_id)];
    if local_id.starts_with('+') {
        variants.push(Identifier::direct(SMS_SERVICE, local_id));
    }
    variants
}
