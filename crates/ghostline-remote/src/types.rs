//! Remote-network value types exchanged with the agent

use crate::identifier::Identifier;
use crate::time::float_seconds;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Offset added to a tapback type to express its removal
pub const TAPBACK_REMOVE_OFFSET: u32 = 1000;

/// Kind of tapback reaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TapbackType {
    /// Heart
    Love,
    /// Thumbs up
    Like,
    /// Thumbs down
    Dislike,
    /// Ha ha
    Laugh,
    /// Double exclamation
    Emphasis,
    /// Question mark
    Question,
}

impl TapbackType {
    /// Wire code of the reaction when it is added
    pub fn code(self) -> u32 {
        match self {
            TapbackType::Love => 2000,
            TapbackType::Like => 2001,
            TapbackType::Dislike => 2002,
            TapbackType::Laugh => 2003,
            TapbackType::Emphasis => 2004,
            TapbackType::Question => 2005,
        }
    }

    /// Wire code for adding (`remove == false`) or removing the reaction
    pub fn wire_code(self, remove: bool) -> u32 {
        if remove {
            self.code() + TAPBACK_REMOVE_OFFSET
        } else {
            self.code()
        }
    }

    /// Reaction for an add-code, if known
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            2000 => TapbackType::Love,
            2001 => TapbackType::Like,
            2002 => TapbackType::Dislike,
            2003 => TapbackType::Laugh,
            2004 => TapbackType::Emphasis,
            2005 => TapbackType::Question,
            _ => return None,
        })
    }
}

/// Tapback decode failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TapbackError {
    /// The type code is not a known reaction
    #[error("unknown tapback type {0}")]
    UnknownType(u32),
    /// The target GUID has an unexpected shape
    #[error("unexpected tapback target {0:?}")]
    BadTarget(String),
}

/// Tapback as sent on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tapback {
    /// Target message GUID, optionally prefixed with `p:<part>/` or `bp:`
    pub target_guid: String,
    /// Reaction code; removals are offset by [`TAPBACK_REMOVE_OFFSET`]
    #[serde(rename = "type")]
    pub code: u32,
}

/// Decoded tapback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    /// GUID of the message the reaction applies to
    pub target_guid: String,
    /// Message part index the reaction applies to
    pub target_part: u32,
    /// Reaction kind
    pub kind: TapbackType,
    /// Whether the reaction is being removed
    pub remove: bool,
}

impl Tapback {
    /// Split the wire form into target, part, kind and polarity
    pub fn parse(&self) -> Result<Reaction, TapbackError> {
        let (code, remove) = if (3000..4000).contains(&self.code) {
            (self.code - TAPBACK_REMOVE_OFFSET, true)
        } else {
            (self.code, false)
        };
        let kind = TapbackType::from_code(code).ok_or(TapbackError::UnknownType(self.code))?;

        let (target_guid, target_part) = if let Some(guid) = self.target_guid.strip_prefix("bp:") {
            (guid.to_string(), 0)
        } else if let Some(rest) = self.target_guid.strip_prefix("p:") {
            let (part, guid) = rest
                .split_once('/')
                .ok_or_else(|| TapbackError::BadTarget(self.target_guid.clone()))?;
            let part = part
                .parse()
                .map_err(|_| TapbackError::BadTarget(self.target_guid.clone()))?;
            (guid.to_string(), part)
        } else {
            (self.target_guid.clone(), 0)
        };

        Ok(Reaction {
            target_guid,
            target_part,
            kind,
            remove,
        })
    }
}

/// File attached to a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// MIME type, if known
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mime_type: String,
    /// Original file name
    #[serde(rename = "name", default)]
    pub file_name: String,
    /// Location readable by both the agent and the bridge
    #[serde(rename = "path", default)]
    pub path_on_disk: String,
}

/// Group-level change carried by a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum GroupAction {
    /// The group was renamed to `Message::new_group_name`
    SetName,
}

/// One remote message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message GUID
    pub guid: String,
    /// Send time
    #[serde(rename = "timestamp", with = "float_seconds", default)]
    pub time: DateTime<Utc>,
    /// Subject line
    #[serde(default)]
    pub subject: String,
    /// Body text
    #[serde(default)]
    pub text: String,
    /// Conversation the message belongs to
    pub chat_guid: String,
    /// Raw sender identifier
    #[serde(default)]
    pub sender_guid: String,
    /// Parsed sender, filled in for messages not sent by the local user
    #[serde(skip)]
    pub sender: Option<Identifier>,
    /// Service the message travelled over
    #[serde(default)]
    pub service: String,
    /// Sent by the local user
    #[serde(default)]
    pub is_from_me: bool,
    /// Already read on the remote device
    #[serde(default)]
    pub is_read: bool,
    /// Voice memo
    #[serde(default)]
    pub is_audio_message: bool,
    /// GUID of the message this one replies to
    #[serde(rename = "thread_originator_guid", default)]
    pub reply_to_guid: String,
    /// Tapback carried by this message
    #[serde(rename = "associated_message", default, skip_serializing_if = "Option::is_none")]
    pub tapback: Option<Tapback>,
    /// Decoded tapback
    #[serde(skip)]
    pub reaction: Option<Reaction>,
    /// Single attachment (legacy agents)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    /// All attachments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// New group title, for rename events
    #[serde(rename = "new_group_title", default, skip_serializing_if = "String::is_empty")]
    pub new_group_name: String,
    /// Group-level change carried by the message
    #[serde(skip)]
    pub group_action: Option<GroupAction>,
}

impl Message {
    /// Fill in derived fields after decoding.
    ///
    /// Parses the sender, decodes the tapback, marks renames, and makes the
    /// single-attachment and attachment-list forms agree.
    pub fn postprocess(&mut self) {
        if !self.is_from_me {
            match Identifier::parse(&self.sender_guid) {
                Ok(sender) => self.sender = Some(sender),
                Err(err) => {
                    warn!(guid = %self.guid, error = %err, "Failed to parse message sender");
                }
            }
        }
        if let Some(tapback) = &self.tapback {
            match tapback.parse() {
                Ok(reaction) => self.reaction = Some(reaction),
                Err(err) => warn!(guid = %self.guid, error = %err, "Failed to parse tapback"),
            }
        }
        if !self.new_group_name.is_empty() {
            self.group_action = Some(GroupAction::SetName);
        }
        match (&self.attachment, self.attachments.is_empty()) {
            (Some(single), true) => self.attachments = vec![single.clone()],
            (None, false) => self.attachment = self.attachments.first().cloned(),
            _ => {}
        }
    }
}

/// Address book entry for a remote participant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Given name
    #[serde(default)]
    pub first_name: String,
    /// Family name
    #[serde(default)]
    pub last_name: String,
    /// Nickname
    #[serde(default)]
    pub nickname: String,
    /// Avatar image, base64 on the wire
    #[serde(rename = "avatar", default, skip_serializing_if = "String::is_empty")]
    pub avatar_b64: String,
    /// Decoded avatar image
    #[serde(skip)]
    pub avatar: Option<Vec<u8>>,
    /// Phone numbers
    #[serde(default)]
    pub phones: Vec<String>,
    /// Email addresses
    #[serde(default)]
    pub emails: Vec<String>,
    /// Identifier the contact was looked up with
    #[serde(default)]
    pub user_guid: String,
}

impl Contact {
    /// Whether the address book has an actual name (not just an address)
    pub fn has_name(&self) -> bool {
        !self.first_name.is_empty() || !self.last_name.is_empty() || !self.nickname.is_empty()
    }

    /// Best display name: full name, then nickname, then first address
    pub fn name(&self) -> String {
        match (self.first_name.is_empty(), self.last_name.is_empty()) {
            (false, false) => format!("{} {}", self.first_name, self.last_name),
            (false, true) => self.first_name.clone(),
            (true, false) => self.last_name.clone(),
            (true, true) => [&self.nickname]
                .into_iter()
                .chain(self.emails.first())
                .chain(self.phones.first())
                .find(|s| !s.is_empty())
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Decode the base64 avatar into [`Contact::avatar`]; a bad encoding is
    /// logged and leaves the avatar unset.
    pub fn decode_avatar(&mut self) {
        if self.avatar_b64.is_empty() {
            return;
        }
        match STANDARD.decode(self.avatar_b64.as_bytes()) {
            Ok(bytes) => self.avatar = Some(bytes),
            Err(err) => {
                warn!(user_guid = %self.user_guid, error = %err, "Failed to decode contact avatar");
            }
        }
    }
}

/// Conversation metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatInfo {
    /// Display name of the conversation
    #[serde(rename = "title", default)]
    pub display_name: String,
    /// Member identifiers
    #[serde(default)]
    pub members: Vec<String>,
}

/// Remote read receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadReceipt {
    /// Identifier of the reader
    #[serde(default)]
    pub sender_guid: String,
    /// Read by the local user on another device
    #[serde(default)]
    pub is_from_me: bool,
    /// Conversation the receipt applies to
    pub chat_guid: String,
    /// Last message GUID read
    pub read_up_to: String,
    /// When the messages were read
    #[serde(with = "float_seconds", default)]
    pub read_at: DateTime<Utc>,
}

/// Remote typing indicator change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingNotification {
    /// Conversation the indicator applies to
    pub chat_guid: String,
    /// Whether the participant started or stopped typing
    pub typing: bool,
}

/// Acknowledgement for an outbound message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendResponse {
    /// GUID assigned to the sent message
    pub guid: String,
    /// Service the message went out on
    #[serde(default)]
    pub service: String,
    /// When the agent sent it
    #[serde(with = "float_seconds", default)]
    pub timestamp: DateTime<Utc>,
}

/// Features the agent supports, queried once at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorCapabilities {
    /// Sends return a [`SendResponse`]
    pub message_send_responses: bool,
    /// Tapbacks can be sent
    pub send_tapbacks: bool,
    /// Read receipts can be sent
    pub send_read_receipts: bool,
    /// Typing indicators can be sent
    pub send_typing_notifications: bool,
}
