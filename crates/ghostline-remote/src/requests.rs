//! Request payloads for outbound commands

#![allow(missing_docs)]

use crate::time::float_seconds;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// `get_messages_after`
#[derive(Debug, Clone, Serialize)]
pub struct GetMessagesAfterRequest<'a> {
    pub chat_guid: &'a str,
    #[serde(with = "float_seconds")]
    pub timestamp: DateTime<Utc>,
}

/// `get_recent_messages`
#[derive(Debug, Clone, Serialize)]
pub struct GetRecentMessagesRequest<'a> {
    pub chat_guid: &'a str,
    pub limit: usize,
}

/// `get_chats`
#[derive(Debug, Clone, Serialize)]
pub struct GetChatsRequest {
    #[serde(with = "float_seconds")]
    pub min_timestamp: DateTime<Utc>,
}

/// `get_chat` and `get_chat_avatar`
#[derive(Debug, Clone, Serialize)]
pub struct GetChatRequest<'a> {
    pub chat_guid: &'a str,
}

/// `get_contact`
#[derive(Debug, Clone, Serialize)]
pub struct GetContactRequest<'a> {
    pub user_guid: &'a str,
}

/// `send_message`
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest<'a> {
    pub chat_guid: &'a str,
    pub text: &'a str,
}

/// `send_media`
#[derive(Debug, Clone, Serialize)]
pub struct SendMediaRequest<'a> {
    pub chat_guid: &'a str,
    #[serde(flatten)]
    pub attachment: crate::types::Attachment,
}

/// `send_tapback`
#[derive(Debug, Clone, Serialize)]
pub struct SendTapbackRequest<'a> {
    pub chat_guid: &'a str,
    pub target_guid: &'a str,
    #[serde(rename = "type")]
    pub code: u32,
}

/// `send_read_receipt`
#[derive(Debug, Clone, Serialize)]
pub struct SendReadReceiptRequest<'a> {
    pub chat_guid: &'a str,
    pub read_up_to: &'a str,
}

/// `set_typing`
#[derive(Debug, Clone, Serialize)]
pub struct SetTypingRequest<'a> {
    pub chat_guid: &'a str,
    pub typing: bool,
}
