//! Remote network API
//!
//! [`RemoteApi`] is the seam between the bridge and whatever talks to the
//! agent. The production implementation is
//! [`RemoteConnector`](crate::connector::RemoteConnector); tests substitute
//! scripted fakes.

use crate::error::RemoteResult;
use crate::identifier::Identifier;
use crate::types::{
    Attachment, ChatInfo, ConnectorCapabilities, Contact, Message, SendResponse, TapbackType,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Operations the bridge can perform against the remote network
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Messages in a conversation sent after `since`
    async fn get_messages_since(
        &self,
        chat: &Identifier,
        since: DateTime<Utc>,
    ) -> RemoteResult<Vec<Message>>;

    /// The latest `limit` messages in a conversation
    async fn get_messages_with_limit(
        &self,
        chat: &Identifier,
        limit: usize,
    ) -> RemoteResult<Vec<Message>>;

    /// Conversations with activity after `since`
    async fn get_chats_with_messages_after(
        &self,
        since: DateTime<Utc>,
    ) -> RemoteResult<Vec<Identifier>>;

    /// Address book entry for a participant, `None` when unknown
    async fn get_contact_info(&self, user: &Identifier) -> RemoteResult<Option<Contact>>;

    /// Conversation metadata
    async fn get_chat_info(&self, chat: &Identifier) -> RemoteResult<ChatInfo>;

    /// Group conversation picture staged on disk by the agent, `None` when
    /// unset
    async fn get_group_avatar(&self, chat: &Identifier) -> RemoteResult<Option<Attachment>>;

    /// Send a text message
    async fn send_message(&self, chat: &Identifier, text: &str) -> RemoteResult<SendResponse>;

    /// Send a file as an attachment
    async fn send_file(
        &self,
        chat: &Identifier,
        file_name: &str,
        data: &[u8],
    ) -> RemoteResult<SendResponse>;

    /// Add or remove a tapback on a message
    async fn send_tapback(
        &self,
        chat: &Identifier,
        target_guid: &str,
        kind: TapbackType,
        remove: bool,
    ) -> RemoteResult<SendResponse>;

    /// Mark a conversation read up to a message
    async fn send_read_receipt(&self, chat: &Identifier, read_up_to: &str) -> RemoteResult<()>;

    /// Start or stop the local typing indicator
    async fn send_typing_notification(&self, chat: &Identifier, typing: bool)
        -> RemoteResult<()>;

    /// Static feature set of this connector
    fn capabilities(&self) -> ConnectorCapabilities;
}
