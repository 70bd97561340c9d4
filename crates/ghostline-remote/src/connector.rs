//! IPC-backed remote connector
//!
//! Implements [`RemoteApi`] on top of an [`ghostline_ipc::Processor`] and
//! turns the agent's unsolicited frames into events on the bounded fan-out
//! queues.

use crate::api::RemoteApi;
use crate::channels::{event_channels, ChannelConfig, ChannelStats, EventReceivers, EventSenders};
use crate::error::{RemoteError, RemoteResult};
use crate::identifier::Identifier;
use crate::mime;
use crate::requests::{
    GetChatRequest, GetChatsRequest, GetContactRequest, GetMessagesAfterRequest,
    GetRecentMessagesRequest, SendMediaRequest, SendMessageRequest, SendReadReceiptRequest,
    SendTapbackRequest, SetTypingRequest,
};
use crate::types::{
    Attachment, ChatInfo, ConnectorCapabilities, Contact, Message, ReadReceipt, SendResponse,
    TapbackType, TypingNotification,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ghostline_ipc::{Command, Processor};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

const UPLOAD_DIR_PREFIX: &str = "ghostline-upload";

/// Remote API client speaking to the agent over one IPC processor
#[derive(Debug)]
pub struct RemoteConnector {
    processor: Arc<Processor>,
    events: EventSenders,
}

impl RemoteConnector {
    /// Create a connector and the queues its events are delivered on.
    ///
    /// Inbound events flow only after [`RemoteConnector::start`].
    pub fn new(processor: Arc<Processor>, channels: ChannelConfig) -> (Arc<Self>, EventReceivers) {
        let (events, receivers) = event_channels(channels);
        (Arc::new(Self { processor, events }), receivers)
    }

    /// Register the inbound event handlers on the processor
    pub fn start(&self) {
        let events = self.events.clone();
        self.processor
            .set_handler(Command::IncomingMessage, move |data| {
                if let Some(mut message) = decode_event::<Message>(Command::IncomingMessage, data) {
                    message.postprocess();
                    events.offer_message(message);
                }
                None
            });

        let events = self.events.clone();
        self.processor
            .set_handler(Command::IncomingReadReceipt, move |data| {
                if let Some(receipt) = decode_event::<ReadReceipt>(Command::IncomingReadReceipt, data)
                {
                    events.offer_receipt(receipt);
                }
                None
            });

        let events = self.events.clone();
        self.processor.set_handler(Command::IncomingTyping, move |data| {
            if let Some(notification) =
                decode_event::<TypingNotification>(Command::IncomingTyping, data)
            {
                events.offer_typing(notification);
            }
            None
        });
        debug!("Remote connector handlers registered");
    }

    /// Events dropped so far because a queue was full
    pub fn channel_stats(&self) -> ChannelStats {
        self.events.stats()
    }

    /// Underlying IPC processor
    pub fn processor(&self) -> &Arc<Processor> {
        &self.processor
    }
}

fn decode_event<T: DeserializeOwned>(command: Command, data: Value) -> Option<T> {
    match serde_json::from_value(data) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(%command, error = %err, "Failed to decode inbound event");
            None
        }
    }
}

fn postprocess_all(mut messages: Vec<Message>) -> Vec<Message> {
    for message in &mut messages {
        message.postprocess();
    }
    messages
}

/// Strip any directory components from a caller-supplied file name
fn upload_file_name(file_name: &str, extension: Option<&str>) -> String {
    match Path::new(file_name).file_name().and_then(|name| name.to_str()) {
        Some(name) if !name.is_empty() && name != "." && name != ".." => name.to_string(),
        _ => match extension {
            Some(ext) => format!("attachment.{ext}"),
            None => "attachment".to_string(),
        },
    }
}

#[async_trait]
impl RemoteApi for RemoteConnector {
    async fn get_messages_since(
        &self,
        chat: &Identifier,
        since: DateTime<Utc>,
    ) -> RemoteResult<Vec<Message>> {
        let chat_guid = chat.to_string();
        let messages = self
            .processor
            .request(
                Command::GetMessagesAfter,
                &GetMessagesAfterRequest {
                    chat_guid: &chat_guid,
                    timestamp: since,
                },
            )
            .await?;
        Ok(postprocess_all(messages))
    }

    async fn get_messages_with_limit(
        &self,
        chat: &Identifier,
        limit: usize,
    ) -> RemoteResult<Vec<Message>> {
        let chat_guid = chat.to_string();
        let messages = self
            .processor
            .request(
                Command::GetRecentMessages,
                &GetRecentMessagesRequest {
                    chat_guid: &chat_guid,
                    limit,
                },
            )
            .await?;
        Ok(postprocess_all(messages))
    }

    async fn get_chats_with_messages_after(
        &self,
        since: DateTime<Utc>,
    ) -> RemoteResult<Vec<Identifier>> {
        let guids: Vec<String> = self
            .processor
            .request(Command::GetChats, &GetChatsRequest { min_timestamp: since })
            .await?;
        Ok(guids
            .into_iter()
            .filter_map(|guid| match Identifier::parse(&guid) {
                Ok(chat) => Some(chat),
                Err(err) => {
                    warn!(error = %err, "Skipping conversation with malformed identifier");
                    None
                }
            })
            .collect())
    }

    async fn get_contact_info(&self, user: &Identifier) -> RemoteResult<Option<Contact>> {
        let user_guid = user.to_string();
        let contact: Option<Contact> = self
            .processor
            .request(
                Command::GetContact,
                &GetContactRequest {
                    user_guid: &user_guid,
                },
            )
            .await?;
        Ok(contact.map(|mut contact| {
            if contact.user_guid.is_empty() {
                contact.user_guid = user_guid;
            }
            contact.decode_avatar();
            contact
        }))
    }

    async fn get_chat_info(&self, chat: &Identifier) -> RemoteResult<ChatInfo> {
        let chat_guid = chat.to_string();
        Ok(self
            .processor
            .request(
                Command::GetChat,
                &GetChatRequest {
                    chat_guid: &chat_guid,
                },
            )
            .await?)
    }

    async fn get_group_avatar(&self, chat: &Identifier) -> RemoteResult<Option<Attachment>> {
        let chat_guid = chat.to_string();
        Ok(self
            .processor
            .request(
                Command::GetChatAvatar,
                &GetChatRequest {
                    chat_guid: &chat_guid,
                },
            )
            .await?)
    }

    async fn send_message(&self, chat: &Identifier, text: &str) -> RemoteResult<SendResponse> {
        let chat_guid = chat.to_string();
        Ok(self
            .processor
            .request(
                Command::SendMessage,
                &SendMessageRequest {
                    chat_guid: &chat_guid,
                    text,
                },
            )
            .await?)
    }

    async fn send_file(
        &self,
        chat: &Identifier,
        file_name: &str,
        data: &[u8],
    ) -> RemoteResult<SendResponse> {
        let kind = mime::sniff(data);
        let dir = tempfile::Builder::new()
            .prefix(UPLOAD_DIR_PREFIX)
            .tempdir()
            .map_err(|e| RemoteError::io(format!("failed to create temp dir: {e}")))?;
        let file_name = upload_file_name(file_name, kind.extension);
        let path = dir.path().join(&file_name);
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| RemoteError::io(format!("failed to write temp file: {e}")))?;

        let chat_guid = chat.to_string();
        let request = SendMediaRequest {
            chat_guid: &chat_guid,
            attachment: Attachment {
                mime_type: kind.mime_type.to_string(),
                file_name,
                path_on_disk: path.to_string_lossy().into_owned(),
            },
        };
        let response = self.processor.request(Command::SendMedia, &request).await;

        // The agent has read the file by the time it answers.
        if let Err(err) = dir.close() {
            warn!(error = %err, "Failed to remove attachment temp dir");
        }
        Ok(response?)
    }

    async fn send_tapback(
        &self,
        chat: &Identifier,
        target_guid: &str,
        kind: TapbackType,
        remove: bool,
    ) -> RemoteResult<SendResponse> {
        let chat_guid = chat.to_string();
        Ok(self
            .processor
            .request(
                Command::SendTapback,
                &SendTapbackRequest {
                    chat_guid: &chat_guid,
                    target_guid,
                    code: kind.wire_code(remove),
                },
            )
            .await?)
    }

    async fn send_read_receipt(&self, chat: &Identifier, read_up_to: &str) -> RemoteResult<()> {
        let chat_guid = chat.to_string();
        Ok(self
            .processor
            .send(
                Command::SendReadReceipt,
                &SendReadReceiptRequest {
                    chat_guid: &chat_guid,
                    read_up_to,
                },
            )
            .await?)
    }

    async fn send_typing_notification(
        &self,
        chat: &Identifier,
        typing: bool,
    ) -> RemoteResult<()> {
        let chat_guid = chat.to_string();
        Ok(self
            .processor
            .send(
                Command::SetTyping,
                &SetTypingRequest {
                    chat_guid: &chat_guid,
                    typing,
                },
            )
            .await?)
    }

    fn capabilities(&self) -> ConnectorCapabilities {
        ConnectorCapabilities {
            message_send_responses: true,
            send_tapbacks: true,
            send_read_receipts: true,
            send_typing_notifications: true,
        }
    }
}
