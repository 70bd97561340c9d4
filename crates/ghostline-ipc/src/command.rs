//! Recognized wire commands
//!
//! Every frame names one of these commands. Names that do not parse are
//! reported as unknown by the read loop rather than silently ignored.

use std::fmt;
use std::str::FromStr;

/// Closed set of commands understood on the agent stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Command {
    /// Successful reply to a request
    Response,
    /// Failed reply to a request
    Error,

    /// Inbound message event
    IncomingMessage,
    /// Inbound read receipt event
    IncomingReadReceipt,
    /// Inbound typing notification event
    IncomingTyping,

    /// Fetch messages newer than a timestamp in one conversation
    GetMessagesAfter,
    /// Fetch the most recent N messages in one conversation
    GetRecentMessages,
    /// List conversations with activity since a timestamp
    GetChats,
    /// Fetch contact details for one identifier
    GetContact,
    /// Fetch conversation metadata
    GetChat,
    /// Fetch the conversation avatar
    GetChatAvatar,
    /// Send a text message
    SendMessage,
    /// Send an attachment
    SendMedia,
    /// Send or remove a tapback reaction
    SendTapback,
    /// Mark a conversation read up to a message
    SendReadReceipt,
    /// Start or stop the typing indicator
    SetTyping,
}

impl Command {
    /// Every recognized command, in wire-table order
    pub const ALL: [Command; 16] = [
        Command::Response,
        Command::Error,
        Command::IncomingMessage,
        Command::IncomingReadReceipt,
        Command::IncomingTyping,
        Command::GetMessagesAfter,
        Command::GetRecentMessages,
        Command::GetChats,
        Command::GetContact,
        Command::GetChat,
        Command::GetChatAvatar,
        Command::SendMessage,
        Command::SendMedia,
        Command::SendTapback,
        Command::SendReadReceipt,
        Command::SetTyping,
    ];

    /// Wire name of the command
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Response => "response",
            Command::Error => "error",
            Command::IncomingMessage => "message",
            Command::IncomingReadReceipt => "read_receipt",
            Command::IncomingTyping => "typing",
            Command::GetMessagesAfter => "get_messages_after",
            Command::GetRecentMessages => "get_recent_messages",
            Command::GetChats => "get_chats",
            Command::GetContact => "get_contact",
            Command::GetChat => "get_chat",
            Command::GetChatAvatar => "get_chat_avatar",
            Command::SendMessage => "send_message",
            Command::SendMedia => "send_media",
            Command::SendTapback => "send_tapback",
            Command::SendReadReceipt => "send_read_receipt",
            Command::SetTyping => "set_typing",
        }
    }

    /// Whether this command carries a reply to an earlier request
    pub fn is_reply(self) -> bool {
        matches!(self, Command::Response | Command::Error)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a frame names a command outside [`Command::ALL`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command {0:?}")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .iter()
            .copied()
            .find(|command| command.as_str() == s)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}
