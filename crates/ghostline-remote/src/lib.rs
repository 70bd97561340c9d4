//! # Ghostline Remote
//!
//! Typed access to the remote messaging network through the agent.
//!
//! ## Purpose
//!
//! - Parse and format remote identifiers (`service;-;local-id`)
//! - Define the value types the agent exchanges (messages, contacts, chats)
//! - Expose the [`RemoteApi`] trait and its IPC-backed [`RemoteConnector`]
//! - Fan inbound events out on bounded, non-blocking queues
//!
//! ## What Does NOT Belong Here
//!
//! - Frame encoding and reply correlation (see `ghostline-ipc`)
//! - Puppets, portals, and homeserver state (see `ghostline-bridge`)

pub mod api;
pub mod channels;
pub mod connector;
pub mod error;
pub mod identifier;
pub mod mime;
pub mod requests;
pub mod time;
pub mod types;

pub use api::RemoteApi;
pub use channels::{event_channels, ChannelConfig, ChannelStats, EventReceivers, EventSenders, Offer};
pub use connector::RemoteConnector;
pub use error::{RemoteError, RemoteResult};
pub use identifier::{
    direct_chat_variants, is_phone_number, Identifier, IdentifierError, IMESSAGE_SERVICE,
    SMS_SERVICE,
};
pub use types::{
    Attachment, ChatInfo, ConnectorCapabilities, Contact, GroupAction, Message, Reaction,
    ReadReceipt, SendResponse, Tapback, TapbackError, TapbackType, TypingNotification,
    TAPBACK_REMOVE_OFFSET,
};
