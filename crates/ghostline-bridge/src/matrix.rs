//! Homeserver side of the bridge
//!
//! Identifier newtypes and the [`MatrixClient`] trait the bridge drives.
//! The client itself lives outside this crate; every call is made on behalf
//! of one puppet or against one room.

use crate::error::BridgeResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Raw identifier
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Fully qualified user id, `@localpart:domain`
    UserId
);
string_id!(
    /// Room id, `!opaque:domain`
    RoomId
);
string_id!(
    /// Uploaded media reference, `mxc://server/media`
    ContentUri
);

impl UserId {
    /// Build `@localpart:domain`
    pub fn from_parts(localpart: &str, domain: &str) -> Self {
        Self(format!("@{localpart}:{domain}"))
    }

    /// Split into localpart and domain
    pub fn parts(&self) -> Option<(&str, &str)> {
        self.0.strip_prefix('@')?.split_once(':')
    }
}

/// Homeserver operations the bridge performs
#[async_trait]
pub trait MatrixClient: Send + Sync {
    /// Register the user if it does not exist yet
    async fn ensure_registered(&self, user: &UserId) -> BridgeResult<()>;

    /// Set a user's display name
    async fn set_display_name(&self, user: &UserId, name: &str) -> BridgeResult<()>;

    /// Set a user's avatar
    async fn set_avatar_url(&self, user: &UserId, uri: &ContentUri) -> BridgeResult<()>;

    /// Upload media as a user
    async fn upload_media(
        &self,
        user: &UserId,
        data: &[u8],
        mime_type: &str,
        file_name: &str,
    ) -> BridgeResult<ContentUri>;

    /// Set a room's name
    async fn set_room_name(&self, room: &RoomId, name: &str) -> BridgeResult<()>;

    /// Set a room's avatar
    async fn set_room_avatar(&self, room: &RoomId, uri: &ContentUri) -> BridgeResult<()>;

    /// Start or stop a user's typing indicator in a room
    async fn set_typing(&self, user: &UserId, room: &RoomId, typing: bool) -> BridgeResult<()>;
}
