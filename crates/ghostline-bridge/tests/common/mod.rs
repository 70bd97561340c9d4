//! Test doubles shared by the bridge integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ghostline_bridge::{
    AvatarFetcher, BridgeConfig, BridgeContext, BridgeError, BridgeResult, ContentUri, EventSink,
    MatrixClient, MemoryStore, Portal, Puppet, RoomId, UserId,
};
use ghostline_remote::{
    Attachment, ChatInfo, ConnectorCapabilities, Contact, Identifier, Message, ReadReceipt,
    RemoteApi, RemoteError, RemoteResult, SendResponse, TapbackType, TypingNotification,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config() -> BridgeConfig {
    BridgeConfig::from_toml_str("[homeserver]\ndomain = \"example.org\"\n").unwrap()
}

/// Homeserver call observed by [`FakeMatrix`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatrixCall {
    EnsureRegistered(UserId),
    SetDisplayName(UserId, String),
    SetAvatarUrl(UserId, ContentUri),
    Upload(UserId, String),
    SetRoomName(RoomId, String),
    SetRoomAvatar(RoomId, ContentUri),
    SetTyping(UserId, RoomId, bool),
}

#[derive(Debug, Default)]
pub struct FakeMatrix {
    calls: Mutex<Vec<MatrixCall>>,
    uploads: AtomicUsize,
    pub fail_uploads: AtomicBool,
    pub fail_display_names: AtomicBool,
}

impl FakeMatrix {
    pub fn calls(&self) -> Vec<MatrixCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&MatrixCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| pred(call)).count()
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    fn record(&self, call: MatrixCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl MatrixClient for FakeMatrix {
    async fn ensure_registered(&self, user: &UserId) -> BridgeResult<()> {
        self.record(MatrixCall::EnsureRegistered(user.clone()));
        Ok(())
    }

    async fn set_display_name(&self, user: &UserId, name: &str) -> BridgeResult<()> {
        if self.fail_display_names.load(Ordering::SeqCst) {
            return Err(BridgeError::homeserver("display name rejected"));
        }
        self.record(MatrixCall::SetDisplayName(user.clone(), name.to_string()));
        Ok(())
    }

    async fn set_avatar_url(&self, user: &UserId, uri: &ContentUri) -> BridgeResult<()> {
        self.record(MatrixCall::SetAvatarUrl(user.clone(), uri.clone()));
        Ok(())
    }

    async fn upload_media(
        &self,
        user: &UserId,
        _data: &[u8],
        mime_type: &str,
        _file_name: &str,
    ) -> BridgeResult<ContentUri> {
        // Widen the window for concurrent duplicate deliveries.
        tokio::time::sleep(Duration::from_millis(5)).await;
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(BridgeError::homeserver("media repository unavailable"));
        }
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(MatrixCall::Upload(user.clone(), mime_type.to_string()));
        Ok(ContentUri::new(format!("mxc://example.org/avatar{n}")))
    }

    async fn set_room_name(&self, room: &RoomId, name: &str) -> BridgeResult<()> {
        self.record(MatrixCall::SetRoomName(room.clone(), name.to_string()));
        Ok(())
    }

    async fn set_room_avatar(&self, room: &RoomId, uri: &ContentUri) -> BridgeResult<()> {
        self.record(MatrixCall::SetRoomAvatar(room.clone(), uri.clone()));
        Ok(())
    }

    async fn set_typing(&self, user: &UserId, room: &RoomId, typing: bool) -> BridgeResult<()> {
        self.record(MatrixCall::SetTyping(user.clone(), room.clone(), typing));
        Ok(())
    }
}

/// Remote API answering contact lookups from a map
#[derive(Debug, Default)]
pub struct FakeRemote {
    contacts: Mutex<HashMap<String, Contact>>,
    lookups: AtomicUsize,
}

impl FakeRemote {
    pub fn with_contact(self, local_id: &str, contact: Contact) -> Self {
        self.contacts.lock().insert(local_id.to_string(), contact);
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

fn unsupported<T>(operation: &'static str) -> RemoteResult<T> {
    Err(RemoteError::Unsupported { operation })
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn get_messages_since(
        &self,
        _chat: &Identifier,
        _since: DateTime<Utc>,
    ) -> RemoteResult<Vec<Message>> {
        Ok(Vec::new())
    }

    async fn get_messages_with_limit(
        &self,
        _chat: &Identifier,
        _limit: usize,
    ) -> RemoteResult<Vec<Message>> {
        Ok(Vec::new())
    }

    async fn get_chats_with_messages_after(
        &self,
        _since: DateTime<Utc>,
    ) -> RemoteResult<Vec<Identifier>> {
        Ok(Vec::new())
    }

    async fn get_contact_info(&self, user: &Identifier) -> RemoteResult<Option<Contact>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.contacts.lock().get(&user.local_id).cloned())
    }

    async fn get_chat_info(&self, _chat: &Identifier) -> RemoteResult<ChatInfo> {
        Ok(ChatInfo::default())
    }

    async fn get_group_avatar(&self, _chat: &Identifier) -> RemoteResult<Option<Attachment>> {
        Ok(None)
    }

    async fn send_message(&self, _chat: &Identifier, _text: &str) -> RemoteResult<SendResponse> {
        unsupported("send_message")
    }

    async fn send_file(
        &self,
        _chat: &Identifier,
        _file_name: &str,
        _data: &[u8],
    ) -> RemoteResult<SendResponse> {
        unsupported("send_file")
    }

    async fn send_tapback(
        &self,
        _chat: &Identifier,
        _target_guid: &str,
        _kind: TapbackType,
        _remove: bool,
    ) -> RemoteResult<SendResponse> {
        unsupported("send_tapback")
    }

    async fn send_read_receipt(&self, _chat: &Identifier, _read_up_to: &str) -> RemoteResult<()> {
        Ok(())
    }

    async fn send_typing_notification(
        &self,
        _chat: &Identifier,
        _typing: bool,
    ) -> RemoteResult<()> {
        Ok(())
    }

    fn capabilities(&self) -> ConnectorCapabilities {
        ConnectorCapabilities::default()
    }
}

/// Avatar fetcher serving fixed bytes, or failing for unknown URLs
#[derive(Debug, Default)]
pub struct FakeFetcher {
    images: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeFetcher {
    pub fn with_image(self, url: &str, bytes: &[u8]) -> Self {
        self.images.lock().insert(url.to_string(), bytes.to_vec());
        self
    }
}

#[async_trait]
impl AvatarFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> BridgeResult<Vec<u8>> {
        self.images
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| BridgeError::avatar_fetch(url, "404 Not Found"))
    }
}

/// Event delivered to [`RecordingSink`]
#[derive(Debug, Clone)]
pub enum SinkEvent {
    Message {
        portal: Identifier,
        sender: Option<String>,
        guid: String,
    },
    Receipt {
        portal: Identifier,
        sender: Option<String>,
    },
    Typing {
        portal: Identifier,
        typing: bool,
    },
}

#[derive(Debug)]
pub struct RecordingSink {
    pub events: tokio::sync::mpsc::UnboundedSender<SinkEvent>,
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn handle_message(
        &self,
        portal: &Arc<Portal>,
        sender: Option<&Arc<Puppet>>,
        message: Message,
    ) {
        let _ = self.events.send(SinkEvent::Message {
            portal: portal.guid().clone(),
            sender: sender.map(|p| p.local_id().to_string()),
            guid: message.guid,
        });
    }

    async fn handle_read_receipt(
        &self,
        portal: &Arc<Portal>,
        sender: Option<&Arc<Puppet>>,
        _receipt: ReadReceipt,
    ) {
        let _ = self.events.send(SinkEvent::Receipt {
            portal: portal.guid().clone(),
            sender: sender.map(|p| p.local_id().to_string()),
        });
    }

    async fn handle_typing(&self, portal: &Arc<Portal>, notification: TypingNotification) {
        let _ = self.events.send(SinkEvent::Typing {
            portal: portal.guid().clone(),
            typing: notification.typing,
        });
    }
}

/// Collaborators for one test bridge
pub struct Harness {
    pub matrix: Arc<FakeMatrix>,
    pub remote: Arc<FakeRemote>,
    pub store: Arc<MemoryStore>,
    pub ctx: Arc<BridgeContext>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(FakeRemote::default(), FakeFetcher::default())
    }

    pub fn with(remote: FakeRemote, fetcher: FakeFetcher) -> Self {
        init_tracing();
        let matrix = Arc::new(FakeMatrix::default());
        let remote = Arc::new(remote);
        let store = Arc::new(MemoryStore::new());
        let ctx = BridgeContext::new(
            &config(),
            matrix.clone(),
            remote.clone(),
            store.clone(),
            Arc::new(fetcher),
        );
        Self {
            matrix,
            remote,
            store,
            ctx,
        }
    }
}

pub fn named_contact(first: &str) -> Contact {
    Contact {
        first_name: first.to_string(),
        ..Contact::default()
    }
}

pub fn nameless_contact() -> Contact {
    Contact {
        emails: vec!["someone@example.com".to_string()],
        ..Contact::default()
    }
}

pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfirst-image";
pub const OTHER_PNG: &[u8] = b"\x89PNG\r\n\x1a\nsecond-image";
