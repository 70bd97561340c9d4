//! Bridge event loop
//!
//! Drains the three inbound event queues. For each event the loop resolves
//! the conversation's portal and the sender's puppet, keeps membership and
//! typing state current, and hands the event to an [`EventSink`] that
//! renders it on the homeserver.
//!
//! A puppet seen for the first time is synced (contact lookup, name and
//! avatar upload) by a detached task, so the loop never waits on the Agent
//! or the homeserver for it. The sink may therefore see a new sender before
//! its profile is filled in.

use crate::avatar::{AvatarFetcher, HttpAvatarFetcher};
use crate::config::BridgeConfig;
use crate::context::BridgeContext;
use crate::error::BridgeResult;
use crate::matrix::MatrixClient;
use crate::portal::Portal;
use crate::puppet::Puppet;
use crate::registry::PuppetRegistry;
use crate::store::BridgeStore;
use async_trait::async_trait;
use ghostline_ipc::Processor;
use ghostline_remote::{
    EventReceivers, GroupAction, Identifier, Message, ReadReceipt, RemoteApi, RemoteConnector,
    TypingNotification,
};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Receives events after the bridge has resolved their portal and sender
#[async_trait]
pub trait EventSink: Send + Sync {
    /// A remote message
    async fn handle_message(
        &self,
        portal: &Arc<Portal>,
        sender: Option<&Arc<Puppet>>,
        message: Message,
    );

    /// A remote read receipt
    async fn handle_read_receipt(
        &self,
        portal: &Arc<Portal>,
        sender: Option<&Arc<Puppet>>,
        receipt: ReadReceipt,
    );

    /// A remote typing change
    async fn handle_typing(&self, portal: &Arc<Portal>, notification: TypingNotification);
}

/// Running bridge: shared context, puppet registry and event sink
pub struct Bridge {
    ctx: Arc<BridgeContext>,
    puppets: PuppetRegistry,
    sink: Arc<dyn EventSink>,
}

impl Bridge {
    /// Assemble a bridge from its collaborators
    pub fn new(ctx: Arc<BridgeContext>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            puppets: PuppetRegistry::new(Arc::clone(&ctx)),
            ctx,
            sink,
        }
    }

    /// Connect to the agent over `reader`/`writer` and assemble a bridge.
    ///
    /// Returns the bridge, the event queues to pass to [`Bridge::run`], and
    /// the IPC read loop task.
    pub fn connect<R, W>(
        config: &BridgeConfig,
        reader: R,
        writer: W,
        matrix: Arc<dyn MatrixClient>,
        store: Arc<dyn BridgeStore>,
        sink: Arc<dyn EventSink>,
    ) -> BridgeResult<(Self, EventReceivers, JoinHandle<()>)>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        config.validate()?;
        let fetcher: Arc<dyn AvatarFetcher> =
            Arc::new(HttpAvatarFetcher::new(config.avatar.download_timeout())?);
        let processor = Processor::new(writer, config.ipc.clone());
        let (connector, events) = RemoteConnector::new(Arc::clone(&processor), config.channels);
        connector.start();
        let read_loop = processor.spawn(reader);

        let remote: Arc<dyn RemoteApi> = connector;
        let ctx = BridgeContext::new(config, matrix, remote, store, fetcher);
        Ok((Self::new(ctx, sink), events, read_loop))
    }

    /// Shared context
    pub fn context(&self) -> &Arc<BridgeContext> {
        &self.ctx
    }

    /// Puppet registry
    pub fn puppets(&self) -> &PuppetRegistry {
        &self.puppets
    }

    /// Process events until every queue is closed
    pub async fn run(&self, mut events: EventReceivers) {
        info!("Bridge event loop started");
        loop {
            tokio::select! {
                Some(message) = events.messages.recv() => self.handle_message(message).await,
                Some(receipt) = events.receipts.recv() => self.handle_read_receipt(receipt).await,
                Some(typing) = events.typing.recv() => self.handle_typing(typing).await,
                else => break,
            }
        }
        info!("Bridge event loop stopped");
    }

    /// Stop detached follow-up work
    pub fn shutdown(&self) {
        self.ctx.tasks.shutdown();
    }

    async fn portal_for(&self, chat_guid: &str) -> Option<(Identifier, Arc<Portal>)> {
        let chat = match Identifier::parse(chat_guid) {
            Ok(chat) => chat,
            Err(err) => {
                warn!(error = %err, "Dropping event for malformed conversation id");
                return None;
            }
        };
        match self.ctx.portals.get_or_create(&chat).await {
            Ok(portal) => Some((chat, portal)),
            Err(err) => {
                warn!(portal = %chat, error = %err, "Failed to load portal");
                None
            }
        }
    }

    async fn puppet_for(&self, local_id: &str) -> Option<Arc<Puppet>> {
        match self.puppets.get_or_create(local_id).await {
            Ok(puppet) => {
                if !puppet.is_synced() {
                    let syncing = Arc::clone(&puppet);
                    self.ctx.tasks.spawn(async move {
                        syncing.ensure_synced().await;
                    });
                }
                Some(puppet)
            }
            Err(err) => {
                warn!(puppet = %local_id, error = %err, "Failed to load puppet");
                None
            }
        }
    }

    async fn handle_message(&self, message: Message) {
        let Some((_, portal)) = self.portal_for(&message.chat_guid).await else {
            return;
        };

        let sender = match &message.sender {
            Some(sender) => self.puppet_for(&sender.local_id).await,
            None => None,
        };
        if let Some(puppet) = &sender {
            if let Err(err) = portal.add_member(puppet.local_id()).await {
                warn!(portal = %portal.guid(), error = %err, "Failed to record portal member");
            }
        }

        if message.group_action == Some(GroupAction::SetName) {
            self.rename_portal(&portal, &message.new_group_name).await;
        }

        self.sink
            .handle_message(&portal, sender.as_ref(), message)
            .await;
    }

    async fn rename_portal(&self, portal: &Portal, name: &str) {
        let mut record = portal.lock().await;
        if record.name == name {
            return;
        }
        if let Some(room) = &record.room_id {
            if let Err(err) = self.ctx.matrix.set_room_name(room, name).await {
                warn!(portal = %portal.guid(), %room, error = %err, "Failed to set room name");
            }
        }
        record.name = name.to_string();
        if let Err(err) = portal.save(&record).await {
            warn!(portal = %portal.guid(), error = %err, "Failed to store portal name");
        }
    }

    async fn handle_read_receipt(&self, receipt: ReadReceipt) {
        let Some((_, portal)) = self.portal_for(&receipt.chat_guid).await else {
            return;
        };
        let sender = if receipt.is_from_me {
            None
        } else {
            match Identifier::parse(&receipt.sender_guid) {
                Ok(sender) => self.puppet_for(&sender.local_id).await,
                Err(err) => {
                    debug!(error = %err, "Read receipt without a usable sender");
                    None
                }
            }
        };
        self.sink
            .handle_read_receipt(&portal, sender.as_ref(), receipt)
            .await;
    }

    async fn handle_typing(&self, notification: TypingNotification) {
        let Some((chat, portal)) = self.portal_for(&notification.chat_guid).await else {
            return;
        };
        if !chat.is_group {
            if let Some(puppet) = self.puppet_for(&chat.local_id).await {
                self.apply_typing(&portal, &puppet, notification.typing).await;
            }
        }
        self.sink.handle_typing(&portal, notification).await;
    }

    async fn apply_typing(&self, portal: &Portal, puppet: &Puppet, typing: bool) {
        let room = if typing {
            let Some(room) = portal.snapshot().await.room_id else {
                return;
            };
            puppet.set_typing_in(room.clone());
            room
        } else {
            let Some(room) = puppet.clear_typing() else {
                return;
            };
            room
        };
        if let Err(err) = self
            .ctx
            .matrix
            .set_typing(puppet.user_id(), &room, typing)
            .await
        {
            warn!(puppet = %puppet.local_id(), %room, error = %err, "Failed to forward typing state");
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("ctx", &self.ctx)
            .field("puppets", &self.puppets)
            .finish_non_exhaustive()
    }
}
