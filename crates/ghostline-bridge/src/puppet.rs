//! Puppets
//!
//! A puppet is the homeserver-side ghost of one remote participant. Its
//! record sits behind a per-puppet async lock, so updates to one puppet are
//! serialized (two identical avatar deliveries upload once) while different
//! puppets update independently.
//!
//! ## Update rules
//!
//! - A name update with an empty candidate does nothing.
//! - A contact without a name never replaces a name the puppet already has.
//! - An avatar update hashes the bytes and does nothing when the hash is
//!   unchanged. A failed upload leaves hash and reference as they were.
//! - Every accepted change is copied onto the puppet's portals by a
//!   detached task; the update itself does not wait for it.

#![allow(clippy::disallowed_types)]

use crate::avatar::{avatar_file_name, avatar_hash};
use crate::context::BridgeContext;
use crate::error::{BridgeError, BridgeResult};
use crate::matrix::{ContentUri, RoomId, UserId};
use crate::store::PuppetRecord;
use crate::sync::PortalMetadata;
use ghostline_remote::{mime, Contact, Identifier, IMESSAGE_SERVICE};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Profile supplied by an external source instead of the address book
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileOverride {
    /// Display name, applied as-is when non-empty
    #[serde(default)]
    pub displayname: String,
    /// Avatar location, downloaded in the background when non-empty
    #[serde(default)]
    pub photo_url: String,
}

/// Where and since when a puppet is typing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypingState {
    /// Room the puppet is typing in
    pub room: Option<RoomId>,
    /// When typing started
    pub since: Option<Instant>,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Name,
    Avatar,
}

/// Homeserver ghost of one remote participant
pub struct Puppet {
    local_id: String,
    user_id: UserId,
    record: tokio::sync::Mutex<PuppetRecord>,
    typing: parking_lot::Mutex<TypingState>,
    synced: AtomicBool,
    ctx: Arc<BridgeContext>,
}

impl Puppet {
    pub(crate) fn new(record: PuppetRecord, ctx: Arc<BridgeContext>) -> Self {
        Self {
            local_id: record.local_id.clone(),
            user_id: ctx.user_ids.format(&record.local_id),
            record: tokio::sync::Mutex::new(record),
            typing: parking_lot::Mutex::new(TypingState::default()),
            synced: AtomicBool::new(false),
            ctx,
        }
    }

    /// Remote local id
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Homeserver user id
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Copy of the current record
    pub async fn snapshot(&self) -> PuppetRecord {
        self.record.lock().await.clone()
    }

    /// Apply a contact's name, respecting an existing name when the contact
    /// has none. Returns whether the name changed.
    pub async fn update_name(self: &Arc<Self>, contact: Option<&Contact>) -> bool {
        let mut record = self.record.lock().await;
        let changed = self.apply_contact_name(&mut record, contact).await;
        if changed {
            self.persist(&record).await;
        }
        changed
    }

    /// Apply a name without the contact guard. Returns whether it changed.
    pub async fn update_name_direct(self: &Arc<Self>, name: &str) -> bool {
        let mut record = self.record.lock().await;
        let changed = self.apply_name(&mut record, name).await;
        if changed {
            self.persist(&record).await;
        }
        changed
    }

    /// Apply a contact's avatar. Returns whether it changed.
    pub async fn update_avatar(self: &Arc<Self>, contact: Option<&Contact>) -> bool {
        self.update_avatar_from_bytes(contact.and_then(|c| c.avatar.as_deref()))
            .await
    }

    /// Apply raw avatar bytes. Returns whether the avatar changed.
    pub async fn update_avatar_from_bytes(self: &Arc<Self>, avatar: Option<&[u8]>) -> bool {
        let Some(avatar) = avatar else {
            return false;
        };
        let mut record = self.record.lock().await;
        let changed = self.apply_avatar(&mut record, avatar).await;
        if changed {
            self.persist(&record).await;
        }
        changed
    }

    /// Apply name and avatar from a contact, persisting once if anything
    /// changed
    pub async fn sync_with_contact(self: &Arc<Self>, contact: Option<&Contact>) -> bool {
        let mut record = self.record.lock().await;
        let mut changed = self.apply_contact_name(&mut record, contact).await;
        if let Some(avatar) = contact.and_then(|c| c.avatar.as_deref()) {
            changed = self.apply_avatar(&mut record, avatar).await || changed;
        }
        if changed {
            self.persist(&record).await;
        }
        changed
    }

    /// Register the puppet, fetch its contact, and apply it
    pub async fn sync(self: &Arc<Self>) -> bool {
        self.synced.store(true, Ordering::Release);
        if let Err(err) = self.ctx.matrix.ensure_registered(&self.user_id).await {
            error!(puppet = %self.local_id, error = %err, "Failed to ensure puppet is registered");
        }

        let contact = match self
            .ctx
            .remote
            .get_contact_info(&Identifier::direct(IMESSAGE_SERVICE, &self.local_id))
            .await
        {
            Ok(Some(contact)) => Some(contact),
            Ok(None) => {
                debug!(puppet = %self.local_id, "No contact info found");
                None
            }
            Err(err) => {
                error!(puppet = %self.local_id, error = %err, "Failed to get contact info");
                None
            }
        };
        self.sync_with_contact(contact.as_ref()).await
    }

    /// Whether [`Puppet::sync`] has started for this puppet
    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    /// Run [`Puppet::sync`] unless it has already run for this puppet
    pub async fn ensure_synced(self: &Arc<Self>) -> bool {
        if self.synced.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.sync().await
    }

    /// Apply a profile override: the name immediately, the avatar in the
    /// background. Returns whether the name changed.
    pub async fn sync_with_profile_override(self: &Arc<Self>, profile: &ProfileOverride) -> bool {
        let changed = if profile.displayname.is_empty() {
            false
        } else {
            self.update_name_direct(&profile.displayname).await
        };
        if !profile.photo_url.is_empty() {
            let puppet = Arc::clone(self);
            let url = profile.photo_url.clone();
            self.ctx.tasks.spawn(async move {
                match puppet.ctx.avatar_fetcher.fetch(&url).await {
                    Ok(avatar) => {
                        puppet.update_avatar_from_bytes(Some(avatar.as_slice())).await;
                    }
                    Err(err) => {
                        warn!(puppet = %puppet.local_id, %url, error = %err, "Failed to fetch override avatar");
                    }
                }
            });
        }
        changed
    }

    /// Record that the puppet started typing in `room`
    pub fn set_typing_in(&self, room: RoomId) {
        *self.typing.lock() = TypingState {
            room: Some(room),
            since: Some(Instant::now()),
        };
    }

    /// Record that the puppet stopped typing; returns the room it was
    /// typing in
    pub fn clear_typing(&self) -> Option<RoomId> {
        std::mem::take(&mut *self.typing.lock()).room
    }

    /// Current typing state
    pub fn typing_state(&self) -> TypingState {
        self.typing.lock().clone()
    }

    async fn apply_contact_name(
        self: &Arc<Self>,
        record: &mut PuppetRecord,
        contact: Option<&Contact>,
    ) -> bool {
        let contact_has_name = contact.is_some_and(Contact::has_name);
        if !record.displayname.is_empty() && !contact_has_name {
            return false;
        }
        let name = match contact {
            Some(contact) => contact.name(),
            None => self.local_id.clone(),
        };
        self.apply_name(record, &name).await
    }

    async fn apply_name(self: &Arc<Self>, record: &mut PuppetRecord, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        let formatted = self.ctx.naming.format_displayname(name);
        if record.displayname == formatted {
            return false;
        }
        if let Err(err) = self
            .ctx
            .matrix
            .set_display_name(&self.user_id, &formatted)
            .await
        {
            warn!(puppet = %self.local_id, error = %err, "Failed to set display name");
            return false;
        }
        record.displayname = formatted;
        self.spawn_portal_sync(Field::Name);
        true
    }

    async fn apply_avatar(self: &Arc<Self>, record: &mut PuppetRecord, avatar: &[u8]) -> bool {
        let hash = avatar_hash(avatar);
        if record.avatar_hash == Some(hash) {
            return false;
        }
        match self.upload_avatar(avatar).await {
            Ok(url) => {
                record.avatar_hash = Some(hash);
                record.avatar_url = Some(url);
                self.spawn_portal_sync(Field::Avatar);
                true
            }
            Err(err) => {
                warn!(
                    puppet = %self.local_id,
                    hash = %hex::encode(hash),
                    error = %err,
                    "Failed to update avatar"
                );
                false
            }
        }
    }

    async fn upload_avatar(&self, avatar: &[u8]) -> BridgeResult<ContentUri> {
        let kind = mime::sniff(avatar);
        let url = self
            .ctx
            .matrix
            .upload_media(
                &self.user_id,
                avatar,
                kind.mime_type,
                &avatar_file_name(kind.extension),
            )
            .await
            .map_err(|e| BridgeError::upload_failed(e.to_string()))?;
        self.ctx.matrix.set_avatar_url(&self.user_id, &url).await?;
        Ok(url)
    }

    async fn persist(&self, record: &PuppetRecord) {
        if let Err(err) = self.ctx.store.update_puppet(record).await {
            error!(puppet = %self.local_id, error = %err, "Failed to store puppet");
        }
    }

    fn spawn_portal_sync(self: &Arc<Self>, field: Field) {
        let puppet = Arc::clone(self);
        self.ctx.tasks.spawn(async move {
            // Read the value at run time so racing follow-ups converge on
            // the latest state.
            let metadata = {
                let record = puppet.record.lock().await;
                match field {
                    Field::Name => PortalMetadata::Name(record.displayname.clone()),
                    Field::Avatar => match &record.avatar_url {
                        Some(url) => PortalMetadata::Avatar {
                            url: url.clone(),
                            hash: record.avatar_hash,
                        },
                        None => return,
                    },
                }
            };
            let changed = puppet
                .ctx
                .synchronizer
                .apply(&puppet.local_id, &metadata)
                .await;
            debug!(puppet = %puppet.local_id, ?field, portals = changed, "Portal metadata synchronized");
        });
    }
}

impl std::fmt::Debug for Puppet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Puppet")
            .field("local_id", &self.local_id)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}
