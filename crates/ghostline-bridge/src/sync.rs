//! Portal Synchronizer
//!
//! Propagates a puppet's display name and avatar to the direct-chat portals
//! that represent it. A participant's local id can name a conversation
//! under more than one service (phone numbers are valid for both the primary
//! and the fallback service), so every variant is checked. Each portal is
//! updated under its own lock; no other portal lock is touched.

use crate::avatar::AvatarHash;
use crate::error::BridgeResult;
use crate::matrix::{ContentUri, MatrixClient};
use crate::portal::{Portal, PortalDirectory};
use ghostline_remote::direct_chat_variants;
use std::sync::Arc;
use tracing::{debug, warn};

/// Metadata change copied from a puppet onto its portals
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalMetadata {
    /// Room name
    Name(String),
    /// Room avatar
    Avatar {
        /// Uploaded image
        url: ContentUri,
        /// Hash of the image bytes
        hash: Option<AvatarHash>,
    },
}

/// Applies puppet metadata changes to the puppet's portals
pub struct PortalSynchronizer {
    portals: Arc<PortalDirectory>,
    matrix: Arc<dyn MatrixClient>,
}

impl PortalSynchronizer {
    /// Create a synchronizer over a portal directory
    pub fn new(portals: Arc<PortalDirectory>, matrix: Arc<dyn MatrixClient>) -> Self {
        Self { portals, matrix }
    }

    /// Existing direct-chat portals for a participant
    pub async fn portals_for(&self, local_id: &str) -> Vec<Arc<Portal>> {
        let mut found = Vec::new();
        for guid in direct_chat_variants(local_id) {
            match self.portals.get_existing(&guid).await {
                Ok(Some(portal)) => found.push(portal),
                Ok(None) => {}
                Err(err) => warn!(portal = %guid, error = %err, "Failed to load portal"),
            }
        }
        found
    }

    /// Apply `metadata` to every portal of `local_id`; returns how many
    /// portals were changed
    pub async fn apply(&self, local_id: &str, metadata: &PortalMetadata) -> usize {
        let mut changed = 0;
        for portal in self.portals_for(local_id).await {
            match self.apply_to(&portal, metadata).await {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(portal = %portal.guid(), error = %err, "Failed to store portal metadata");
                }
            }
        }
        changed
    }

    async fn apply_to(&self, portal: &Portal, metadata: &PortalMetadata) -> BridgeResult<bool> {
        let mut record = portal.lock().await;
        match metadata {
            PortalMetadata::Name(name) => {
                if record.name == *name {
                    return Ok(false);
                }
                if let Some(room) = &record.room_id {
                    if let Err(err) = self.matrix.set_room_name(room, name).await {
                        warn!(portal = %portal.guid(), %room, error = %err, "Failed to set room name");
                    }
                }
                record.name.clone_from(name);
            }
            PortalMetadata::Avatar { url, hash } => {
                if record.avatar_url.as_ref() == Some(url) && record.avatar_hash == *hash {
                    return Ok(false);
                }
                if let Some(room) = &record.room_id {
                    if let Err(err) = self.matrix.set_room_avatar(room, url).await {
                        warn!(portal = %portal.guid(), %room, error = %err, "Failed to set room avatar");
                    }
                }
                record.avatar_url = Some(url.clone());
                record.avatar_hash = *hash;
            }
        }
        portal.save(&record).await?;
        debug!(portal = %portal.guid(), "Portal metadata updated");
        Ok(true)
    }
}

impl std::fmt::Debug for PortalSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalSynchronizer")
            .field("portals", &self.portals)
            .finish_non_exhaustive()
    }
}
