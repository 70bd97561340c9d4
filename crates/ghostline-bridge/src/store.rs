//! Durable state for puppets and portals
//!
//! [`BridgeStore`] is the seam to the relational database. [`MemoryStore`]
//! keeps everything in process and backs tests and ephemeral deployments.
//!
//! # Blocking Lock Usage
//!
//! `MemoryStore` uses `parking_lot::Mutex` because every operation is a
//! single map lookup or insert and the lock is never held across `.await`.

#![allow(clippy::disallowed_types)]

use crate::avatar::AvatarHash;
use crate::error::BridgeResult;
use crate::matrix::{ContentUri, RoomId};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Stored state of one puppet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuppetRecord {
    /// Remote local id (phone number or email)
    pub local_id: String,
    /// Formatted display name, empty until first set
    pub displayname: String,
    /// SHA-256 of the current avatar image
    pub avatar_hash: Option<AvatarHash>,
    /// Uploaded avatar
    pub avatar_url: Option<ContentUri>,
}

impl PuppetRecord {
    /// Fresh record for a puppet seen for the first time
    pub fn new(local_id: impl Into<String>) -> Self {
        Self {
            local_id: local_id.into(),
            ..Self::default()
        }
    }
}

/// Stored state of one portal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalRecord {
    /// Canonical conversation identifier
    pub guid: String,
    /// Bridged room, once created
    pub room_id: Option<RoomId>,
    /// Room name
    pub name: String,
    /// SHA-256 of the room avatar image
    pub avatar_hash: Option<AvatarHash>,
    /// Room avatar
    pub avatar_url: Option<ContentUri>,
    /// Local ids of the remote members
    pub members: BTreeSet<String>,
}

impl PortalRecord {
    /// Fresh record for a conversation seen for the first time
    pub fn new(guid: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            ..Self::default()
        }
    }
}

/// Durable storage for bridge state
#[async_trait]
pub trait BridgeStore: Send + Sync {
    /// Load one puppet
    async fn get_puppet(&self, local_id: &str) -> BridgeResult<Option<PuppetRecord>>;

    /// Load every puppet
    async fn all_puppets(&self) -> BridgeResult<Vec<PuppetRecord>>;

    /// Insert a puppet; an existing row with the same id is kept
    async fn insert_puppet(&self, record: &PuppetRecord) -> BridgeResult<()>;

    /// Overwrite a puppet
    async fn update_puppet(&self, record: &PuppetRecord) -> BridgeResult<()>;

    /// Load one portal
    async fn get_portal(&self, guid: &str) -> BridgeResult<Option<PortalRecord>>;

    /// Load every portal
    async fn all_portals(&self) -> BridgeResult<Vec<PortalRecord>>;

    /// Insert a portal; an existing row with the same id is kept
    async fn insert_portal(&self, record: &PortalRecord) -> BridgeResult<()>;

    /// Overwrite a portal
    async fn update_portal(&self, record: &PortalRecord) -> BridgeResult<()>;
}

/// In-memory [`BridgeStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    puppets: Mutex<HashMap<String, PuppetRecord>>,
    portals: Mutex<HashMap<String, PortalRecord>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored puppets
    pub fn puppet_count(&self) -> usize {
        self.puppets.lock().len()
    }

    /// Number of stored portals
    pub fn portal_count(&self) -> usize {
        self.portals.lock().len()
    }
}

#[async_trait]
impl BridgeStore for MemoryStore {
    async fn get_puppet(&self, local_id: &str) -> BridgeResult<Option<PuppetRecord>> {
        Ok(self.puppets.lock().get(local_id).cloned())
    }

    async fn all_puppets(&self) -> BridgeResult<Vec<PuppetRecord>> {
        let mut records: Vec<_> = self.puppets.lock().values().cloned().collect();
        records.sort_by(|a, b| a.local_id.cmp(&b.local_id));
        Ok(records)
    }

    async fn insert_puppet(&self, record: &PuppetRecord) -> BridgeResult<()> {
        self.puppets
            .lock()
            .entry(record.local_id.clone())
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn update_puppet(&self, record: &PuppetRecord) -> BridgeResult<()> {
        self.puppets
            .lock()
            .insert(record.local_id.clone(), record.clone());
        Ok(())
    }

    async fn get_portal(&self, guid: &str) -> BridgeResult<Option<PortalRecord>> {
        Ok(self.portals.lock().get(guid).cloned())
    }

    async fn all_portals(&self) -> BridgeResult<Vec<PortalRecord>> {
        let mut records: Vec<_> = self.portals.lock().values().cloned().collect();
        records.sort_by(|a, b| a.guid.cmp(&b.guid));
        Ok(records)
    }

    async fn insert_portal(&self, record: &PortalRecord) -> BridgeResult<()> {
        self.portals
            .lock()
            .entry(record.guid.clone())
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn update_portal(&self, record: &PortalRecord) -> BridgeResult<()> {
        self.portals
            .lock()
            .insert(record.guid.clone(), record.clone());
        Ok(())
    }
}
