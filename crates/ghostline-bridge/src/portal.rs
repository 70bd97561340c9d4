//! Portals
//!
//! A portal is the bridge-side record of one remote conversation. Its
//! record sits behind a per-portal async lock; every mutation happens with
//! that lock held, and no other portal's lock is ever taken at the same time.
//!
//! # Blocking Lock Usage
//!
//! [`PortalDirectory`] guards its map with a `parking_lot::Mutex` held only
//! for lookup and insert, never across store calls.

#![allow(clippy::disallowed_types)]

use crate::error::BridgeResult;
use crate::matrix::RoomId;
use crate::store::{BridgeStore, PortalRecord};
use ghostline_remote::Identifier;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::MutexGuard;
use tracing::debug;

/// One bridged conversation
pub struct Portal {
    guid: Identifier,
    record: tokio::sync::Mutex<PortalRecord>,
    store: Arc<dyn BridgeStore>,
}

impl Portal {
    fn new(guid: Identifier, record: PortalRecord, store: Arc<dyn BridgeStore>) -> Self {
        Self {
            guid,
            record: tokio::sync::Mutex::new(record),
            store,
        }
    }

    /// Conversation identifier
    pub fn guid(&self) -> &Identifier {
        &self.guid
    }

    /// Acquire the portal lock
    pub async fn lock(&self) -> MutexGuard<'_, PortalRecord> {
        self.record.lock().await
    }

    /// Acquire the portal lock if it is free
    pub fn try_lock(&self) -> Option<MutexGuard<'_, PortalRecord>> {
        self.record.try_lock().ok()
    }

    /// Copy of the current record
    pub async fn snapshot(&self) -> PortalRecord {
        self.record.lock().await.clone()
    }

    /// Persist a record obtained from [`Portal::lock`]
    pub async fn save(&self, record: &PortalRecord) -> BridgeResult<()> {
        self.store.update_portal(record).await
    }

    /// Record a remote member; returns whether it was new
    pub async fn add_member(&self, local_id: &str) -> BridgeResult<bool> {
        let mut record = self.record.lock().await;
        if !record.members.insert(local_id.to_string()) {
            return Ok(false);
        }
        self.store.update_portal(&record).await?;
        Ok(true)
    }

    /// Attach the bridged room
    pub async fn set_room(&self, room_id: RoomId) -> BridgeResult<()> {
        let mut record = self.record.lock().await;
        record.room_id = Some(room_id);
        self.store.update_portal(&record).await
    }
}

impl std::fmt::Debug for Portal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Portal")
            .field("guid", &self.guid)
            .finish_non_exhaustive()
    }
}

/// In-memory map of portals, loaded lazily from the store
pub struct PortalDirectory {
    portals: Mutex<HashMap<Identifier, Arc<Portal>>>,
    store: Arc<dyn BridgeStore>,
}

impl PortalDirectory {
    /// Create an empty directory over `store`
    pub fn new(store: Arc<dyn BridgeStore>) -> Self {
        Self {
            portals: Mutex::new(HashMap::new()),
            store,
        }
    }

    fn cached(&self, guid: &Identifier) -> Option<Arc<Portal>> {
        self.portals.lock().get(guid).cloned()
    }

    fn adopt(&self, guid: &Identifier, record: PortalRecord) -> Arc<Portal> {
        let store = Arc::clone(&self.store);
        Arc::clone(
            self.portals
                .lock()
                .entry(guid.clone())
                .or_insert_with(|| Arc::new(Portal::new(guid.clone(), record, store))),
        )
    }

    /// The portal for a conversation if it has been stored before
    pub async fn get_existing(&self, guid: &Identifier) -> BridgeResult<Option<Arc<Portal>>> {
        if let Some(portal) = self.cached(guid) {
            return Ok(Some(portal));
        }
        let record = self.store.get_portal(&guid.to_string()).await?;
        Ok(record.map(|record| self.adopt(guid, record)))
    }

    /// The portal for a conversation, creating and storing it on first use
    pub async fn get_or_create(&self, guid: &Identifier) -> BridgeResult<Arc<Portal>> {
        if let Some(portal) = self.cached(guid) {
            return Ok(portal);
        }
        let key = guid.to_string();
        let record = match self.store.get_portal(&key).await? {
            Some(record) => record,
            None => {
                let record = PortalRecord::new(key);
                self.store.insert_portal(&record).await?;
                debug!(portal = %guid, "Created portal");
                record
            }
        };
        Ok(self.adopt(guid, record))
    }

    /// Every portal currently held in memory
    pub fn loaded(&self) -> Vec<Arc<Portal>> {
        self.portals.lock().values().cloned().collect()
    }
}

impl std::fmt::Debug for PortalDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalDirectory")
            .field("loaded", &self.portals.lock().len())
            .finish_non_exhaustive()
    }
}
