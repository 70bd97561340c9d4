//! Puppet Registry
//!
//! Keeps exactly one in-memory [`Puppet`] per remote local id, loading or
//! creating the stored record on first use.
//!
//! # Blocking Lock Usage
//!
//! The map sits behind a `parking_lot::Mutex` that is held only to look up
//! or insert an entry. Store calls happen between two short lock sections:
//! a miss releases the lock, loads or inserts the record, then re-locks and
//! keeps whichever entry landed first. Concurrent callers for the same id
//! may both touch the store, but all of them receive the same `Arc`.

#![allow(clippy::disallowed_types)]

use crate::context::BridgeContext;
use crate::error::{BridgeError, BridgeResult};
use crate::matrix::UserId;
use crate::puppet::Puppet;
use crate::store::PuppetRecord;
use ghostline_remote::Identifier;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Singleton map of puppets keyed by remote local id
pub struct PuppetRegistry {
    puppets: Mutex<HashMap<String, Arc<Puppet>>>,
    ctx: Arc<BridgeContext>,
}

impl PuppetRegistry {
    /// Create an empty registry
    pub fn new(ctx: Arc<BridgeContext>) -> Self {
        Self {
            puppets: Mutex::new(HashMap::new()),
            ctx,
        }
    }

    fn adopt(&self, record: PuppetRecord) -> Arc<Puppet> {
        let mut puppets = self.puppets.lock();
        Arc::clone(
            puppets
                .entry(record.local_id.clone())
                .or_insert_with(|| Arc::new(Puppet::new(record, Arc::clone(&self.ctx)))),
        )
    }

    /// The puppet for a local id, creating and storing it on first use
    pub async fn get_or_create(&self, local_id: &str) -> BridgeResult<Arc<Puppet>> {
        let cached = self.puppets.lock().get(local_id).cloned();
        if let Some(puppet) = cached {
            return Ok(puppet);
        }

        let record = match self.ctx.store.get_puppet(local_id).await? {
            Some(record) => record,
            None => {
                let record = PuppetRecord::new(local_id);
                self.ctx.store.insert_puppet(&record).await?;
                debug!(puppet = %local_id, "Created puppet");
                record
            }
        };
        Ok(self.adopt(record))
    }

    /// The puppet for a participant identifier such as `iMessage;-;+15551234`
    pub async fn get_by_guid(&self, guid: &str) -> BridgeResult<Arc<Puppet>> {
        let identifier = Identifier::parse(guid)?;
        self.get_or_create(&identifier.local_id).await
    }

    /// The puppet owning a homeserver user id
    pub async fn get_by_user_id(&self, user_id: &UserId) -> BridgeResult<Arc<Puppet>> {
        let local_id = self
            .ctx
            .user_ids
            .parse(user_id)
            .ok_or_else(|| BridgeError::InvalidUserId {
                user_id: user_id.to_string(),
            })?;
        self.get_or_create(&local_id).await
    }

    /// Every stored puppet, sharing instances with earlier lookups
    pub async fn all(&self) -> BridgeResult<Vec<Arc<Puppet>>> {
        let records = self.ctx.store.all_puppets().await?;
        Ok(records.into_iter().map(|record| self.adopt(record)).collect())
    }

    /// Number of puppets held in memory
    pub fn len(&self) -> usize {
        self.puppets.lock().len()
    }

    /// Whether no puppet has been loaded yet
    pub fn is_empty(&self) -> bool {
        self.puppets.lock().is_empty()
    }
}

impl std::fmt::Debug for PuppetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PuppetRegistry")
            .field("loaded", &self.len())
            .finish_non_exhaustive()
    }
}
