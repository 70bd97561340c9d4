//! Shared bridge services
//!
//! One [`BridgeContext`] is created per bridge and shared by the registry,
//! every puppet, and the event loop.

use crate::avatar::AvatarFetcher;
use crate::config::{BridgeConfig, NamingConfig};
use crate::matrix::MatrixClient;
use crate::portal::PortalDirectory;
use crate::store::BridgeStore;
use crate::sync::PortalSynchronizer;
use crate::tasks::TaskRegistry;
use crate::user_id::PuppetUserIds;
use ghostline_remote::RemoteApi;
use std::sync::Arc;

/// Collaborators and shared state used across the bridge
pub struct BridgeContext {
    /// Display name formatting
    pub naming: NamingConfig,
    /// Puppet user id codec
    pub user_ids: PuppetUserIds,
    /// Homeserver client
    pub matrix: Arc<dyn MatrixClient>,
    /// Remote network API
    pub remote: Arc<dyn RemoteApi>,
    /// Durable state
    pub store: Arc<dyn BridgeStore>,
    /// Loaded portals
    pub portals: Arc<PortalDirectory>,
    /// Puppet to portal metadata propagation
    pub synchronizer: PortalSynchronizer,
    /// Detached follow-up work
    pub tasks: TaskRegistry,
    /// Override avatar downloads
    pub avatar_fetcher: Arc<dyn AvatarFetcher>,
}

impl BridgeContext {
    /// Wire the collaborators together
    pub fn new(
        config: &BridgeConfig,
        matrix: Arc<dyn MatrixClient>,
        remote: Arc<dyn RemoteApi>,
        store: Arc<dyn BridgeStore>,
        avatar_fetcher: Arc<dyn AvatarFetcher>,
    ) -> Arc<Self> {
        let portals = Arc::new(PortalDirectory::new(Arc::clone(&store)));
        Arc::new(Self {
            naming: config.bridge.clone(),
            user_ids: PuppetUserIds::new(
                &config.bridge.username_template,
                config.homeserver.domain.clone(),
            ),
            synchronizer: PortalSynchronizer::new(Arc::clone(&portals), Arc::clone(&matrix)),
            matrix,
            remote,
            store,
            portals,
            tasks: TaskRegistry::new(),
            avatar_fetcher,
        })
    }
}

impl std::fmt::Debug for BridgeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeContext")
            .field("naming", &self.naming)
            .field("user_ids", &self.user_ids)
            .field("portals", &self.portals)
            .field("tasks", &self.tasks)
            .finish_non_exhaustive()
    }
}
