//! # Ghostline Bridge
//!
//! Identity and lifecycle layer of the bridge: maps remote participants to
//! homeserver puppets and remote conversations to portals, and keeps their
//! names and avatars in step exactly once per observed change.
//!
//! ## Purpose
//!
//! - One in-memory [`Puppet`] per remote local id ([`PuppetRegistry`])
//! - Name and avatar updates with change detection and rollback
//! - Fan-out of puppet metadata to direct-chat portals under per-portal
//!   locks ([`PortalSynchronizer`])
//! - The event loop draining the remote event queues ([`Bridge`])
//!
//! ## What Does NOT Belong Here
//!
//! - The homeserver client ([`MatrixClient`] is implemented elsewhere)
//! - Database schema and migrations ([`BridgeStore`] is implemented
//!   elsewhere; [`MemoryStore`] is for tests and ephemeral use)
//! - Room creation policy

pub mod avatar;
pub mod bridge;
pub mod config;
pub mod context;
pub mod error;
pub mod matrix;
pub mod portal;
pub mod puppet;
pub mod registry;
pub mod store;
pub mod sync;
pub mod tasks;
pub mod user_id;

pub use avatar::{avatar_hash, AvatarFetcher, AvatarHash, HttpAvatarFetcher};
pub use bridge::{Bridge, EventSink};
pub use config::{AvatarConfig, BridgeConfig, HomeserverConfig, NamingConfig};
pub use context::BridgeContext;
pub use error::{BridgeError, BridgeResult};
pub use matrix::{ContentUri, MatrixClient, RoomId, UserId};
pub use portal::{Portal, PortalDirectory};
pub use puppet::{ProfileOverride, Puppet, TypingState};
pub use registry::PuppetRegistry;
pub use store::{BridgeStore, MemoryStore, PortalRecord, PuppetRecord};
pub use sync::{PortalMetadata, PortalSynchronizer};
pub use tasks::TaskRegistry;
pub use user_id::PuppetUserIds;
