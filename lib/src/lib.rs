//! # Alliance
//!
//! Keeps the roles and nicknames of chat server members in line with their
//! Guild Wars 2 accounts.
//!
//! ## Core Concepts
//!
//! - **Guild Directory**: cached game guild lookups, all-or-nothing per batch
//! - **World Links**: which worlds are linked in the current matchup
//! - **Nickname Composer**: guild tag prefixes and account name suffixes
//! - **Role Reconciler**: plans and applies the role changes a member needs
//! - **Member Sync**: drives the reconciler from events, updates and sweeps
//!
//! ## Example
//!
//! ```rust,ignore
//! use alliance::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let api = Arc::new(gw2api::Client::new()?);
//!     let directory = Arc::new(GuildDirectory::new(api.clone()));
//!     let worlds = Arc::new(WorldLinks::new(api));
//!     worlds.spawn();
//!     worlds.synchronized().await;
//!
//!     let sync = MemberSync::new(platform, facts, settings, RoleReconciler::new(directory, worlds));
//!     sync.sweep_once().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod facts;
pub mod game;
pub mod guilds;
pub mod id;
pub mod nick;
pub mod platform;
pub mod reconcile;
pub mod settings;
pub mod status;
pub mod sync;
pub mod testing;
pub mod worlds;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::facts::backend::BackendClient;
    pub use crate::facts::{Account, Ban, FactProvider, UserFacts};
    pub use crate::game::{GameApi, GuildFact, Matchup};
    pub use crate::guilds::GuildDirectory;
    pub use crate::id::*;
    pub use crate::nick::NickComposer;
    pub use crate::platform::discord::DiscordRest;
    pub use crate::platform::{ChatPlatform, GuildRoles, Member, Role, RoleDirectory};
    pub use crate::reconcile::{ReconcileContext, Reconciliation, RoleMutation, RoleReconciler};
    pub use crate::settings::{GuildConfig, ServiceSettings, SettingKey, SettingsStore};
    pub use crate::status::StatusReport;
    pub use crate::sync::{MemberReport, MemberSync, SweepStats};
    pub use crate::worlds::WorldLinks;
}
