//! Facts about a platform user as served by the verification backend.
//!
//! Facts are immutable snapshots: a reconciliation pass reads them and never
//! writes back. The backend is the source of truth.

pub mod backend;

use crate::error::FactResult;
use crate::id::{AccountId, GameGuildId, UserId, WorldId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Source of user facts
#[async_trait]
pub trait FactProvider: Send + Sync {
    /// Fetch the facts for a chat platform user
    async fn get_user(&self, user: &UserId) -> FactResult<UserFacts>;

    /// Wait for the next user whose facts changed.
    ///
    /// Returns `Ok(None)` when the poll window closed without an update.
    async fn next_update(&self) -> FactResult<Option<UserFacts>>;
}

/// A linked game account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Backend identity of the account
    pub id: AccountId,
    /// Full account name, e.g. `Name.1234`
    pub name: String,
    /// World the account is assigned to
    pub world: WorldId,
    /// Guilds the account is a member of
    #[serde(default)]
    pub guilds: Vec<GameGuildId>,
    /// API keys registered for the account
    #[serde(default)]
    pub api_keys: Vec<ApiKey>,
    /// Whether the backend could no longer verify the account
    #[serde(default)]
    pub expired: bool,
}

impl Account {
    /// Permission tags across every API key of this account.
    ///
    /// Entries may be comma-joined lists; they are split and trimmed.
    pub fn permissions(&self) -> BTreeSet<&str> {
        self.api_keys
            .iter()
            .flat_map(|key| key.permissions.iter())
            .flat_map(|entry| entry.split(','))
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect()
    }

    /// Whether the combined keys grant every required permission.
    pub fn covers<S: AsRef<str>>(&self, required: &[S]) -> bool {
        if required.is_empty() {
            return true;
        }
        let granted = self.permissions();
        required.iter().all(|p| granted.contains(p.as_ref()))
    }

    /// Whether the account is a member of the given guild.
    pub fn in_guild(&self, guild: &GameGuildId) -> bool {
        self.guilds.contains(guild)
    }
}

/// An API key registered by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    /// Name the user gave the key
    #[serde(default)]
    pub name: String,
    /// Permission tags granted by the key
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// A ban on the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ban {
    /// When the ban expires
    pub until: DateTime<Utc>,
    /// Reason shown to the user
    #[serde(default)]
    pub reason: String,
}

impl Ban {
    /// Whether the ban is in effect at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.until > now
    }
}

/// A temporary grant of world membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EphemeralAssociation {
    /// World granted
    pub world: WorldId,
    /// When the grant expires
    pub until: DateTime<Utc>,
}

/// Link between the backend user and a chat platform identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformLink {
    /// Platform discriminator (Discord is 2)
    pub platform_id: u32,
    /// User ID on that platform
    pub platform_user_id: UserId,
}

/// Everything the backend knows about one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFacts {
    /// Linked game accounts
    #[serde(default)]
    pub accounts: Vec<Account>,
    /// Bans, active or expired
    #[serde(default)]
    pub bans: Vec<Ban>,
    /// Temporary world grants
    #[serde(default)]
    pub ephemeral_associations: Vec<EphemeralAssociation>,
    /// Chat platform identities
    #[serde(default)]
    pub platform_links: Vec<PlatformLink>,
}

impl UserFacts {
    /// The active ban with the furthest expiry, if any.
    pub fn active_ban(&self, now: DateTime<Utc>) -> Option<&Ban> {
        self.bans
            .iter()
            .filter(|ban| ban.is_active(now))
            .max_by_key(|ban| ban.until)
    }

    /// Ephemeral grants still in effect at `now`.
    pub fn active_associations(
        &self,
        now: DateTime<Utc>,
    ) -> impl Iterator<Item = &EphemeralAssociation> {
        self.ephemeral_associations
            .iter()
            .filter(move |assoc| assoc.until > now)
    }

    /// Accounts the backend still considers valid.
    pub fn live_accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.iter().filter(|acc| !acc.expired)
    }

    /// Whether any account covers the required permissions.
    pub fn any_account_covers<S: AsRef<str>>(&self, required: &[S]) -> bool {
        if required.is_empty() {
            return true;
        }
        self.accounts.iter().any(|acc| acc.covers(required))
    }

    /// User IDs of this user on the given platform.
    pub fn platform_users(&self, platform_id: u32) -> impl Iterator<Item = &UserId> {
        self.platform_links
            .iter()
            .filter(move |link| link.platform_id == platform_id)
            .map(|link| &link.platform_user_id)
    }
}
