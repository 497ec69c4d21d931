//! Chat platform abstraction.
//!
//! The reconciler only needs a handful of member and role operations; this
//! module defines them as the [`ChatPlatform`] trait together with cached
//! role snapshots per chat guild.

pub mod discord;

use crate::error::PlatformResult;
use crate::guilds::is_guild_role_name;
use crate::id::{GuildId, RoleId, UserId};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Operations the service performs on the chat platform
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Give a member a role
    async fn add_role(&self, guild: &GuildId, user: &UserId, role: &RoleId) -> PlatformResult<()>;

    /// Take a role from a member
    async fn remove_role(
        &self,
        guild: &GuildId,
        user: &UserId,
        role: &RoleId,
    ) -> PlatformResult<()>;

    /// Change a member's nickname
    async fn set_nickname(&self, guild: &GuildId, user: &UserId, nick: &str) -> PlatformResult<()>;

    /// Every role of a chat guild
    async fn list_roles(&self, guild: &GuildId) -> PlatformResult<Vec<Role>>;

    /// One page of members ordered by user ID, starting after `after`
    async fn list_members(
        &self,
        guild: &GuildId,
        after: Option<&UserId>,
        limit: usize,
    ) -> PlatformResult<Vec<Member>>;

    /// A single member, `None` if the user is not in the guild
    async fn member(&self, guild: &GuildId, user: &UserId) -> PlatformResult<Option<Member>>;

    /// Chat guilds the service is part of
    async fn guilds(&self) -> PlatformResult<Vec<GuildId>>;
}

/// A role of a chat guild
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role ID
    pub id: RoleId,
    /// Display name
    pub name: String,
}

impl Role {
    /// Create a role
    pub fn new(id: impl Into<RoleId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A member of a chat guild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// User ID
    pub user_id: UserId,
    /// Account-wide user name
    pub username: String,
    /// Guild-specific nickname
    pub nick: Option<String>,
    /// Roles currently held
    pub roles: Vec<RoleId>,
}

impl Member {
    /// Create a member without nickname or roles
    pub fn new(user_id: impl Into<UserId>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            nick: None,
            roles: Vec::new(),
        }
    }

    /// Set the nickname
    pub fn with_nick(mut self, nick: impl Into<String>) -> Self {
        self.nick = Some(nick.into());
        self
    }

    /// Set the held roles
    pub fn with_roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RoleId>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Name shown in the guild: nickname if set, else user name
    pub fn display_name(&self) -> &str {
        match &self.nick {
            Some(nick) if !nick.is_empty() => nick,
            _ => &self.username,
        }
    }

    /// Whether the member holds a role
    pub fn has_role(&self, role: &RoleId) -> bool {
        self.roles.contains(role)
    }
}

/// Immutable snapshot of one chat guild's roles
#[derive(Debug, Clone, Default)]
pub struct GuildRoles {
    roles: HashMap<RoleId, Role>,
}

impl GuildRoles {
    /// Build a snapshot from a role list
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            roles: roles.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    /// Look a role up by ID
    pub fn get(&self, id: &RoleId) -> Option<&Role> {
        self.roles.get(id)
    }

    /// Role with exactly this name; the lowest ID wins on duplicates
    pub fn find_by_name(&self, name: &str) -> Option<&Role> {
        self.roles
            .values()
            .filter(|r| r.name == name)
            .min_by(|a, b| a.id.cmp(&b.id))
    }

    /// Whether the role exists and is named like a guild role
    pub fn is_guild_role(&self, id: &RoleId) -> bool {
        self.get(id).is_some_and(|r| is_guild_role_name(&r.name))
    }

    /// Roles named like guild roles, lowest ID first
    pub fn guild_roles(&self) -> Vec<&Role> {
        let mut roles: Vec<&Role> = self
            .roles
            .values()
            .filter(|r| is_guild_role_name(&r.name))
            .collect();
        roles.sort_by(|a, b| a.id.cmp(&b.id));
        roles
    }

    /// Number of roles
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Whether the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Cache of role snapshots per chat guild
pub struct RoleDirectory {
    platform: Arc<dyn ChatPlatform>,
    guilds: RwLock<HashMap<GuildId, Arc<GuildRoles>>>,
}

impl RoleDirectory {
    /// Create an empty directory
    pub fn new(platform: Arc<dyn ChatPlatform>) -> Self {
        Self {
            platform,
            guilds: RwLock::new(HashMap::new()),
        }
    }

    /// Roles of a guild, loading them on first use
    pub async fn roles(&self, guild: &GuildId) -> PlatformResult<Arc<GuildRoles>> {
        let cached = self.guilds.read().get(guild).cloned();
        match cached {
            Some(roles) => Ok(roles),
            None => self.refresh(guild).await,
        }
    }

    /// Reload the roles of a guild
    pub async fn refresh(&self, guild: &GuildId) -> PlatformResult<Arc<GuildRoles>> {
        let roles = Arc::new(GuildRoles::new(self.platform.list_roles(guild).await?));
        self.guilds.write().insert(guild.clone(), roles.clone());
        Ok(roles)
    }

    /// Drop the cached roles of a guild
    pub fn invalidate(&self, guild: &GuildId) {
        self.guilds.write().remove(guild);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockPlatform;

    #[test]
    fn test_display_name() {
        let member = Member::new("1", "user");
        assert_eq!(member.display_name(), "user");
        assert_eq!(member.clone().with_nick("nick").display_name(), "nick");
        assert_eq!(member.with_nick("").display_name(), "user");
    }

    #[test]
    fn test_find_by_name_prefers_lowest_id() {
        let roles = GuildRoles::new([
            Role::new("20", "[DW] Deep Wound"),
            Role::new("3", "[DW] Deep Wound"),
            Role::new("5", "Member"),
        ]);
        assert_eq!(roles.find_by_name("[DW] Deep Wound").unwrap().id, RoleId::new("3"));
        assert!(roles.find_by_name("[XX] Nope").is_none());
        assert!(roles.is_guild_role(&RoleId::new("20")));
        assert!(!roles.is_guild_role(&RoleId::new("5")));
        assert!(!roles.is_guild_role(&RoleId::new("404")));

        let ids: Vec<&str> = roles.guild_roles().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "20"]);
    }

    #[tokio::test]
    async fn test_role_directory_caches_until_refresh() {
        let platform = Arc::new(MockPlatform::new());
        let guild = GuildId::new("1");
        platform.add_guild_role(&guild, Role::new("10", "[A] Alpha"));

        let directory = RoleDirectory::new(platform.clone());
        assert_eq!(directory.roles(&guild).await.unwrap().len(), 1);

        platform.add_guild_role(&guild, Role::new("11", "[B] Beta"));
        assert_eq!(directory.roles(&guild).await.unwrap().len(), 1);

        directory.invalidate(&guild);
        assert_eq!(directory.roles(&guild).await.unwrap().len(), 2);
    }
}
