//! In-memory fakes for testing.
//!
//! This module provides stand-ins for every external collaborator:
//! - `MockPlatform` for the chat platform, recording every call
//! - `MockGameApi` for guild lookups and matchups, with injectable failures
//! - `MockFacts` for linked account data and the update stream
//! - `MemorySettings` for per-guild configuration

use crate::error::{
    FactError, FactResult, GameApiError, GameApiResult, PlatformError, PlatformResult,
    SettingsResult,
};
use crate::facts::{FactProvider, UserFacts};
use crate::game::{GameApi, GuildFact, Matchup};
use crate::id::{GameGuildId, GuildId, RoleId, UserId};
use crate::platform::{ChatPlatform, Member, Role};
use crate::settings::{SettingKey, SettingsStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

// ============================================================================
// Chat platform
// ============================================================================

/// A call made against [`MockPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    /// `add_role`
    AddRole {
        /// Chat guild
        guild: GuildId,
        /// Member
        user: UserId,
        /// Role given
        role: RoleId,
    },
    /// `remove_role`
    RemoveRole {
        /// Chat guild
        guild: GuildId,
        /// Member
        user: UserId,
        /// Role taken
        role: RoleId,
    },
    /// `set_nickname`
    SetNickname {
        /// Chat guild
        guild: GuildId,
        /// Member
        user: UserId,
        /// New nickname
        nick: String,
    },
}

impl PlatformCall {
    /// Whether this call changed roles
    pub fn is_role_change(&self) -> bool {
        !matches!(self, PlatformCall::SetNickname { .. })
    }
}

#[derive(Default)]
struct PlatformState {
    roles: HashMap<GuildId, Vec<Role>>,
    members: HashMap<GuildId, BTreeMap<UserId, Member>>,
    failing_roles: HashSet<RoleId>,
    calls: Vec<PlatformCall>,
}

impl PlatformState {
    fn member_mut(&mut self, guild: &GuildId, user: &UserId) -> PlatformResult<&mut Member> {
        self.members
            .get_mut(guild)
            .and_then(|members| members.get_mut(user))
            .ok_or_else(|| PlatformError::Api {
                status: 404,
                message: "Unknown Member".to_string(),
            })
    }

    fn check_role(&self, role: &RoleId) -> PlatformResult<()> {
        if self.failing_roles.contains(role) {
            return Err(PlatformError::Api {
                status: 403,
                message: "Missing Permissions".to_string(),
            });
        }
        Ok(())
    }
}

/// A chat platform held in memory.
///
/// Role and nickname changes update the stored members so that a later
/// `member` or `list_members` call observes them.
#[derive(Default)]
pub struct MockPlatform {
    state: Mutex<PlatformState>,
}

impl MockPlatform {
    /// Create an empty platform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a role to a chat guild.
    pub fn add_guild_role(&self, guild: &GuildId, role: Role) {
        self.state
            .lock()
            .roles
            .entry(guild.clone())
            .or_default()
            .push(role);
    }

    /// Add or replace a member of a chat guild.
    pub fn add_member(&self, guild: &GuildId, member: Member) {
        self.state
            .lock()
            .members
            .entry(guild.clone())
            .or_default()
            .insert(member.user_id.clone(), member);
    }

    /// Make every add or remove of `role` fail.
    pub fn fail_role(&self, role: &RoleId) {
        self.state.lock().failing_roles.insert(role.clone());
    }

    /// Roles a member currently holds; empty if unknown.
    pub fn member_roles(&self, guild: &GuildId, user: &UserId) -> Vec<RoleId> {
        self.state
            .lock()
            .members
            .get(guild)
            .and_then(|members| members.get(user))
            .map(|member| member.roles.clone())
            .unwrap_or_default()
    }

    /// Current nickname of a member.
    pub fn member_nick(&self, guild: &GuildId, user: &UserId) -> Option<String> {
        self.state
            .lock()
            .members
            .get(guild)
            .and_then(|members| members.get(user))
            .and_then(|member| member.nick.clone())
    }

    /// Every mutating call made so far, in order.
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state.lock().calls.clone()
    }

    /// Nicknames set so far, in order.
    pub fn nicknames(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                PlatformCall::SetNickname { nick, .. } => Some(nick.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }
}

#[async_trait]
impl ChatPlatform for MockPlatform {
    async fn add_role(&self, guild: &GuildId, user: &UserId, role: &RoleId) -> PlatformResult<()> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::AddRole {
            guild: guild.clone(),
            user: user.clone(),
            role: role.clone(),
        });
        state.check_role(role)?;
        let member = state.member_mut(guild, user)?;
        if !member.roles.contains(role) {
            member.roles.push(role.clone());
        }
        Ok(())
    }

    async fn remove_role(
        &self,
        guild: &GuildId,
        user: &UserId,
        role: &RoleId,
    ) -> PlatformResult<()> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::RemoveRole {
            guild: guild.clone(),
            user: user.clone(),
            role: role.clone(),
        });
        state.check_role(role)?;
        let member = state.member_mut(guild, user)?;
        member.roles.retain(|r| r != role);
        Ok(())
    }

    async fn set_nickname(&self, guild: &GuildId, user: &UserId, nick: &str) -> PlatformResult<()> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::SetNickname {
            guild: guild.clone(),
            user: user.clone(),
            nick: nick.to_string(),
        });
        let member = state.member_mut(guild, user)?;
        member.nick = (!nick.is_empty()).then(|| nick.to_string());
        Ok(())
    }

    async fn list_roles(&self, guild: &GuildId) -> PlatformResult<Vec<Role>> {
        Ok(self.state.lock().roles.get(guild).cloned().unwrap_or_default())
    }

    async fn list_members(
        &self,
        guild: &GuildId,
        after: Option<&UserId>,
        limit: usize,
    ) -> PlatformResult<Vec<Member>> {
        let state = self.state.lock();
        let Some(members) = state.members.get(guild) else {
            return Ok(Vec::new());
        };
        Ok(members
            .values()
            .filter(|member| after.is_none_or(|after| member.user_id > *after))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn member(&self, guild: &GuildId, user: &UserId) -> PlatformResult<Option<Member>> {
        Ok(self
            .state
            .lock()
            .members
            .get(guild)
            .and_then(|members| members.get(user))
            .cloned())
    }

    async fn guilds(&self) -> PlatformResult<Vec<GuildId>> {
        let state = self.state.lock();
        let guilds: BTreeSet<GuildId> = state
            .roles
            .keys()
            .chain(state.members.keys())
            .cloned()
            .collect();
        Ok(guilds.into_iter().collect())
    }
}

// ============================================================================
// Game API
// ============================================================================

#[derive(Default)]
struct GameState {
    guilds: HashMap<GameGuildId, GuildFact>,
    failing: HashSet<GameGuildId>,
    rate_limited: HashSet<GameGuildId>,
    guild_calls: usize,
    matchups: Vec<Matchup>,
    fail_matchups: bool,
}

/// A game API answering from memory.
///
/// Unknown guilds are reported as not found.
#[derive(Default)]
pub struct MockGameApi {
    state: Mutex<GameState>,
}

impl MockGameApi {
    /// Create an API that knows no guilds and has no matchups.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a guild.
    pub fn with_guild(self, fact: GuildFact) -> Self {
        self.state.lock().guilds.insert(fact.id.clone(), fact);
        self
    }

    /// Make lookups of a guild fail until healed.
    pub fn fail_guild(&self, id: &str) {
        self.state.lock().failing.insert(GameGuildId::new(id));
    }

    /// Undo [`fail_guild`](Self::fail_guild) and [`rate_limit_guild`](Self::rate_limit_guild).
    pub fn heal_guild(&self, id: &str) {
        let id = GameGuildId::new(id);
        let mut state = self.state.lock();
        state.failing.remove(&id);
        state.rate_limited.remove(&id);
    }

    /// Make lookups of a guild report rate limiting until healed.
    pub fn rate_limit_guild(&self, id: &str) {
        self.state.lock().rate_limited.insert(GameGuildId::new(id));
    }

    /// Number of guild lookups served, failures included.
    pub fn guild_calls(&self) -> usize {
        self.state.lock().guild_calls
    }

    /// Replace the current matchups.
    pub fn set_matchups(&self, matchups: Vec<Matchup>) {
        self.state.lock().matchups = matchups;
    }

    /// Make matchup fetches fail or succeed.
    pub fn fail_matchups(&self, fail: bool) {
        self.state.lock().fail_matchups = fail;
    }
}

#[async_trait]
impl GameApi for MockGameApi {
    async fn get_guild(&self, id: &GameGuildId) -> GameApiResult<GuildFact> {
        let mut state = self.state.lock();
        state.guild_calls += 1;
        if state.rate_limited.contains(id) {
            return Err(GameApiError::RateLimited);
        }
        if state.failing.contains(id) {
            return Err(GameApiError::Unavailable("injected failure".to_string()));
        }
        state
            .guilds
            .get(id)
            .cloned()
            .ok_or_else(|| GameApiError::NotFound { id: id.clone() })
    }

    async fn regional_matchups(&self) -> GameApiResult<Vec<Matchup>> {
        let state = self.state.lock();
        if state.fail_matchups {
            return Err(GameApiError::Unavailable("injected failure".to_string()));
        }
        Ok(state.matchups.clone())
    }
}

// ============================================================================
// Facts
// ============================================================================

#[derive(Default)]
struct FactState {
    users: HashMap<UserId, UserFacts>,
    updates: VecDeque<UserFacts>,
    failing: bool,
    lookups: usize,
}

/// Linked account data held in memory.
#[derive(Default)]
pub struct MockFacts {
    state: Mutex<FactState>,
}

impl MockFacts {
    /// Create a provider that knows nobody.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register facts for a platform user.
    pub fn with_user(self, user: impl Into<UserId>, facts: UserFacts) -> Self {
        self.set_user(user, facts);
        self
    }

    /// Register or replace facts for a platform user.
    pub fn set_user(&self, user: impl Into<UserId>, facts: UserFacts) {
        self.state.lock().users.insert(user.into(), facts);
    }

    /// Queue an update for [`FactProvider::next_update`].
    pub fn push_update(&self, facts: UserFacts) {
        self.state.lock().updates.push_back(facts);
    }

    /// Make every call fail with a server error.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    /// Number of `get_user` calls served.
    pub fn lookups(&self) -> usize {
        self.state.lock().lookups
    }
}

fn injected_server_error() -> FactError {
    FactError::Server {
        status: 500,
        message: "injected failure".to_string(),
    }
}

#[async_trait]
impl FactProvider for MockFacts {
    async fn get_user(&self, user: &UserId) -> FactResult<UserFacts> {
        let mut state = self.state.lock();
        state.lookups += 1;
        if state.failing {
            return Err(injected_server_error());
        }
        state.users.get(user).cloned().ok_or(FactError::NotFound)
    }

    async fn next_update(&self) -> FactResult<Option<UserFacts>> {
        let mut state = self.state.lock();
        if state.failing {
            return Err(injected_server_error());
        }
        Ok(state.updates.pop_front())
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Per-guild settings held in memory.
#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<(GuildId, SettingKey), String>>,
}

impl MemorySettings {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value while building.
    pub fn with(self, guild: &GuildId, key: SettingKey, value: &str) -> Self {
        self.values
            .lock()
            .insert((guild.clone(), key), value.to_string());
        self
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    fn get(&self, guild: &GuildId, key: SettingKey) -> String {
        self.values
            .lock()
            .get(&(guild.clone(), key))
            .cloned()
            .unwrap_or_default()
    }

    async fn set(&self, guild: &GuildId, key: SettingKey, value: &str) -> SettingsResult<()> {
        self.values
            .lock()
            .insert((guild.clone(), key), value.to_string());
        Ok(())
    }
}
