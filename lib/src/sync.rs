//! Member synchronization.
//!
//! [`MemberSync`] connects the chat platform, the fact provider and the
//! settings store to the [`RoleReconciler`]. It has three entry points that
//! may run concurrently for the same member:
//!
//! - events: a member's roles changed ([`MemberSync::on_member_update`])
//! - backend updates: a user's facts changed ([`MemberSync::run_updates`])
//! - the periodic sweep over every member ([`MemberSync::run_sweep`])
//!
//! Reconciliation is idempotent, so racing entry points cost at most a
//! redundant mutation.

use crate::error::{Error, FactError, PlatformError, Result};
use crate::facts::backend::DISCORD_PLATFORM_ID;
use crate::facts::{FactProvider, UserFacts};
use crate::id::{GameGuildId, GuildId, RoleId, UserId};
use crate::platform::{ChatPlatform, Member, RoleDirectory};
use crate::reconcile::{MutationFailure, ReconcileContext, RoleMutation, RoleReconciler};
use crate::settings::{GuildConfig, SettingsStore};
use crate::status::StatusReport;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

/// Members fetched per sweep page
pub const DEFAULT_PAGE_SIZE: usize = 25;

/// Pause between sweep pages
pub const DEFAULT_PAGE_PAUSE: Duration = Duration::from_secs(5);

/// Pause after a failed update poll
pub const DEFAULT_UPDATE_BACKOFF: Duration = Duration::from_secs(10);

/// What one member refresh did
#[derive(Debug)]
pub struct MemberReport {
    /// Chat guild
    pub guild: GuildId,
    /// Member
    pub user: UserId,
    /// Role changes the platform accepted
    pub applied: Vec<RoleMutation>,
    /// Role changes the platform rejected
    pub failures: Vec<MutationFailure>,
    /// New nickname, if it was changed
    pub nickname: Option<String>,
    /// Why the nickname change failed, if it did
    pub nickname_failure: Option<PlatformError>,
    /// Unresolved game guilds, if the refresh was aborted
    pub aborted: Option<Vec<GameGuildId>>,
}

impl MemberReport {
    fn new(guild: &GuildId, user: &UserId) -> Self {
        Self {
            guild: guild.clone(),
            user: user.clone(),
            applied: Vec::new(),
            failures: Vec::new(),
            nickname: None,
            nickname_failure: None,
            aborted: None,
        }
    }

    /// Whether nothing was decided because a guild lookup failed
    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// Whether the refresh changed or attempted nothing
    pub fn is_unchanged(&self) -> bool {
        self.applied.is_empty()
            && self.failures.is_empty()
            && self.nickname.is_none()
            && self.nickname_failure.is_none()
    }
}

/// Counters of one sweep pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepStats {
    /// Chat guilds visited
    pub guilds: usize,
    /// Members refreshed
    pub refreshed: usize,
    /// Members skipped (inactive or unlinked)
    pub skipped: usize,
    /// Refreshes aborted on incomplete guild data
    pub aborted: usize,
    /// Errors while fetching or refreshing
    pub errors: usize,
}

/// Keeps chat guild members in line with their facts
pub struct MemberSync {
    platform: Arc<dyn ChatPlatform>,
    facts: Arc<dyn FactProvider>,
    settings: Arc<dyn SettingsStore>,
    roles: RoleDirectory,
    reconciler: RoleReconciler,
    platform_id: u32,
    debug_user: Option<UserId>,
    page_size: usize,
    page_pause: Duration,
    update_backoff: Duration,
}

impl MemberSync {
    /// Create a synchronizer with default paging and back-off
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        facts: Arc<dyn FactProvider>,
        settings: Arc<dyn SettingsStore>,
        reconciler: RoleReconciler,
    ) -> Self {
        Self {
            roles: RoleDirectory::new(platform.clone()),
            platform,
            facts,
            settings,
            reconciler,
            platform_id: DISCORD_PLATFORM_ID,
            debug_user: None,
            page_size: DEFAULT_PAGE_SIZE,
            page_pause: DEFAULT_PAGE_PAUSE,
            update_backoff: DEFAULT_UPDATE_BACKOFF,
        }
    }

    /// Only act on this user
    pub fn with_debug_user(mut self, user: Option<UserId>) -> Self {
        self.debug_user = user;
        self
    }

    /// Platform discriminator of the chat platform in backend links
    pub fn with_platform_id(mut self, platform_id: u32) -> Self {
        self.platform_id = platform_id;
        self
    }

    /// Members per sweep page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Pause between sweep pages
    pub fn with_page_pause(mut self, pause: Duration) -> Self {
        self.page_pause = pause;
        self
    }

    /// Pause after a failed update poll
    pub fn with_update_backoff(mut self, backoff: Duration) -> Self {
        self.update_backoff = backoff;
        self
    }

    /// Role snapshots per chat guild
    pub fn role_directory(&self) -> &RoleDirectory {
        &self.roles
    }

    /// Whether the service acts on this user
    pub fn is_active_for(&self, user: &UserId) -> bool {
        self.debug_user.as_ref().is_none_or(|debug| debug == user)
    }

    /// Reconcile roles, then nickname, of one member.
    pub async fn refresh_member(
        &self,
        guild: &GuildId,
        member: &Member,
        facts: &UserFacts,
        hint: Option<&RoleId>,
    ) -> Result<MemberReport> {
        let config = GuildConfig::load(self.settings.as_ref(), guild);
        let roles = self.roles.roles(guild).await?;
        let ctx = ReconcileContext {
            guild,
            member,
            config: &config,
            facts,
            roles: &roles,
            hint,
            now: Utc::now(),
        };

        let outcome = self.reconciler.reconcile(self.platform.as_ref(), &ctx).await;
        let mut report = MemberReport::new(guild, &member.user_id);
        report.failures = outcome.failures;
        if outcome.aborted.is_some() {
            report.aborted = outcome.aborted;
            return Ok(report);
        }

        // Nickname follows the roles as they are after this pass.
        let mut projected = member.roles.clone();
        for mutation in &outcome.applied {
            mutation.apply_to(&mut projected);
        }
        report.applied = outcome.applied;

        if let Some(nick) = self.reconciler.plan_nickname(&ctx, &projected) {
            let user = &member.user_id;
            match self.platform.set_nickname(guild, user, &nick).await {
                Ok(()) => {
                    tracing::info!(%guild, %user, nick = %nick, "nickname updated");
                    report.nickname = Some(nick);
                }
                Err(error) => {
                    tracing::warn!(%guild, %user, nick = %nick, %error, "nickname update failed");
                    report.nickname_failure = Some(error);
                }
            }
        }

        Ok(report)
    }

    /// React to a member's roles changing.
    ///
    /// The first role present now but not before is preferred when several
    /// guild roles are eligible. Users without linked data are left alone.
    pub async fn on_member_update(
        &self,
        guild: &GuildId,
        before: Option<&[RoleId]>,
        member: &Member,
    ) -> Result<Option<MemberReport>> {
        if !self.is_active_for(&member.user_id) {
            return Ok(None);
        }

        let hint = before.and_then(|before| find_added_role(before, &member.roles));
        let facts = match self.facts.get_user(&member.user_id).await {
            Ok(facts) => facts,
            Err(FactError::NotFound) => {
                tracing::debug!(%guild, user = %member.user_id, "member has no linked data");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        self.refresh_member(guild, member, &facts, hint).await.map(Some)
    }

    /// React to a backend update: refresh the user in every chat guild.
    pub async fn refresh_user(&self, facts: &UserFacts) -> Result<Vec<MemberReport>> {
        let guilds = self.platform.guilds().await?;
        let mut reports = Vec::new();

        for user in facts.platform_users(self.platform_id) {
            if !self.is_active_for(user) {
                continue;
            }
            let refreshes = guilds
                .iter()
                .map(|guild| self.refresh_in_guild(guild, user, facts));
            reports.extend(join_all(refreshes).await.into_iter().flatten());
        }

        Ok(reports)
    }

    async fn refresh_in_guild(
        &self,
        guild: &GuildId,
        user: &UserId,
        facts: &UserFacts,
    ) -> Option<MemberReport> {
        let member = match self.platform.member(guild, user).await {
            Ok(Some(member)) => member,
            Ok(None) => return None,
            Err(error) => {
                tracing::error!(%guild, %user, %error, "unable to get member");
                return None;
            }
        };

        match self.refresh_member(guild, &member, facts, None).await {
            Ok(report) => Some(report),
            Err(error) => {
                tracing::error!(%guild, %user, %error, "unable to refresh member");
                None
            }
        }
    }

    /// Refresh every member of every chat guild once.
    pub async fn sweep_once(&self) -> Result<SweepStats> {
        let mut stats = SweepStats::default();

        for guild in self.platform.guilds().await? {
            stats.guilds += 1;
            // Roles may have been created or renamed since the last pass.
            if let Err(error) = self.roles.refresh(&guild).await {
                tracing::error!(%guild, %error, "unable to load guild roles");
                stats.errors += 1;
                continue;
            }
            self.sweep_guild(&guild, &mut stats).await;
        }

        Ok(stats)
    }

    async fn sweep_guild(&self, guild: &GuildId, stats: &mut SweepStats) {
        let limit = self.page_size;
        let mut after: Option<UserId> = None;

        loop {
            tracing::info!(%guild, limit, "fetching guild members scheduled for refresh");
            let members = match self.platform.list_members(guild, after.as_ref(), limit).await {
                Ok(members) => members,
                Err(error) => {
                    tracing::error!(%guild, %error, "unable to fetch guild members");
                    stats.errors += 1;
                    break;
                }
            };

            for member in &members {
                after = Some(member.user_id.clone());
                self.sweep_member(guild, member, stats).await;
            }

            tokio::time::sleep(self.page_pause).await;
            if members.len() < limit {
                break;
            }
        }
    }

    async fn sweep_member(&self, guild: &GuildId, member: &Member, stats: &mut SweepStats) {
        let user = &member.user_id;
        if !self.is_active_for(user) {
            stats.skipped += 1;
            return;
        }

        let facts = match self.facts.get_user(user).await {
            Ok(facts) => facts,
            Err(FactError::NotFound) => {
                stats.skipped += 1;
                return;
            }
            Err(error) => {
                tracing::error!(%guild, %user, %error, "unable to get facts for member");
                stats.errors += 1;
                return;
            }
        };

        match self.refresh_member(guild, member, &facts, None).await {
            Ok(report) => {
                stats.refreshed += 1;
                if report.is_aborted() {
                    stats.aborted += 1;
                }
            }
            Err(error) => {
                tracing::error!(%guild, %user, %error, "unable to refresh member");
                stats.errors += 1;
            }
        }
    }

    /// Sweep forever.
    pub async fn run_sweep(self: Arc<Self>) {
        loop {
            match self.sweep_once().await {
                Ok(stats) => tracing::info!(?stats, "membership sweep complete"),
                Err(error) => tracing::error!(%error, "membership sweep failed"),
            }
            tokio::time::sleep(self.page_pause).await;
        }
    }

    /// Listen for backend updates forever.
    pub async fn run_updates(self: Arc<Self>) {
        loop {
            match self.facts.next_update().await {
                Ok(Some(facts)) => {
                    tracing::info!(links = facts.platform_links.len(), "received verification update");
                    if let Err(error) = self.refresh_user(&facts).await {
                        tracing::error!(%error, "unable to refresh user");
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::error!(%error, "unable to get verification update");
                    tokio::time::sleep(self.update_backoff).await;
                }
            }
        }
    }

    /// Make `target` the game guild a member represents.
    ///
    /// Every other guild role is removed, then the common role and the
    /// target's role are added. Returns the role now held.
    pub async fn represent_guild(
        &self,
        guild: &GuildId,
        user: &UserId,
        target: &GameGuildId,
    ) -> Result<RoleId> {
        let facts = self.facts.get_user(user).await?;
        if !facts.accounts.iter().any(|acc| acc.in_guild(target)) {
            return Err(Error::NotEligible {
                guild: target.clone(),
            });
        }

        let fact = self.reconciler.directory().resolve(target).await?;
        let roles = self.roles.roles(guild).await?;
        let name = fact.role_name();
        let role = roles
            .find_by_name(&name)
            .map(|role| role.id.clone())
            .ok_or_else(|| Error::RoleNotFound { name: name.clone() })?;

        let member = self
            .platform
            .member(guild, user)
            .await?
            .ok_or(Error::NotMember)?;
        let config = GuildConfig::load(self.settings.as_ref(), guild);
        let common = config.common_role.as_ref();

        for held in &member.roles {
            if held == &role || Some(held) == common || !roles.is_guild_role(held) {
                continue;
            }
            if let Err(error) = self.platform.remove_role(guild, user, held).await {
                tracing::warn!(%guild, %user, role = %held, %error, "unable to remove guild role");
            }
        }

        if let Some(common) = common {
            self.platform.add_role(guild, user, common).await?;
        }
        self.platform.add_role(guild, user, &role).await?;
        tracing::info!(%guild, %user, %role, guild_name = %name, "member now represents guild");

        Ok(role)
    }

    /// Verification status of a user.
    pub async fn status(&self, user: &UserId) -> Result<StatusReport> {
        let facts = match self.facts.get_user(user).await {
            Ok(facts) => facts,
            Err(FactError::NotFound) => UserFacts::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(StatusReport::build(self.reconciler.directory(), &facts, Utc::now()).await)
    }
}

/// First role in `after` that is not in `before`.
pub fn find_added_role<'a>(before: &[RoleId], after: &'a [RoleId]) -> Option<&'a RoleId> {
    after.iter().find(|role| !before.contains(role))
}
