//! Role Reconciler.
//!
//! Computes the roles a member should hold from their facts and the guild
//! configuration, diffs that against the roles they hold, and applies the
//! difference. Planning is all-or-nothing: if any guild lookup is incomplete
//! nothing is planned. Application is best-effort: each mutation stands alone
//! and failures are reported, never rolled back.
//!
//! Reconciliation is idempotent. Running it again with the same facts after
//! its mutations landed plans nothing, which makes concurrent passes over the
//! same member harmless.

pub mod guild_roles;
pub mod nickname;
pub mod world_roles;

use crate::error::PlatformError;
use crate::facts::UserFacts;
use crate::guilds::GuildDirectory;
use crate::id::{GameGuildId, GuildId, RoleId};
use crate::nick::NickComposer;
use crate::platform::{ChatPlatform, GuildRoles, Member};
use crate::settings::GuildConfig;
use crate::worlds::WorldLinks;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// A single change to a member's roles
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoleMutation {
    /// Give the role
    Add(RoleId),
    /// Take the role
    Remove(RoleId),
}

impl RoleMutation {
    /// The role being changed
    pub fn role(&self) -> &RoleId {
        match self {
            RoleMutation::Add(role) | RoleMutation::Remove(role) => role,
        }
    }

    /// Apply to a role list as if the platform accepted it
    pub fn apply_to(&self, roles: &mut Vec<RoleId>) {
        match self {
            RoleMutation::Add(role) => {
                if !roles.contains(role) {
                    roles.push(role.clone());
                }
            }
            RoleMutation::Remove(role) => roles.retain(|r| r != role),
        }
    }
}

impl fmt::Display for RoleMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleMutation::Add(role) => write!(f, "+{role}"),
            RoleMutation::Remove(role) => write!(f, "-{role}"),
        }
    }
}

/// A mutation the platform rejected
#[derive(Debug)]
pub struct MutationFailure {
    /// What was attempted
    pub mutation: RoleMutation,
    /// Why it failed
    pub error: PlatformError,
}

/// Everything one reconciliation call needs to know
#[derive(Debug, Clone, Copy)]
pub struct ReconcileContext<'a> {
    /// Chat guild
    pub guild: &'a GuildId,
    /// The member as currently observed
    pub member: &'a Member,
    /// Guild configuration
    pub config: &'a GuildConfig,
    /// Facts about the member
    pub facts: &'a UserFacts,
    /// Roles of the chat guild
    pub roles: &'a GuildRoles,
    /// Role just added to the member, preferred when several are eligible
    pub hint: Option<&'a RoleId>,
    /// Evaluation time for bans
    pub now: DateTime<Utc>,
}

/// Planned role changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolePlan {
    /// A guild lookup failed; nothing may change
    Aborted {
        /// Guilds that could not be resolved
        failed: Vec<GameGuildId>,
    },
    /// Changes to make, possibly none
    Mutations(Vec<RoleMutation>),
}

impl RolePlan {
    /// Planned mutations; empty when aborted
    pub fn mutations(&self) -> &[RoleMutation] {
        match self {
            RolePlan::Aborted { .. } => &[],
            RolePlan::Mutations(mutations) => mutations,
        }
    }
}

/// Outcome of a reconciliation call
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// Mutations the platform accepted
    pub applied: Vec<RoleMutation>,
    /// Mutations the platform rejected
    pub failures: Vec<MutationFailure>,
    /// Guilds that failed to resolve, if the call was aborted
    pub aborted: Option<Vec<GameGuildId>>,
}

impl Reconciliation {
    /// Whether the call was aborted before planning
    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// Number of mutations attempted
    pub fn attempted(&self) -> usize {
        self.applied.len() + self.failures.len()
    }
}

/// Drives members towards the roles their facts call for
pub struct RoleReconciler {
    directory: Arc<GuildDirectory>,
    worlds: Arc<WorldLinks>,
    composer: NickComposer,
}

impl RoleReconciler {
    /// Create a reconciler
    pub fn new(directory: Arc<GuildDirectory>, worlds: Arc<WorldLinks>) -> Self {
        Self {
            directory,
            worlds,
            composer: NickComposer::default(),
        }
    }

    /// Use a different nickname composer
    pub fn with_composer(mut self, composer: NickComposer) -> Self {
        self.composer = composer;
        self
    }

    /// The guild directory in use
    pub fn directory(&self) -> &Arc<GuildDirectory> {
        &self.directory
    }

    /// Plan guild, common and world role changes.
    pub async fn plan(&self, ctx: &ReconcileContext<'_>) -> RolePlan {
        let mut mutations = match guild_roles::plan(&self.directory, ctx).await {
            RolePlan::Mutations(mutations) => mutations,
            aborted => return aborted,
        };

        // World roles are skipped, not guessed, while links are unknown.
        if let Some(world) = world_roles::plan(&self.worlds, ctx) {
            for mutation in world {
                if !mutations.iter().any(|m| m.role() == mutation.role()) {
                    mutations.push(mutation);
                }
            }
        }

        RolePlan::Mutations(mutations)
    }

    /// Plan and apply role changes for one member.
    pub async fn reconcile(
        &self,
        platform: &dyn ChatPlatform,
        ctx: &ReconcileContext<'_>,
    ) -> Reconciliation {
        match self.plan(ctx).await {
            RolePlan::Aborted { failed } => {
                tracing::warn!(
                    guild = %ctx.guild,
                    user = %ctx.member.user_id,
                    failed = ?failed,
                    "guild lookup incomplete, skipping reconciliation"
                );
                Reconciliation {
                    aborted: Some(failed),
                    ..Default::default()
                }
            }
            RolePlan::Mutations(mutations) => {
                apply_mutations(platform, ctx.guild, ctx.member, mutations).await
            }
        }
    }

    /// Nickname the member should have, if it differs from the current one.
    pub fn plan_nickname(&self, ctx: &ReconcileContext<'_>, roles: &[RoleId]) -> Option<String> {
        nickname::plan(&self.composer, &self.directory, ctx, roles)
    }
}

/// Apply mutations one by one, collecting failures.
pub async fn apply_mutations(
    platform: &dyn ChatPlatform,
    guild: &GuildId,
    member: &Member,
    mutations: Vec<RoleMutation>,
) -> Reconciliation {
    let user = &member.user_id;
    let mut outcome = Reconciliation::default();

    for mutation in mutations {
        let result = match &mutation {
            RoleMutation::Add(role) => platform.add_role(guild, user, role).await,
            RoleMutation::Remove(role) => platform.remove_role(guild, user, role).await,
        };
        match result {
            Ok(()) => {
                tracing::info!(%guild, %user, %mutation, "role updated");
                outcome.applied.push(mutation);
            }
            Err(error) => {
                tracing::warn!(%guild, %user, %mutation, %error, "role update failed");
                outcome.failures.push(MutationFailure { mutation, error });
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockPlatform;

    #[test]
    fn test_mutation_apply_to() {
        let mut roles = vec![RoleId::new("1"), RoleId::new("2")];
        RoleMutation::Add(RoleId::new("3")).apply_to(&mut roles);
        RoleMutation::Add(RoleId::new("3")).apply_to(&mut roles);
        RoleMutation::Remove(RoleId::new("1")).apply_to(&mut roles);
        assert_eq!(roles, vec![RoleId::new("2"), RoleId::new("3")]);
    }

    #[test]
    fn test_mutation_display() {
        assert_eq!(RoleMutation::Add(RoleId::new("7")).to_string(), "+7");
        assert_eq!(RoleMutation::Remove(RoleId::new("7")).to_string(), "-7");
    }

    #[tokio::test]
    async fn test_apply_continues_past_failures() {
        let platform = MockPlatform::new();
        let guild = GuildId::new("1");
        let member = Member::new("u1", "user");
        platform.add_member(&guild, member.clone());
        platform.fail_role(&RoleId::new("bad"));

        let outcome = apply_mutations(
            &platform,
            &guild,
            &member,
            vec![
                RoleMutation::Add(RoleId::new("a")),
                RoleMutation::Add(RoleId::new("bad")),
                RoleMutation::Add(RoleId::new("b")),
            ],
        )
        .await;

        assert_eq!(outcome.applied.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].mutation, RoleMutation::Add(RoleId::new("bad")));
        let roles = platform.member_roles(&guild, &member.user_id);
        assert!(roles.contains(&RoleId::new("a")) && roles.contains(&RoleId::new("b")));
    }
}
