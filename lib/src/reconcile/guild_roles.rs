//! Guild affiliation roles and the common verification role.
//!
//! A member may hold at most one guild role, and only one backed by a guild
//! one of their accounts is in. Ties are broken by the hint, then by the
//! lowest role ID.

use super::{ReconcileContext, RoleMutation, RolePlan};
use crate::guilds::{GuildDirectory, is_guild_role_name};
use crate::id::{GameGuildId, RoleId};
use std::collections::BTreeSet;

/// Guild roles the member's accounts entitle them to.
///
/// Returns `Err` with the unresolved guild IDs when any lookup failed.
pub async fn eligible_roles(
    directory: &GuildDirectory,
    ctx: &ReconcileContext<'_>,
) -> Result<BTreeSet<RoleId>, Vec<GameGuildId>> {
    let mut eligible = BTreeSet::new();

    for account in &ctx.facts.accounts {
        let batch = directory.resolve_many(&account.guilds).await;
        if batch.is_partial() {
            return Err(batch.failed);
        }
        for guild in &batch.guilds {
            let Some(role) = ctx.roles.find_by_name(&guild.role_name()) else {
                continue;
            };
            if is_guild_role_name(&role.name) {
                eligible.insert(role.id.clone());
            }
        }
    }

    Ok(eligible)
}

/// Plan guild role and common role changes.
pub async fn plan(directory: &GuildDirectory, ctx: &ReconcileContext<'_>) -> RolePlan {
    let eligible = match eligible_roles(directory, ctx).await {
        Ok(eligible) => eligible,
        Err(failed) => return RolePlan::Aborted { failed },
    };
    RolePlan::Mutations(plan_with_eligible(ctx, &eligible))
}

/// The deterministic part of [`plan`], once eligibility is known.
pub fn plan_with_eligible(ctx: &ReconcileContext<'_>, eligible: &BTreeSet<RoleId>) -> Vec<RoleMutation> {
    let config = ctx.config;
    let common = config.common_role.as_ref();
    let favored = eligible.first();

    let held: BTreeSet<&RoleId> = ctx
        .member
        .roles
        .iter()
        .filter(|role| Some(*role) != common && ctx.roles.is_guild_role(role))
        .collect();

    let mut mutations = Vec::new();

    for role in held.iter().filter(|role| !eligible.contains(**role)) {
        mutations.push(RoleMutation::Remove(RoleId::clone(role)));
    }

    let mut kept: Vec<&RoleId> = held
        .iter()
        .copied()
        .filter(|role| eligible.contains(*role))
        .collect();

    // An eligible hint competes as if already held.
    let pending = ctx
        .hint
        .filter(|hint| eligible.contains(*hint) && !held.contains(hint));
    kept.extend(pending);

    let represented = match kept.as_slice() {
        [] => match favored {
            Some(favored) if config.enforce_guild_rep => {
                mutations.push(RoleMutation::Add(favored.clone()));
                Some(favored)
            }
            _ => None,
        },
        [only] => Some(*only),
        several => {
            let keep = ctx
                .hint
                .filter(|hint| several.contains(hint))
                .or_else(|| favored.filter(|f| several.contains(f)))
                .unwrap_or(several[0]);
            for role in several.iter().filter(|role| **role != keep) {
                mutations.push(RoleMutation::Remove(RoleId::clone(role)));
            }
            Some(keep)
        }
    };

    if let Some(pending) = pending.filter(|pending| represented == Some(*pending)) {
        mutations.push(RoleMutation::Add(pending.clone()));
    }

    if let Some(common) = common {
        let verified = represented.is_some_and(|role| config.is_verify_role(role))
            && ctx.facts.any_account_covers(&config.required_permissions);
        let has_common = ctx.member.has_role(common);
        if verified && !has_common {
            mutations.push(RoleMutation::Add(common.clone()));
        } else if !verified && has_common {
            mutations.push(RoleMutation::Remove(common.clone()));
        }
    }

    mutations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::UserFacts;
    use crate::id::GuildId;
    use crate::platform::{GuildRoles, Member, Role};
    use crate::settings::GuildConfig;
    use chrono::Utc;

    fn roles() -> GuildRoles {
        GuildRoles::new([
            Role::new("10", "[A] Alpha"),
            Role::new("11", "[B] Beta"),
            Role::new("12", "[C] Gamma"),
            Role::new("50", "Verified"),
            Role::new("60", "Member"),
        ])
    }

    fn ids(ids: &[&str]) -> BTreeSet<RoleId> {
        ids.iter().map(|id| RoleId::new(*id)).collect()
    }

    fn run(
        member: &Member,
        config: &GuildConfig,
        hint: Option<&RoleId>,
        eligible: &[&str],
    ) -> Vec<RoleMutation> {
        let guild = GuildId::new("g");
        let facts = UserFacts::default();
        let roles = roles();
        let ctx = ReconcileContext {
            guild: &guild,
            member,
            config,
            facts: &facts,
            roles: &roles,
            hint,
            now: Utc::now(),
        };
        plan_with_eligible(&ctx, &ids(eligible))
    }

    fn add(id: &str) -> RoleMutation {
        RoleMutation::Add(RoleId::new(id))
    }

    fn remove(id: &str) -> RoleMutation {
        RoleMutation::Remove(RoleId::new(id))
    }

    #[test]
    fn test_removes_ineligible_guild_roles_only() {
        let member = Member::new("u", "user").with_roles(["10", "11", "60"]);
        let mutations = run(&member, &GuildConfig::default(), None, &["10"]);
        assert_eq!(mutations, vec![remove("11")]);
    }

    #[test]
    fn test_keeps_hint_among_several() {
        let member = Member::new("u", "user").with_roles(["10", "11", "12"]);
        let hint = RoleId::new("12");
        let mutations = run(&member, &GuildConfig::default(), Some(&hint), &["10", "11", "12"]);
        assert_eq!(mutations, vec![remove("10"), remove("11")]);
    }

    #[test]
    fn test_keeps_lowest_without_hint() {
        let member = Member::new("u", "user").with_roles(["12", "11"]);
        let mutations = run(&member, &GuildConfig::default(), None, &["11", "12"]);
        assert_eq!(mutations, vec![remove("12")]);
    }

    #[test]
    fn test_ineligible_hint_is_ignored() {
        let member = Member::new("u", "user").with_roles(["10", "11"]);
        let hint = RoleId::new("60");
        let mutations = run(&member, &GuildConfig::default(), Some(&hint), &["10", "11"]);
        assert_eq!(mutations, vec![remove("11")]);
    }

    #[test]
    fn test_eligible_hint_not_yet_held_wins() {
        let member = Member::new("u", "user").with_roles(["10", "60"]);
        let hint = RoleId::new("12");
        let mutations = run(&member, &GuildConfig::default(), Some(&hint), &["10", "12"]);
        assert_eq!(mutations, vec![remove("10"), add("12")]);

        let member = Member::new("u", "user");
        let mutations = run(&member, &GuildConfig::default(), Some(&hint), &["10", "12"]);
        assert_eq!(mutations, vec![add("12")]);
    }

    #[test]
    fn test_enforcement_adds_favored() {
        let member = Member::new("u", "user");
        let config = GuildConfig {
            enforce_guild_rep: true,
            ..Default::default()
        };
        assert_eq!(run(&member, &config, None, &["12", "11"]), vec![add("11")]);
        assert!(run(&member, &GuildConfig::default(), None, &["11"]).is_empty());
    }

    #[test]
    fn test_common_role_follows_representation() {
        let config = GuildConfig {
            common_role: Some(RoleId::new("50")),
            ..Default::default()
        };
        let member = Member::new("u", "user").with_roles(["10"]);
        assert_eq!(run(&member, &config, None, &["10"]), vec![add("50")]);

        let member = Member::new("u", "user").with_roles(["50"]);
        assert_eq!(run(&member, &config, None, &["10"]), vec![remove("50")]);
    }

    #[test]
    fn test_common_role_respects_verify_list() {
        let config = GuildConfig {
            common_role: Some(RoleId::new("50")),
            verify_roles: vec![RoleId::new("11")],
            ..Default::default()
        };
        let member = Member::new("u", "user").with_roles(["10", "50"]);
        assert_eq!(run(&member, &config, None, &["10"]), vec![remove("50")]);
    }

    #[test]
    fn test_common_role_requires_permissions() {
        let config = GuildConfig {
            common_role: Some(RoleId::new("50")),
            required_permissions: vec!["guilds".to_string()],
            ..Default::default()
        };
        // No accounts, so nobody covers the requirement.
        let member = Member::new("u", "user").with_roles(["10"]);
        assert!(run(&member, &config, None, &["10"]).is_empty());
    }
}
