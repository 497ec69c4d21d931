//! Primary and linked world roles.

use super::{ReconcileContext, RoleMutation};
use crate::error::WorldError;
use crate::id::RoleId;
use crate::worlds::WorldLinks;

/// Plan world role changes.
///
/// Returns `None` when the pass must be skipped because world links are not
/// known yet. A guild without a primary world plans nothing.
pub fn plan(worlds: &WorldLinks, ctx: &ReconcileContext<'_>) -> Option<Vec<RoleMutation>> {
    let config = ctx.config;
    let Some(primary) = config.primary_world else {
        return Some(Vec::new());
    };

    let links = match worlds.links(primary) {
        Ok(links) => links,
        Err(WorldError::NotSynchronized) => {
            tracing::debug!(guild = %ctx.guild, "world links not synchronized, skipping world roles");
            return None;
        }
        Err(e) => {
            tracing::warn!(guild = %ctx.guild, error = %e, "world links unavailable");
            return None;
        }
    };

    let banned = ctx.facts.active_ban(ctx.now).is_some();
    let accounts = &ctx.facts.accounts;
    let mut should_primary = !banned && accounts.iter().any(|acc| acc.world == primary);
    let mut should_linked = !banned && accounts.iter().any(|acc| links.contains(&acc.world));

    // One role configured for both means either membership earns it.
    if config.primary_role.is_some() && config.primary_role == config.linked_role {
        should_primary |= should_linked;
        should_linked = should_primary;
    }

    let mut mutations = Vec::new();
    toggle(&mut mutations, ctx, config.primary_role.as_ref(), should_primary);
    if config.linked_role != config.primary_role {
        toggle(&mut mutations, ctx, config.linked_role.as_ref(), should_linked);
    }

    if !should_primary && !should_linked {
        for role in &config.associated_roles {
            let world_role = Some(role) == config.primary_role.as_ref()
                || Some(role) == config.linked_role.as_ref();
            if !world_role && ctx.member.has_role(role) {
                mutations.push(RoleMutation::Remove(role.clone()));
            }
        }
    }

    Some(mutations)
}

fn toggle(
    mutations: &mut Vec<RoleMutation>,
    ctx: &ReconcileContext<'_>,
    role: Option<&RoleId>,
    should_have: bool,
) {
    let Some(role) = role else {
        return;
    };
    let has = ctx.member.has_role(role);
    if should_have && !has {
        mutations.push(RoleMutation::Add(role.clone()));
    } else if !should_have && has {
        mutations.push(RoleMutation::Remove(role.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::{Account, Ban, UserFacts};
    use crate::game::Matchup;
    use crate::id::{AccountId, GuildId, WorldId};
    use crate::platform::{GuildRoles, Member};
    use crate::settings::GuildConfig;
    use crate::testing::MockGameApi;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn account(world: u32) -> Account {
        Account {
            id: AccountId::new("a"),
            name: "Name.1234".to_string(),
            world: WorldId(world),
            guilds: Vec::new(),
            api_keys: Vec::new(),
            expired: false,
        }
    }

    fn config() -> GuildConfig {
        GuildConfig {
            primary_world: Some(WorldId(2003)),
            primary_role: Some(RoleId::new("100")),
            linked_role: Some(RoleId::new("101")),
            associated_roles: vec![RoleId::new("102")],
            ..Default::default()
        }
    }

    async fn synced_links() -> WorldLinks {
        let api = Arc::new(MockGameApi::new());
        api.set_matchups(vec![Matchup::new(
            [
                vec![WorldId(2003), WorldId(2105)],
                vec![WorldId(2009)],
                vec![WorldId(2202)],
            ],
            None,
        )]);
        let links = WorldLinks::new(api).with_known_worlds([
            WorldId(2003),
            WorldId(2105),
            WorldId(2009),
            WorldId(2202),
        ]);
        links.sync_once().await.unwrap();
        links
    }

    fn run(
        worlds: &WorldLinks,
        config: &GuildConfig,
        member: &Member,
        facts: &UserFacts,
    ) -> Option<Vec<RoleMutation>> {
        let guild = GuildId::new("g");
        let roles = GuildRoles::default();
        let ctx = ReconcileContext {
            guild: &guild,
            member,
            config,
            facts,
            roles: &roles,
            hint: None,
            now: Utc::now(),
        };
        plan(worlds, &ctx)
    }

    #[tokio::test]
    async fn test_skipped_until_synchronized() {
        let worlds = WorldLinks::new(Arc::new(MockGameApi::new()));
        let facts = UserFacts {
            accounts: vec![account(2003)],
            ..Default::default()
        };
        assert!(run(&worlds, &config(), &Member::new("u", "user"), &facts).is_none());
    }

    #[tokio::test]
    async fn test_primary_and_linked_roles() {
        let worlds = synced_links().await;
        let member = Member::new("u", "user");

        let facts = UserFacts {
            accounts: vec![account(2003)],
            ..Default::default()
        };
        let mutations = run(&worlds, &config(), &member, &facts).unwrap();
        assert_eq!(mutations, vec![RoleMutation::Add(RoleId::new("100"))]);

        let facts = UserFacts {
            accounts: vec![account(2105)],
            ..Default::default()
        };
        let mutations = run(&worlds, &config(), &member, &facts).unwrap();
        assert_eq!(mutations, vec![RoleMutation::Add(RoleId::new("101"))]);
    }

    #[tokio::test]
    async fn test_unaffiliated_member_loses_world_and_associated_roles() {
        let worlds = synced_links().await;
        let member = Member::new("u", "user").with_roles(["100", "102", "7"]);
        let facts = UserFacts {
            accounts: vec![account(2009)],
            ..Default::default()
        };
        let mutations = run(&worlds, &config(), &member, &facts).unwrap();
        assert_eq!(
            mutations,
            vec![
                RoleMutation::Remove(RoleId::new("100")),
                RoleMutation::Remove(RoleId::new("102")),
            ]
        );
    }

    #[tokio::test]
    async fn test_active_ban_revokes_world_roles() {
        let worlds = synced_links().await;
        let member = Member::new("u", "user").with_roles(["100"]);
        let facts = UserFacts {
            accounts: vec![account(2003)],
            bans: vec![Ban {
                until: Utc::now() + Duration::days(1),
                reason: String::new(),
            }],
            ..Default::default()
        };
        let mutations = run(&worlds, &config(), &member, &facts).unwrap();
        assert_eq!(mutations, vec![RoleMutation::Remove(RoleId::new("100"))]);
    }

    #[tokio::test]
    async fn test_disabled_primary_world_plans_nothing() {
        let worlds = WorldLinks::new(Arc::new(MockGameApi::new()));
        let config = GuildConfig {
            primary_world: None,
            ..config()
        };
        let member = Member::new("u", "user").with_roles(["100"]);
        let mutations = run(&worlds, &config, &member, &UserFacts::default()).unwrap();
        assert!(mutations.is_empty());
    }

    #[tokio::test]
    async fn test_shared_role_for_primary_and_linked() {
        let worlds = synced_links().await;
        let config = GuildConfig {
            linked_role: Some(RoleId::new("100")),
            ..config()
        };
        let member = Member::new("u", "user");
        let facts = UserFacts {
            accounts: vec![account(2105)],
            ..Default::default()
        };
        let mutations = run(&worlds, &config, &member, &facts).unwrap();
        assert_eq!(mutations, vec![RoleMutation::Add(RoleId::new("100"))]);
    }
}
