//! Nickname representation: guild tag prefix and account name suffix.

use super::ReconcileContext;
use crate::facts::UserFacts;
use crate::guilds::{GuildDirectory, guild_role_parts};
use crate::id::{GameGuildId, RoleId};
use crate::nick::{NickComposer, NickParts, has_account_suffix};

/// Nickname the member should have given the roles they hold after this pass.
///
/// Returns `None` when nothing needs to change or no nickname feature is
/// enabled for the guild.
pub fn plan(
    composer: &NickComposer,
    directory: &GuildDirectory,
    ctx: &ReconcileContext<'_>,
    roles: &[RoleId],
) -> Option<String> {
    let config = ctx.config;
    if !config.manages_nickname() {
        return None;
    }

    let current = ctx.member.display_name();
    let parsed = NickParts::parse(current);

    // Guild roles held, lowest ID first, as (tag, guild name).
    let mut held: Vec<(&RoleId, &str, &str)> = roles
        .iter()
        .filter(|role| Some(*role) != config.common_role.as_ref())
        .filter_map(|role| {
            let name = &ctx.roles.get(role)?.name;
            let (tag, guild) = guild_role_parts(name)?;
            Some((role, tag, guild))
        })
        .collect();
    held.sort_by(|a, b| a.0.cmp(b.0));

    let tag = if config.guild_tag_rep {
        let tags: Vec<&str> = held
            .iter()
            .map(|(_, tag, _)| *tag)
            .filter(|tag| !tag.is_empty())
            .collect();
        match parsed.tag {
            Some(existing) if tags.contains(&existing) => Some(existing),
            _ => tags.first().copied(),
        }
    } else {
        parsed.tag
    };

    let account = if config.account_name_rep {
        let names = ctx.facts.accounts.iter().map(|acc| acc.name.as_str());
        if has_account_suffix(current, names) {
            parsed.account
        } else {
            let represented = held
                .first()
                .and_then(|(_, _, guild)| directory.by_name(guild))
                .map(|fact| fact.id);
            choose_account(ctx.facts, represented.as_ref()).or(parsed.account)
        }
    } else {
        parsed.account
    };

    let desired = composer.compose(&NickParts {
        marker: parsed.marker,
        tag,
        base: parsed.base,
        account,
    });

    (desired != current).then_some(desired)
}

/// Account whose name goes into the nickname: the first live account in the
/// represented guild, else the first live account.
pub fn choose_account<'a>(
    facts: &'a UserFacts,
    represented: Option<&GameGuildId>,
) -> Option<&'a str> {
    let in_represented =
        represented.and_then(|guild| facts.live_accounts().find(|acc| acc.in_guild(guild)));
    in_represented
        .or_else(|| facts.live_accounts().next())
        .map(|acc| acc.name.as_str())
}
