//! Human-readable verification status of a user.

use crate::facts::{Ban, UserFacts};
use crate::guilds::GuildDirectory;
use crate::id::{GameGuildId, WorldId};
use crate::worlds::world_name;
use chrono::{DateTime, Utc};
use std::fmt;

/// Status of one linked account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountStatus {
    /// Account name
    pub name: String,
    /// Home world
    pub world: WorldId,
    /// Display name of the home world
    pub world_name: String,
    /// Whether the backend considers the account expired
    pub expired: bool,
    /// One label per guild, `"[TAG] Name"` or `"<id> - gw2 api error"`
    pub guilds: Vec<String>,
}

/// An unexpired temporary world grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationStatus {
    /// World granted
    pub world: WorldId,
    /// Display name of the world
    pub world_name: String,
    /// Expiry
    pub until: DateTime<Utc>,
}

/// Everything shown to a user asking for their status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Linked accounts in backend order
    pub accounts: Vec<AccountStatus>,
    /// The active ban, if any
    pub ban: Option<Ban>,
    /// Active temporary world grants
    pub associations: Vec<AssociationStatus>,
}

impl StatusReport {
    /// Build a report, resolving guild names through the directory.
    ///
    /// Guilds that fail to resolve are labelled instead of failing the report.
    pub async fn build(directory: &GuildDirectory, facts: &UserFacts, now: DateTime<Utc>) -> Self {
        let mut accounts = Vec::with_capacity(facts.accounts.len());

        for account in &facts.accounts {
            let batch = directory.resolve_many(&account.guilds).await;
            let guilds = account
                .guilds
                .iter()
                .filter(|id| !id.is_empty())
                .map(|id| match batch.guilds.iter().find(|g| &g.id == id) {
                    Some(fact) => fact.role_name(),
                    None => unresolved_label(id),
                })
                .collect();

            accounts.push(AccountStatus {
                name: account.name.clone(),
                world: account.world,
                world_name: world_label(account.world),
                expired: account.expired,
                guilds,
            });
        }

        let associations = facts
            .active_associations(now)
            .map(|assoc| AssociationStatus {
                world: assoc.world,
                world_name: world_label(assoc.world),
                until: assoc.until,
            })
            .collect();

        Self {
            accounts,
            ban: facts.active_ban(now).cloned(),
            associations,
        }
    }

    /// Whether the user has any linked account
    pub fn is_linked(&self) -> bool {
        !self.accounts.is_empty()
    }
}

fn world_label(world: WorldId) -> String {
    world_name(world)
        .map(str::to_string)
        .unwrap_or_else(|| world.to_string())
}

fn unresolved_label(id: &GameGuildId) -> String {
    format!("{id} - gw2 api error")
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_linked() {
            return writeln!(f, "No linked accounts");
        }

        if let Some(ban) = &self.ban {
            writeln!(f, "Banned until {}: {}", ban.until.format("%Y-%m-%d %H:%M UTC"), ban.reason)?;
        }

        for account in &self.accounts {
            write!(f, "{} ({})", account.name, account.world_name)?;
            if account.expired {
                write!(f, " [expired]")?;
            }
            writeln!(f)?;
            for guild in &account.guilds {
                writeln!(f, "  {guild}")?;
            }
        }

        for assoc in &self.associations {
            writeln!(
                f,
                "Temporary access to {} until {}",
                assoc.world_name,
                assoc.until.format("%Y-%m-%d %H:%M UTC")
            )?;
        }

        Ok(())
    }
}
