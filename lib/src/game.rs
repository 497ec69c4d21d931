//! Game API abstraction.
//!
//! [`GameApi`] is the seam between the reconciliation core and the Guild Wars 2
//! API. The production implementation wraps [`gw2api::Client`].

use crate::error::GameApiResult;
use crate::id::{GameGuildId, WorldId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Guild and matchup lookups
#[async_trait]
pub trait GameApi: Send + Sync {
    /// Fetch a guild by ID
    async fn get_guild(&self, id: &GameGuildId) -> GameApiResult<GuildFact>;

    /// Every currently running regional matchup
    async fn regional_matchups(&self) -> GameApiResult<Vec<Matchup>>;
}

/// Tag and name of an in-game guild
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuildFact {
    /// Guild ID
    pub id: GameGuildId,
    /// Guild tag, up to four characters
    pub tag: String,
    /// Guild name
    pub name: String,
}

impl GuildFact {
    /// Create a guild fact
    pub fn new(id: impl Into<GameGuildId>, tag: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag: tag.into(),
            name: name.into(),
        }
    }

    /// Name of the chat role representing this guild
    pub fn role_name(&self) -> String {
        format!("[{}] {}", self.tag, self.name)
    }
}

impl fmt::Display for GuildFact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.tag, self.name)
    }
}

/// One regional matchup: three sides of linked worlds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matchup {
    /// World groups, one per side
    pub sides: [Vec<WorldId>; 3],
    /// When the matchup ends, if known
    pub end_time: Option<DateTime<Utc>>,
}

impl Matchup {
    /// Create a matchup from its three sides
    pub fn new(sides: [Vec<WorldId>; 3], end_time: Option<DateTime<Utc>>) -> Self {
        Self { sides, end_time }
    }
}

impl From<gw2api::Match> for Matchup {
    fn from(m: gw2api::Match) -> Self {
        let side = |ids: &[u32]| ids.iter().copied().map(WorldId).collect::<Vec<_>>();
        let [red, blue, green] = m.all_worlds.groups();
        Self {
            sides: [side(red), side(blue), side(green)],
            end_time: m.end_time,
        }
    }
}

#[async_trait]
impl GameApi for gw2api::Client {
    async fn get_guild(&self, id: &GameGuildId) -> GameApiResult<GuildFact> {
        let guild = self.guild(id.as_str()).await?;
        Ok(GuildFact::new(guild.id, guild.tag, guild.name))
    }

    async fn regional_matchups(&self) -> GameApiResult<Vec<Matchup>> {
        let matches = self.wvw_matches().await?;
        Ok(matches.into_iter().map(Matchup::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_name() {
        let fact = GuildFact::new("g1", "DW", "Deep Wound");
        assert_eq!(fact.role_name(), "[DW] Deep Wound");
        assert_eq!(fact.to_string(), fact.role_name());
    }

    #[test]
    fn test_matchup_from_api() {
        let api: gw2api::Match = serde_json::from_str(
            r#"{"id": "2-1", "end_time": "2024-01-19T18:00:00Z",
                "all_worlds": {"red": [2202, 2105], "blue": [2009], "green": [2003, 2014]}}"#,
        )
        .unwrap();
        let matchup = Matchup::from(api);
        assert_eq!(matchup.sides[0], vec![WorldId(2202), WorldId(2105)]);
        assert_eq!(matchup.sides[2], vec![WorldId(2003), WorldId(2014)]);
        assert!(matchup.end_time.is_some());
    }
}
