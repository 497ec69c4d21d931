//! Guild Directory: cached game guild facts.
//!
//! Guild tags and names are assumed stable for the process lifetime, so cache
//! entries never expire. A failed fetch caches nothing; the next lookup of the
//! same ID retries.
//!
//! Chat roles encode guild affiliation by name: `"[TAG] Name"` where the tag is
//! zero to four non-space characters followed by exactly one space. Roles named
//! any other way are not guild roles.

use crate::error::{GameApiError, GameApiResult};
use crate::game::{GameApi, GuildFact};
use crate::id::GameGuildId;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Back-off after the game API reports a rate limit.
pub const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(5);

static GUILD_ROLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[(\S{0,4})\] ([\S ]*)").expect("guild role pattern"));

/// Whether a role name follows the guild role pattern.
pub fn is_guild_role_name(name: &str) -> bool {
    GUILD_ROLE.is_match(name)
}

/// Split a guild role name into tag and guild name.
pub fn guild_role_parts(name: &str) -> Option<(&str, &str)> {
    let caps = GUILD_ROLE.captures(name)?;
    let tag = caps.get(1).map_or("", |m| m.as_str());
    let guild = caps.get(2).map_or("", |m| m.as_str());
    Some((tag, guild))
}

/// Result of resolving several guilds at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuildBatch {
    /// Guilds that resolved
    pub guilds: Vec<GuildFact>,
    /// IDs that could not be resolved
    pub failed: Vec<GameGuildId>,
}

impl GuildBatch {
    /// Whether any lookup failed. A partial batch must not drive role removal.
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Cache of guild facts in front of the game API
pub struct GuildDirectory {
    api: Arc<dyn GameApi>,
    cache: RwLock<HashMap<GameGuildId, GuildFact>>,
    rate_limit_backoff: Duration,
}

impl GuildDirectory {
    /// Create an empty directory
    pub fn new(api: Arc<dyn GameApi>) -> Self {
        Self {
            api,
            cache: RwLock::new(HashMap::new()),
            rate_limit_backoff: DEFAULT_RATE_LIMIT_BACKOFF,
        }
    }

    /// Set the pause taken after a rate-limited fetch
    pub fn with_rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }

    /// Resolve one guild, fetching it on a miss.
    pub async fn resolve(&self, id: &GameGuildId) -> GameApiResult<GuildFact> {
        if let Some(fact) = self.cached(id) {
            return Ok(fact);
        }

        match self.api.get_guild(id).await {
            Ok(fact) => {
                self.cache.write().insert(id.clone(), fact.clone());
                Ok(fact)
            }
            Err(GameApiError::RateLimited) => {
                tracing::warn!(guild = %id, backoff = ?self.rate_limit_backoff, "guild lookup rate limited");
                tokio::time::sleep(self.rate_limit_backoff).await;
                Err(GameApiError::RateLimited)
            }
            Err(e) => {
                tracing::warn!(guild = %id, error = %e, "guild lookup failed");
                Err(e)
            }
        }
    }

    /// Resolve every non-empty ID, collecting failures instead of stopping.
    pub async fn resolve_many(&self, ids: &[GameGuildId]) -> GuildBatch {
        let mut batch = GuildBatch::default();
        for id in ids.iter().filter(|id| !id.is_empty()) {
            match self.resolve(id).await {
                Ok(fact) => batch.guilds.push(fact),
                Err(_) => batch.failed.push(id.clone()),
            }
        }
        batch
    }

    /// Cached fact for an ID, never fetching
    pub fn cached(&self, id: &GameGuildId) -> Option<GuildFact> {
        self.cache.read().get(id).cloned()
    }

    /// Cached guild with exactly this name, never fetching
    pub fn by_name(&self, name: &str) -> Option<GuildFact> {
        self.cache
            .read()
            .values()
            .find(|fact| fact.name == name)
            .cloned()
    }

    /// Number of cached guilds
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// Whether nothing is cached yet
    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}
