//! Per-guild settings.
//!
//! Settings are stored by the backend as service properties keyed by subject
//! (the chat guild ID). [`ServiceSettings`] keeps an in-memory snapshot that is
//! replaced wholesale on every [`ServiceSettings::synchronize`], so readers
//! never block on the network.

use crate::error::{FactResult, SettingsError, SettingsResult};
use crate::id::{GuildId, RoleId, WorldId};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Recognized setting keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    /// World whose members get the primary role
    PrimaryWorld,
    /// Role for members of the primary world
    PrimaryWorldRole,
    /// Role for members of worlds linked to the primary world
    LinkedWorldRole,
    /// Extra roles stripped from members of neither
    AssociatedRoles,
    /// Append the account name to nicknames
    AccountNameRep,
    /// Prefix nicknames with the represented guild tag
    GuildTagRep,
    /// Always give eligible members a guild role
    EnforceGuildRep,
    /// Common role for verified guild members
    CommonGuildRole,
    /// Guild roles that count towards the common role
    GuildVerifyRoles,
    /// API key permissions required for the common role
    RequiredPermissions,
}

impl SettingKey {
    /// Every recognized key
    pub const ALL: [SettingKey; 10] = [
        SettingKey::PrimaryWorld,
        SettingKey::PrimaryWorldRole,
        SettingKey::LinkedWorldRole,
        SettingKey::AssociatedRoles,
        SettingKey::AccountNameRep,
        SettingKey::GuildTagRep,
        SettingKey::EnforceGuildRep,
        SettingKey::CommonGuildRole,
        SettingKey::GuildVerifyRoles,
        SettingKey::RequiredPermissions,
    ];

    /// Property name used by the backend
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::PrimaryWorld => "wvw_world",
            SettingKey::PrimaryWorldRole => "wvw_primary_role",
            SettingKey::LinkedWorldRole => "wvw_linked_role",
            SettingKey::AssociatedRoles => "wvw_associated_roles",
            SettingKey::AccountNameRep => "acc_rep_nick",
            SettingKey::GuildTagRep => "guild_tag_rep_nick",
            SettingKey::EnforceGuildRep => "enforce_guild_rep",
            SettingKey::CommonGuildRole => "verification_role",
            SettingKey::GuildVerifyRoles => "guild_verify_roles",
            SettingKey::RequiredPermissions => "guild_required_permissions",
        }
    }

    /// Look a key up by its property name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key/value settings per chat guild
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Stored value, empty if unset
    fn get(&self, guild: &GuildId, key: SettingKey) -> String;

    /// Comma-separated value split into its non-empty entries
    fn get_list(&self, guild: &GuildId, key: SettingKey) -> Vec<String> {
        split_list(&self.get(guild, key))
    }

    /// Persist a value
    async fn set(&self, guild: &GuildId, key: SettingKey, value: &str) -> SettingsResult<()>;
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// One persisted property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProperty {
    /// Subject the property belongs to (a chat guild ID)
    pub subject: String,
    /// Property name
    pub name: String,
    /// Property value
    pub value: String,
}

/// Where service properties are persisted
#[async_trait]
pub trait PropertySource: Send + Sync {
    /// Every property of the service
    async fn properties(&self) -> FactResult<Vec<ServiceProperty>>;

    /// Create or replace one property
    async fn put_property(&self, subject: &str, name: &str, value: &str) -> FactResult<()>;
}

type PropertyMap = HashMap<String, HashMap<String, String>>;

/// Settings store backed by service properties
pub struct ServiceSettings {
    source: Arc<dyn PropertySource>,
    properties: RwLock<PropertyMap>,
}

impl ServiceSettings {
    /// Create an empty store; call [`Self::synchronize`] to load it
    pub fn new(source: Arc<dyn PropertySource>) -> Self {
        Self {
            source,
            properties: RwLock::new(HashMap::new()),
        }
    }

    /// Reload every property from the source.
    ///
    /// Returns the number of properties loaded. On error the previous
    /// snapshot stays in place.
    pub async fn synchronize(&self) -> SettingsResult<usize> {
        let properties = self.source.properties().await.map_err(|e| SettingsError::Store {
            reason: e.to_string(),
        })?;
        let count = properties.len();

        let mut map: PropertyMap = HashMap::new();
        for prop in properties {
            map.entry(prop.subject).or_default().insert(prop.name, prop.value);
        }
        *self.properties.write() = map;

        tracing::debug!(count, "synchronized service properties");
        Ok(count)
    }
}

#[async_trait]
impl SettingsStore for ServiceSettings {
    fn get(&self, guild: &GuildId, key: SettingKey) -> String {
        self.properties
            .read()
            .get(guild.as_str())
            .and_then(|props| props.get(key.as_str()))
            .cloned()
            .unwrap_or_default()
    }

    async fn set(&self, guild: &GuildId, key: SettingKey, value: &str) -> SettingsResult<()> {
        self.source
            .put_property(guild.as_str(), key.as_str(), value)
            .await
            .map_err(|e| SettingsError::Store {
                reason: e.to_string(),
            })?;

        self.properties
            .write()
            .entry(guild.to_string())
            .or_default()
            .insert(key.as_str().to_string(), value.to_string());
        Ok(())
    }
}

/// Typed configuration of one chat guild, read once per reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuildConfig {
    /// World whose members get the primary role; `None` disables world roles
    pub primary_world: Option<WorldId>,
    /// Role for primary world members
    pub primary_role: Option<RoleId>,
    /// Role for linked world members
    pub linked_role: Option<RoleId>,
    /// Roles stripped from members of neither world
    pub associated_roles: Vec<RoleId>,
    /// Append the account name to nicknames
    pub account_name_rep: bool,
    /// Prefix nicknames with the guild tag
    pub guild_tag_rep: bool,
    /// Give eligible members a guild role even if they hold none
    pub enforce_guild_rep: bool,
    /// Common verification role
    pub common_role: Option<RoleId>,
    /// Guild roles that qualify for the common role; empty means all
    pub verify_roles: Vec<RoleId>,
    /// API key permissions required for the common role
    pub required_permissions: Vec<String>,
}

impl GuildConfig {
    /// Read the configuration of a guild from a store
    pub fn load(store: &dyn SettingsStore, guild: &GuildId) -> Self {
        let role = |key| {
            let value = store.get(guild, key);
            let value = value.trim();
            (!value.is_empty()).then(|| RoleId::new(value))
        };
        let roles = |key| {
            store
                .get_list(guild, key)
                .into_iter()
                .map(RoleId::new)
                .collect::<Vec<_>>()
        };
        let flag = |key| store.get(guild, key) == "true";

        Self {
            primary_world: parse_world(guild, &store.get(guild, SettingKey::PrimaryWorld)),
            primary_role: role(SettingKey::PrimaryWorldRole),
            linked_role: role(SettingKey::LinkedWorldRole),
            associated_roles: roles(SettingKey::AssociatedRoles),
            account_name_rep: flag(SettingKey::AccountNameRep),
            guild_tag_rep: flag(SettingKey::GuildTagRep),
            enforce_guild_rep: flag(SettingKey::EnforceGuildRep),
            common_role: role(SettingKey::CommonGuildRole),
            verify_roles: roles(SettingKey::GuildVerifyRoles),
            required_permissions: store.get_list(guild, SettingKey::RequiredPermissions),
        }
    }

    /// Whether a guild role counts towards the common role
    pub fn is_verify_role(&self, role: &RoleId) -> bool {
        self.verify_roles.is_empty() || self.verify_roles.contains(role)
    }

    /// Whether any nickname feature is enabled
    pub fn manages_nickname(&self) -> bool {
        self.account_name_rep || self.guild_tag_rep
    }
}

fn parse_world(guild: &GuildId, value: &str) -> Option<WorldId> {
    let value = value.trim();
    if value.is_empty() || value == "disabled" {
        return None;
    }
    match value.parse() {
        Ok(world) => Some(world),
        Err(e) => {
            tracing::warn!(%guild, value, error = %e, "invalid primary world setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySettings;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeSource {
        props: Mutex<Vec<ServiceProperty>>,
        puts: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl PropertySource for FakeSource {
        async fn properties(&self) -> FactResult<Vec<ServiceProperty>> {
            Ok(self.props.lock().clone())
        }

        async fn put_property(&self, subject: &str, name: &str, value: &str) -> FactResult<()> {
            self.puts
                .lock()
                .push((subject.to_string(), name.to_string(), value.to_string()));
            Ok(())
        }
    }

    fn prop(subject: &str, name: &str, value: &str) -> ServiceProperty {
        ServiceProperty {
            subject: subject.to_string(),
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_key_names_round_trip() {
        for key in SettingKey::ALL {
            assert_eq!(SettingKey::from_name(key.as_str()), Some(key));
        }
        assert_eq!(SettingKey::from_name("unknown"), None);
    }

    #[tokio::test]
    async fn test_synchronize_replaces_snapshot() {
        let source = Arc::new(FakeSource::default());
        *source.props.lock() = vec![prop("1", "wvw_world", "2003"), prop("2", "acc_rep_nick", "true")];
        let settings = ServiceSettings::new(source.clone());
        let guild = GuildId::new("1");

        assert_eq!(settings.get(&guild, SettingKey::PrimaryWorld), "");
        assert_eq!(settings.synchronize().await.unwrap(), 2);
        assert_eq!(settings.get(&guild, SettingKey::PrimaryWorld), "2003");

        *source.props.lock() = vec![prop("2", "acc_rep_nick", "false")];
        settings.synchronize().await.unwrap();
        assert_eq!(settings.get(&guild, SettingKey::PrimaryWorld), "");
    }

    #[tokio::test]
    async fn test_set_writes_through() {
        let source = Arc::new(FakeSource::default());
        let settings = ServiceSettings::new(source.clone());
        let guild = GuildId::new("9");

        settings
            .set(&guild, SettingKey::GuildVerifyRoles, "10, 11,,12")
            .await
            .unwrap();

        assert_eq!(source.puts.lock().len(), 1);
        assert_eq!(
            settings.get_list(&guild, SettingKey::GuildVerifyRoles),
            vec!["10", "11", "12"]
        );
    }

    #[test]
    fn test_guild_config_load() {
        let guild = GuildId::new("1");
        let store = MemorySettings::new()
            .with(&guild, SettingKey::PrimaryWorld, "2003")
            .with(&guild, SettingKey::PrimaryWorldRole, "100")
            .with(&guild, SettingKey::AssociatedRoles, "300,301")
            .with(&guild, SettingKey::GuildTagRep, "true")
            .with(&guild, SettingKey::AccountNameRep, "yes")
            .with(&guild, SettingKey::RequiredPermissions, "account,guilds");

        let config = GuildConfig::load(&store, &guild);
        assert_eq!(config.primary_world, Some(WorldId(2003)));
        assert_eq!(config.primary_role, Some(RoleId::new("100")));
        assert_eq!(config.linked_role, None);
        assert_eq!(config.associated_roles.len(), 2);
        assert!(config.guild_tag_rep);
        assert!(!config.account_name_rep);
        assert_eq!(config.required_permissions, vec!["account", "guilds"]);
        assert!(config.is_verify_role(&RoleId::new("anything")));
    }

    #[test]
    fn test_disabled_or_invalid_world() {
        let guild = GuildId::new("1");
        for value in ["disabled", "", "two thousand"] {
            let store = MemorySettings::new().with(&guild, SettingKey::PrimaryWorld, value);
            assert_eq!(GuildConfig::load(&store, &guild).primary_world, None);
        }
    }
}
