//! Process configuration read from the environment.

use alliance::id::UserId;
use std::time::Duration;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or empty
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    /// A variable could not be parsed
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Everything the process needs to start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    /// Discord bot token
    pub discord_token: String,
    /// Base URL of the verification backend
    pub backend_url: String,
    /// Bearer token for the backend
    pub backend_token: String,
    /// Service registration in the backend
    pub service_uuid: String,
    /// Only act on this user when set
    pub debug_user: Option<UserId>,
    /// Members per sweep page
    pub sweep_page_size: usize,
    /// Pause between sweep pages
    pub sweep_page_pause: Duration,
    /// Override of the Guild Wars 2 API base URL
    pub gw2_api_url: Option<String>,
}

impl BotConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through a variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let required = |name: &'static str| optional(name).ok_or(ConfigError::Missing(name));

        Ok(Self {
            discord_token: required("DISCORD_TOKEN")?,
            backend_url: required("BACKEND_URL")?,
            backend_token: required("BACKEND_TOKEN")?,
            service_uuid: required("SERVICE_UUID")?,
            debug_user: optional("DEBUG_USER").map(UserId::from),
            sweep_page_size: parse_or("SWEEP_PAGE_SIZE", optional("SWEEP_PAGE_SIZE"), 25)?,
            sweep_page_pause: Duration::from_secs(parse_or(
                "SWEEP_PAGE_PAUSE_SECS",
                optional("SWEEP_PAGE_PAUSE_SECS"),
                5,
            )?),
            gw2_api_url: optional("GW2_API_URL"),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 4] = [
        ("DISCORD_TOKEN", "token"),
        ("BACKEND_URL", "https://backend.example"),
        ("BACKEND_TOKEN", "secret"),
        ("SERVICE_UUID", "0000-1111"),
    ];

    #[test]
    fn test_defaults() {
        let config = BotConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.discord_token, "token");
        assert_eq!(config.debug_user, None);
        assert_eq!(config.sweep_page_size, 25);
        assert_eq!(config.sweep_page_pause, Duration::from_secs(5));
        assert_eq!(config.gw2_api_url, None);
    }

    #[test]
    fn test_optional_values() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("DEBUG_USER", "1234"),
            ("SWEEP_PAGE_SIZE", "100"),
            ("SWEEP_PAGE_PAUSE_SECS", "0"),
            ("GW2_API_URL", ""),
        ]);
        let config = BotConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.debug_user, Some(UserId::new("1234")));
        assert_eq!(config.sweep_page_size, 100);
        assert_eq!(config.sweep_page_pause, Duration::ZERO);
        assert_eq!(config.gw2_api_url, None);
    }

    #[test]
    fn test_missing_and_invalid() {
        let err = BotConfig::from_lookup(lookup(&REQUIRED[..3])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SERVICE_UUID")));

        let mut vars = REQUIRED.to_vec();
        vars.push(("SWEEP_PAGE_SIZE", "lots"));
        let err = BotConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert_eq!(err.to_string(), "invalid value for SWEEP_PAGE_SIZE: \"lots\"");
    }
}
