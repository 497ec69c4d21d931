//! Error types for the alliance service.
//!
//! Uses thiserror for ergonomic error definition. Each external collaborator
//! gets its own enum; none of them is fatal to the process. Callers log and
//! defer to the next reconciliation pass.

use crate::id::GameGuildId;
use std::time::Duration;

/// Main error type for the alliance service
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Fact provider (backend) error
    #[error("Fact error: {0}")]
    Fact(#[from] FactError),

    /// Chat platform error
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Game API error
    #[error("Game API error: {0}")]
    GameApi(#[from] GameApiError),

    /// Settings store error
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// World link error
    #[error("World error: {0}")]
    World(#[from] WorldError),

    /// None of the user's accounts is in the game guild
    #[error("Not eligible to represent guild {guild}")]
    NotEligible {
        /// The guild asked for
        guild: GameGuildId,
    },

    /// The chat guild has no role with the expected name
    #[error("No role named {name}")]
    RoleNotFound {
        /// Expected role name
        name: String,
    },

    /// The user is not a member of the chat guild
    #[error("Not a member of this server")]
    NotMember,
}

/// Errors from the fact provider
#[derive(Debug, thiserror::Error)]
pub enum FactError {
    /// The platform user has no linked data
    #[error("User not found")]
    NotFound,

    /// The backend failed to serve the request
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status
        status: u16,
        /// Response body
        message: String,
    },

    /// Network/connection error
    #[error("Network error: {0}")]
    Network(String),

    /// Response parsing error
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Errors from the chat platform
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// API error from the platform
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status
        status: u16,
        /// Response body
        message: String,
    },

    /// Network/connection error
    #[error("Network error: {0}")]
    Network(String),

    /// Response parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limited
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Wait requested by the platform
        retry_after: Option<Duration>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Errors from the game API
#[derive(Debug, Clone, thiserror::Error)]
pub enum GameApiError {
    /// Too many requests
    #[error("Rate limited")]
    RateLimited,

    /// The guild does not exist
    #[error("Guild not found: {id}")]
    NotFound {
        /// Guild looked up
        id: GameGuildId,
    },

    /// Any other failure (network, server, parse)
    #[error("Game API unavailable: {0}")]
    Unavailable(String),
}

impl From<gw2api::Error> for GameApiError {
    fn from(err: gw2api::Error) -> Self {
        match err {
            gw2api::Error::RateLimited => GameApiError::RateLimited,
            gw2api::Error::NotFound(id) => GameApiError::NotFound {
                id: GameGuildId::new(id),
            },
            other => GameApiError::Unavailable(other.to_string()),
        }
    }
}

/// Errors from the settings store
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Persisting or loading failed
    #[error("Settings store failed: {reason}")]
    Store {
        /// What went wrong
        reason: String,
    },
}

/// Errors from the world link synchronizer
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorldError {
    /// No complete matchup has been loaded yet
    #[error("World links are not synchronized")]
    NotSynchronized,

    /// Fetching matchups failed
    #[error("Matchup fetch failed: {0}")]
    Fetch(#[from] GameApiError),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for fact provider operations
pub type FactResult<T> = std::result::Result<T, FactError>;

/// Result type for chat platform operations
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Result type for game API operations
pub type GameApiResult<T> = std::result::Result<T, GameApiError>;

/// Result type for settings operations
pub type SettingsResult<T> = std::result::Result<T, SettingsError>;

/// Result type for world link operations
pub type WorldResult<T> = std::result::Result<T, WorldError>;
