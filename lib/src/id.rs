//! Type-safe ID types for the alliance service.
//!
//! Uses newtype pattern to prevent mixing up different ID types at compile time.
//! Chat platform IDs are decimal snowflakes carried as strings; game guild IDs
//! are GUID strings; worlds are small integers.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Macro to define a newtype ID wrapper around a string
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an ID from its string form
            #[inline]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the underlying string
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Check if this ID is empty
            #[inline]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        // Decimal snowflakes order numerically when shorter strings sort first.
        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                self.0
                    .len()
                    .cmp(&other.0.len())
                    .then_with(|| self.0.cmp(&other.0))
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Identifier of a chat server (a Discord guild)
    GuildId
);

define_id!(
    /// Identifier of a chat platform user
    UserId
);

define_id!(
    /// Identifier of a role within a chat server
    RoleId
);

define_id!(
    /// Identifier of an in-game guild
    GameGuildId
);

define_id!(
    /// Identifier of a game account as known to the backend
    AccountId
);

/// Identifier of a game world (a WvW region).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldId(pub u32);

impl fmt::Debug for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorldId({})", self.0)
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for WorldId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snowflake_ordering() {
        let small = RoleId::new("999");
        let large = RoleId::new("1000");
        assert!(small < large);
        assert!(RoleId::new("1001") > RoleId::new("1000"));
    }

    #[test]
    fn test_id_debug_format() {
        let id = UserId::new("42");
        assert_eq!(format!("{:?}", id), "UserId(42)");
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_id_serde_transparent() {
        let id = GuildId::new("123456789012345678");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"123456789012345678\"");
    }

    #[test]
    fn test_world_id_from_str() {
        let world: WorldId = " 2003 ".parse().unwrap();
        assert_eq!(world, WorldId(2003));
        assert!("disabled".parse::<WorldId>().is_err());
    }
}
