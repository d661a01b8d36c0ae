//! Domain primitives: TimeMs, AccountId, BattleId, SongId, TeamSide.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Time in milliseconds since Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// Offset by a number of seconds, saturating on overflow.
    pub fn plus_secs(&self, secs: i64) -> Self {
        TimeMs(self.0.saturating_add(secs.saturating_mul(1000)))
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(IdParseError::Empty(stringify!($name)));
                }
                if trimmed.len() > 128 {
                    return Err(IdParseError::TooLong(stringify!($name)));
                }
                Ok($name(trimmed.to_string()))
            }
        }

        // Ids arriving in request bodies get the same checks as path ids.
        impl TryFrom<String> for $name {
            type Error = IdParseError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

string_id!(
    /// Listener, artist or platform identity issued by the identity provider.
    AccountId
);
string_id!(
    /// Battle identifier.
    BattleId
);
string_id!(
    /// Catalog song identifier.
    SongId
);

impl BattleId {
    /// Fresh random battle id.
    pub fn generate() -> Self {
        BattleId(uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{0} is too long")]
    TooLong(&'static str),
}

/// One of the two sides of a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TeamSide {
    #[serde(rename = "A")]
    A,
    #[serde(rename = "B")]
    B,
}

impl TeamSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamSide::A => "A",
            TeamSide::B => "B",
        }
    }

    /// Resolve a client-supplied side label. Returns None for anything but A/B.
    pub fn resolve(label: &str) -> Option<Self> {
        match label.trim() {
            "A" | "a" => Some(TeamSide::A),
            "B" | "b" => Some(TeamSide::B),
            _ => None,
        }
    }
}

impl std::fmt::Display for TeamSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
