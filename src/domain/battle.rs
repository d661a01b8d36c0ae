//! Battle, team and song snapshot types.

use crate::domain::{AccountId, BattleId, SongId, TeamSide, TimeMs};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

/// Upper bound on songs in a battle snapshot.
pub const MAX_SONGS: usize = 5;

/// Default name for the open challenger slot.
pub const CHALLENGER_TEAM_NAME: &str = "Challenger Team";

/// Battle lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BattleStatus {
    Scheduled,
    Live,
    Completed,
    Cancelled,
}

impl BattleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BattleStatus::Scheduled => "scheduled",
            BattleStatus::Live => "live",
            BattleStatus::Completed => "completed",
            BattleStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BattleStatus::Completed | BattleStatus::Cancelled)
    }
}

impl std::fmt::Display for BattleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BattleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(BattleStatus::Scheduled),
            "live" => Ok(BattleStatus::Live),
            "completed" => Ok(BattleStatus::Completed),
            "cancelled" => Ok(BattleStatus::Cancelled),
            other => Err(format!("unknown battle status: {}", other)),
        }
    }
}

/// A song copied by value from the catalog at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: SongId,
    pub title: String,
    pub artist_id: AccountId,
    /// Declared play length in seconds.
    pub duration_secs: i64,
}

/// One side of a battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub side: TeamSide,
    pub name: String,
    pub artist_id: Option<AccountId>,
    pub score: i64,
    pub supporters: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Battle {
    pub id: BattleId,
    pub name: String,
    pub creator_id: AccountId,
    pub duration_secs: i64,
    pub entry_fee: i64,
    pub status: BattleStatus,
    pub created_at: TimeMs,
    pub scheduled_at: Option<TimeMs>,
    pub started_at: Option<TimeMs>,
    pub ended_at: Option<TimeMs>,
    pub songs: Vec<Song>,
    pub team_a: Team,
    pub team_b: Team,
    pub total_pot: i64,
    pub stream_revenue: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
}

impl Battle {
    pub fn team(&self, side: TeamSide) -> &Team {
        match side {
            TeamSide::A => &self.team_a,
            TeamSide::B => &self.team_b,
        }
    }

    pub fn song(&self, song_id: &SongId) -> Option<&Song> {
        self.songs.iter().find(|s| &s.id == song_id)
    }

    /// Logical end of scoring: `startedAt + duration`.
    pub fn ends_at(&self) -> Option<TimeMs> {
        self.started_at.map(|t| t.plus_secs(self.duration_secs))
    }

    /// Whether a stream received at `now` may still score.
    pub fn accepts_streams_at(&self, now: TimeMs) -> bool {
        self.status == BattleStatus::Live && self.ends_at().map_or(false, |end| now < end)
    }

    /// Both sides have an artist who paid the entry fee.
    pub fn is_fully_funded(&self) -> bool {
        self.team_a.artist_id.is_some() && self.team_b.artist_id.is_some()
    }
}

/// Creation request for a battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleSpec {
    pub name: String,
    pub duration_secs: i64,
    pub entry_fee: i64,
    #[serde(default)]
    pub scheduled_at: Option<TimeMs>,
    pub songs: Vec<Song>,
    #[serde(default)]
    pub team_name: Option<String>,
}

impl BattleSpec {
    /// Check structural constraints. Returns a human readable reason on failure.
    pub fn validate(&self, creator: &AccountId) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("battle name must not be empty".to_string());
        }
        if self.songs.is_empty() {
            return Err("a battle needs at least one song".to_string());
        }
        if self.songs.len() > MAX_SONGS {
            return Err(format!("a battle allows at most {} songs", MAX_SONGS));
        }
        if self.entry_fee < 0 {
            return Err("entry fee must not be negative".to_string());
        }
        if self.duration_secs <= 0 {
            return Err("duration must be positive".to_string());
        }

        let mut seen = HashSet::new();
        for song in &self.songs {
            if !seen.insert(&song.id) {
                return Err(format!("song {} listed twice", song.id));
            }
            if &song.artist_id != creator {
                return Err(format!("song {} is not owned by the creator", song.id));
            }
            if song.duration_secs <= 0 {
                return Err(format!("song {} has no declared duration", song.id));
            }
        }
        Ok(())
    }

    /// Team A name, falling back to the creator's fan base label.
    pub fn team_a_name(&self, creator: &AccountId) -> String {
        self.team_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}'s Team", creator))
    }

    /// Advertised pot: both artists pay the same fee.
    pub fn total_pot(&self) -> i64 {
        self.entry_fee.saturating_mul(2)
    }
}
