//! Stream events submitted by listener clients.

use crate::domain::{AccountId, BattleId, SongId, TeamSide, TimeMs};
use serde::{Deserialize, Serialize};

/// A play reported by a listener client, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSubmission {
    pub listener_id: AccountId,
    pub battle_id: BattleId,
    pub song_id: SongId,
    /// Raw side label; resolved against the battle's two teams.
    pub team_side: String,
    /// Client-reported play time. Recorded for audit only.
    pub timestamp: TimeMs,
    /// Client-generated nonce; retries of the same play reuse it.
    pub client_nonce: String,
}

/// An accepted stream event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    pub event_id: String,
    pub listener_id: AccountId,
    pub battle_id: BattleId,
    pub song_id: SongId,
    pub team_side: TeamSide,
    pub client_timestamp: TimeMs,
    pub client_nonce: String,
    pub received_at: TimeMs,
    /// False when the play fell inside the replay window of an earlier scored play.
    pub scored: bool,
}

impl StreamEvent {
    /// Compute the stable id of a play.
    ///
    /// Fields are length-prefixed before hashing so that `("ab", "c")` and
    /// `("a", "bc")` never collide. The digest is truncated to 128 bits.
    pub fn compute_event_id(
        listener: &AccountId,
        battle: &BattleId,
        song: &SongId,
        client_nonce: &str,
    ) -> String {
        use sha2::{Digest, Sha256};

        fn hash_var(hasher: &mut Sha256, data: &str) {
            hasher.update((data.len() as u32).to_le_bytes());
            hasher.update(data.as_bytes());
        }

        let mut hasher = Sha256::new();
        hash_var(&mut hasher, listener.as_str());
        hash_var(&mut hasher, battle.as_str());
        hash_var(&mut hasher, song.as_str());
        hash_var(&mut hasher, client_nonce.trim());

        let hash = hasher.finalize();
        format!("ev:{}", hex::encode(&hash[..16]))
    }
}

/// The unit handed from the ingestor to the scoring pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringUnit {
    pub event_id: String,
    pub battle_id: BattleId,
    pub listener_id: AccountId,
    pub team_side: TeamSide,
}

impl From<&StreamEvent> for ScoringUnit {
    fn from(event: &StreamEvent) -> Self {
        ScoringUnit {
            event_id: event.event_id.clone(),
            battle_id: event.battle_id.clone(),
            listener_id: event.listener_id.clone(),
            team_side: event.team_side,
        }
    }
}
