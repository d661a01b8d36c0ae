//! Bot program tasks: stream a song, earn coins.

use crate::domain::{AccountId, SongId, TimeMs};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotTask {
    pub id: String,
    pub listener_id: AccountId,
    pub song_id: SongId,
    pub coins_awarded: i64,
    pub completed: bool,
    pub created_at: TimeMs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<TimeMs>,
}

impl BotTask {
    pub fn new(listener_id: AccountId, song_id: SongId, coins_awarded: i64, now: TimeMs) -> Self {
        BotTask {
            id: uuid::Uuid::new_v4().to_string(),
            listener_id,
            song_id,
            coins_awarded,
            completed: false,
            created_at: now,
            completed_at: None,
        }
    }
}
