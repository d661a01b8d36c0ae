use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::str::FromStr;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::api::AppState;
use crate::domain::{AccountId, Battle, BattleId, BattleStatus, SongId, StreamSubmission, Team, TimeMs};
use crate::error::AppError;
use crate::orchestration::{ScoreUpdate, SubmitOutcome};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitStreamRequest {
    pub listener_id: AccountId,
    pub song_id: SongId,
    pub team_side: String,
    pub client_nonce: String,
    /// Client play time in ms, audit only.
    pub timestamp: Option<i64>,
}

/// First frame of a score stream.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scoreboard {
    pub battle_id: BattleId,
    pub status: BattleStatus,
    pub ends_at: Option<TimeMs>,
    pub team_a: Team,
    pub team_b: Team,
}

impl From<Battle> for Scoreboard {
    fn from(battle: Battle) -> Self {
        Scoreboard {
            ends_at: battle.ends_at(),
            battle_id: battle.id,
            status: battle.status,
            team_a: battle.team_a,
            team_b: battle.team_b,
        }
    }
}

pub async fn submit_stream(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<SubmitStreamRequest>,
) -> Result<(StatusCode, Json<SubmitOutcome>), AppError> {
    if req.client_nonce.trim().is_empty() {
        return Err(AppError::BadRequest("clientNonce must not be empty".into()));
    }

    let submission = StreamSubmission {
        listener_id: req.listener_id,
        battle_id: BattleId::from_str(&id)?,
        song_id: req.song_id,
        team_side: req.team_side,
        timestamp: TimeMs::new(req.timestamp.unwrap_or_default()),
        client_nonce: req.client_nonce,
    };

    let outcome = state.engine.ingestor.submit(submission).await?;
    let status = if outcome.replayed {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(outcome)))
}

/// Server-sent events: a `scoreboard` frame, then one `score` frame per fold.
pub async fn score_stream(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let battle_id = BattleId::from_str(&id)?;
    // Subscribe before reading so no fold between the two is lost.
    let updates = state.engine.scoring.subscribe();
    let battle = state.engine.lifecycle.get(&battle_id).await?;

    let snapshot = json_event("scoreboard", &Scoreboard::from(battle));
    let live = stream::unfold((updates, battle_id), |(mut updates, battle_id)| async move {
        loop {
            match updates.recv().await {
                Ok(update) if update.battle_id == battle_id => {
                    return Some((update, (updates, battle_id)));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(battle = %battle_id, skipped, "Score stream subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .map(|update: ScoreUpdate| json_event("score", &update));

    let events = stream::once(async move { snapshot })
        .chain(live)
        .map(Ok::<_, Infallible>);
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn json_event<T: Serialize>(name: &str, payload: &T) -> Event {
    Event::default()
        .event(name)
        .json_data(payload)
        .unwrap_or_else(|_| Event::default().comment("unserializable payload"))
}
