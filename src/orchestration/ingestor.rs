use crate::clock::Clock;
use crate::config::{Config, ReplayWindow};
use crate::db::Repository;
use crate::domain::{ScoringUnit, StreamEvent, StreamSubmission, TeamSide};
use crate::error::EngineError;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Result of a submission. `replayed` is set when the same play (same nonce)
/// was already recorded and the original record is returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub event: StreamEvent,
    pub replayed: bool,
}

#[derive(Clone)]
pub struct Ingestor {
    repo: Arc<Repository>,
    clock: Arc<dyn Clock>,
    replay_window: ReplayWindow,
    dispatch: mpsc::UnboundedSender<ScoringUnit>,
}

impl Ingestor {
    pub fn new(
        repo: Arc<Repository>,
        clock: Arc<dyn Clock>,
        config: &Config,
        dispatch: mpsc::UnboundedSender<ScoringUnit>,
    ) -> Self {
        Self {
            repo,
            clock,
            replay_window: config.replay_window,
            dispatch,
        }
    }

    /// Validate, deduplicate and record one play.
    ///
    /// Scoring-eligible events are handed to the scoring worker without
    /// waiting for the fold.
    pub async fn submit(&self, submission: StreamSubmission) -> Result<SubmitOutcome, EngineError> {
        let now = self.clock.now();
        let battle = self
            .repo
            .get_battle(&submission.battle_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("battle {}", submission.battle_id)))?;

        let event_id = StreamEvent::compute_event_id(
            &submission.listener_id,
            &submission.battle_id,
            &submission.song_id,
            &submission.client_nonce,
        );

        if let Some(existing) = self.repo.get_stream_event(&event_id).await? {
            debug!(event = %event_id, "Client retry of a recorded play");
            return Ok(SubmitOutcome {
                event: existing,
                replayed: true,
            });
        }

        if !battle.accepts_streams_at(now) {
            return Err(EngineError::BattleNotLive(battle.id.to_string()));
        }

        let side = TeamSide::resolve(&submission.team_side)
            .ok_or_else(|| EngineError::UnknownTeam(submission.team_side.clone()))?;
        let song = battle
            .song(&submission.song_id)
            .ok_or_else(|| EngineError::UnknownSong(submission.song_id.to_string()))?;
        let window_ms = self.replay_window.window_ms(song.duration_secs);

        let event = StreamEvent {
            event_id,
            listener_id: submission.listener_id,
            battle_id: submission.battle_id,
            song_id: submission.song_id,
            team_side: side,
            client_timestamp: submission.timestamp,
            client_nonce: submission.client_nonce.trim().to_string(),
            received_at: now,
            scored: true,
        };

        // The insert re-checks the live window, so a battle that ended since
        // the read above still refuses the play.
        let Some((stored, inserted)) = self.repo.record_stream_event(&event, window_ms).await?
        else {
            return Err(EngineError::BattleNotLive(event.battle_id.to_string()));
        };

        if inserted {
            if stored.scored {
                self.dispatch_unit(ScoringUnit::from(&stored));
            } else {
                info!(
                    event = %stored.event_id,
                    battle = %stored.battle_id,
                    listener = %stored.listener_id,
                    song = %stored.song_id,
                    window_ms,
                    "Duplicate play inside replay window recorded without score"
                );
            }
        }

        Ok(SubmitOutcome {
            event: stored,
            replayed: !inserted,
        })
    }

    fn dispatch_unit(&self, unit: ScoringUnit) {
        if let Err(e) = self.dispatch.send(unit) {
            // Completion and the startup sweep fold whatever was not applied.
            warn!(event = %e.0.event_id, "Scoring worker unavailable; event left pending");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{AccountId, BattleId, SongId, StreamSubmission, TimeMs};
    use crate::error::EngineError;
    use crate::orchestration::test_support::{live_battle, scheduled_battle, setup_engine};

    fn play(battle: &BattleId, listener: &str, song: &str, side: &str, nonce: &str) -> StreamSubmission {
        StreamSubmission {
            listener_id: AccountId::new(listener),
            battle_id: battle.clone(),
            song_id: SongId::new(song),
            team_side: side.to_string(),
            timestamp: TimeMs::new(42),
            client_nonce: nonce.to_string(),
        }
    }

    #[tokio::test]
    async fn test_unknown_battle() {
        let (engine, _clock, _temp) = setup_engine().await;
        let err = engine
            .ingestor
            .submit(play(&BattleId::new("nope"), "fan", "s1", "A", "n"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_scheduled_battle_refuses_streams() {
        let (engine, _clock, _temp) = setup_engine().await;
        let battle = scheduled_battle(&engine, 0).await;
        let err = engine
            .ingestor
            .submit(play(&battle, "fan", "s1", "A", "n"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::BattleNotLive(_)));
    }

    #[tokio::test]
    async fn test_unknown_song_and_team() {
        let (engine, _clock, _temp) = setup_engine().await;
        let battle = live_battle(&engine, 0).await;

        let err = engine
            .ingestor
            .submit(play(&battle, "fan", "not-in-battle", "A", "n"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownSong(_)));

        let err = engine
            .ingestor
            .submit(play(&battle, "fan", "s1", "C", "n"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownTeam(_)));

        let (recorded, scored) = engine.repo.stream_counts(&battle).await.unwrap();
        assert_eq!((recorded, scored), (0, 0));
    }

    #[tokio::test]
    async fn test_replay_window_records_without_score() {
        let (engine, clock, _temp) = setup_engine().await;
        let battle = live_battle(&engine, 0).await;

        let first = engine.ingestor.submit(play(&battle, "fan", "s1", "A", "n1")).await.unwrap();
        clock.advance_ms(1_000);
        let second = engine.ingestor.submit(play(&battle, "fan", "s1", "A", "n2")).await.unwrap();

        assert!(first.event.scored);
        assert!(!second.event.scored);
        assert!(!second.replayed);
        assert_ne!(first.event.event_id, second.event.event_id);

        let (recorded, scored) = engine.repo.stream_counts(&battle).await.unwrap();
        assert_eq!((recorded, scored), (2, 1));
    }

    #[tokio::test]
    async fn test_retry_returns_original_record() {
        let (engine, clock, _temp) = setup_engine().await;
        let battle = live_battle(&engine, 0).await;

        let first = engine.ingestor.submit(play(&battle, "fan", "s1", "A", "n1")).await.unwrap();
        clock.advance_ms(500);
        let retry = engine.ingestor.submit(play(&battle, "fan", "s1", "A", " n1 ")).await.unwrap();

        assert!(retry.replayed);
        assert_eq!(retry.event, first.event);
        let (recorded, _) = engine.repo.stream_counts(&battle).await.unwrap();
        assert_eq!(recorded, 1);
    }

    #[tokio::test]
    async fn test_late_arrival_is_refused_before_end_runs() {
        let (engine, clock, _temp) = setup_engine().await;
        let battle = live_battle(&engine, 0).await;

        // Exactly at startedAt + duration: too late, even though still `live`.
        clock.advance_secs(60);
        let err = engine
            .ingestor
            .submit(play(&battle, "fan", "s1", "A", "n1"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::BattleNotLive(_)));
        assert_eq!(
            engine.lifecycle.get(&battle).await.unwrap().status,
            crate::domain::BattleStatus::Live
        );
    }
}
