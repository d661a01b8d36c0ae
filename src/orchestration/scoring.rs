//! Scoring pipeline: folds accepted stream events into team counters.

use crate::clock::Clock;
use crate::config::Config;
use crate::db::repo::TeamCounters;
use crate::db::Repository;
use crate::domain::{BattleId, BattleStatus, ScoringUnit, TeamSide};
use crate::error::EngineError;
use serde::Serialize;
use sqlx::sqlite::SqliteConnection;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const UPDATE_CHANNEL_CAPACITY: usize = 1024;

/// Team aggregates right after a fold, pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreUpdate {
    pub battle_id: BattleId,
    pub team_side: TeamSide,
    pub score: i64,
    pub supporters: i64,
    pub event_id: String,
}

impl ScoreUpdate {
    fn from_counters(counters: TeamCounters, event_id: &str) -> Self {
        ScoreUpdate {
            battle_id: counters.battle_id,
            team_side: counters.side,
            score: counters.score,
            supporters: counters.supporters,
            event_id: event_id.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct ScoringPipeline {
    repo: Arc<Repository>,
    clock: Arc<dyn Clock>,
    points_per_stream: i64,
    revenue_per_stream: i64,
    updates: broadcast::Sender<ScoreUpdate>,
}

impl ScoringPipeline {
    pub fn new(repo: Arc<Repository>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            repo,
            clock,
            points_per_stream: config.points_per_stream,
            revenue_per_stream: config.revenue_per_stream,
            updates,
        }
    }

    /// Receive every score update published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ScoreUpdate> {
        self.updates.subscribe()
    }

    /// Fold one unit while its battle is live.
    ///
    /// Returns `None` when the event was already applied or the battle is no
    /// longer live. In the latter case nothing is written and the event stays
    /// pending for the completion fold.
    pub async fn apply(&self, unit: &ScoringUnit) -> Result<Option<ScoreUpdate>, EngineError> {
        let mut tx = self.repo.begin().await?;
        let update = self.fold_in(&mut *tx, unit, true).await?;
        match update {
            Some(update) => {
                tx.commit().await?;
                self.publish(update.clone());
                Ok(Some(update))
            }
            None => {
                tx.rollback().await?;
                Ok(None)
            }
        }
    }

    /// Fold everything accepted for a battle but not applied yet.
    pub async fn replay_pending(&self, battle_id: &BattleId) -> Result<usize, EngineError> {
        let mut conn = self.repo.pool().acquire().await?;
        let pending = Repository::pending_scoring_units(&mut conn, battle_id).await?;
        drop(conn);

        let mut folded = 0;
        for unit in &pending {
            if self.apply(unit).await?.is_some() {
                folded += 1;
            }
        }

        if folded > 0 {
            info!(battle = %battle_id, folded, "Replayed pending stream events");
        }
        Ok(folded)
    }

    /// Fold all pending units inside a caller-owned transaction without the
    /// live check. Used by battle completion after the status has flipped.
    pub(crate) async fn fold_pending_in(
        &self,
        conn: &mut SqliteConnection,
        battle_id: &BattleId,
    ) -> Result<Vec<ScoreUpdate>, EngineError> {
        let pending = Repository::pending_scoring_units(&mut *conn, battle_id).await?;
        let mut updates = Vec::with_capacity(pending.len());
        for unit in &pending {
            if let Some(update) = self.fold_in(&mut *conn, unit, false).await? {
                updates.push(update);
            }
        }
        Ok(updates)
    }

    /// The applied marker is the first write so the transaction takes the
    /// write lock before reading anything.
    async fn fold_in(
        &self,
        conn: &mut SqliteConnection,
        unit: &ScoringUnit,
        require_live: bool,
    ) -> Result<Option<ScoreUpdate>, EngineError> {
        let now = self.clock.now();
        if !Repository::mark_event_applied(&mut *conn, unit, now).await? {
            debug!(event = %unit.event_id, "Stream event already applied");
            return Ok(None);
        }

        if require_live {
            let status = Repository::battle_status(&mut *conn, &unit.battle_id).await?;
            if status != Some(BattleStatus::Live) {
                debug!(
                    event = %unit.event_id,
                    battle = %unit.battle_id,
                    status = ?status,
                    "Skipping fold for battle that is not live"
                );
                return Ok(None);
            }
        }

        let mut counters = Repository::increment_team_score(
            &mut *conn,
            &unit.battle_id,
            unit.team_side,
            self.points_per_stream,
            self.revenue_per_stream,
        )
        .await?;

        if let Some(with_supporter) = Repository::add_supporter(
            &mut *conn,
            &unit.battle_id,
            &unit.listener_id,
            unit.team_side,
            now,
        )
        .await?
        {
            counters = with_supporter;
        }

        Ok(Some(ScoreUpdate::from_counters(counters, &unit.event_id)))
    }

    /// Lagging or absent subscribers never block a fold.
    pub(crate) fn publish(&self, update: ScoreUpdate) {
        let _ = self.updates.send(update);
    }

    /// Drain dispatched units until every sender is gone.
    pub fn spawn_worker(&self, mut units: mpsc::UnboundedReceiver<ScoringUnit>) -> JoinHandle<()> {
        let pipeline = self.clone();
        tokio::spawn(async move {
            while let Some(unit) = units.recv().await {
                if let Err(e) = pipeline.apply(&unit).await {
                    warn!(
                        event = %unit.event_id,
                        battle = %unit.battle_id,
                        error = %e,
                        "Scoring fold failed; event stays pending"
                    );
                }
            }
            debug!("Scoring worker stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{AccountId, ScoringUnit, StreamSubmission, TeamSide, TimeMs};
    use crate::orchestration::test_support::{live_battle, setup_engine};

    fn play(battle: &crate::domain::BattleId, listener: &str, nonce: &str) -> StreamSubmission {
        StreamSubmission {
            listener_id: AccountId::new(listener),
            battle_id: battle.clone(),
            song_id: crate::domain::SongId::new("s1"),
            team_side: "A".to_string(),
            timestamp: TimeMs::new(0),
            client_nonce: nonce.to_string(),
        }
    }

    #[tokio::test]
    async fn test_apply_is_idempotent_per_event() {
        let (engine, _clock, _temp) = setup_engine().await;
        let battle = live_battle(&engine, 0).await;

        let outcome = engine.ingestor.submit(play(&battle, "fan-1", "n1")).await.unwrap();
        let unit = ScoringUnit::from(&outcome.event);

        let first = engine.scoring.apply(&unit).await.unwrap();
        let second = engine.scoring.apply(&unit).await.unwrap();

        // The worker may have folded it first; exactly one call can win.
        let loaded = engine.lifecycle.get(&battle).await.unwrap();
        assert_eq!(loaded.team_a.score, 10);
        assert_eq!(loaded.team_a.supporters, 1);
        assert!(first.is_none() || second.is_none());
    }

    #[tokio::test]
    async fn test_supporter_counted_once_per_listener() {
        let (engine, clock, _temp) = setup_engine().await;
        let battle = live_battle(&engine, 0).await;

        engine.ingestor.submit(play(&battle, "fan-1", "n1")).await.unwrap();
        clock.advance_secs(10);
        // Outside a 5s fixed window this scores again.
        engine.ingestor.submit(play(&battle, "fan-1", "n2")).await.unwrap();
        engine.ingestor.submit(play(&battle, "fan-2", "n1")).await.unwrap();
        engine.scoring.replay_pending(&battle).await.unwrap();

        let loaded = engine.lifecycle.get(&battle).await.unwrap();
        assert_eq!(loaded.team_a.score, 30);
        assert_eq!(loaded.team_a.supporters, 2);
        assert_eq!(loaded.team_b.score, 0);
        assert_eq!(loaded.stream_revenue, 3);
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let (engine, _clock, _temp) = setup_engine().await;
        let battle = live_battle(&engine, 0).await;
        let mut rx = engine.scoring.subscribe();

        engine.ingestor.submit(play(&battle, "fan-1", "n1")).await.unwrap();
        engine.scoring.replay_pending(&battle).await.unwrap();

        let update = rx.recv().await.unwrap();
        assert_eq!(update.battle_id, battle);
        assert_eq!(update.team_side, TeamSide::A);
        assert_eq!(update.score, 10);
    }

    #[tokio::test]
    async fn test_no_fold_after_completion_outside_end() {
        let (engine, clock, _temp) = setup_engine().await;
        let battle = live_battle(&engine, 0).await;

        let outcome = engine.ingestor.submit(play(&battle, "fan-1", "n1")).await.unwrap();
        clock.advance_secs(120);
        engine.lifecycle.end(&battle).await.unwrap();

        // Completion already folded the event; a late apply changes nothing.
        assert!(engine
            .scoring
            .apply(&ScoringUnit::from(&outcome.event))
            .await
            .unwrap()
            .is_none());
        let loaded = engine.lifecycle.get(&battle).await.unwrap();
        assert_eq!(loaded.team_a.score, 10);
    }
}
