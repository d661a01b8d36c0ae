//! Stream event and team counter operations for the repository.

use crate::domain::{
    AccountId, BattleId, BattleStatus, ScoringUnit, SongId, StreamEvent, TeamSide, TimeMs,
};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

use super::Repository;

/// Team aggregates right after an increment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamCounters {
    pub battle_id: BattleId,
    pub side: TeamSide,
    pub score: i64,
    pub supporters: i64,
}

impl Repository {
    /// Record a stream event in one statement.
    ///
    /// The statement only inserts while the battle is live and `now` is before
    /// `started_at + duration`, and it computes `scored` from the replay window
    /// in the same step, so concurrent plays of the same song by one listener
    /// cannot both score. Returns the stored event and whether this call wrote
    /// it, or `None` when the battle refused the play.
    pub async fn record_stream_event(
        &self,
        event: &StreamEvent,
        replay_window_ms: i64,
    ) -> Result<Option<(StreamEvent, bool)>, sqlx::Error> {
        let window_start = event.received_at.as_ms().saturating_sub(replay_window_ms);

        let result = sqlx::query(
            r#"
            INSERT INTO stream_events (
                event_id, battle_id, listener_id, song_id, team_side,
                client_timestamp, client_nonce, received_at, scored
            )
            SELECT ?, ?, ?, ?, ?, ?, ?, ?,
                   NOT EXISTS (
                       SELECT 1 FROM stream_events p
                       WHERE p.battle_id = ? AND p.listener_id = ? AND p.song_id = ?
                         AND p.scored = 1 AND p.received_at > ?
                   )
            WHERE EXISTS (
                SELECT 1 FROM battles b
                WHERE b.id = ? AND b.status = 'live'
                  AND ? < b.started_at + b.duration_secs * 1000
            )
            ON CONFLICT(event_id) DO NOTHING
            "#,
        )
        .bind(&event.event_id)
        .bind(event.battle_id.as_str())
        .bind(event.listener_id.as_str())
        .bind(event.song_id.as_str())
        .bind(event.team_side.as_str())
        .bind(event.client_timestamp.as_ms())
        .bind(&event.client_nonce)
        .bind(event.received_at.as_ms())
        .bind(event.battle_id.as_str())
        .bind(event.listener_id.as_str())
        .bind(event.song_id.as_str())
        .bind(window_start)
        .bind(event.battle_id.as_str())
        .bind(event.received_at.as_ms())
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        let stored = self.get_stream_event(&event.event_id).await?;
        Ok(stored.map(|e| (e, inserted)))
    }

    pub async fn get_stream_event(&self, event_id: &str) -> Result<Option<StreamEvent>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT event_id, battle_id, listener_id, song_id, team_side,
                   client_timestamp, client_nonce, received_at, scored
            FROM stream_events
            WHERE event_id = ?
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(event_from_row).transpose()
    }

    /// Count (recorded, scored) events of a battle.
    pub async fn stream_counts(&self, battle_id: &BattleId) -> Result<(i64, i64), sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS recorded, COALESCE(SUM(scored), 0) AS scored
            FROM stream_events
            WHERE battle_id = ?
            "#,
        )
        .bind(battle_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok((row.get("recorded"), row.get("scored")))
    }

    /// Mark an event as folded. Returns false if it already was.
    pub async fn mark_event_applied(
        conn: &mut SqliteConnection,
        unit: &ScoringUnit,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO applied_events (event_id, battle_id, applied_at)
            VALUES (?, ?, ?)
            ON CONFLICT(event_id) DO NOTHING
            "#,
        )
        .bind(&unit.event_id)
        .bind(unit.battle_id.as_str())
        .bind(now.as_ms())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// In-place increment of a team's score and revenue.
    pub async fn increment_team_score(
        conn: &mut SqliteConnection,
        battle_id: &BattleId,
        side: TeamSide,
        points: i64,
        revenue: i64,
    ) -> Result<TeamCounters, sqlx::Error> {
        let row = sqlx::query(
            r#"
            UPDATE teams
            SET score = score + ?, revenue = revenue + ?
            WHERE battle_id = ? AND side = ?
            RETURNING score, supporters
            "#,
        )
        .bind(points)
        .bind(revenue)
        .bind(battle_id.as_str())
        .bind(side.as_str())
        .fetch_one(&mut *conn)
        .await?;

        Ok(TeamCounters {
            battle_id: battle_id.clone(),
            side,
            score: row.get("score"),
            supporters: row.get("supporters"),
        })
    }

    /// Count a listener as a supporter the first time they score in a battle.
    /// Returns the new counters if the listener was new.
    pub async fn add_supporter(
        conn: &mut SqliteConnection,
        battle_id: &BattleId,
        listener_id: &AccountId,
        side: TeamSide,
        now: TimeMs,
    ) -> Result<Option<TeamCounters>, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO battle_supporters (battle_id, listener_id, side, first_seen_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(battle_id, listener_id) DO NOTHING
            "#,
        )
        .bind(battle_id.as_str())
        .bind(listener_id.as_str())
        .bind(side.as_str())
        .bind(now.as_ms())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let row = sqlx::query(
            r#"
            UPDATE teams
            SET supporters = supporters + 1
            WHERE battle_id = ? AND side = ?
            RETURNING score, supporters
            "#,
        )
        .bind(battle_id.as_str())
        .bind(side.as_str())
        .fetch_one(&mut *conn)
        .await?;

        Ok(Some(TeamCounters {
            battle_id: battle_id.clone(),
            side,
            score: row.get("score"),
            supporters: row.get("supporters"),
        }))
    }

    pub async fn battle_status(
        conn: &mut SqliteConnection,
        battle_id: &BattleId,
    ) -> Result<Option<BattleStatus>, sqlx::Error> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM battles WHERE id = ?")
            .bind(battle_id.as_str())
            .fetch_optional(&mut *conn)
            .await?;

        status
            .map(|s| BattleStatus::from_str(&s).map_err(|e| sqlx::Error::Decode(e.into())))
            .transpose()
    }

    /// Scored events of a battle that have not been folded yet.
    pub async fn pending_scoring_units(
        conn: &mut SqliteConnection,
        battle_id: &BattleId,
    ) -> Result<Vec<ScoringUnit>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT s.event_id, s.battle_id, s.listener_id, s.team_side
            FROM stream_events s
            LEFT JOIN applied_events a ON a.event_id = s.event_id
            WHERE s.battle_id = ? AND s.scored = 1 AND a.event_id IS NULL
            ORDER BY s.received_at ASC, s.event_id ASC
            "#,
        )
        .bind(battle_id.as_str())
        .fetch_all(&mut *conn)
        .await?;

        rows.iter()
            .map(|r| {
                let side: String = r.get("team_side");
                Ok(ScoringUnit {
                    event_id: r.get("event_id"),
                    battle_id: BattleId::new(r.get::<String, _>("battle_id")),
                    listener_id: AccountId::new(r.get::<String, _>("listener_id")),
                    team_side: TeamSide::resolve(&side).ok_or_else(|| {
                        sqlx::Error::Decode(format!("bad team side {}", side).into())
                    })?,
                })
            })
            .collect()
    }
}

fn event_from_row(row: &SqliteRow) -> Result<StreamEvent, sqlx::Error> {
    let side: String = row.get("team_side");
    Ok(StreamEvent {
        event_id: row.get("event_id"),
        listener_id: AccountId::new(row.get::<String, _>("listener_id")),
        battle_id: BattleId::new(row.get::<String, _>("battle_id")),
        song_id: SongId::new(row.get::<String, _>("song_id")),
        team_side: TeamSide::resolve(&side)
            .ok_or_else(|| sqlx::Error::Decode(format!("bad team side {}", side).into()))?,
        client_timestamp: TimeMs::new(row.get("client_timestamp")),
        client_nonce: row.get("client_nonce"),
        received_at: TimeMs::new(row.get("received_at")),
        scored: row.get::<i64, _>("scored") != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::battles::tests::sample_battle;
    use crate::db::repo::test_support::setup_test_db;

    fn event(battle: &BattleId, listener: &str, nonce: &str, at: i64) -> StreamEvent {
        let listener = AccountId::new(listener);
        let song = SongId::new("s1");
        StreamEvent {
            event_id: StreamEvent::compute_event_id(&listener, battle, &song, nonce),
            listener_id: listener,
            battle_id: battle.clone(),
            song_id: song,
            team_side: TeamSide::A,
            client_timestamp: TimeMs::new(at),
            client_nonce: nonce.to_string(),
            received_at: TimeMs::new(at),
            scored: true,
        }
    }

    async fn live_battle(repo: &Repository) -> BattleId {
        let mut battle = sample_battle("b1", "artist-a");
        battle.status = BattleStatus::Live;
        battle.started_at = Some(TimeMs::new(0));
        battle.team_b.artist_id = Some(AccountId::new("artist-b"));
        let mut tx = repo.begin().await.unwrap();
        Repository::insert_battle(&mut tx, &battle).await.unwrap();
        tx.commit().await.unwrap();
        battle.id
    }

    #[tokio::test]
    async fn test_replay_window_marks_repeat_unscored() {
        let (repo, _temp) = setup_test_db().await;
        let battle = live_battle(&repo).await;

        let (first, inserted) = repo
            .record_stream_event(&event(&battle, "fan-1", "n1", 1_000), 10_000)
            .await
            .unwrap()
            .unwrap();
        assert!(inserted);
        assert!(first.scored);

        let (second, inserted) = repo
            .record_stream_event(&event(&battle, "fan-1", "n2", 5_000), 10_000)
            .await
            .unwrap()
            .unwrap();
        assert!(inserted);
        assert!(!second.scored);

        let (third, _) = repo
            .record_stream_event(&event(&battle, "fan-1", "n3", 11_001), 10_000)
            .await
            .unwrap()
            .unwrap();
        assert!(third.scored);

        assert_eq!(repo.stream_counts(&battle).await.unwrap(), (3, 2));
    }

    #[tokio::test]
    async fn test_retry_returns_original() {
        let (repo, _temp) = setup_test_db().await;
        let battle = live_battle(&repo).await;

        let ev = event(&battle, "fan-1", "n1", 1_000);
        repo.record_stream_event(&ev, 10_000).await.unwrap();
        let mut retry = ev.clone();
        retry.received_at = TimeMs::new(2_000);
        let (stored, inserted) = repo.record_stream_event(&retry, 10_000).await.unwrap().unwrap();
        assert!(!inserted);
        assert_eq!(stored.received_at, TimeMs::new(1_000));
        assert!(stored.scored);
    }

    #[tokio::test]
    async fn test_late_event_refused() {
        let (repo, _temp) = setup_test_db().await;
        let battle = live_battle(&repo).await;
        // sample battle lasts 60s from t=0
        let late = event(&battle, "fan-1", "n1", 60_000);
        assert!(repo.record_stream_event(&late, 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fold_counters() {
        let (repo, _temp) = setup_test_db().await;
        let battle = live_battle(&repo).await;
        let ev = event(&battle, "fan-1", "n1", 1_000);
        repo.record_stream_event(&ev, 0).await.unwrap();
        let unit = ScoringUnit::from(&ev);

        let mut tx = repo.begin().await.unwrap();
        assert_eq!(
            Repository::pending_scoring_units(&mut tx, &battle)
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(Repository::mark_event_applied(&mut tx, &unit, TimeMs::new(1))
            .await
            .unwrap());
        assert!(!Repository::mark_event_applied(&mut tx, &unit, TimeMs::new(2))
            .await
            .unwrap());
        let counters = Repository::increment_team_score(&mut tx, &battle, TeamSide::A, 10, 1)
            .await
            .unwrap();
        assert_eq!(counters.score, 10);
        let counters =
            Repository::add_supporter(&mut tx, &battle, &unit.listener_id, TeamSide::A, TimeMs::new(1))
                .await
                .unwrap()
                .unwrap();
        assert_eq!(counters.supporters, 1);
        assert!(
            Repository::add_supporter(&mut tx, &battle, &unit.listener_id, TeamSide::A, TimeMs::new(2))
                .await
                .unwrap()
                .is_none()
        );
        assert!(Repository::pending_scoring_units(&mut tx, &battle)
            .await
            .unwrap()
            .is_empty());
        tx.commit().await.unwrap();
    }
}
