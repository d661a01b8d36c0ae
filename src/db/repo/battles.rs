//! Battle, team and song snapshot operations for the repository.
//!
//! Status changes are compare-and-set updates (`WHERE status = ...`), so a
//! transition either happens exactly once or reports `false` to the caller.

use crate::domain::{
    AccountId, Battle, BattleId, BattleStatus, Song, SongId, Team, TeamSide, TimeMs,
};
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;
use std::str::FromStr;

use super::{opt_time, Repository};

impl Repository {
    /// Insert a new battle with its two teams and song snapshot.
    pub async fn insert_battle(
        conn: &mut SqliteConnection,
        battle: &Battle,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO battles (
                id, name, creator_id, duration_secs, entry_fee, status,
                created_at, scheduled_at, started_at, ended_at, total_pot, cancel_reason
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(battle.id.as_str())
        .bind(&battle.name)
        .bind(battle.creator_id.as_str())
        .bind(battle.duration_secs)
        .bind(battle.entry_fee)
        .bind(battle.status.as_str())
        .bind(battle.created_at.as_ms())
        .bind(battle.scheduled_at.map(|t| t.as_ms()))
        .bind(battle.started_at.map(|t| t.as_ms()))
        .bind(battle.ended_at.map(|t| t.as_ms()))
        .bind(battle.total_pot)
        .bind(battle.cancel_reason.as_deref())
        .execute(&mut *conn)
        .await?;

        for team in [&battle.team_a, &battle.team_b] {
            sqlx::query(
                r#"
                INSERT INTO teams (battle_id, side, name, artist_id, score, supporters, revenue)
                VALUES (?, ?, ?, ?, ?, ?, 0)
                "#,
            )
            .bind(battle.id.as_str())
            .bind(team.side.as_str())
            .bind(&team.name)
            .bind(team.artist_id.as_ref().map(|a| a.as_str()))
            .bind(team.score)
            .bind(team.supporters)
            .execute(&mut *conn)
            .await?;
        }

        for (position, song) in battle.songs.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO battle_songs (battle_id, position, song_id, title, artist_id, duration_secs)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(battle.id.as_str())
            .bind(position as i64)
            .bind(song.id.as_str())
            .bind(&song.title)
            .bind(song.artist_id.as_str())
            .bind(song.duration_secs)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// Load a battle with teams and songs on the given connection.
    pub async fn load_battle(
        conn: &mut SqliteConnection,
        battle_id: &BattleId,
    ) -> Result<Option<Battle>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, name, creator_id, duration_secs, entry_fee, status, created_at,
                   scheduled_at, started_at, ended_at, total_pot, cancel_reason
            FROM battles
            WHERE id = ?
            "#,
        )
        .bind(battle_id.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.get("status");
        let status = BattleStatus::from_str(&status).map_err(|e| sqlx::Error::Decode(e.into()))?;

        let team_rows = sqlx::query(
            r#"
            SELECT side, name, artist_id, score, supporters, revenue
            FROM teams
            WHERE battle_id = ?
            ORDER BY side ASC
            "#,
        )
        .bind(battle_id.as_str())
        .fetch_all(&mut *conn)
        .await?;

        let mut team_a = None;
        let mut team_b = None;
        let mut stream_revenue = 0i64;
        for r in &team_rows {
            let side: String = r.get("side");
            let side = TeamSide::resolve(&side)
                .ok_or_else(|| sqlx::Error::Decode(format!("bad team side {}", side).into()))?;
            let artist_id: Option<String> = r.get("artist_id");
            stream_revenue += r.get::<i64, _>("revenue");
            let team = Team {
                side,
                name: r.get("name"),
                artist_id: artist_id.map(AccountId::new),
                score: r.get("score"),
                supporters: r.get("supporters"),
            };
            match side {
                TeamSide::A => team_a = Some(team),
                TeamSide::B => team_b = Some(team),
            }
        }

        let (Some(team_a), Some(team_b)) = (team_a, team_b) else {
            return Err(sqlx::Error::Decode(
                format!("battle {} is missing a team row", battle_id).into(),
            ));
        };

        let song_rows = sqlx::query(
            r#"
            SELECT song_id, title, artist_id, duration_secs
            FROM battle_songs
            WHERE battle_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(battle_id.as_str())
        .fetch_all(&mut *conn)
        .await?;

        let songs = song_rows
            .iter()
            .map(|r| Song {
                id: SongId::new(r.get::<String, _>("song_id")),
                title: r.get("title"),
                artist_id: AccountId::new(r.get::<String, _>("artist_id")),
                duration_secs: r.get("duration_secs"),
            })
            .collect();

        Ok(Some(Battle {
            id: BattleId::new(row.get::<String, _>("id")),
            name: row.get("name"),
            creator_id: AccountId::new(row.get::<String, _>("creator_id")),
            duration_secs: row.get("duration_secs"),
            entry_fee: row.get("entry_fee"),
            status,
            created_at: TimeMs::new(row.get("created_at")),
            scheduled_at: opt_time(row.get("scheduled_at")),
            started_at: opt_time(row.get("started_at")),
            ended_at: opt_time(row.get("ended_at")),
            songs,
            team_a,
            team_b,
            total_pot: row.get("total_pot"),
            stream_revenue,
            cancel_reason: row.get("cancel_reason"),
        }))
    }

    /// Read a consistent snapshot of one battle.
    pub async fn get_battle(&self, battle_id: &BattleId) -> Result<Option<Battle>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let battle = Self::load_battle(&mut tx, battle_id).await?;
        tx.commit().await?;
        Ok(battle)
    }

    /// Battles for client feeds, newest first.
    pub async fn list_battles(
        &self,
        status: Option<BattleStatus>,
        limit: i64,
    ) -> Result<Vec<Battle>, sqlx::Error> {
        let ids: Vec<String> = match status {
            Some(status) => {
                sqlx::query_scalar(
                    r#"
                    SELECT id FROM battles
                    WHERE status = ?
                    ORDER BY COALESCE(scheduled_at, created_at) DESC, id ASC
                    LIMIT ?
                    "#,
                )
                .bind(status.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar(
                    r#"
                    SELECT id FROM battles
                    ORDER BY COALESCE(scheduled_at, created_at) DESC, id ASC
                    LIMIT ?
                    "#,
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut battles = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(battle) = self.get_battle(&BattleId::new(id)).await? {
                battles.push(battle);
            }
        }
        Ok(battles)
    }

    /// Fill the open challenger slot while the battle is still scheduled.
    pub async fn claim_challenger_slot(
        conn: &mut SqliteConnection,
        battle_id: &BattleId,
        artist_id: &AccountId,
        team_name: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE teams
            SET artist_id = ?, name = ?
            WHERE battle_id = ? AND side = 'B' AND artist_id IS NULL
              AND EXISTS (SELECT 1 FROM battles WHERE id = ? AND status = 'scheduled')
            "#,
        )
        .bind(artist_id.as_str())
        .bind(team_name)
        .bind(battle_id.as_str())
        .bind(battle_id.as_str())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// scheduled → live, only once the challenger slot is funded.
    pub async fn mark_live(&self, battle_id: &BattleId, now: TimeMs) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE battles
            SET status = 'live', started_at = ?
            WHERE id = ? AND status = 'scheduled'
              AND EXISTS (
                  SELECT 1 FROM teams
                  WHERE battle_id = battles.id AND side = 'B' AND artist_id IS NOT NULL
              )
            "#,
        )
        .bind(now.as_ms())
        .bind(battle_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// live → completed.
    pub async fn mark_completed(
        conn: &mut SqliteConnection,
        battle_id: &BattleId,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE battles
            SET status = 'completed', ended_at = ?
            WHERE id = ? AND status = 'live'
            "#,
        )
        .bind(now.as_ms())
        .bind(battle_id.as_str())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// scheduled|live → cancelled.
    pub async fn mark_cancelled(
        conn: &mut SqliteConnection,
        battle_id: &BattleId,
        reason: &str,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE battles
            SET status = 'cancelled', ended_at = ?, cancel_reason = ?
            WHERE id = ? AND status IN ('scheduled', 'live')
            "#,
        )
        .bind(now.as_ms())
        .bind(reason)
        .bind(battle_id.as_str())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Live battles whose scoring window has closed at `now`.
    pub async fn expired_live_battles(&self, now: TimeMs) -> Result<Vec<BattleId>, sqlx::Error> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT id FROM battles
            WHERE status = 'live' AND started_at + duration_secs * 1000 <= ?
            ORDER BY started_at ASC
            "#,
        )
        .bind(now.as_ms())
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(BattleId::new).collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::repo::test_support::setup_test_db;

    pub fn sample_battle(id: &str, creator: &str) -> Battle {
        let creator = AccountId::new(creator);
        Battle {
            id: BattleId::new(id),
            name: "Clash".to_string(),
            creator_id: creator.clone(),
            duration_secs: 60,
            entry_fee: 0,
            status: BattleStatus::Scheduled,
            created_at: TimeMs::new(1_000),
            scheduled_at: None,
            started_at: None,
            ended_at: None,
            songs: vec![Song {
                id: SongId::new("s1"),
                title: "Opener".to_string(),
                artist_id: creator.clone(),
                duration_secs: 120,
            }],
            team_a: Team {
                side: TeamSide::A,
                name: "Home".to_string(),
                artist_id: Some(creator),
                score: 0,
                supporters: 0,
            },
            team_b: Team {
                side: TeamSide::B,
                name: "Challenger Team".to_string(),
                artist_id: None,
                score: 0,
                supporters: 0,
            },
            total_pot: 0,
            stream_revenue: 0,
            cancel_reason: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_load_battle() {
        let (repo, _temp) = setup_test_db().await;
        let battle = sample_battle("b1", "artist-a");

        let mut tx = repo.begin().await.unwrap();
        Repository::insert_battle(&mut tx, &battle).await.unwrap();
        tx.commit().await.unwrap();

        let loaded = repo.get_battle(&battle.id).await.unwrap().unwrap();
        assert_eq!(loaded, battle);
        assert!(repo.get_battle(&BattleId::new("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_live_requires_challenger() {
        let (repo, _temp) = setup_test_db().await;
        let battle = sample_battle("b1", "artist-a");
        let mut tx = repo.begin().await.unwrap();
        Repository::insert_battle(&mut tx, &battle).await.unwrap();
        tx.commit().await.unwrap();

        assert!(!repo.mark_live(&battle.id, TimeMs::new(2_000)).await.unwrap());

        let mut conn = repo.pool().acquire().await.unwrap();
        assert!(Repository::claim_challenger_slot(
            &mut conn,
            &battle.id,
            &AccountId::new("artist-b"),
            "Rivals"
        )
        .await
        .unwrap());
        assert!(!Repository::claim_challenger_slot(
            &mut conn,
            &battle.id,
            &AccountId::new("artist-c"),
            "Late"
        )
        .await
        .unwrap());
        drop(conn);

        assert!(repo.mark_live(&battle.id, TimeMs::new(2_000)).await.unwrap());
        assert!(!repo.mark_live(&battle.id, TimeMs::new(3_000)).await.unwrap());

        let loaded = repo.get_battle(&battle.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, BattleStatus::Live);
        assert_eq!(loaded.started_at, Some(TimeMs::new(2_000)));
        assert_eq!(loaded.team_b.name, "Rivals");
    }

    #[tokio::test]
    async fn test_expired_live_battles() {
        let (repo, _temp) = setup_test_db().await;
        let mut battle = sample_battle("b1", "artist-a");
        battle.status = BattleStatus::Live;
        battle.started_at = Some(TimeMs::new(10_000));
        battle.team_b.artist_id = Some(AccountId::new("artist-b"));

        let mut tx = repo.begin().await.unwrap();
        Repository::insert_battle(&mut tx, &battle).await.unwrap();
        tx.commit().await.unwrap();

        // duration 60s: window closes at 70_000
        assert!(repo
            .expired_live_battles(TimeMs::new(69_999))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            repo.expired_live_battles(TimeMs::new(70_000)).await.unwrap(),
            vec![battle.id.clone()]
        );
    }
}
