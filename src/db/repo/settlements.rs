//! Settlement record operations for the repository.

use crate::domain::{BattleId, EntryReason, Settlement, SettlementOutcome, TimeMs};
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;
use std::str::FromStr;

use super::Repository;

impl Repository {
    /// Claim the settlement slot of a battle. Returns false if the battle was
    /// already settled, in which case nothing else may be written.
    pub async fn insert_settlement(
        conn: &mut SqliteConnection,
        settlement: &Settlement,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO settlements (
                battle_id, outcome, team_a_score, team_b_score, total_pot,
                artist_payout, platform_share, settled_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(battle_id) DO NOTHING
            "#,
        )
        .bind(settlement.battle_id.as_str())
        .bind(settlement.outcome.as_str())
        .bind(settlement.team_a_score)
        .bind(settlement.team_b_score)
        .bind(settlement.total_pot)
        .bind(settlement.artist_payout)
        .bind(settlement.platform_share)
        .bind(settlement.settled_at.as_ms())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Load a settlement with the payout entries it wrote.
    pub async fn load_settlement(
        conn: &mut SqliteConnection,
        battle_id: &BattleId,
    ) -> Result<Option<Settlement>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT battle_id, outcome, team_a_score, team_b_score, total_pot,
                   artist_payout, platform_share, settled_at
            FROM settlements
            WHERE battle_id = ?
            "#,
        )
        .bind(battle_id.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let outcome: String = row.get("outcome");
        let entries = Self::battle_entries(conn, battle_id, EntryReason::BattlePayout).await?;

        Ok(Some(Settlement {
            battle_id: battle_id.clone(),
            outcome: SettlementOutcome::from_str(&outcome)
                .map_err(|e| sqlx::Error::Decode(e.into()))?,
            team_a_score: row.get("team_a_score"),
            team_b_score: row.get("team_b_score"),
            total_pot: row.get("total_pot"),
            artist_payout: row.get("artist_payout"),
            platform_share: row.get("platform_share"),
            settled_at: TimeMs::new(row.get("settled_at")),
            entries,
        }))
    }

    pub async fn get_settlement(
        &self,
        battle_id: &BattleId,
    ) -> Result<Option<Settlement>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        Self::load_settlement(&mut conn, battle_id).await
    }
}
