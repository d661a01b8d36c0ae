//! Settlement engine: splits the pot of a completed battle exactly once.

use crate::clock::Clock;
use crate::config::Config;
use crate::db::Repository;
use crate::domain::{AccountId, BattleId, BattleStatus, EntryReason, NewEntry, Settlement};
use crate::engine::plan_payout;
use crate::error::EngineError;
use crate::orchestration::ledger::CoinLedger;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteConnection;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct SettlementEngine {
    repo: Arc<Repository>,
    ledger: CoinLedger,
    clock: Arc<dyn Clock>,
    winner_share: Decimal,
    platform_account: AccountId,
}

impl SettlementEngine {
    pub fn new(
        repo: Arc<Repository>,
        ledger: CoinLedger,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        Self {
            repo,
            ledger,
            clock,
            winner_share: config.winner_share,
            platform_account: config.platform_account.clone(),
        }
    }

    /// Settle inside the completion transaction.
    ///
    /// The settlement row is claimed before any ledger write; if another
    /// caller already claimed it, the recorded settlement is returned and
    /// nothing is written.
    pub(crate) async fn settle_in(
        &self,
        conn: &mut SqliteConnection,
        battle_id: &BattleId,
    ) -> Result<Settlement, EngineError> {
        let battle = Repository::load_battle(&mut *conn, battle_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("battle {}", battle_id)))?;
        if battle.status != BattleStatus::Completed {
            return Err(EngineError::illegal(
                battle.status,
                "only a completed battle can be settled",
            ));
        }

        let plan = plan_payout(&battle, self.winner_share)
            .map_err(|e| EngineError::SettlementFailure(e.to_string()))?;

        let mut settlement = Settlement {
            battle_id: battle.id.clone(),
            outcome: plan.outcome,
            team_a_score: battle.team_a.score,
            team_b_score: battle.team_b.score,
            total_pot: battle.total_pot,
            artist_payout: plan.artist_payout,
            platform_share: plan.platform_share,
            settled_at: self.clock.now(),
            entries: Vec::new(),
        };

        if !Repository::insert_settlement(&mut *conn, &settlement).await? {
            return Repository::load_settlement(&mut *conn, battle_id)
                .await?
                .ok_or_else(|| EngineError::SettlementFailure("settlement row vanished".into()));
        }

        for (artist, amount) in &plan.artist_credits {
            let entry = NewEntry::credit(artist.clone(), *amount, EntryReason::BattlePayout)
                .for_battle(battle_id);
            settlement.entries.push(self.ledger.append_in(&mut *conn, &entry).await?);
        }
        if plan.platform_share > 0 {
            let entry = NewEntry::credit(
                self.platform_account.clone(),
                plan.platform_share,
                EntryReason::BattlePayout,
            )
            .for_battle(battle_id);
            settlement.entries.push(self.ledger.append_in(&mut *conn, &entry).await?);
        }

        info!(
            battle = %battle_id,
            outcome = settlement.outcome.as_str(),
            team_a = settlement.team_a_score,
            team_b = settlement.team_b_score,
            pot = settlement.total_pot,
            artist_payout = settlement.artist_payout,
            platform_share = settlement.platform_share,
            "Battle settled"
        );

        Ok(settlement)
    }

    /// Recorded settlement of a battle.
    ///
    /// Settling is a no-op for a settled battle. A battle that has not
    /// completed yet is an illegal transition.
    pub async fn settle(&self, battle_id: &BattleId) -> Result<Settlement, EngineError> {
        if let Some(existing) = self.repo.get_settlement(battle_id).await? {
            return Ok(existing);
        }

        let battle = self
            .repo
            .get_battle(battle_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("battle {}", battle_id)))?;
        if battle.status != BattleStatus::Completed {
            return Err(EngineError::illegal(
                battle.status,
                "only a completed battle can be settled",
            ));
        }

        // Completed without a settlement row only if a completion committed
        // without settling, which the completion transaction rules out.
        let mut tx = self.repo.begin().await?;
        let settlement = self.settle_in(&mut *tx, battle_id).await?;
        tx.commit().await?;
        Ok(settlement)
    }
}
