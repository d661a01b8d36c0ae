//! Battle lifecycle manager: the only writer of battle status.
//!
//! ```text
//! scheduled ──start──▶ live ──end──▶ completed
//!     │                  │
//!     └──────cancel──────┴──▶ cancelled
//! ```

use crate::clock::Clock;
use crate::config::Config;
use crate::db::Repository;
use crate::domain::battle::CHALLENGER_TEAM_NAME;
use crate::domain::{
    AccountId, AccountKind, Battle, BattleId, BattleSpec, BattleStatus, EntryReason, NewEntry,
    Settlement, Team, TeamSide,
};
use crate::error::EngineError;
use crate::orchestration::ledger::CoinLedger;
use crate::orchestration::scoring::{ScoreUpdate, ScoringPipeline};
use crate::orchestration::settlement::SettlementEngine;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const DEFAULT_CANCEL_REASON: &str = "cancelled";

#[derive(Clone)]
pub struct BattleLifecycle {
    repo: Arc<Repository>,
    clock: Arc<dyn Clock>,
    ledger: CoinLedger,
    scoring: ScoringPipeline,
    settlement: SettlementEngine,
    platform_account: AccountId,
    settlement_retry_max: Duration,
}

impl BattleLifecycle {
    pub fn new(
        repo: Arc<Repository>,
        clock: Arc<dyn Clock>,
        ledger: CoinLedger,
        scoring: ScoringPipeline,
        settlement: SettlementEngine,
        config: &Config,
    ) -> Self {
        Self {
            repo,
            clock,
            ledger,
            scoring,
            settlement,
            platform_account: config.platform_account.clone(),
            settlement_retry_max: Duration::from_millis(config.settlement_retry_max_ms),
        }
    }

    /// Create a scheduled battle and collect the creator's entry fee with it.
    pub async fn create(&self, creator: &AccountId, spec: BattleSpec) -> Result<Battle, EngineError> {
        spec.validate(creator).map_err(EngineError::InvalidSpec)?;
        self.ensure_artist_seat(creator).await?;

        let battle = Battle {
            id: BattleId::generate(),
            name: spec.name.trim().to_string(),
            creator_id: creator.clone(),
            duration_secs: spec.duration_secs,
            entry_fee: spec.entry_fee,
            status: BattleStatus::Scheduled,
            created_at: self.clock.now(),
            scheduled_at: spec.scheduled_at,
            started_at: None,
            ended_at: None,
            team_a: Team {
                side: TeamSide::A,
                name: spec.team_a_name(creator),
                artist_id: Some(creator.clone()),
                score: 0,
                supporters: 0,
            },
            team_b: Team {
                side: TeamSide::B,
                name: CHALLENGER_TEAM_NAME.to_string(),
                artist_id: None,
                score: 0,
                supporters: 0,
            },
            total_pot: spec.total_pot(),
            stream_revenue: 0,
            cancel_reason: None,
            songs: spec.songs,
        };

        let mut tx = self.repo.begin().await?;
        Repository::insert_battle(&mut *tx, &battle).await?;
        if battle.entry_fee > 0 {
            let fee = NewEntry::debit(creator.clone(), battle.entry_fee, EntryReason::EntryFee)
                .for_battle(&battle.id);
            self.ledger.append_in(&mut *tx, &fee).await?;
        }
        tx.commit().await?;

        info!(
            battle = %battle.id,
            creator = %creator,
            entry_fee = battle.entry_fee,
            songs = battle.songs.len(),
            "Battle created"
        );
        Ok(battle)
    }

    /// Take the challenger slot and pay the entry fee in one step.
    pub async fn join(
        &self,
        battle_id: &BattleId,
        challenger: &AccountId,
        team_name: Option<&str>,
    ) -> Result<Battle, EngineError> {
        let battle = self.get(battle_id).await?;
        if &battle.creator_id == challenger {
            return Err(EngineError::InvalidSpec(
                "the creator cannot challenge their own battle".into(),
            ));
        }
        self.ensure_artist_seat(challenger).await?;

        let team_name = team_name
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(CHALLENGER_TEAM_NAME);

        let mut tx = self.repo.begin().await?;
        if !Repository::claim_challenger_slot(&mut *tx, battle_id, challenger, team_name).await? {
            tx.rollback().await?;
            let current = self.get(battle_id).await?;
            let reason = if current.status == BattleStatus::Scheduled {
                "challenger slot is already taken"
            } else {
                "only a scheduled battle accepts a challenger"
            };
            return Err(EngineError::illegal(current.status, reason));
        }
        if battle.entry_fee > 0 {
            let fee = NewEntry::debit(challenger.clone(), battle.entry_fee, EntryReason::EntryFee)
                .for_battle(battle_id);
            // Insufficient funds drops the transaction and the slot stays open.
            self.ledger.append_in(&mut *tx, &fee).await?;
        }
        tx.commit().await?;

        info!(battle = %battle_id, challenger = %challenger, "Challenger joined battle");
        self.get(battle_id).await
    }

    /// scheduled → live once both sides are funded.
    pub async fn start(&self, battle_id: &BattleId) -> Result<Battle, EngineError> {
        if self.repo.mark_live(battle_id, self.clock.now()).await? {
            let battle = self.get(battle_id).await?;
            info!(battle = %battle_id, ends_at = ?battle.ends_at(), "Battle started");
            return Ok(battle);
        }

        let battle = self.get(battle_id).await?;
        let reason = if battle.status == BattleStatus::Scheduled {
            "both sides must be funded before the battle starts"
        } else {
            "only a scheduled battle can start"
        };
        Err(EngineError::illegal(battle.status, reason))
    }

    /// live → completed, folding pending events and settling in the same
    /// transaction. Lock contention is retried with exponential backoff; if
    /// it persists the battle stays live and `SettlementFailure` is returned.
    pub async fn end(&self, battle_id: &BattleId) -> Result<Settlement, EngineError> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(self.settlement_retry_max),
            ..Default::default()
        };

        let (settlement, updates) = retry(policy, || async {
            self.complete_and_settle(battle_id).await.map_err(|e| {
                if e.is_transient() {
                    warn!(battle = %battle_id, error = %e, "Battle completion contended, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await
        .map_err(|e| match e {
            EngineError::Db(db) => {
                error!(battle = %battle_id, error = %db, "Battle completion failed");
                EngineError::SettlementFailure(db.to_string())
            }
            other => other,
        })?;

        for update in updates {
            self.scoring.publish(update);
        }
        Ok(settlement)
    }

    async fn complete_and_settle(
        &self,
        battle_id: &BattleId,
    ) -> Result<(Settlement, Vec<ScoreUpdate>), EngineError> {
        let mut tx = self.repo.begin().await?;
        if !Repository::mark_completed(&mut *tx, battle_id, self.clock.now()).await? {
            tx.rollback().await?;
            let battle = self.get(battle_id).await?;
            return Err(EngineError::illegal(battle.status, "only a live battle can end"));
        }

        let updates = self.scoring.fold_pending_in(&mut *tx, battle_id).await?;
        let settlement = self.settlement.settle_in(&mut *tx, battle_id).await?;
        tx.commit().await?;

        info!(
            battle = %battle_id,
            folded_at_close = updates.len(),
            outcome = settlement.outcome.as_str(),
            "Battle completed"
        );
        Ok((settlement, updates))
    }

    /// scheduled|live → cancelled, refunding every collected entry fee.
    pub async fn cancel(&self, battle_id: &BattleId, reason: Option<&str>) -> Result<Battle, EngineError> {
        let reason = reason
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_CANCEL_REASON);

        let mut tx = self.repo.begin().await?;
        if !Repository::mark_cancelled(&mut *tx, battle_id, reason, self.clock.now()).await? {
            tx.rollback().await?;
            let battle = self.get(battle_id).await?;
            return Err(EngineError::illegal(
                battle.status,
                "only a scheduled or live battle can be cancelled",
            ));
        }

        let fees = Repository::battle_entries(&mut *tx, battle_id, EntryReason::EntryFee).await?;
        for fee in &fees {
            let refund = NewEntry::credit(fee.account_id.clone(), -fee.amount, EntryReason::Refund)
                .for_battle(battle_id);
            self.ledger.append_in(&mut *tx, &refund).await?;
        }
        tx.commit().await?;

        info!(battle = %battle_id, reason, refunds = fees.len(), "Battle cancelled");
        self.get(battle_id).await
    }

    /// The platform collects the remainder of every pot and cannot also
    /// compete for it.
    async fn ensure_artist_seat(&self, account: &AccountId) -> Result<(), EngineError> {
        let is_platform = account == &self.platform_account
            || matches!(
                self.repo.get_account(account).await?,
                Some(existing) if existing.kind == AccountKind::Platform
            );
        if is_platform {
            return Err(EngineError::InvalidSpec(format!(
                "platform account {} cannot take part in a battle",
                account
            )));
        }
        Ok(())
    }

    pub async fn get(&self, battle_id: &BattleId) -> Result<Battle, EngineError> {
        self.repo
            .get_battle(battle_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("battle {}", battle_id)))
    }

    pub async fn list(&self, status: Option<BattleStatus>, limit: i64) -> Result<Vec<Battle>, EngineError> {
        Ok(self.repo.list_battles(status, limit.clamp(1, 200)).await?)
    }
}
