use crate::clock::Clock;
use crate::config::Config;
use crate::db::Repository;
use crate::domain::{AccountKind, BattleStatus};
use crate::error::EngineError;
use crate::orchestration::bot_program::BotProgram;
use crate::orchestration::ingestor::Ingestor;
use crate::orchestration::ledger::CoinLedger;
use crate::orchestration::lifecycle::BattleLifecycle;
use crate::orchestration::scheduler::ExpiryScheduler;
use crate::orchestration::scoring::ScoringPipeline;
use crate::orchestration::settlement::SettlementEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

/// The battle engine with every component wired to one repository and clock.
#[derive(Clone)]
pub struct BattleEngine {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub ledger: CoinLedger,
    pub scoring: ScoringPipeline,
    pub ingestor: Ingestor,
    pub settlement: SettlementEngine,
    pub lifecycle: BattleLifecycle,
    pub bots: BotProgram,
    clock: Arc<dyn Clock>,
}

impl BattleEngine {
    /// Wire the components, open the platform account, start the scoring
    /// worker and fold anything a previous process left pending.
    pub async fn bootstrap(
        repo: Arc<Repository>,
        config: Config,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let (dispatch, units) = mpsc::unbounded_channel();

        let ledger = CoinLedger::new(repo.clone(), clock.clone(), &config);
        let scoring = ScoringPipeline::new(repo.clone(), clock.clone(), &config);
        let ingestor = Ingestor::new(repo.clone(), clock.clone(), &config, dispatch);
        let settlement = SettlementEngine::new(repo.clone(), ledger.clone(), clock.clone(), &config);
        let lifecycle = BattleLifecycle::new(
            repo.clone(),
            clock.clone(),
            ledger.clone(),
            scoring.clone(),
            settlement.clone(),
            &config,
        );
        let bots = BotProgram::new(repo.clone(), clock.clone(), ledger.clone());

        ledger
            .open_account(&config.platform_account, AccountKind::Platform)
            .await?;
        scoring.spawn_worker(units);

        let engine = Self {
            repo,
            config,
            ledger,
            scoring,
            ingestor,
            settlement,
            lifecycle,
            bots,
            clock,
        };
        engine.recover().await?;
        Ok(engine)
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Fold accepted events of live battles that were never applied.
    pub async fn recover(&self) -> Result<usize, EngineError> {
        let live = self.repo.list_battles(Some(BattleStatus::Live), i64::MAX).await?;
        let mut folded = 0;
        for battle in &live {
            folded += self.scoring.replay_pending(&battle.id).await?;
        }
        if folded > 0 {
            info!(battles = live.len(), folded, "Recovered pending stream events");
        }
        Ok(folded)
    }

    pub fn expiry_scheduler(&self) -> ExpiryScheduler {
        ExpiryScheduler::new(
            self.repo.clone(),
            self.clock.clone(),
            self.lifecycle.clone(),
            Duration::from_millis(self.config.scheduler_interval_ms.max(10)),
        )
    }
}
