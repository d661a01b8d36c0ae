//! Bot program: listeners earn coins by completing assigned tasks.

use crate::clock::Clock;
use crate::db::Repository;
use crate::domain::{AccountId, BotTask, EntryReason, NewEntry, SongId};
use crate::error::EngineError;
use crate::orchestration::ledger::CoinLedger;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct BotProgram {
    repo: Arc<Repository>,
    clock: Arc<dyn Clock>,
    ledger: CoinLedger,
}

impl BotProgram {
    pub fn new(repo: Arc<Repository>, clock: Arc<dyn Clock>, ledger: CoinLedger) -> Self {
        Self { repo, clock, ledger }
    }

    pub async fn assign(
        &self,
        listener_id: &AccountId,
        song_id: &SongId,
        coins: i64,
    ) -> Result<BotTask, EngineError> {
        if coins <= 0 {
            return Err(EngineError::InvalidSpec("a bot task must award coins".into()));
        }
        // The earning needs somewhere to land.
        self.ledger.account(listener_id).await?;

        let task = BotTask::new(listener_id.clone(), song_id.clone(), coins, self.clock.now());
        self.repo.insert_bot_task(&task).await?;
        debug!(task = %task.id, listener = %listener_id, coins, "Bot task assigned");
        Ok(task)
    }

    /// Complete a task and credit its coins exactly once. Completing an
    /// already completed task returns it unchanged.
    pub async fn complete(&self, task_id: &str, listener_id: &AccountId) -> Result<BotTask, EngineError> {
        let now = self.clock.now();
        let mut tx = self.repo.begin().await?;

        if !Repository::mark_bot_task_completed(&mut *tx, task_id, listener_id, now).await? {
            let existing = Repository::load_bot_task(&mut *tx, task_id).await?;
            tx.rollback().await?;
            return match existing {
                Some(task) if &task.listener_id == listener_id => Ok(task),
                Some(_) => Err(EngineError::InvalidSpec(format!(
                    "bot task {} is assigned to another listener",
                    task_id
                ))),
                None => Err(EngineError::NotFound(format!("bot task {}", task_id))),
            };
        }

        let task = Repository::load_bot_task(&mut *tx, task_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("bot task {}", task_id)))?;
        let earning = NewEntry::credit(listener_id.clone(), task.coins_awarded, EntryReason::BotEarning);
        self.ledger.append_in(&mut *tx, &earning).await?;
        tx.commit().await?;

        info!(task = %task_id, listener = %listener_id, coins = task.coins_awarded, "Bot task completed");
        Ok(task)
    }

    pub async fn tasks_for(&self, listener_id: &AccountId) -> Result<Vec<BotTask>, EngineError> {
        Ok(self.repo.list_bot_tasks(listener_id).await?)
    }
}
