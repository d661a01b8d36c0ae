use crate::clock::Clock;
use crate::db::Repository;
use crate::error::EngineError;
use crate::orchestration::lifecycle::BattleLifecycle;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Ends live battles whose scoring window has closed.
#[derive(Clone)]
pub struct ExpiryScheduler {
    repo: Arc<Repository>,
    clock: Arc<dyn Clock>,
    lifecycle: BattleLifecycle,
    interval: Duration,
}

impl ExpiryScheduler {
    pub fn new(
        repo: Arc<Repository>,
        clock: Arc<dyn Clock>,
        lifecycle: BattleLifecycle,
        interval: Duration,
    ) -> Self {
        Self {
            repo,
            clock,
            lifecycle,
            interval,
        }
    }

    /// One sweep. Returns how many battles this call completed.
    pub async fn tick(&self) -> Result<usize, EngineError> {
        let expired = self.repo.expired_live_battles(self.clock.now()).await?;
        let mut ended = 0;

        for battle_id in expired {
            match self.lifecycle.end(&battle_id).await {
                Ok(settlement) => {
                    ended += 1;
                    info!(
                        battle = %battle_id,
                        outcome = settlement.outcome.as_str(),
                        "Expired battle ended by scheduler"
                    );
                }
                Err(EngineError::IllegalTransition { from, .. }) => {
                    debug!(battle = %battle_id, status = %from, "Battle already left live state");
                }
                Err(e) => {
                    warn!(battle = %battle_id, error = %e, "Failed to end expired battle");
                }
            }
        }

        Ok(ended)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.tick().await {
                    warn!(error = %e, "Expiry sweep failed");
                }
            }
        })
    }
}
