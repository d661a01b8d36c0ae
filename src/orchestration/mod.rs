//! Engine services. Each owns one slice of shared state:
//! - `ledger` - coin balances
//! - `ingestor` - stream event intake and dedup
//! - `scoring` - team counters and live score updates
//! - `lifecycle` - battle status
//! - `settlement` - payouts of completed battles
//! - `bot_program` - bot tasks and their earnings
//! - `scheduler` - ending expired battles

pub mod bot_program;
pub mod ingestor;
pub mod ledger;
pub mod lifecycle;
pub mod orchestrator;
pub mod scheduler;
pub mod scoring;
pub mod settlement;

pub use bot_program::BotProgram;
pub use ingestor::{Ingestor, SubmitOutcome};
pub use ledger::CoinLedger;
pub use lifecycle::BattleLifecycle;
pub use orchestrator::BattleEngine;
pub use scheduler::ExpiryScheduler;
pub use scoring::{ScoreUpdate, ScoringPipeline};
pub use settlement::SettlementEngine;
