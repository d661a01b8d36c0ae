pub mod api;
pub mod clock;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    AccountId, AccountKind, Battle, BattleId, BattleSpec, BattleStatus, EntryReason, LedgerEntry,
    Settlement, SettlementOutcome, SongId, StreamEvent, StreamSubmission, TeamSide, TimeMs,
};
pub use error::{AppError, EngineError};
pub use orchestration::BattleEngine;
