//! Domain types for the battle engine.
//!
//! This module provides:
//! - Identity and time primitives: AccountId, BattleId, SongId, TimeMs, TeamSide
//! - Battle, Team and Song snapshot types with creation validation
//! - Stream events and their stable event ids
//! - Coin accounts, ledger entries, settlements and bot tasks

pub mod battle;
pub mod bot_task;
pub mod ledger;
pub mod primitives;
pub mod settlement;
pub mod stream_event;

pub use battle::{Battle, BattleSpec, BattleStatus, Song, Team, MAX_SONGS};
pub use bot_task::BotTask;
pub use ledger::{AccountKind, CoinAccount, EntryReason, LedgerEntry, NewEntry};
pub use primitives::{AccountId, BattleId, IdParseError, SongId, TeamSide, TimeMs};
pub use settlement::{Settlement, SettlementOutcome};
pub use stream_event::{ScoringUnit, StreamEvent, StreamSubmission};
