//! Settlement record of a completed battle.

use crate::domain::{BattleId, LedgerEntry, TimeMs};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    TeamA,
    TeamB,
    Tie,
}

impl SettlementOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementOutcome::TeamA => "team_a",
            SettlementOutcome::TeamB => "team_b",
            SettlementOutcome::Tie => "tie",
        }
    }

    pub fn from_scores(team_a: i64, team_b: i64) -> Self {
        match team_a.cmp(&team_b) {
            std::cmp::Ordering::Greater => SettlementOutcome::TeamA,
            std::cmp::Ordering::Less => SettlementOutcome::TeamB,
            std::cmp::Ordering::Equal => SettlementOutcome::Tie,
        }
    }
}

impl FromStr for SettlementOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "team_a" => Ok(SettlementOutcome::TeamA),
            "team_b" => Ok(SettlementOutcome::TeamB),
            "tie" => Ok(SettlementOutcome::Tie),
            other => Err(format!("unknown settlement outcome: {}", other)),
        }
    }
}

/// The one-time settlement of a battle, with the ledger entries it wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub battle_id: BattleId,
    pub outcome: SettlementOutcome,
    pub team_a_score: i64,
    pub team_b_score: i64,
    pub total_pot: i64,
    pub artist_payout: i64,
    pub platform_share: i64,
    pub settled_at: TimeMs,
    pub entries: Vec<LedgerEntry>,
}
