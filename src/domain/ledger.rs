//! Coin accounts and ledger entries.

use crate::domain::{AccountId, BattleId, TimeMs};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Listener,
    Artist,
    Platform,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Listener => "listener",
            AccountKind::Artist => "artist",
            AccountKind::Platform => "platform",
        }
    }
}

impl FromStr for AccountKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "listener" => Ok(AccountKind::Listener),
            "artist" => Ok(AccountKind::Artist),
            "platform" => Ok(AccountKind::Platform),
            other => Err(format!("unknown account kind: {}", other)),
        }
    }
}

/// Why a ledger entry was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryReason {
    EntryFee,
    BotEarning,
    BattlePayout,
    Refund,
    SignupBonus,
    TopUp,
}

impl EntryReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryReason::EntryFee => "entry_fee",
            EntryReason::BotEarning => "bot_earning",
            EntryReason::BattlePayout => "battle_payout",
            EntryReason::Refund => "refund",
            EntryReason::SignupBonus => "signup_bonus",
            EntryReason::TopUp => "top_up",
        }
    }

    /// Debit reasons carry negative amounts, everything else is a credit.
    pub fn is_debit(&self) -> bool {
        matches!(self, EntryReason::EntryFee)
    }
}

impl FromStr for EntryReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry_fee" => Ok(EntryReason::EntryFee),
            "bot_earning" => Ok(EntryReason::BotEarning),
            "battle_payout" => Ok(EntryReason::BattlePayout),
            "refund" => Ok(EntryReason::Refund),
            "signup_bonus" => Ok(EntryReason::SignupBonus),
            "top_up" => Ok(EntryReason::TopUp),
            other => Err(format!("unknown entry reason: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinAccount {
    pub account_id: AccountId,
    pub kind: AccountKind,
    pub balance: i64,
    pub created_at: TimeMs,
}

/// A signed movement of coins on one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub account_id: AccountId,
    pub amount: i64,
    pub reason: EntryReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battle_id: Option<BattleId>,
    pub created_at: TimeMs,
}

/// An entry that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub account_id: AccountId,
    pub amount: i64,
    pub reason: EntryReason,
    pub battle_id: Option<BattleId>,
}

impl NewEntry {
    pub fn debit(account_id: AccountId, coins: i64, reason: EntryReason) -> Self {
        NewEntry {
            account_id,
            amount: -coins,
            reason,
            battle_id: None,
        }
    }

    pub fn credit(account_id: AccountId, coins: i64, reason: EntryReason) -> Self {
        NewEntry {
            account_id,
            amount: coins,
            reason,
            battle_id: None,
        }
    }

    pub fn for_battle(mut self, battle_id: &BattleId) -> Self {
        self.battle_id = Some(battle_id.clone());
        self
    }

    /// The sign of the amount must agree with the reason, and zero moves nothing.
    pub fn is_well_formed(&self) -> bool {
        if self.amount == 0 {
            return false;
        }
        if self.reason.is_debit() {
            self.amount < 0
        } else {
            self.amount > 0
        }
    }
}
