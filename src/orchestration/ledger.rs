//! Coin ledger: the only writer of account balances.

use crate::clock::Clock;
use crate::config::Config;
use crate::db::repo::AppendError;
use crate::db::Repository;
use crate::domain::{AccountId, AccountKind, CoinAccount, EntryReason, LedgerEntry, NewEntry};
use crate::error::EngineError;
use sqlx::sqlite::SqliteConnection;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct CoinLedger {
    repo: Arc<Repository>,
    clock: Arc<dyn Clock>,
    signup_bonus: i64,
}

impl CoinLedger {
    pub fn new(repo: Arc<Repository>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self {
            repo,
            clock,
            signup_bonus: config.signup_bonus,
        }
    }

    /// Open an account if it does not exist. New listener accounts get the
    /// signup bonus in the same transaction.
    pub async fn open_account(
        &self,
        account_id: &AccountId,
        kind: AccountKind,
    ) -> Result<CoinAccount, EngineError> {
        let now = self.clock.now();
        let mut tx = self.repo.begin().await?;
        let created = Repository::insert_account(&mut *tx, account_id, kind, now).await?;
        if created && kind == AccountKind::Listener && self.signup_bonus > 0 {
            let bonus = NewEntry::credit(account_id.clone(), self.signup_bonus, EntryReason::SignupBonus);
            self.append_in(&mut *tx, &bonus).await?;
        }
        tx.commit().await?;

        if created {
            info!(account = %account_id, kind = kind.as_str(), "Opened coin account");
        }

        self.account(account_id).await
    }

    pub async fn account(&self, account_id: &AccountId) -> Result<CoinAccount, EngineError> {
        self.repo
            .get_account(account_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("account {}", account_id)))
    }

    /// Append a single entry in its own transaction.
    pub async fn append(&self, entry: NewEntry) -> Result<LedgerEntry, EngineError> {
        let mut tx = self.repo.begin().await?;
        let written = self.append_in(&mut *tx, &entry).await?;
        tx.commit().await?;
        Ok(written)
    }

    /// Append inside a caller-owned transaction. If the caller rolls back, the
    /// entry and the balance change disappear together.
    pub async fn append_in(
        &self,
        conn: &mut SqliteConnection,
        entry: &NewEntry,
    ) -> Result<LedgerEntry, EngineError> {
        let written = Repository::append_entry(conn, entry, self.clock.now()).await?;
        debug!(
            account = %written.account_id,
            amount = written.amount,
            reason = written.reason.as_str(),
            battle = ?written.battle_id,
            "Ledger entry appended"
        );
        Ok(written)
    }

    /// Operator credit.
    pub async fn top_up(&self, account_id: &AccountId, coins: i64) -> Result<LedgerEntry, EngineError> {
        if coins <= 0 {
            return Err(EngineError::InvalidSpec("top-up amount must be positive".into()));
        }
        self.append(NewEntry::credit(account_id.clone(), coins, EntryReason::TopUp))
            .await
    }

    pub async fn balance_of(&self, account_id: &AccountId) -> Result<i64, EngineError> {
        self.repo
            .get_balance(account_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("account {}", account_id)))
    }

    /// Balance recomputed from the entry history.
    pub async fn folded_balance(&self, account_id: &AccountId) -> Result<i64, EngineError> {
        Ok(self.repo.folded_balance(account_id).await?)
    }

    pub async fn entries(
        &self,
        account_id: &AccountId,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, EngineError> {
        Ok(self.repo.list_entries(account_id, limit).await?)
    }
}

impl From<AppendError> for EngineError {
    fn from(err: AppendError) -> Self {
        match err {
            AppendError::UnknownAccount(account) => {
                EngineError::NotFound(format!("account {}", account))
            }
            AppendError::InsufficientFunds {
                account,
                balance,
                required,
            } => EngineError::InsufficientFunds {
                account,
                balance,
                required,
            },
            err @ AppendError::Malformed { .. } => EngineError::InvalidSpec(err.to_string()),
            AppendError::Db(e) => EngineError::Db(e),
        }
    }
}
