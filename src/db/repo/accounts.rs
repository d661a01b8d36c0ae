//! Coin account and ledger entry operations for the repository.

use crate::domain::{
    AccountId, AccountKind, BattleId, CoinAccount, EntryReason, LedgerEntry, NewEntry, TimeMs,
};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use thiserror::Error;

use super::Repository;

/// Why a ledger append was refused.
#[derive(Debug, Error)]
pub enum AppendError {
    #[error("account {0} does not exist")]
    UnknownAccount(String),
    #[error("insufficient funds on {account}: balance {balance}, required {required}")]
    InsufficientFunds {
        account: String,
        balance: i64,
        required: i64,
    },
    #[error("ledger entry amount {amount} does not match reason {reason}")]
    Malformed { amount: i64, reason: &'static str },
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl Repository {
    /// Create an account if it does not exist yet. Returns true when created.
    pub async fn insert_account(
        conn: &mut SqliteConnection,
        account_id: &AccountId,
        kind: AccountKind,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO coin_accounts (account_id, kind, balance, created_at, updated_at)
            VALUES (?, ?, 0, ?, ?)
            ON CONFLICT(account_id) DO NOTHING
            "#,
        )
        .bind(account_id.as_str())
        .bind(kind.as_str())
        .bind(now.as_ms())
        .bind(now.as_ms())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<CoinAccount>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT account_id, kind, balance, created_at
            FROM coin_accounts
            WHERE account_id = ?
            "#,
        )
        .bind(account_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let kind: String = r.get("kind");
            Ok(CoinAccount {
                account_id: AccountId::new(r.get::<String, _>("account_id")),
                kind: AccountKind::from_str(&kind).map_err(|e| sqlx::Error::Decode(e.into()))?,
                balance: r.get("balance"),
                created_at: TimeMs::new(r.get("created_at")),
            })
        })
        .transpose()
    }

    /// Append one ledger entry and move the cached balance with it.
    ///
    /// The balance update is a single conditional statement
    /// (`balance + amount >= 0`), so two debits racing on the same account can
    /// never both pass the funds check. The entry insert shares the caller's
    /// transaction, keeping the cached balance equal to the fold of entries.
    pub async fn append_entry(
        conn: &mut SqliteConnection,
        entry: &NewEntry,
        now: TimeMs,
    ) -> Result<LedgerEntry, AppendError> {
        if !entry.is_well_formed() {
            return Err(AppendError::Malformed {
                amount: entry.amount,
                reason: entry.reason.as_str(),
            });
        }

        let updated = sqlx::query(
            r#"
            UPDATE coin_accounts
            SET balance = balance + ?, updated_at = ?
            WHERE account_id = ? AND balance + ? >= 0
            "#,
        )
        .bind(entry.amount)
        .bind(now.as_ms())
        .bind(entry.account_id.as_str())
        .bind(entry.amount)
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            let balance: Option<i64> =
                sqlx::query_scalar("SELECT balance FROM coin_accounts WHERE account_id = ?")
                    .bind(entry.account_id.as_str())
                    .fetch_optional(&mut *conn)
                    .await?;
            return Err(match balance {
                None => AppendError::UnknownAccount(entry.account_id.to_string()),
                Some(balance) => AppendError::InsufficientFunds {
                    account: entry.account_id.to_string(),
                    balance,
                    required: -entry.amount,
                },
            });
        }

        let written = LedgerEntry {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: entry.account_id.clone(),
            amount: entry.amount,
            reason: entry.reason,
            battle_id: entry.battle_id.clone(),
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, account_id, amount, reason, battle_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&written.id)
        .bind(written.account_id.as_str())
        .bind(written.amount)
        .bind(written.reason.as_str())
        .bind(written.battle_id.as_ref().map(|b| b.as_str()))
        .bind(written.created_at.as_ms())
        .execute(&mut *conn)
        .await?;

        Ok(written)
    }

    /// Cached balance.
    pub async fn get_balance(&self, account_id: &AccountId) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar("SELECT balance FROM coin_accounts WHERE account_id = ?")
            .bind(account_id.as_str())
            .fetch_optional(&self.pool)
            .await
    }

    /// Balance recomputed from the entries themselves.
    pub async fn folded_balance(&self, account_id: &AccountId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM ledger_entries WHERE account_id = ?",
        )
        .bind(account_id.as_str())
        .fetch_one(&self.pool)
        .await
    }

    /// Most recent entries first.
    pub async fn list_entries(
        &self,
        account_id: &AccountId,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, amount, reason, battle_id, created_at
            FROM ledger_entries
            WHERE account_id = ?
            ORDER BY seq DESC
            LIMIT ?
            "#,
        )
        .bind(account_id.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    /// Entries of one reason written for a battle, in append order.
    pub async fn battle_entries(
        conn: &mut SqliteConnection,
        battle_id: &BattleId,
        reason: EntryReason,
    ) -> Result<Vec<LedgerEntry>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, amount, reason, battle_id, created_at
            FROM ledger_entries
            WHERE battle_id = ? AND reason = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(battle_id.as_str())
        .bind(reason.as_str())
        .fetch_all(&mut *conn)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<LedgerEntry, sqlx::Error> {
    let reason: String = row.get("reason");
    let battle_id: Option<String> = row.get("battle_id");
    Ok(LedgerEntry {
        id: row.get("id"),
        account_id: AccountId::new(row.get::<String, _>("account_id")),
        amount: row.get("amount"),
        reason: EntryReason::from_str(&reason).map_err(|e| sqlx::Error::Decode(e.into()))?,
        battle_id: battle_id.map(BattleId::new),
        created_at: TimeMs::new(row.get("created_at")),
    })
}
