use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::api::AppState;
use crate::domain::{AccountId, AccountKind, CoinAccount, LedgerEntry};
use crate::error::AppError;

const DEFAULT_ENTRY_LIMIT: i64 = 100;
const MAX_ENTRY_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAccountRequest {
    pub account_id: AccountId,
    pub kind: AccountKind,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntriesQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpRequest {
    pub amount: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub account_id: AccountId,
    pub balance: i64,
    /// Sum of all entries; always equal to `balance`.
    pub folded_balance: i64,
}

pub async fn open_account(
    State(state): State<AppState>,
    Json(req): Json<OpenAccountRequest>,
) -> Result<(StatusCode, Json<CoinAccount>), AppError> {
    if req.kind == AccountKind::Platform || req.account_id == state.config.platform_account {
        return Err(AppError::BadRequest(
            "platform accounts are managed by the engine".into(),
        ));
    }
    let account = state.engine.ledger.open_account(&req.account_id, req.kind).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn get_balance(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, AppError> {
    let account_id = AccountId::from_str(&id)?;
    let balance = state.engine.ledger.balance_of(&account_id).await?;
    let folded_balance = state.engine.ledger.folded_balance(&account_id).await?;
    Ok(Json(BalanceResponse {
        account_id,
        balance,
        folded_balance,
    }))
}

pub async fn get_entries(
    Path(id): Path<String>,
    Query(params): Query<EntriesQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<LedgerEntry>>, AppError> {
    let account_id = AccountId::from_str(&id)?;
    let limit = params.limit.unwrap_or(DEFAULT_ENTRY_LIMIT);
    if !(1..=MAX_ENTRY_LIMIT).contains(&limit) {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_ENTRY_LIMIT
        )));
    }

    // 404 for unknown accounts rather than an empty history
    state.engine.ledger.account(&account_id).await?;
    let entries = state.engine.ledger.entries(&account_id, limit).await?;
    Ok(Json(entries))
}

pub async fn top_up(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<TopUpRequest>,
) -> Result<Json<LedgerEntry>, AppError> {
    let account_id = AccountId::from_str(&id)?;
    let entry = state.engine.ledger.top_up(&account_id, req.amount).await?;
    Ok(Json(entry))
}
