use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::api::AppState;
use crate::domain::{AccountId, Battle, BattleId, BattleSpec, BattleStatus, Settlement};
use crate::error::AppError;

const DEFAULT_LIST_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBattleRequest {
    pub creator_id: AccountId,
    #[serde(flatten)]
    pub spec: BattleSpec,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListBattlesQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinBattleRequest {
    pub artist_id: AccountId,
    pub team_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelBattleRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndBattleResponse {
    pub battle: Battle,
    pub settlement: Settlement,
}

fn battle_id(raw: &str) -> Result<BattleId, AppError> {
    Ok(BattleId::from_str(raw)?)
}

pub async fn create_battle(
    State(state): State<AppState>,
    Json(req): Json<CreateBattleRequest>,
) -> Result<(StatusCode, Json<Battle>), AppError> {
    let battle = state.engine.lifecycle.create(&req.creator_id, req.spec).await?;
    Ok((StatusCode::CREATED, Json(battle)))
}

pub async fn list_battles(
    Query(params): Query<ListBattlesQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Battle>>, AppError> {
    let status = params
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(BattleStatus::from_str)
        .transpose()
        .map_err(AppError::BadRequest)?;
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if limit <= 0 {
        return Err(AppError::BadRequest("limit must be positive".into()));
    }

    let battles = state.engine.lifecycle.list(status, limit).await?;
    Ok(Json(battles))
}

pub async fn get_battle(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Battle>, AppError> {
    let battle = state.engine.lifecycle.get(&battle_id(&id)?).await?;
    Ok(Json(battle))
}

pub async fn join_battle(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<JoinBattleRequest>,
) -> Result<Json<Battle>, AppError> {
    let battle = state
        .engine
        .lifecycle
        .join(&battle_id(&id)?, &req.artist_id, req.team_name.as_deref())
        .await?;
    Ok(Json(battle))
}

pub async fn start_battle(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Battle>, AppError> {
    let battle = state.engine.lifecycle.start(&battle_id(&id)?).await?;
    Ok(Json(battle))
}

pub async fn end_battle(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<EndBattleResponse>, AppError> {
    let id = battle_id(&id)?;
    let settlement = state.engine.lifecycle.end(&id).await?;
    let battle = state.engine.lifecycle.get(&id).await?;
    Ok(Json(EndBattleResponse { battle, settlement }))
}

pub async fn cancel_battle(
    Path(id): Path<String>,
    State(state): State<AppState>,
    body: Option<Json<CancelBattleRequest>>,
) -> Result<Json<Battle>, AppError> {
    let reason = body.and_then(|Json(req)| req.reason);
    let battle = state
        .engine
        .lifecycle
        .cancel(&battle_id(&id)?, reason.as_deref())
        .await?;
    Ok(Json(battle))
}

pub async fn get_settlement(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Settlement>, AppError> {
    let settlement = state.engine.settlement.settle(&battle_id(&id)?).await?;
    Ok(Json(settlement))
}
