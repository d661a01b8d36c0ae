use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::str::FromStr;

use crate::api::AppState;
use crate::domain::{AccountId, BotTask, SongId};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignTaskRequest {
    pub listener_id: AccountId,
    pub song_id: SongId,
    pub coins: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTaskRequest {
    pub listener_id: AccountId,
}

pub async fn assign_task(
    State(state): State<AppState>,
    Json(req): Json<AssignTaskRequest>,
) -> Result<(StatusCode, Json<BotTask>), AppError> {
    let task = state
        .engine
        .bots
        .assign(&req.listener_id, &req.song_id, req.coins)
        .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn complete_task(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<CompleteTaskRequest>,
) -> Result<Json<BotTask>, AppError> {
    let task = state.engine.bots.complete(id.trim(), &req.listener_id).await?;
    Ok(Json(task))
}

pub async fn list_tasks(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<BotTask>>, AppError> {
    let listener_id = AccountId::from_str(&id)?;
    let tasks = state.engine.bots.tasks_for(&listener_id).await?;
    Ok(Json(tasks))
}
