pub mod accounts;
pub mod battles;
pub mod bot_tasks;
pub mod health;
pub mod streams;

use crate::config::Config;
use crate::db::Repository;
use crate::orchestration::BattleEngine;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub engine: BattleEngine,
}

impl AppState {
    pub fn new(engine: BattleEngine) -> Self {
        Self {
            repo: engine.repo.clone(),
            config: engine.config.clone(),
            engine,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route(
            "/v1/battles",
            post(battles::create_battle).get(battles::list_battles),
        )
        .route("/v1/battles/:id", get(battles::get_battle))
        .route("/v1/battles/:id/join", post(battles::join_battle))
        .route("/v1/battles/:id/start", post(battles::start_battle))
        .route("/v1/battles/:id/end", post(battles::end_battle))
        .route("/v1/battles/:id/cancel", post(battles::cancel_battle))
        .route("/v1/battles/:id/settlement", get(battles::get_settlement))
        .route("/v1/battles/:id/streams", post(streams::submit_stream))
        .route("/v1/battles/:id/scores/stream", get(streams::score_stream))
        .route("/v1/accounts", post(accounts::open_account))
        .route("/v1/accounts/:id/balance", get(accounts::get_balance))
        .route("/v1/accounts/:id/entries", get(accounts::get_entries))
        .route("/v1/accounts/:id/top-up", post(accounts::top_up))
        .route("/v1/bot-tasks", post(bot_tasks::assign_task))
        .route("/v1/bot-tasks/:id/complete", post(bot_tasks::complete_task))
        .route("/v1/listeners/:id/bot-tasks", get(bot_tasks::list_tasks))
        .layer(cors)
        .with_state(state)
}
