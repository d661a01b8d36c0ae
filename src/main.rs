use anyhow::Context;
use battlestream::{api, config::Config, db::init_db, BattleEngine, Repository, SystemClock};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("configuration error")?;
    let port = config.port;

    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("failed to initialize database at {}", config.database_path))?;
    let repo = Arc::new(Repository::new(pool));

    let engine = BattleEngine::bootstrap(repo, config, Arc::new(SystemClock))
        .await
        .context("failed to start battle engine")?;
    engine.expiry_scheduler().spawn();

    let app = api::create_router(api::AppState::new(engine));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
