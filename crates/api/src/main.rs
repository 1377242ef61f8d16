use anyhow::Context;
use hirewire_api::{build_router, state::AppState, tasks};
use hirewire_config::Settings;
use hirewire_services::dao::notification::NotificationDao;
use hirewire_services::store::mongo::MongoCallStore;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Arc::new(Settings::load().context("Failed to load settings")?);

    let db = hirewire_db::connect(&settings.mongo)
        .await
        .context("Failed to connect to MongoDB")?;
    hirewire_db::indexes::ensure_indexes(&db)
        .await
        .context("Failed to ensure indexes")?;

    let store = Arc::new(MongoCallStore::new(&db));
    let notifications = Arc::new(NotificationDao::new(&db));

    let state = AppState::new(settings.clone(), store, notifications);

    tasks::spawn_pending_sweeper(state.clone());

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "hirewire-api listening");

    axum::serve(listener, build_router(state))
        .await
        .context("Server exited")?;

    Ok(())
}
