use std::sync::Arc;

use tracing::info;

use crate::config::AppConfig;
use crate::engine::CompletionEngine;
use crate::server::{self, AppState};
use crate::state::SqliteStateStore;
use crate::traits::{CatalogStore, StateStore};

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    // 1. State store
    let store = Arc::new(SqliteStateStore::new(&config.state.db_path).await?);
    info!("State store initialized ({})", config.state.db_path);

    // 2. Quest catalog (immutable reference data, first write wins)
    let seeded = store.seed_quests(&config.catalog.quests).await?;
    info!(
        seeded,
        configured = config.catalog.quests.len(),
        "Quest catalog seeded"
    );

    // 3. Completion engine
    let store: Arc<dyn StateStore> = store;
    let engine = Arc::new(CompletionEngine::new(store.clone()));

    // 4. HTTP surface
    let app = server::build_router(AppState { engine, store });
    let addr: std::net::SocketAddr =
        format!("{}:{}", config.server.bind, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
