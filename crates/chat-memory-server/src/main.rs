use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use chat_memory_server::{
    build_router,
    config::{Settings, StoreBackend},
    database::{ensure_schema, DbPool, InMemoryChatStore, PgChatStore},
    logging::init_logger,
    services::{conversation::ChatStore, EmbeddingService, LlmService},
    AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_logger()?;

    info!("🚀 Starting chat memory server...");

    let settings = Settings::load()?;
    info!("✅ Configuration loaded");

    let store: Arc<dyn ChatStore> = match settings.database.backend {
        StoreBackend::Postgres => {
            let pool = DbPool::connect(&settings.database).await?;
            ensure_schema(&pool, settings.embedding.dimension).await?;
            info!("✅ Database ready (dimension {})", settings.embedding.dimension);
            Arc::new(PgChatStore::new(pool))
        }
        StoreBackend::Memory => {
            info!("⚠️ Using in-memory store, data is lost on restart");
            Arc::new(InMemoryChatStore::new())
        }
    };

    let embedder = Arc::new(EmbeddingService::new(&settings.embedding)?);
    let llm = Arc::new(LlmService::new(&settings.llm)?);
    info!(
        "✅ Services initialized (embedding model {}, chat model {})",
        settings.embedding.model, settings.llm.model
    );

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    let app = build_router(AppState::new(settings, store, embedder, llm));

    info!("🎯 Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
