mod agent;
mod config;
mod db;
mod errors;
mod models;
mod routes;
mod schemas;
mod service;

use tracing::info;

use crate::agent::OllamaProvider;
use crate::config::AppConfig;
use crate::db::message_store::MessageStore;
use crate::service::chat_service::ChatService;
use crate::service::dispatcher::IntentRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "structured_chat=debug,tower_http=debug".into()),
        )
        .init();

    let config = AppConfig::from_env()?;

    // ── Message store ─────────────────────────────────────────────────────────
    let store = MessageStore::open(&config.db_path).await?;
    info!("Message store holds {} exchanges", store.count().await?);

    // ── Dependency wiring ─────────────────────────────────────────────────────
    let provider = OllamaProvider::new(&config.ollama_base_url, &config.model)?;
    let registry = IntentRegistry::ollama(provider, config.generator_timeout);
    let chat_service = ChatService::new(store.clone(), registry, config.max_prompt_length);

    let app = routes::router(chat_service);

    // ── Listen ────────────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}/ (model {})", config.model);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
        })
        .await?;

    store.close().await?;
    Ok(())
}
