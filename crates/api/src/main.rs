mod config;
mod error;
mod metrics;
mod routes;

use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::{AppConfig, StoreBackend};
use index::{EmbeddingClient, InMemoryVectorStore, QdrantStore, VectorStore};
use query::QueryLLM;
use routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = config::read_dotenv(".env")?;

    // Tracing before the config so its warnings are not lost
    let log_json = std::env::var("RAG_LOG_JSON")
        .ok()
        .or_else(|| dotenv.get("RAG_LOG_JSON").cloned())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
    init_tracing(log_json);

    let config = AppConfig::from_env_and_dotenv(&dotenv);
    config.validate().context("Invalid configuration")?;
    info!(
        embedding.provider = ?config.embedding.provider,
        embedding.model = %config.embedding.model,
        completion.provider = ?config.completion.provider,
        completion.model = %config.completion.model,
        store = ?config.store.backend,
        log_json = config.log_json,
        dotenv_entries = dotenv.len(),
        "starting RAG service"
    );

    let timeout = config.request_timeout();

    // Create embedding client
    let embedder = EmbeddingClient::new(
        config.embedding.provider,
        config.embedding.base_url.clone(),
        config.embedding.model.clone(),
        config.embedding.dimension,
    )
    .with_api_key(config.embedding.api_key.clone())
    .with_timeout(timeout)?;

    // Create completion client
    if config.completion.api_key.is_none() {
        warn!("no completion API key configured; hosted providers will reject requests");
    }
    let llm = QueryLLM::new(
        config.completion.provider,
        config.completion.base_url.clone(),
        config.completion.model.clone(),
    )
    .with_api_key(config.completion.api_key.clone())
    .with_sampling(config.completion.temperature, config.completion.max_tokens)
    .with_timeout(timeout)?;

    // Create vector store
    let store: Arc<dyn VectorStore> = match config.store.backend {
        StoreBackend::Memory => {
            warn!("using the in-memory vector store; documents are lost on restart");
            Arc::new(InMemoryVectorStore::new())
        }
        StoreBackend::Qdrant => {
            let store = QdrantStore::new(config.store.qdrant_url.clone(), &config.store.collection)
                .with_timeout(timeout)?;
            store
                .init(config.embedding.dimension)
                .await
                .context("Failed to initialize Qdrant collections")?;
            Arc::new(store)
        }
    };

    let state = AppState::new(Arc::new(embedder), store, Arc::new(llm), &config)?;

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origins));

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    info!("Server listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
